//! Abstract interpretation over graphs.
//!
//! - [`scheduler`]: the cooperative loop and pending values
//! - [`reference`]: contexts, references and the evaluation cache
//! - [`inferrers`]: one inferrer per kind of callee
//! - [`engine`]: dispatch, rerouting and the top-level `run`

pub mod engine;
pub mod inferrers;
pub mod reference;
pub mod scheduler;
