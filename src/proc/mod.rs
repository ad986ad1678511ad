//! Module analyses consumed by the back ends.

mod flow;
mod typify;

pub use flow::{FlowInfo, LoopAnalysis};
pub use typify::{resolve_value, ResolveError, TypeResolution};
