//! Build pipeline observation

mod monitor;
mod types;

pub use monitor::BuildMonitor;
pub use types::{BuildState, BuildTarget};
