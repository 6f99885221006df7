//! Operation registry (ยง3/ยง4.2): outstanding-request correlation, bounded
//! concurrency, timeouts and retries.

mod manager;
mod types;

pub use manager::{OperationCounters, OperationManager};
pub use types::{Disposition, Operation, OperationState, ResponseInspector};
