// ABOUTME: Durable run state: the serde model, atomic store, run lock, and cancel marker
// ABOUTME: Only the scheduler holding the run lock may mutate the state file

pub mod cancel;
pub mod error;
pub mod lock;
pub mod model;
pub mod store;

pub use cancel::{clear_cancel_request, is_cancel_requested, request_cancel};
pub use error::{LockError, StateError};
pub use lock::RunLock;
pub use model::{RunState, RunStatus, TaskState, TaskStatus};
pub use store::{load_state, save_state_atomic};
