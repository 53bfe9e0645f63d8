//! Client synchronization: poll resolution and push attach/replay.

mod coordinator;

pub use coordinator::{PollOutcome, SyncCoordinator, SyncPolicy};
