//! Background replay of deferred writes
//!
//! The worker follows explicit lifecycle management: join handle tracking,
//! cancellation tokens and a join timeout on stop.

mod errors;
pub mod replay_worker;

pub use errors::WorkerError;
pub use replay_worker::{ReplayWorker, ReplayWorkerConfig};
