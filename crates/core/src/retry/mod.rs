//! Retry store port and replay orchestration

pub mod ports;
pub mod replay;

pub use ports::{AttemptOutcome, RetryStore};
pub use replay::{ReplaySummary, Replayer};
