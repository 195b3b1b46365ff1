//! # Mailwire Infrastructure
//!
//! Implementations of the core ports that touch the outside world.
//!
//! This crate contains:
//! - The file-backed retry store and the store factory
//! - The timeout decorator for wire transports
//! - Configuration loading from the environment and files
//! - Tracing subscriber setup
//! - The background replay worker
//!
//! ## Architecture
//! - Implements traits defined in `mailwire-core`
//! - Contains all filesystem and timer code

pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod retry;
pub mod sync;
pub mod transport;

pub use bootstrap::{connect, connect_from_env};
pub use logging::{init_tracing, LogFormat};
pub use retry::{build_retry_store, FileRetryStore};
pub use sync::{ReplayWorker, ReplayWorkerConfig, WorkerError};
pub use transport::TimeoutTransport;
