//! # Mailwire Core
//!
//! Client-side consistency and retry machinery - no I/O of its own.
//!
//! This crate contains:
//! - Port interfaces for the wire transport and the retry store
//! - The serialized transport session
//! - The record lifecycle state machine
//! - The write cache and its positional correlation of batch results
//! - Replay orchestration with a retry limit
//!
//! ## Architecture Principles
//! - Only depends on `mailwire-domain`
//! - No filesystem, network or SOAP code
//! - All external dependencies via traits

pub mod client;
pub mod records;
pub mod retry;
pub mod transport;
pub mod write_cache;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::{Client, ClientBuilder};
pub use records::{EntityRegistry, Record};
pub use retry::{AttemptOutcome, ReplaySummary, Replayer, RetryStore};
pub use transport::{BatchRequest, BatchTransport, Exchange, SessionHandle, TransportSession};
pub use write_cache::{
    CorrelatedOutcome, Deferral, FlushOutcome, FlushReport, ItemOutcome, WriteCache,
};
