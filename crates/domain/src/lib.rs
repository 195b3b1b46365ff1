//! # Mailwire Domain
//!
//! Types shared by every layer of the client.
//!
//! This crate contains:
//! - Field maps, batch results and pending write units
//! - Entity descriptors and the built-in entity catalog
//! - The error type and `Result` alias
//! - Client configuration structures
//!
//! ## Architecture
//! - No dependencies on other Mailwire crates
//! - No I/O

pub mod catalog;
pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
