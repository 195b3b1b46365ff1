//! Transport decorators

pub mod timeout;

pub use timeout::TimeoutTransport;
