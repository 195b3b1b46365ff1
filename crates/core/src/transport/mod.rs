//! Remote transport port and the session that serializes access to it

pub mod ports;
pub mod session;

pub use ports::{BatchRequest, BatchTransport, SessionHandle};
pub use session::{Exchange, TransportSession};
