//! Shared machinery between the LSP client and server: connection state,
//! params, errors, the epoch clock, and datagram I/O. The client and server
//! event loops differ only in cardinality (one connection vs. a keyed map)
//! and in how a connection gets created.

pub mod connection;
pub mod epoch;
pub mod error;
pub mod params;
pub mod socket;

pub use connection::{AckOutcome, ConnState, ConnectionState, DataOutcome, EpochOutcome, WriteOutcome};
pub use error::LspError;
pub use params::Params;
pub use socket::{Datagram, UdpTransport};
