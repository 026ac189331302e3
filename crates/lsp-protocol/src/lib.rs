//! Wire types and the sequence-ordered buffer shared by the LSP client and
//! server: the two pieces of the protocol that have no notion of
//! connections, windows, or event loops on their own.

mod buffer;
mod message;

pub use buffer::{HasSeq, OrderedBuffer};
pub use message::{Message, UNASSIGNED_CONN_ID};
