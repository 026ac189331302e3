//! A multi-decree Paxos replica: per-slot `{value, is_decided, seq_accepted,
//! seq_highest}`, a Prepare/Accept/Decide proposer loop, and the admin lock
//! used to pause proposing during membership changes.
//!
//! This is the secondary subsystem: its algorithm is standard and its
//! contract (at most one value decided per slot) is what matters.

mod error;
mod proposal;
mod replica;
mod slot;
mod transport;

pub use error::PaxosError;
pub use proposal::ProposalNumberGenerator;
pub use replica::Paxos;
pub use slot::{Slot, SlotState, SlotStatus};
pub use transport::{AcceptReply, PaxosTransport, PrepareReply};
