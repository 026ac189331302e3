//! The operations a replica proposes to the log. Mirrors the `PaxosValue`
//! variants dispatched over in `server_impl.go`'s `addPaxosLogAndUpdateState`,
//! trimmed to the three named in the flight-reservation resource model:
//! reserve a seat, cancel one, and query how many remain.

/// A single entry in the replicated log. `NoOp` is never proposed directly
/// by a caller — it is what `sync_slot` fills a gap with while catching up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reserve { flight: String, user: String },
    Cancel { flight: String, user: String },
    Query { flight: String },
    NoOp,
}

/// The result of applying a decided `Command` against local state, handed
/// back to whichever caller proposed it (every other decided entry is
/// applied too, but its result is discarded — only the proposer's own
/// command's outcome is returned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Reserved,
    Cancelled,
    SeatsAvailable(u32),
    Nothing,
}
