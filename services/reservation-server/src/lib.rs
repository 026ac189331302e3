//! Flight-reservation state machine fed by a replicated log. No RPC
//! transport, CLI runner, or admin tooling is built here — callers supply a
//! `paxos::PaxosTransport<Command>` of their own (a real one in production,
//! `lsp_test_support::InMemoryCluster` in tests) and drive `propose`/
//! `catch_up` directly.

mod command;
mod error;
mod server;
mod state;

pub use command::{Command, CommandResult};
pub use error::ReservationError;
pub use server::ReservationServer;
