//! Catch-up-then-apply: the core of `server_impl.go`'s
//! `addPaxosLogAndUpdateState`, ported directly. A replica proposes its own
//! command at the next free slot; whatever actually gets decided there
//! (which may be a different replica's command, or a `sync_slot` no-op) is
//! applied to local state before the replica looks at the result. If the
//! decided entry wasn't its own, it advances to the next slot and retries
//! the same command, applying every intervening decided entry along the
//! way, until its own command is finally the one that wins a slot.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use paxos::{Paxos, PaxosTransport, Slot};
use tokio::sync::Mutex;
use tracing::debug;

use crate::command::{Command, CommandResult};
use crate::error::ReservationError;
use crate::state::State;

fn wall_time_ns() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_nanos() as u64
}

struct Inner {
    next_slot: Slot,
    state: State,
}

/// One replica of the flight-reservation service. Wraps a `Paxos<Command>`
/// acceptor/proposer and the local state it drives; holds no network
/// transport of its own, accepting one per call the way the teacher's
/// session types accept a socket per call rather than owning it.
pub struct ReservationServer {
    paxos: Arc<Paxos<Command>>,
    inner: Mutex<Inner>,
}

impl ReservationServer {
    pub fn new(paxos: Arc<Paxos<Command>>, flights: impl IntoIterator<Item = (String, u32)>) -> Self {
        ReservationServer {
            paxos,
            inner: Mutex::new(Inner { next_slot: 0, state: State::new(flights) }),
        }
    }

    pub fn me(&self) -> usize {
        self.paxos.me()
    }

    /// Proposes `command`, catching up through every slot decided ahead of
    /// it, and returns the result of applying `command` itself once it is
    /// the entry that wins a slot. Held for the full catch-up loop, so two
    /// concurrent calls on the same replica serialize rather than race over
    /// `next_slot`.
    pub async fn propose(&self, command: Command, transport: &dyn PaxosTransport<Command>) -> Result<CommandResult, ReservationError> {
        let mut inner = self.inner.lock().await;
        loop {
            let slot = inner.next_slot;
            let decided = self.paxos.start(slot, command.clone(), wall_time_ns, transport).await?;
            let is_own = decided == command;
            let applied = inner.state.apply(&decided);
            inner.next_slot = slot + 1;
            self.paxos.done(slot);

            if is_own {
                return applied;
            }
            if let Err(e) = applied {
                debug!(slot, error = %e, "catch-up: decided entry did not apply, continuing");
            }
        }
    }

    /// Drives no-op proposals through every slot up to (but not including)
    /// `target`, applying whatever is actually decided at each. Lets a
    /// replica that fell behind (e.g. after rejoining) rejoin the applied
    /// sequence without proposing a real command of its own.
    pub async fn catch_up(&self, target: Slot, transport: &dyn PaxosTransport<Command>) {
        let mut inner = self.inner.lock().await;
        while inner.next_slot < target {
            let slot = inner.next_slot;
            let decided = match self.paxos.sync_slot(slot, Command::NoOp, wall_time_ns, transport).await {
                Ok(decided) => decided,
                Err(e) => {
                    debug!(slot, error = %e, "catch-up: sync_slot failed, stopping early");
                    return;
                }
            };
            if let Err(e) = inner.state.apply(&decided) {
                debug!(slot, error = %e, "catch-up: decided entry did not apply, continuing");
            }
            inner.next_slot = slot + 1;
            self.paxos.done(slot);
        }
    }
}
