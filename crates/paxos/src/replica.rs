//! The Paxos replica: per-slot acceptor state plus the proposer loop
//! (Prepare -> Accept -> Decide). Grounded directly in the original
//! `paxos.go`'s `Start`/`Prepare`/`Accept`/`Decide` shape; the per-slot
//! locking keeps unrelated slots from blocking each other, same as the
//! original's per-time-slot lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::error::PaxosError;
use crate::proposal::ProposalNumberGenerator;
use crate::slot::{Slot, SlotState, SlotStatus};
use crate::transport::{AcceptReply, PaxosTransport, PrepareReply};

pub struct Paxos<V> {
    me: usize,
    peer_count: usize,
    slots: Mutex<HashMap<Slot, Arc<Mutex<SlotState<V>>>>>,
    proposal_gen: ProposalNumberGenerator,
    admin_locked: AtomicBool,
    max_done: Mutex<Vec<Slot>>,
}

impl<V: Clone + Send + Sync + 'static> Paxos<V> {
    pub fn new(me: usize, peer_count: usize) -> Self {
        Paxos {
            me,
            peer_count,
            slots: Mutex::new(HashMap::new()),
            proposal_gen: ProposalNumberGenerator::new(peer_count, me),
            admin_locked: AtomicBool::new(false),
            max_done: Mutex::new(vec![0; peer_count]),
        }
    }

    pub fn me(&self) -> usize {
        self.me
    }

    fn slot_handle(&self, slot: Slot) -> Arc<Mutex<SlotState<V>>> {
        let mut slots = self.slots.lock().expect("slots mutex poisoned");
        slots.entry(slot).or_insert_with(|| Arc::new(Mutex::new(SlotState::default()))).clone()
    }

    /// Handles an incoming Prepare(slot, seq), called both for peer RPCs and
    /// for the proposer's own self-vote. `from`/`max_done` gossip the
    /// proposer's own garbage-collection progress, the same piggyback the
    /// original RPC's `PrepareArgs.MaxDone` field carries.
    pub fn handle_prepare(&self, slot: Slot, seq: u64, from: usize, max_done: Slot) -> PrepareReply<V> {
        self.observe_max_done(from, max_done);
        let handle = self.slot_handle(slot);
        let mut state = handle.lock().expect("slot mutex poisoned");
        if seq > state.seq_highest {
            state.seq_highest = seq;
            PrepareReply {
                ok: true,
                seq_accepted: state.seq_accepted,
                value_accepted: state.value.clone(),
                seq_highest: state.seq_highest,
            }
        } else {
            PrepareReply {
                ok: false,
                seq_accepted: None,
                value_accepted: None,
                seq_highest: state.seq_highest,
            }
        }
    }

    /// Handles an incoming Accept(slot, seq, value).
    pub fn handle_accept(&self, slot: Slot, seq: u64, value: V) -> AcceptReply {
        let handle = self.slot_handle(slot);
        let mut state = handle.lock().expect("slot mutex poisoned");
        if seq >= state.seq_highest {
            state.seq_highest = seq;
            state.seq_accepted = Some(seq);
            state.value = Some(value);
            AcceptReply {
                ok: true,
                seq_highest: seq,
            }
        } else {
            AcceptReply {
                ok: false,
                seq_highest: state.seq_highest,
            }
        }
    }

    /// Handles an incoming Decide(slot, value). Fire-and-forget: no reply.
    pub fn handle_decide(&self, slot: Slot, value: V) {
        let handle = self.slot_handle(slot);
        let mut state = handle.lock().expect("slot mutex poisoned");
        state.value = Some(value);
        state.is_decided = true;
    }

    pub fn status(&self, slot: Slot) -> SlotStatus<V> {
        let handle = self.slot_handle(slot);
        let state = handle.lock().expect("slot mutex poisoned");
        if state.is_decided {
            SlotStatus::Decided(state.value.clone().expect("decided slot always has a value"))
        } else {
            SlotStatus::Pending
        }
    }

    pub fn admin_lock(&self) {
        self.admin_locked.store(true, Ordering::SeqCst);
    }

    pub fn admin_unlock(&self) {
        self.admin_locked.store(false, Ordering::SeqCst);
    }

    /// Records that this peer no longer needs slots up to and including
    /// `slot` (garbage-collection bookkeeping, per `paxos.go`'s `Done`).
    pub fn done(&self, slot: Slot) {
        self.observe_max_done(self.me, slot);
    }

    /// Records the highest slot `peer` has reported done, whether learned
    /// from our own `done()` call or gossiped in on a Prepare from `peer`.
    fn observe_max_done(&self, peer: usize, slot: Slot) {
        let mut max_done = self.max_done.lock().expect("max_done mutex poisoned");
        if max_done[peer] < slot {
            max_done[peer] = slot;
        }
    }

    /// The lowest slot not yet marked done by every peer this replica has
    /// heard from — below this point, state can be forgotten. Advances as
    /// Prepares from other peers gossip their own progress in.
    pub fn min_slot(&self) -> Slot {
        let max_done = self.max_done.lock().expect("max_done mutex poisoned");
        max_done.iter().copied().min().unwrap_or(0)
    }

    /// Drops acceptor state for slots at or below `min_slot()`.
    pub fn forget_up_to(&self, slot: Slot) {
        let mut slots = self.slots.lock().expect("slots mutex poisoned");
        slots.retain(|&s, _| s > slot);
    }

    /// Runs Prepare -> (majority) -> Accept -> (majority) -> Decide for
    /// `slot`, restarting with a fresh proposal number on any rejection,
    /// until a value is chosen. Returns the value that was actually
    /// decided, which may not be `value` if another proposer's value won
    /// the slot first.
    pub async fn start(
        &self,
        slot: Slot,
        value: V,
        wall_time_ns: impl Fn() -> u64,
        transport: &dyn PaxosTransport<V>,
    ) -> Result<V, PaxosError> {
        if self.admin_locked.load(Ordering::SeqCst) {
            return Err(PaxosError::AdminLocked);
        }

        loop {
            let seq = self.proposal_gen.next(wall_time_ns());
            trace!(slot, seq, "paxos: prepare phase");

            let mut ok_count = 0usize;
            let mut best: Option<(u64, V)> = None;
            let mut max_rejected_high = 0u64;
            let my_max_done = {
                let max_done = self.max_done.lock().expect("max_done mutex poisoned");
                max_done[self.me]
            };

            for peer in 0..transport.peer_count() {
                let reply = if peer == self.me {
                    Some(self.handle_prepare(slot, seq, self.me, my_max_done))
                } else {
                    transport.prepare(peer, slot, seq, self.me, my_max_done).await
                };
                let Some(reply) = reply else { continue };
                if reply.ok {
                    ok_count += 1;
                    if let (Some(sa), Some(v)) = (reply.seq_accepted, reply.value_accepted) {
                        if best.as_ref().map(|(bsa, _)| sa > *bsa).unwrap_or(true) {
                            best = Some((sa, v));
                        }
                    }
                } else {
                    max_rejected_high = max_rejected_high.max(reply.seq_highest);
                }
            }

            if ok_count * 2 <= transport.peer_count() {
                debug!(slot, seq, ok_count, "paxos: prepare did not reach a majority, retrying");
                self.proposal_gen.observe_rejected(max_rejected_high);
                continue;
            }

            let propose_value = match best {
                Some((_, v)) => v,
                None => value.clone(),
            };

            trace!(slot, seq, "paxos: accept phase");
            let mut accept_ok = 0usize;
            let mut accept_max_high = 0u64;
            for peer in 0..transport.peer_count() {
                let reply = if peer == self.me {
                    Some(self.handle_accept(slot, seq, propose_value.clone()))
                } else {
                    transport.accept(peer, slot, seq, propose_value.clone()).await
                };
                let Some(reply) = reply else { continue };
                if reply.ok {
                    accept_ok += 1;
                } else {
                    accept_max_high = accept_max_high.max(reply.seq_highest);
                }
            }

            if accept_ok * 2 <= transport.peer_count() {
                debug!(slot, seq, accept_ok, "paxos: accept did not reach a majority, retrying");
                self.proposal_gen.observe_rejected(accept_max_high);
                continue;
            }

            trace!(slot, seq, "paxos: decide phase (fire-and-forget)");
            for peer in 0..transport.peer_count() {
                if peer == self.me {
                    self.handle_decide(slot, propose_value.clone());
                } else {
                    transport.decide(peer, slot, propose_value.clone()).await;
                }
            }

            return Ok(propose_value);
        }
    }

    /// Drives a no-op proposal to fill a slot this peer believes is
    /// undecided, so a strictly-ascending applier can catch up past gaps
    /// left by membership changes or crashed proposers.
    pub async fn sync_slot(
        &self,
        slot: Slot,
        no_op: V,
        wall_time_ns: impl Fn() -> u64,
        transport: &dyn PaxosTransport<V>,
    ) -> Result<V, PaxosError> {
        self.start(slot, no_op, wall_time_ns, transport).await
    }
}
