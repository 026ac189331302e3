//! The network seam: how a `Paxos` replica reaches its peers. Production
//! code supplies a real RPC transport; tests supply an in-memory one (see
//! `lsp-test-support`).

use async_trait::async_trait;

use crate::slot::Slot;

#[derive(Debug, Clone)]
pub struct PrepareReply<V> {
    pub ok: bool,
    pub seq_accepted: Option<u64>,
    pub value_accepted: Option<V>,
    pub seq_highest: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct AcceptReply {
    pub ok: bool,
    pub seq_highest: u64,
}

#[async_trait]
pub trait PaxosTransport<V>: Send + Sync {
    fn peer_count(&self) -> usize;

    /// `from` is the proposer's own index and `max_done` its own highest
    /// garbage-collected slot, gossiped alongside every Prepare so every
    /// peer's acceptor can learn the others' progress without a dedicated
    /// RPC (`paxos.go`'s `PrepareArgs.MaxDone`).
    async fn prepare(&self, peer: usize, slot: Slot, seq: u64, from: usize, max_done: Slot) -> Option<PrepareReply<V>>;
    async fn accept(&self, peer: usize, slot: Slot, seq: u64, value: V) -> Option<AcceptReply>;
    /// Fire-and-forget: the Decide phase does not wait for a reply.
    async fn decide(&self, peer: usize, slot: Slot, value: V);
}
