//! An in-memory `PaxosTransport` wiring a handful of `Paxos<V>` replicas
//! together in-process, for exercising `reservation-server` without a real
//! RPC layer. Same shape as the teacher's paired mock client/server, just
//! one seam over: acceptor RPCs instead of websocket frames.

use std::sync::Arc;

use async_trait::async_trait;
use paxos::{AcceptReply, Paxos, PaxosTransport, PrepareReply, Slot};

/// A fixed set of replicas, each reachable by index. Unlike a real network,
/// calls never fail outright; partial failure is injected by the caller
/// wrapping this in something that returns `None` for a chosen peer.
pub struct InMemoryCluster<V> {
    replicas: Vec<Arc<Paxos<V>>>,
}

impl<V: Clone + Send + Sync + 'static> InMemoryCluster<V> {
    pub fn new(peer_count: usize) -> Self {
        let replicas = (0..peer_count).map(|me| Arc::new(Paxos::new(me, peer_count))).collect();
        InMemoryCluster { replicas }
    }

    pub fn replica(&self, index: usize) -> Arc<Paxos<V>> {
        self.replicas[index].clone()
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> PaxosTransport<V> for InMemoryCluster<V> {
    fn peer_count(&self) -> usize {
        self.replicas.len()
    }

    async fn prepare(&self, peer: usize, slot: Slot, seq: u64, from: usize, max_done: Slot) -> Option<PrepareReply<V>> {
        tokio::task::yield_now().await;
        Some(self.replicas[peer].handle_prepare(slot, seq, from, max_done))
    }

    async fn accept(&self, peer: usize, slot: Slot, seq: u64, value: V) -> Option<AcceptReply> {
        tokio::task::yield_now().await;
        Some(self.replicas[peer].handle_accept(slot, seq, value))
    }

    async fn decide(&self, peer: usize, slot: Slot, value: V) {
        tokio::task::yield_now().await;
        self.replicas[peer].handle_decide(slot, value);
    }
}
