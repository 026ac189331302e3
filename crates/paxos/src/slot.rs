//! Per-slot acceptor state: `{value, is_decided, seq_accepted (Na),
//! seq_highest (Nh)}`.

/// A position in the replicated log.
pub type Slot = u64;

#[derive(Debug, Clone)]
pub struct SlotState<V> {
    pub value: Option<V>,
    pub is_decided: bool,
    /// Na: the highest proposal number this acceptor has accepted.
    pub seq_accepted: Option<u64>,
    /// Nh: the highest proposal number this acceptor has seen (accepted or
    /// merely promised).
    pub seq_highest: u64,
}

impl<V> Default for SlotState<V> {
    fn default() -> Self {
        SlotState {
            value: None,
            is_decided: false,
            seq_accepted: None,
            seq_highest: 0,
        }
    }
}

/// The outcome of querying a slot locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStatus<V> {
    Pending,
    Decided(V),
}
