//! Per-connection state shared verbatim by the client (one instance) and the
//! server (one instance per peer, keyed by `conn_id`).

use std::net::SocketAddr;

use lsp_protocol::{HasSeq, Message, OrderedBuffer};

/// Connection lifecycle state (spec 4.4 "State machine (per connection)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Client only: Connect sent, no Ack(0) yet.
    Handshake,
    Established,
    /// User requested close; pending Data must drain first.
    Closing,
    /// `epoch_limit` consecutive silent ticks elapsed.
    Lost,
}

/// Outcome of [`ConnectionState::write`].
pub enum WriteOutcome {
    /// The window had room; send this Data now.
    Send(Message),
    /// The window was full; queued in `write_buffer`.
    Queued,
}

/// Outcome of [`ConnectionState::receive_ack`].
#[derive(Default)]
pub struct AckOutcome {
    /// This Ack completed the handshake (Ack(conn_id, 0) matched a Connect
    /// sitting in `unacked_buffer`).
    pub newly_established: bool,
    /// Data messages promoted from `write_buffer` and sent as a result.
    pub to_send: Vec<Message>,
}

/// Outcome of [`ConnectionState::receive_data`].
pub struct DataOutcome {
    /// Always Ack the seq-num, even for already-delivered Data (spec 9 open
    /// question, resolved: Ack every well-formed Data unconditionally).
    pub ack_to_send: Message,
    /// The delivery made the new front of `read_buffer` match
    /// `expected_recv_seq`, where it did not before — a deferred read can be
    /// woken.
    pub became_deliverable: bool,
}

/// Outcome of [`ConnectionState::epoch_tick`].
#[derive(Default)]
pub struct EpochOutcome {
    /// The connection transitioned to `Lost` on this tick.
    pub newly_lost: bool,
    /// Datagrams to retransmit: unacked Data, plus either the latest Acks
    /// or a single keep-alive Ack.
    pub retransmits: Vec<Message>,
}

pub struct ConnectionState {
    pub conn_id: u32,
    pub remote_addr: SocketAddr,
    pub state: ConnState,
    window_size: u32,
    next_send_seq: u32,
    expected_recv_seq: u32,
    write_buffer: OrderedBuffer<Message>,
    unacked_buffer: OrderedBuffer<Message>,
    read_buffer: OrderedBuffer<Message>,
    latest_ack_buffer: OrderedBuffer<Message>,
    last_active_epoch: u64,
    close_requested: bool,
}

impl ConnectionState {
    /// Client-side constructor: starts in `Handshake`, with the outgoing
    /// Connect already occupying `unacked_buffer` so the epoch clock
    /// retransmits it like any other unacked message.
    pub fn new_client(remote_addr: SocketAddr, window_size: u32, current_epoch: u64) -> Self {
        let mut unacked = OrderedBuffer::new();
        unacked.insert(Message::connect());
        ConnectionState {
            conn_id: 0,
            remote_addr,
            state: ConnState::Handshake,
            window_size,
            next_send_seq: 0,
            expected_recv_seq: 1,
            write_buffer: OrderedBuffer::new(),
            unacked_buffer: unacked,
            read_buffer: OrderedBuffer::new(),
            latest_ack_buffer: OrderedBuffer::new(),
            last_active_epoch: current_epoch,
            close_requested: false,
        }
    }

    /// Server-side constructor: the Connect has already been validated, so
    /// the connection starts `Established` directly.
    pub fn new_server(conn_id: u32, remote_addr: SocketAddr, window_size: u32, current_epoch: u64) -> Self {
        ConnectionState {
            conn_id,
            remote_addr,
            state: ConnState::Established,
            window_size,
            next_send_seq: 0,
            expected_recv_seq: 1,
            write_buffer: OrderedBuffer::new(),
            unacked_buffer: OrderedBuffer::new(),
            read_buffer: OrderedBuffer::new(),
            latest_ack_buffer: OrderedBuffer::new(),
            last_active_epoch: current_epoch,
            close_requested: false,
        }
    }

    pub fn is_lost(&self) -> bool {
        self.state == ConnState::Lost
    }

    pub fn is_established(&self) -> bool {
        self.state == ConnState::Established
    }

    /// `write_buffer` and `unacked_buffer` are both empty: a pending close
    /// can complete.
    pub fn is_drained(&self) -> bool {
        self.write_buffer.is_empty() && self.unacked_buffer.is_empty()
    }

    /// Messages already enqueued at construction time (the client's initial
    /// Connect) that an event loop should transmit once at startup, rather
    /// than waiting for the first epoch tick to retransmit them.
    pub fn pending_initial_sends(&self) -> Vec<Message> {
        self.unacked_buffer.snapshot().to_vec()
    }

    /// Assigns the next seq-num and either promotes the Data directly into
    /// `unacked_buffer` (if the window permits) or queues it.
    pub fn write(&mut self, payload: Vec<u8>) -> WriteOutcome {
        self.next_send_seq += 1;
        let seq = self.next_send_seq;
        let msg = Message::data(self.conn_id, seq, payload);
        if Self::window_permits(&self.unacked_buffer, seq, self.window_size) {
            self.unacked_buffer.insert(msg.clone());
            WriteOutcome::Send(msg)
        } else {
            self.write_buffer.insert(msg);
            WriteOutcome::Queued
        }
    }

    fn window_permits(unacked: &OrderedBuffer<Message>, candidate_seq: u32, window: u32) -> bool {
        match unacked.front() {
            None => true,
            Some(front) => candidate_seq.saturating_sub(window) < front.seq_num(),
        }
    }

    /// Request close on a client, or close of one connection on a server.
    /// Takes effect once [`is_drained`] is true.
    pub fn request_close(&mut self) {
        self.close_requested = true;
        if self.state == ConnState::Established {
            self.state = ConnState::Closing;
        }
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    /// Process an incoming Ack. Stale Acks (seq not present in
    /// `unacked_buffer`) still refresh liveness but otherwise do nothing.
    pub fn receive_ack(&mut self, current_epoch: u64, seq: u32) -> AckOutcome {
        self.last_active_epoch = current_epoch;
        let removed = self.unacked_buffer.delete(seq);
        if !removed {
            return AckOutcome::default();
        }

        let mut newly_established = false;
        if seq == 0 && self.state == ConnState::Handshake {
            self.state = ConnState::Established;
            newly_established = true;
        }

        let mut to_send = Vec::new();
        while let Some(next) = self.write_buffer.front() {
            if !Self::window_permits(&self.unacked_buffer, next.seq_num(), self.window_size) {
                break;
            }
            let msg = self
                .write_buffer
                .remove_front()
                .expect("front() just returned Some");
            self.unacked_buffer.insert(msg.clone());
            to_send.push(msg);
        }

        AckOutcome {
            newly_established,
            to_send,
        }
    }

    /// Sets the conn_id learned from the handshake Ack (client only).
    pub fn set_conn_id(&mut self, conn_id: u32) {
        self.conn_id = conn_id;
    }

    /// Process incoming Data. Always returns an Ack to send, even for
    /// already-delivered seq-nums or ones rejected below because a close is
    /// pending.
    pub fn receive_data(&mut self, current_epoch: u64, seq: u32, payload: Vec<u8>) -> DataOutcome {
        self.last_active_epoch = current_epoch;
        let ack = Message::ack(self.conn_id, seq);

        // Once close_conn is pending, no new Data is admitted into
        // read_buffer — only the mandatory Ack still goes out.
        if self.close_requested {
            return DataOutcome {
                ack_to_send: ack,
                became_deliverable: false,
            };
        }

        if seq < self.expected_recv_seq {
            return DataOutcome {
                ack_to_send: ack,
                became_deliverable: false,
            };
        }

        let was_deliverable = self.front_is_deliverable();
        self.read_buffer.insert(Message::data(self.conn_id, seq, payload));
        self.latest_ack_buffer.insert(ack.clone());
        self.latest_ack_buffer.trim_to_window(self.window_size);
        let now_deliverable = self.front_is_deliverable();

        DataOutcome {
            ack_to_send: ack,
            became_deliverable: !was_deliverable && now_deliverable,
        }
    }

    fn front_is_deliverable(&self) -> bool {
        self.read_buffer
            .front()
            .map(|m| m.seq_num() == self.expected_recv_seq)
            .unwrap_or(false)
    }

    pub fn has_deliverable(&self) -> bool {
        self.front_is_deliverable()
    }

    /// Pops the next in-order Data payload, if its seq-num is ready.
    pub fn try_deliver(&mut self) -> Option<Vec<u8>> {
        if !self.front_is_deliverable() {
            return None;
        }
        let msg = self.read_buffer.remove_front()?;
        self.expected_recv_seq += 1;
        match msg {
            Message::Data { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Advances the epoch clock for this connection: declares loss, or
    /// computes the datagrams to retransmit.
    pub fn epoch_tick(&mut self, current_epoch: u64, epoch_limit: u32) -> EpochOutcome {
        if self.state == ConnState::Lost {
            return EpochOutcome::default();
        }

        if current_epoch.saturating_sub(self.last_active_epoch) >= u64::from(epoch_limit) {
            self.state = ConnState::Lost;
            return EpochOutcome {
                newly_lost: true,
                retransmits: Vec::new(),
            };
        }

        let mut retransmits: Vec<Message> = self.unacked_buffer.snapshot().to_vec();

        if !self.close_requested {
            if self.latest_ack_buffer.is_empty() {
                if matches!(self.state, ConnState::Established | ConnState::Closing) {
                    retransmits.push(Message::ack(self.conn_id, 0));
                }
            } else {
                retransmits.extend(self.latest_ack_buffer.snapshot().iter().cloned());
            }
        }

        EpochOutcome {
            newly_lost: false,
            retransmits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000)
    }

    #[test]
    fn client_write_within_window_sends_immediately() {
        let mut conn = ConnectionState::new_server(1, addr(), 2, 0);
        match conn.write(b"a".to_vec()) {
            WriteOutcome::Send(m) => assert_eq!(m.seq_num(), 1),
            WriteOutcome::Queued => panic!("expected immediate send"),
        }
        match conn.write(b"b".to_vec()) {
            WriteOutcome::Send(m) => assert_eq!(m.seq_num(), 2),
            WriteOutcome::Queued => panic!("expected immediate send within window of 2"),
        }
        match conn.write(b"c".to_vec()) {
            WriteOutcome::Queued => {}
            WriteOutcome::Send(_) => panic!("window should be full"),
        }
    }

    #[test]
    fn ack_promotes_queued_write_into_window() {
        let mut conn = ConnectionState::new_server(1, addr(), 1, 0);
        conn.write(b"a".to_vec());
        conn.write(b"b".to_vec()); // queued, window=1

        let outcome = conn.receive_ack(1, 1);
        assert_eq!(outcome.to_send.len(), 1);
        assert_eq!(outcome.to_send[0].seq_num(), 2);
        assert!(!conn.is_drained());
    }

    #[test]
    fn handshake_completes_on_ack_zero() {
        let mut conn = ConnectionState::new_client(addr(), 1, 0);
        assert_eq!(conn.state, ConnState::Handshake);
        let outcome = conn.receive_ack(1, 0);
        assert!(outcome.newly_established);
        assert_eq!(conn.state, ConnState::Established);
        assert!(conn.is_drained());
    }

    #[test]
    fn stale_ack_refreshes_liveness_without_side_effects() {
        let mut conn = ConnectionState::new_server(1, addr(), 2, 0);
        conn.write(b"a".to_vec());
        let outcome = conn.receive_ack(3, 99);
        assert!(!outcome.newly_established);
        assert!(outcome.to_send.is_empty());
        // last_active_epoch was refreshed: an epoch_tick far in the future
        // relative to epoch 3 (not epoch 0) should not yet declare loss.
        let tick = conn.epoch_tick(3 + 4, 5);
        assert!(!tick.newly_lost);
    }

    #[test]
    fn out_of_order_data_is_delivered_in_order() {
        let mut conn = ConnectionState::new_server(1, addr(), 3, 0);
        conn.receive_data(0, 2, b"b".to_vec());
        conn.receive_data(0, 1, b"a".to_vec());
        conn.receive_data(0, 3, b"c".to_vec());

        assert_eq!(conn.try_deliver(), Some(b"a".to_vec()));
        assert_eq!(conn.try_deliver(), Some(b"b".to_vec()));
        assert_eq!(conn.try_deliver(), Some(b"c".to_vec()));
        assert_eq!(conn.try_deliver(), None);
    }

    #[test]
    fn already_delivered_seq_is_still_acked_but_not_redelivered() {
        let mut conn = ConnectionState::new_server(1, addr(), 2, 0);
        conn.receive_data(0, 1, b"a".to_vec());
        conn.try_deliver();

        let outcome = conn.receive_data(0, 1, b"a-dup".to_vec());
        assert_eq!(outcome.ack_to_send.seq_num(), 1);
        assert!(!outcome.became_deliverable);
        assert_eq!(conn.try_deliver(), None);
    }

    #[test]
    fn epoch_tick_retransmits_unacked_and_declares_loss_after_limit() {
        let mut conn = ConnectionState::new_server(1, addr(), 2, 0);
        conn.write(b"a".to_vec());

        let tick = conn.epoch_tick(1, 5);
        assert!(!tick.newly_lost);
        assert_eq!(tick.retransmits.len(), 1);

        let tick = conn.epoch_tick(5, 5);
        assert!(tick.newly_lost);
        assert!(conn.is_lost());
    }

    #[test]
    fn keepalive_ack_sent_when_established_and_no_data_received() {
        let mut conn = ConnectionState::new_server(1, addr(), 2, 0);
        let tick = conn.epoch_tick(1, 5);
        assert_eq!(tick.retransmits.len(), 1);
        assert!(tick.retransmits[0].is_ack());
        assert_eq!(tick.retransmits[0].seq_num(), 0);
    }

    #[test]
    fn pending_close_acks_new_data_but_does_not_admit_it() {
        let mut conn = ConnectionState::new_server(1, addr(), 2, 0);
        conn.request_close();

        let outcome = conn.receive_data(0, 1, b"a".to_vec());
        assert_eq!(outcome.ack_to_send.seq_num(), 1);
        assert!(!outcome.became_deliverable);
        assert!(!conn.has_deliverable());
        assert_eq!(conn.try_deliver(), None);
    }

    #[test]
    fn close_suppresses_keepalive_but_not_data_retransmit() {
        let mut conn = ConnectionState::new_server(1, addr(), 2, 0);
        conn.write(b"a".to_vec());
        conn.request_close();
        let tick = conn.epoch_tick(1, 5);
        assert_eq!(tick.retransmits.len(), 1);
        assert!(tick.retransmits[0].is_data());
    }
}
