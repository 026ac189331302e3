//! The LSP wire message: a tagged record with variants `Connect`, `Data`,
//! `Ack`. One message per datagram; encoding is `bincode` over the derived
//! `serde` representation, so it round-trips exactly.

use serde::{Deserialize, Serialize};

/// conn_id of an unassigned connection (used on `Connect`).
pub const UNASSIGNED_CONN_ID: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Handshake request. Always `conn_id = 0, seq_num = 0`.
    Connect,
    /// An application payload, numbered by `seq_num` within `conn_id`.
    Data {
        conn_id: u32,
        seq_num: u32,
        payload: Vec<u8>,
    },
    /// Acknowledges the Data with the same `seq_num`, or (with `seq_num ==
    /// 0`) acknowledges a Connect / serves as a keep-alive.
    Ack { conn_id: u32, seq_num: u32 },
}

impl Message {
    pub fn connect() -> Self {
        Message::Connect
    }

    pub fn data(conn_id: u32, seq_num: u32, payload: Vec<u8>) -> Self {
        Message::Data {
            conn_id,
            seq_num,
            payload,
        }
    }

    pub fn ack(conn_id: u32, seq_num: u32) -> Self {
        Message::Ack { conn_id, seq_num }
    }

    pub fn conn_id(&self) -> u32 {
        match self {
            Message::Connect => UNASSIGNED_CONN_ID,
            Message::Data { conn_id, .. } | Message::Ack { conn_id, .. } => *conn_id,
        }
    }

    pub fn seq_num(&self) -> u32 {
        match self {
            Message::Connect => 0,
            Message::Data { seq_num, .. } | Message::Ack { seq_num, .. } => *seq_num,
        }
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Message::Data { payload, .. } => Some(payload),
            _ => None,
        }
    }

    pub fn is_connect(&self) -> bool {
        matches!(self, Message::Connect)
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Message::Ack { .. })
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Message::Data { .. })
    }

    /// Encode as the single datagram payload that goes on the wire.
    pub fn encode(&self) -> Vec<u8> {
        // A `Message` always fits in one datagram (spec non-goal: no
        // fragmentation), so bincode's default fixed-width encoding is fine.
        bincode::serialize(self).expect("Message encoding is infallible")
    }

    /// Decode a datagram payload. Malformed bytes are the caller's problem
    /// to discard silently (spec 4.2) — this just reports the error.
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_connect() {
        let m = Message::connect();
        let bytes = m.encode();
        assert_eq!(Message::decode(&bytes).unwrap(), m);
        assert_eq!(m.conn_id(), 0);
        assert_eq!(m.seq_num(), 0);
    }

    #[test]
    fn round_trips_data_with_payload() {
        let m = Message::data(7, 42, b"hello world".to_vec());
        let bytes = m.encode();
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded, m);
        assert_eq!(decoded.payload(), Some(&b"hello world"[..]));
    }

    #[test]
    fn round_trips_ack_keepalive() {
        let m = Message::ack(3, 0);
        let bytes = m.encode();
        assert_eq!(Message::decode(&bytes).unwrap(), m);
        assert!(m.is_ack());
    }

    #[test]
    fn decode_of_garbage_is_an_error_not_a_panic() {
        let garbage = vec![0xffu8; 3];
        assert!(Message::decode(&garbage).is_err());
    }
}
