//! A container of items ordered strictly ascending by sequence number.
//!
//! Used for `unacked_buffer`, `write_buffer`, `read_buffer`, and
//! `latest_ack_buffer` on both client and server connections. Insertion is
//! O(n), which is fine since every one of those buffers is expected to hold
//! at most `window_size` entries.

/// Anything that can be placed in an [`OrderedBuffer`].
pub trait HasSeq {
    fn seq_num(&self) -> u32;
}

impl HasSeq for crate::message::Message {
    fn seq_num(&self) -> u32 {
        crate::message::Message::seq_num(self)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderedBuffer<T> {
    items: Vec<T>,
}

impl<T: HasSeq> OrderedBuffer<T> {
    pub fn new() -> Self {
        OrderedBuffer { items: Vec::new() }
    }

    /// Insert `item` at its sorted position. If an item with the same
    /// seq-num already exists, the existing one is retained and `item` is
    /// dropped (idempotent insert).
    pub fn insert(&mut self, item: T) {
        let seq = item.seq_num();
        match self.items.binary_search_by_key(&seq, HasSeq::seq_num) {
            Ok(_) => {} // duplicate seq-num: keep the existing entry
            Err(pos) => self.items.insert(pos, item),
        }
    }

    pub fn front(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn back(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn remove_front(&mut self) -> Option<T> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    /// Remove the item with the given seq-num. Returns whether one was
    /// found; a missing seq-num is a no-op, not an error.
    pub fn delete(&mut self, seq: u32) -> bool {
        match self.items.binary_search_by_key(&seq, HasSeq::seq_num) {
            Ok(pos) => {
                self.items.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn snapshot(&self) -> &[T] {
        &self.items
    }

    /// Remove every element whose seq-num is less than
    /// `back().seq_num - window + 1`. No-op on an empty buffer.
    pub fn trim_to_window(&mut self, window: u32) {
        let Some(back_seq) = self.back().map(HasSeq::seq_num) else {
            return;
        };
        let floor = back_seq.saturating_sub(window - 1);
        self.items.retain(|item| item.seq_num() >= floor);
    }
}
