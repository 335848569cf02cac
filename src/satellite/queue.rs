//! Bounded store-and-forward queue
//!
//! Messages leave in priority order (Emergency first), FIFO within a
//! priority. When full, the oldest message of the lowest stored priority is
//! evicted to make room, unless the newcomer ranks below all of them.

use crate::config::queue::CAPACITY;
use crate::config::satellite::MAX_PAYLOAD;
use crate::transport::traits::Priority;
use heapless::Vec;

/// Encoded payload as it will go on air
pub type StoredPayload = Vec<u8, MAX_PAYLOAD>;

/// One deferred message
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub priority: Priority,
    /// Insertion order, unique per engine lifetime
    pub seq: u32,
    /// Transmission attempts made so far
    pub attempts: u8,
    pub payload: StoredPayload,
}

/// Incoming message ranks below everything in a full queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

#[derive(Debug, Default)]
pub struct MessageQueue {
    entries: Vec<StoredMessage, CAPACITY>,
    next_seq: u32,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredMessage> {
        self.entries.iter()
    }

    /// Store a message, evicting if needed
    ///
    /// Returns the evicted message, if any.
    pub fn push(
        &mut self,
        priority: Priority,
        payload: StoredPayload,
    ) -> Result<Option<StoredMessage>, QueueFull> {
        let evicted = if self.entries.is_full() {
            let victim = self.eviction_candidate().ok_or(QueueFull)?;
            if self.entries[victim].priority > priority {
                return Err(QueueFull);
            }
            Some(self.entries.remove(victim))
        } else {
            None
        };

        let message = StoredMessage {
            priority,
            seq: self.next_seq,
            attempts: 0,
            payload,
        };
        self.next_seq = self.next_seq.wrapping_add(1);

        // Room was made above
        let _ = self.entries.push(message);
        Ok(evicted)
    }

    /// Next message to transmit: highest priority, oldest first
    pub fn peek_next(&self) -> Option<&StoredMessage> {
        self.entries
            .iter()
            .min_by_key(|m| (core::cmp::Reverse(m.priority), m.seq))
    }

    /// Remove a message by sequence number
    pub fn remove(&mut self, seq: u32) -> Option<StoredMessage> {
        let index = self.entries.iter().position(|m| m.seq == seq)?;
        Some(self.entries.remove(index))
    }

    /// Count a failed attempt on a stored message
    pub fn note_attempt(&mut self, seq: u32) {
        if let Some(message) = self.entries.iter_mut().find(|m| m.seq == seq) {
            message.attempts = message.attempts.saturating_add(1);
        }
    }

    /// Replace the contents with restored messages
    pub fn restore(&mut self, messages: impl IntoIterator<Item = StoredMessage>) {
        self.entries.clear();
        for message in messages {
            self.next_seq = self.next_seq.max(message.seq.wrapping_add(1));
            if self.entries.push(message).is_err() {
                break;
            }
        }
    }

    /// Oldest message of the lowest stored priority
    fn eviction_candidate(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .min_by_key(|(_, m)| (m.priority, m.seq))
            .map(|(index, _)| index)
    }
}
