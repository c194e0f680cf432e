//! Deterministic per-room state machine.
//!
//! `RoomState::apply` is the only place committed chat messages take effect.
//! It never reads the clock and never consults randomness: given the same
//! ordered sequence of applied messages, two independent instances reach
//! byte-identical `head_hash` and message sequences (determinism property
//! X1).

use std::collections::HashMap;

use crate::error::{Result, VsrError};
use crate::protocol::ChatMessage;

/// Upper bound on messages retained per room.
pub const MAX_MESSAGES_PER_ROOM: usize = 1_000_000;

/// Upper bound on idempotency-table entries per room.
pub const MAX_IDEMPOTENCY_ENTRIES: usize = 100_000;

/// The result of applying one op to a [`RoomState`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ApplyResult {
    /// `false` if this was a duplicate `(author_id, client_sequence)` that
    /// had already been applied under a different op.
    pub applied: bool,
    /// The op this message is recorded under, whether newly applied or a
    /// pre-existing duplicate.
    pub op: u64,
}

/// In-memory state for a single room-shard.
pub struct RoomState {
    room_id: u128,
    messages: Vec<ChatMessage>,
    position_by_msg_id: HashMap<u128, usize>,
    idempotency: HashMap<(u64, u64), u64>,
    last_op: u64,
    last_timestamp_us: u64,
    head_hash: [u8; 32],
}

impl RoomState {
    /// Creates an empty room with no applied messages.
    pub fn new(room_id: u128) -> Self {
        Self {
            room_id,
            messages: Vec::new(),
            position_by_msg_id: HashMap::new(),
            idempotency: HashMap::new(),
            last_op: 0,
            last_timestamp_us: 0,
            head_hash: [0; 32],
        }
    }

    pub fn room_id(&self) -> u128 {
        self.room_id
    }

    pub fn last_op(&self) -> u64 {
        self.last_op
    }

    pub fn last_timestamp_us(&self) -> u64 {
        self.last_timestamp_us
    }

    /// SHA-256 of the most recently applied message; zero before any
    /// message has been applied.
    pub fn head_hash(&self) -> [u8; 32] {
        self.head_hash
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn message_at(&self, position: usize) -> Option<&ChatMessage> {
        self.messages.get(position)
    }

    pub fn message_by_id(&self, msg_id: u128) -> Option<&ChatMessage> {
        self.position_by_msg_id
            .get(&msg_id)
            .map(|&pos| &self.messages[pos])
    }

    /// Applies `message` as op `op`. See module docs for the invariants
    /// enforced, in the order they are checked.
    pub fn apply(&mut self, op: u64, message: &ChatMessage) -> Result<ApplyResult> {
        if op != self.last_op + 1 {
            return Err(VsrError::NonSequentialOp);
        }
        if message.room_id != self.room_id {
            return Err(VsrError::WrongRoom);
        }
        if message.timestamp_us < self.last_timestamp_us {
            return Err(VsrError::TimestampNotMonotonic);
        }

        let idem_key = (message.author_id, message.client_sequence);
        if let Some(&existing_op) = self.idempotency.get(&idem_key) {
            return Ok(ApplyResult {
                applied: false,
                op: existing_op,
            });
        }

        if self.messages.len() >= MAX_MESSAGES_PER_ROOM {
            return Err(VsrError::RoomFull);
        }
        if self.idempotency.len() >= MAX_IDEMPOTENCY_ENTRIES {
            return Err(VsrError::IdempotencyTableFull);
        }

        let position = self.messages.len();
        self.messages.push(*message);
        self.position_by_msg_id.insert(message.msg_id, position);
        self.idempotency.insert(idem_key, op);
        self.last_op = op;
        self.last_timestamp_us = message.timestamp_us;
        self.head_hash = message.calculate_hash();

        debug_assert_eq!(self.messages.len() as u64, self.last_op);

        Ok(ApplyResult { applied: true, op })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(room: u128, seq: u64, ts: u64, author: u64, prev_hash: [u8; 32]) -> ChatMessage {
        ChatMessage::build(room, seq as u128 + 1, author, 0, ts, seq, b"hi", prev_hash)
    }

    #[test]
    fn sequential_ops_apply_in_order() {
        let mut room = RoomState::new(1);
        let m1 = msg(1, 1, 100, 1, [0; 32]);
        let r1 = room.apply(1, &m1).unwrap();
        assert_eq!(r1, ApplyResult { applied: true, op: 1 });
        let m2 = msg(1, 2, 200, 1, m1.calculate_hash());
        room.apply(2, &m2).unwrap();
        assert_eq!(room.last_op(), 2);
        assert_eq!(room.head_hash(), m2.calculate_hash());
    }

    #[test]
    fn non_sequential_op_is_rejected() {
        let mut room = RoomState::new(1);
        let m1 = msg(1, 1, 100, 1, [0; 32]);
        room.apply(1, &m1).unwrap();
        let m3 = msg(1, 2, 200, 1, [0; 32]);
        assert!(matches!(room.apply(3, &m3), Err(VsrError::NonSequentialOp)));
    }

    #[test]
    fn wrong_room_is_rejected() {
        let mut room = RoomState::new(1);
        let m = msg(2, 1, 100, 1, [0; 32]);
        assert!(matches!(room.apply(1, &m), Err(VsrError::WrongRoom)));
    }

    #[test]
    fn timestamp_regression_is_rejected() {
        let mut room = RoomState::new(1);
        room.apply(1, &msg(1, 1, 500, 1, [0; 32])).unwrap();
        let regressed = msg(1, 2, 100, 1, [0; 32]);
        assert!(matches!(
            room.apply(2, &regressed),
            Err(VsrError::TimestampNotMonotonic)
        ));
    }

    #[test]
    fn duplicate_idempotency_key_is_reported_without_mutation() {
        let mut room = RoomState::new(1);
        let m1 = msg(1, 1, 100, 1, [0; 32]);
        room.apply(1, &m1).unwrap();
        let duplicate = msg(1, 1, 150, 1, [0; 32]);
        let result = room.apply(2, &duplicate).unwrap();
        assert_eq!(result, ApplyResult { applied: false, op: 1 });
        assert_eq!(room.last_op(), 1);
        assert_eq!(room.message_count(), 1);
    }

    #[test]
    fn determinism_same_sequence_same_head_hash() {
        let messages = vec![msg(1, 1, 100, 1, [0; 32]), msg(1, 2, 200, 2, [0; 32])];
        let mut a = RoomState::new(1);
        let mut b = RoomState::new(1);
        for (i, m) in messages.iter().enumerate() {
            a.apply(i as u64 + 1, m).unwrap();
            b.apply(i as u64 + 1, m).unwrap();
        }
        assert_eq!(a.head_hash(), b.head_hash());
        assert_eq!(a.message_count(), b.message_count());
    }
}
