//! Fixed-layout chat message record (2368 bytes, 16-byte aligned) and its
//! checksum/hash codec helpers.

use bitflags::bitflags;

use crate::crypto::{crc32c, sha256};

/// Maximum UTF-8 body length in bytes.
pub const BODY_LEN_MAX: u32 = 2048;

/// Size of [`ChatMessage`] in bytes.
pub const MESSAGE_SIZE: usize = 2368;

bitflags! {
    /// Per-message flags.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct ChatMessageFlags: u32 {
        /// Message has been soft-deleted.
        const DELETED = 1 << 0;
        /// Message has been edited since it was first applied.
        const EDITED = 1 << 1;
    }
}

/// A single chat message, stored and transmitted in a fixed byte layout so
/// that equal logical content always serializes to equal bytes.
///
/// Byte layout (offsets in bytes): `room_id(0..16) msg_id(16..32)
/// author_id(32..40) _pad0(40..48) parent_id(48..64) timestamp_us(64..72)
/// client_sequence(72..80) body_len(80..84) flags(84..88) body(88..2136)
/// prev_hash(2136..2168) checksum(2168..2172) reserved(2172..2368)`.
///
/// `_pad0` exists only because `parent_id: u128` requires 16-byte alignment
/// immediately after the 8-byte `author_id`; it is explicit rather than
/// compiler-inserted so the layout is visible in the type itself.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ChatMessage {
    pub room_id: u128,
    pub msg_id: u128,
    pub author_id: u64,
    _pad0: [u8; 8],
    pub parent_id: u128,
    pub timestamp_us: u64,
    pub client_sequence: u64,
    pub body_len: u32,
    pub flags: ChatMessageFlags,
    pub body: [u8; BODY_LEN_MAX as usize],
    pub prev_hash: [u8; 32],
    pub checksum: u32,
    pub reserved: [u8; 196],
}

const _: () = assert!(std::mem::size_of::<ChatMessage>() == MESSAGE_SIZE);
const _: () = assert!(std::mem::align_of::<ChatMessage>() == 16);

impl Default for ChatMessage {
    fn default() -> Self {
        Self {
            room_id: 0,
            msg_id: 0,
            author_id: 0,
            _pad0: [0; 8],
            parent_id: 0,
            timestamp_us: 0,
            client_sequence: 0,
            body_len: 0,
            flags: ChatMessageFlags::empty(),
            body: [0; BODY_LEN_MAX as usize],
            prev_hash: [0; 32],
            checksum: 0,
            reserved: [0; 196],
        }
    }
}

impl std::fmt::Debug for ChatMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatMessage")
            .field("room_id", &self.room_id)
            .field("msg_id", &self.msg_id)
            .field("author_id", &self.author_id)
            .field("parent_id", &self.parent_id)
            .field("timestamp_us", &self.timestamp_us)
            .field("client_sequence", &self.client_sequence)
            .field("body_len", &self.body_len)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl ChatMessage {
    /// Builds a message from logical fields, zeroing padding and computing
    /// the checksum. `body` must be at most [`BODY_LEN_MAX`] bytes.
    ///
    /// # Panics
    /// Panics if `body.len()` exceeds `BODY_LEN_MAX`.
    pub fn build(
        room_id: u128,
        msg_id: u128,
        author_id: u64,
        parent_id: u128,
        timestamp_us: u64,
        client_sequence: u64,
        body: &[u8],
        prev_hash: [u8; 32],
    ) -> Self {
        assert!(
            body.len() as u32 <= BODY_LEN_MAX,
            "chat message body exceeds BODY_LEN_MAX"
        );
        let mut msg = ChatMessage {
            room_id,
            msg_id,
            author_id,
            parent_id,
            timestamp_us,
            client_sequence,
            body_len: body.len() as u32,
            prev_hash,
            ..Default::default()
        };
        msg.body[..body.len()].copy_from_slice(body);
        msg.zero_padding();
        msg.checksum = msg.calculate_checksum();
        msg
    }

    /// True if the `deleted` flag bit is set.
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(ChatMessageFlags::DELETED)
    }

    /// True if the `edited` flag bit is set.
    pub fn is_edited(&self) -> bool {
        self.flags.contains(ChatMessageFlags::EDITED)
    }

    /// Zeros the unused body tail and reserved fields. Idempotent; must be
    /// called before computing a checksum so that equal logical content
    /// always produces equal bytes.
    pub fn zero_padding(&mut self) {
        self._pad0 = [0; 8];
        let len = self.body_len as usize;
        if len < self.body.len() {
            self.body[len..].fill(0);
        }
        self.reserved = [0; 196];
    }

    /// Computes the CRC32C checksum over every byte preceding the checksum
    /// field (offsets `0..2168`), including `prev_hash`.
    pub fn calculate_checksum(&self) -> u32 {
        crc32c(&self.as_bytes()[..2168])
    }

    /// Sets `self.checksum` from the current contents.
    pub fn set_checksum(&mut self) {
        self.checksum = self.calculate_checksum();
    }

    /// True if `self.checksum` matches the recomputed checksum.
    pub fn valid_checksum(&self) -> bool {
        self.checksum == self.calculate_checksum()
    }

    /// Computes the SHA-256 digest of the full 2368-byte record, used as
    /// this message's contribution to the room's hash chain.
    pub fn calculate_hash(&self) -> [u8; 32] {
        sha256(self.as_bytes())
    }

    /// The UTF-8 body, truncated to `body_len`. Lossy: malformed UTF-8 in an
    /// untrusted record is replaced rather than rejected.
    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body[..self.body_len as usize])
    }

    /// Views this record as its raw byte representation.
    pub fn as_bytes(&self) -> &[u8; MESSAGE_SIZE] {
        unsafe { &*(self as *const ChatMessage as *const [u8; MESSAGE_SIZE]) }
    }

    /// Reinterprets `bytes` as a message record without copying.
    pub fn from_bytes(bytes: &[u8; MESSAGE_SIZE]) -> &ChatMessage {
        unsafe { &*(bytes.as_ptr() as *const ChatMessage) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_size_and_alignment() {
        assert_eq!(std::mem::size_of::<ChatMessage>(), MESSAGE_SIZE);
        assert_eq!(std::mem::align_of::<ChatMessage>(), 16);
    }

    #[test]
    fn build_zeros_padding_and_sets_checksum() {
        let msg = ChatMessage::build(1, 2, 3, 0, 1000, 0, b"hello", [0; 32]);
        assert!(msg.valid_checksum());
        assert_eq!(&msg.body[5..], &[0u8; BODY_LEN_MAX as usize - 5][..]);
        assert_eq!(msg.reserved, [0u8; 196]);
    }

    #[test]
    fn equal_logical_content_is_byte_identical() {
        let a = ChatMessage::build(1, 2, 3, 0, 1000, 0, b"hi", [9; 32]);
        let b = ChatMessage::build(1, 2, 3, 0, 1000, 0, b"hi", [9; 32]);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn checksum_detects_tampering() {
        let mut msg = ChatMessage::build(1, 2, 3, 0, 1000, 0, b"hi", [0; 32]);
        msg.timestamp_us += 1;
        assert!(!msg.valid_checksum());
    }

    #[test]
    fn checksum_covers_prev_hash() {
        let mut a = ChatMessage::build(1, 2, 3, 0, 1000, 0, b"hi", [1; 32]);
        a.set_checksum();
        let original = a.checksum;
        a.prev_hash = [2; 32];
        assert_ne!(a.calculate_checksum(), original);
    }

    #[test]
    fn hash_changes_with_content() {
        let a = ChatMessage::build(1, 2, 3, 0, 1000, 0, b"hi", [0; 32]);
        let b = ChatMessage::build(1, 2, 3, 0, 1000, 1, b"hi", [0; 32]);
        assert_ne!(a.calculate_hash(), b.calculate_hash());
    }

    #[test]
    fn bytes_round_trip() {
        let msg = ChatMessage::build(7, 8, 9, 6, 123, 0, b"roundtrip", [3; 32]);
        let bytes = *msg.as_bytes();
        let restored = ChatMessage::from_bytes(&bytes);
        assert_eq!(restored.room_id, 7);
        assert_eq!(restored.msg_id, 8);
        assert_eq!(restored.body_str(), "roundtrip");
    }

    #[test]
    #[should_panic(expected = "exceeds BODY_LEN_MAX")]
    fn build_rejects_oversized_body() {
        let body = vec![b'x'; BODY_LEN_MAX as usize + 1];
        ChatMessage::build(1, 1, 1, 0, 0, 0, &body, [0; 32]);
    }
}
