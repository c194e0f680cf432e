//! Fixed-size transport header (128 bytes, 16-byte aligned).
//!
//! Prefixes every envelope on the wire. Follows the project convention of a
//! `#[repr(C)]` struct reinterpreted as raw bytes via pointer casts rather
//! than a derive-based codec, since the header mixes a `u128` field with
//! bitfield-like flags and fixed reserved padding.

use super::command::Command;

/// Header magic value, the ASCII bytes `"TIGR"` read as a big-endian u32.
pub const TRANSPORT_MAGIC: u32 = 0x5449_4752;

/// Protocol version understood by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Size of [`TransportHeader`] in bytes.
pub const HEADER_SIZE: usize = 128;

/// The fixed-size prefix of every envelope on the wire.
///
/// Byte layout (offsets in bytes, little-endian multi-byte fields):
/// `magic(0..4) protocol(4..6) command(6) flags(7) checksum(8..12)
/// size(12..16) nonce(16..24) timestamp_us(24..32) cluster_id(32..48)
/// op(48..56) commit(56..64) view(64..68) sender_id(68) reserved(69..128)`.
///
/// `checksum` covers `header[12..]` concatenated with the envelope body, so
/// the checksum field itself and everything before it are excluded.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct TransportHeader {
    pub magic: u32,
    pub protocol: u16,
    pub command: u8,
    pub flags: u8,
    pub checksum: u32,
    pub size: u32,
    pub nonce: u64,
    pub timestamp_us: u64,
    pub cluster_id: u128,
    pub op: u64,
    pub commit: u64,
    pub view: u32,
    pub sender_id: u8,
    pub reserved: [u8; 59],
}

const _: () = assert!(std::mem::size_of::<TransportHeader>() == HEADER_SIZE);
const _: () = assert!(std::mem::align_of::<TransportHeader>() == 16);

impl Default for TransportHeader {
    fn default() -> Self {
        Self {
            magic: TRANSPORT_MAGIC,
            protocol: PROTOCOL_VERSION,
            command: 0,
            flags: 0,
            checksum: 0,
            size: HEADER_SIZE as u32,
            nonce: 0,
            timestamp_us: 0,
            cluster_id: 0,
            op: 0,
            commit: 0,
            view: 0,
            sender_id: 0,
            reserved: [0; 59],
        }
    }
}

impl TransportHeader {
    /// Returns the command tag, if it decodes to a known VSR command.
    ///
    /// Tags in `0x20..=0x24` are edge/client traffic the core forwards
    /// opaquely; callers distinguish that range explicitly rather than
    /// through this accessor.
    pub fn command(&self) -> Option<Command> {
        Command::try_from(self.command).ok()
    }

    /// Sets the command tag.
    pub fn set_command(&mut self, command: Command) {
        self.command = command as u8;
    }

    /// Computes the checksum over `header[12..]` followed by `body`.
    pub fn calculate_checksum(&self, body: &[u8]) -> u32 {
        let bytes = self.as_bytes();
        let mut scratch = Vec::with_capacity(HEADER_SIZE - 12 + body.len());
        scratch.extend_from_slice(&bytes[12..]);
        scratch.extend_from_slice(body);
        crate::crypto::crc32c(&scratch)
    }

    /// Sets `self.checksum` from the current header contents and `body`.
    pub fn set_checksum(&mut self, body: &[u8]) {
        self.checksum = self.calculate_checksum(body);
    }

    /// True if `self.checksum` matches the recomputed checksum over `body`.
    pub fn valid_checksum(&self, body: &[u8]) -> bool {
        self.checksum == self.calculate_checksum(body)
    }

    /// Views this header as its raw little-endian byte representation.
    pub fn as_bytes(&self) -> &[u8; HEADER_SIZE] {
        unsafe { &*(self as *const TransportHeader as *const [u8; HEADER_SIZE]) }
    }

    /// Views this header as a mutable raw byte representation.
    pub fn as_bytes_mut(&mut self) -> &mut [u8; HEADER_SIZE] {
        unsafe { &mut *(self as *mut TransportHeader as *mut [u8; HEADER_SIZE]) }
    }

    /// Reinterprets `bytes` as a header without copying.
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> &TransportHeader {
        unsafe { &*(bytes.as_ptr() as *const TransportHeader) }
    }

    /// Validates magic and protocol version.
    pub fn valid_magic_and_version(&self) -> bool {
        self.magic == TRANSPORT_MAGIC && self.protocol == PROTOCOL_VERSION
    }
}
