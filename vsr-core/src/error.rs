//! Error types for the consensus core.
//!
//! Follows the two-tier taxonomy from the design: invariant violations are
//! bugs and abort the process via `panic!`/`assert!` at the point of
//! detection (see call sites in `wal`, `queue`, `replica::view_change`); this
//! module only covers the second tier, expected failures that a caller is
//! meant to handle as structured values.

use std::error::Error;
use std::fmt;

/// Result type used throughout the consensus core.
pub type Result<T> = std::result::Result<T, VsrError>;

/// Expected failures a caller must handle explicitly.
#[derive(Debug)]
pub enum VsrError {
    // --- Transport (§7: reject envelope, state unchanged) ---
    /// Header magic or protocol version did not match.
    InvalidMagicOrVersion,
    /// CRC32C over the header/body did not match the header's checksum field.
    ChecksumMismatch,
    /// Ed25519 signature verification failed.
    InvalidSignature,
    /// Envelope's cluster id did not match this replica's configured cluster.
    ClusterIdMismatch,
    /// Sender id was not in `{0, 1, 2}`.
    InvalidSenderId,
    /// Nonce was not strictly greater than the last accepted nonce from that sender.
    ReplayedNonce,

    // --- WAL recovery (§7: refuse to start) ---
    /// Adjacent entries did not have strictly increasing op numbers.
    NonMonotonicOp,
    /// A trailing entry was short or truncated.
    CorruptLog,
    /// An entry's own embedded message checksum was invalid.
    MessageChecksumInvalid,

    // --- Resource bounds (§7: surface to caller, back-pressure upstream) ---
    /// WAL is at its configured `max_entries`.
    LogFull,
    /// Room is at `MAX_MESSAGES_PER_ROOM`.
    RoomFull,
    /// Room's idempotency table is at `MAX_IDEMPOTENCY_ENTRIES`.
    IdempotencyTableFull,
    /// Connection pool is at `MAX_CONNECTIONS`.
    TooManyConnections,
    /// A bounded queue was full.
    QueueFull,

    // --- State machine (§7: refuse to apply, caller treats as protocol bug) ---
    /// `op` was not `last_op + 1`.
    NonSequentialOp,
    /// Message's `room_id` did not match the room being applied to.
    WrongRoom,
    /// Message's `timestamp_us` regressed relative to the room's last applied message.
    TimestampNotMonotonic,

    // --- Role/phase mismatch (§7: ignore or return, no state change) ---
    /// Caller is not the primary for the current view.
    NotPrimary,
    /// Replica is not currently in the `ViewChange` role.
    NotInViewChangeState,
    /// A view-change message named a view older than the replica's current view.
    OldView,

    /// Underlying I/O failure (open, read, write, fsync).
    Io(std::io::Error),
}

impl fmt::Display for VsrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VsrError::InvalidMagicOrVersion => write!(f, "invalid header magic or protocol version"),
            VsrError::ChecksumMismatch => write!(f, "checksum mismatch"),
            VsrError::InvalidSignature => write!(f, "invalid envelope signature"),
            VsrError::ClusterIdMismatch => write!(f, "cluster id mismatch"),
            VsrError::InvalidSenderId => write!(f, "invalid sender id"),
            VsrError::ReplayedNonce => write!(f, "replayed or out-of-order nonce"),
            VsrError::NonMonotonicOp => write!(f, "non-monotonic op number in log"),
            VsrError::CorruptLog => write!(f, "corrupt or truncated log entry"),
            VsrError::MessageChecksumInvalid => write!(f, "message checksum invalid"),
            VsrError::LogFull => write!(f, "write-ahead log is full"),
            VsrError::RoomFull => write!(f, "room has reached the maximum message count"),
            VsrError::IdempotencyTableFull => write!(f, "room idempotency table is full"),
            VsrError::TooManyConnections => write!(f, "too many open connections"),
            VsrError::QueueFull => write!(f, "queue is full"),
            VsrError::NonSequentialOp => write!(f, "op is not sequential"),
            VsrError::WrongRoom => write!(f, "message room_id does not match target room"),
            VsrError::TimestampNotMonotonic => write!(f, "message timestamp is not monotonic"),
            VsrError::NotPrimary => write!(f, "replica is not the primary for the current view"),
            VsrError::NotInViewChangeState => write!(f, "replica is not in the ViewChange role"),
            VsrError::OldView => write!(f, "view is older than the replica's current view"),
            VsrError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl Error for VsrError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            VsrError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VsrError {
    fn from(err: std::io::Error) -> Self {
        VsrError::Io(err)
    }
}
