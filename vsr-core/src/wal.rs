//! Crash-safe, append-only write-ahead log.
//!
//! Every append is fsync'd before it returns (durability invariant D1); every
//! entry carries its own checksum, and op numbers are required to increase by
//! exactly one from entry to entry (safety invariant S1). A torn trailing
//! entry found during recovery is treated as corruption, never silently
//! truncated.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::crypto::crc32c;
use crate::error::{Result, VsrError};
use crate::protocol::{ChatMessage, MESSAGE_SIZE};

/// Size of [`EntryHeader`] in bytes.
pub const ENTRY_HEADER_SIZE: usize = 16;

/// Size of one on-disk log entry (header + message).
pub const ENTRY_SIZE: usize = ENTRY_HEADER_SIZE + MESSAGE_SIZE;

/// Fixed 16-byte prefix of each on-disk log entry.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct EntryHeader {
    pub op: u64,
    pub checksum: u32,
    pub reserved: u32,
}

const _: () = assert!(std::mem::size_of::<EntryHeader>() == ENTRY_HEADER_SIZE);

impl EntryHeader {
    /// Computes `CRC32C(op_le | message_bytes)`.
    pub fn calculate_checksum(op: u64, message: &ChatMessage) -> u32 {
        let mut scratch = Vec::with_capacity(8 + MESSAGE_SIZE);
        scratch.extend_from_slice(&op.to_le_bytes());
        scratch.extend_from_slice(message.as_bytes());
        crc32c(&scratch)
    }
}

/// An append-only log of [`ChatMessage`] entries, indexed by op number.
pub struct Wal {
    file: File,
    max_entries: u64,
    last_op: u64,
    entry_count: u64,
}

impl Wal {
    /// Opens `path` (creating it if absent) and runs recovery before
    /// returning, per the open contract.
    pub fn open(path: &Path, max_entries: u64) -> Result<Self> {
        assert!(
            max_entries > 0 && max_entries <= 10_000_000,
            "max_entries out of range (0, 10_000_000]"
        );
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let mut wal = Wal {
            file,
            max_entries,
            last_op: 0,
            entry_count: 0,
        };
        wal.recover()?;
        Ok(wal)
    }

    /// The op number of the most recently appended entry (0 if empty).
    pub fn last_op(&self) -> u64 {
        self.last_op
    }

    /// The number of entries currently in the log.
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Appends `message` at `op`. Requires `op > last_op` and
    /// `entry_count < max_entries`. Fsyncs before returning (D1).
    pub fn append(&mut self, op: u64, message: &ChatMessage) -> Result<()> {
        assert!(op > self.last_op, "append requires a strictly increasing op");
        if self.entry_count >= self.max_entries {
            return Err(VsrError::LogFull);
        }

        let header = EntryHeader {
            op,
            checksum: EntryHeader::calculate_checksum(op, message),
            reserved: 0,
        };

        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(header.as_bytes())?;
        self.file.write_all(message.as_bytes())?;
        self.file.sync_all()?;

        self.last_op = op;
        self.entry_count += 1;
        Ok(())
    }

    /// Scans the log from the start looking for `op`, verifying every
    /// entry's checksum along the way. Returns `None` at EOF without a
    /// match, and a checksum error on the first corrupt entry encountered.
    pub fn read(&mut self, op: u64) -> Result<Option<ChatMessage>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; ENTRY_SIZE];
        loop {
            match read_exact_or_eof(&mut self.file, &mut buf)? {
                None => return Ok(None),
                Some(n) if n < ENTRY_SIZE => return Err(VsrError::CorruptLog),
                Some(_) => {}
            }
            let (entry_op, message) = decode_entry(&buf)?;
            if entry_op == op {
                return Ok(Some(message));
            }
        }
    }

    /// Scans the full log from byte 0, validating every entry and
    /// reconstructing `last_op`/`entry_count`. Called by [`Wal::open`]
    /// before it returns.
    fn recover(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut prev_op = 0u64;
        let mut count = 0u64;
        let mut buf = [0u8; ENTRY_SIZE];

        loop {
            let read = match read_exact_or_eof(&mut self.file, &mut buf)? {
                None => break,
                Some(n) => n,
            };
            if read < ENTRY_SIZE {
                return Err(VsrError::CorruptLog);
            }
            let (entry_op, _message) = decode_entry(&buf)?;
            if entry_op <= prev_op {
                return Err(VsrError::NonMonotonicOp);
            }
            prev_op = entry_op;
            count += 1;
            if count > self.max_entries {
                return Err(VsrError::LogFull);
            }
        }

        self.last_op = prev_op;
        self.entry_count = count;
        Ok(())
    }

    /// Iterates every entry from the start, in op order, verifying
    /// checksums. Used by the replica to rebuild room state on startup.
    pub fn replay(&mut self) -> Result<Vec<(u64, ChatMessage)>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut out = Vec::with_capacity(self.entry_count as usize);
        let mut buf = [0u8; ENTRY_SIZE];
        loop {
            match read_exact_or_eof(&mut self.file, &mut buf)? {
                None => break,
                Some(n) if n < ENTRY_SIZE => return Err(VsrError::CorruptLog),
                Some(_) => {}
            }
            let (op, message) = decode_entry(&buf)?;
            out.push((op, message));
        }
        Ok(out)
    }
}

fn decode_entry(buf: &[u8; ENTRY_SIZE]) -> Result<(u64, ChatMessage)> {
    let header_bytes: &[u8; ENTRY_HEADER_SIZE] = buf[..ENTRY_HEADER_SIZE].try_into().unwrap();
    let header = EntryHeader::read_from_bytes(header_bytes).expect("fixed-size header read");
    let message_bytes: &[u8; MESSAGE_SIZE] = buf[ENTRY_HEADER_SIZE..].try_into().unwrap();
    let message = *ChatMessage::from_bytes(message_bytes);

    if header.checksum != EntryHeader::calculate_checksum(header.op, &message) {
        return Err(VsrError::ChecksumMismatch);
    }
    if !message.valid_checksum() {
        return Err(VsrError::MessageChecksumInvalid);
    }
    Ok((header.op, message))
}

/// Reads up to `buf.len()` bytes, returning `None` only at a clean EOF with
/// zero bytes read, and `Some(n)` otherwise (where `n < buf.len()` signals a
/// short/torn trailing record).
fn read_exact_or_eof(file: &mut File, buf: &mut [u8]) -> Result<Option<usize>> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    if total == 0 {
        Ok(None)
    } else {
        Ok(Some(total))
    }
}
