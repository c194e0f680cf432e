//! Primary-side normal-case protocol: op assignment and quorum detection.

use crate::error::{Result, VsrError};
use crate::protocol::ChatMessage;

use super::ReplicaCore;

/// Tracks `prepare_ok` votes for one in-flight op. Implementations may hold
/// several of these concurrently, bounded by pipeline depth.
#[derive(Debug, Clone, Copy)]
pub struct PrepareTracker {
    pub op: u64,
    prepare_ok_from: [bool; 3],
    pub count: u8,
}

impl PrepareTracker {
    fn new(op: u64, self_id: u8) -> Self {
        let mut tracker = PrepareTracker {
            op,
            prepare_ok_from: [false; 3],
            count: 0,
        };
        tracker.record(self_id);
        tracker
    }

    /// Records a vote from `replica_id`. No-op if already recorded.
    fn record(&mut self, replica_id: u8) {
        let slot = &mut self.prepare_ok_from[replica_id as usize];
        if !*slot {
            *slot = true;
            self.count += 1;
        }
    }
}

/// Quorum size required to commit or elect (`Q = 2` out of `N = 3`).
pub const QUORUM: u8 = 2;

impl ReplicaCore {
    /// Accepts a client-submitted message as the primary: assigns the next
    /// op, appends it durably, applies it locally, and opens a
    /// [`PrepareTracker`] with the primary's own self-vote already counted.
    ///
    /// Returns the assigned op so the caller can broadcast `prepare`
    /// envelopes to backups.
    pub fn accept_client_request(&mut self, message: &ChatMessage) -> Result<u64> {
        if !self.is_primary() {
            return Err(VsrError::NotPrimary);
        }
        let op = self.wal_mut().last_op() + 1;
        self.wal_mut().append(op, message)?;

        let room = self.get_or_create_room(message.room_id);
        room.apply(op, message)?;

        let self_id = self.config().replica_id;
        self.prepare_trackers.insert(op, PrepareTracker::new(op, self_id));

        Ok(op)
    }

    /// Records a `prepare_ok` from `from_replica` for `op`. Returns `true`
    /// exactly once per op, the moment quorum is reached, signaling the
    /// caller to advance `commit_num` and broadcast `commit`. Ignores votes
    /// for an op with no open tracker (already committed, or never ours).
    pub fn handle_prepare_ok(&mut self, from_replica: u8, op: u64) -> bool {
        let Some(tracker) = self.prepare_trackers.get_mut(&op) else {
            return false;
        };
        tracker.record(from_replica);
        if tracker.count >= QUORUM {
            self.prepare_trackers.remove(&op);
            self.commit_num = op;
            true
        } else {
            false
        }
    }
}
