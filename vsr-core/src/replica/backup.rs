//! Backup-side normal-case protocol: accepting prepares and following commits.

use crate::error::{Result, VsrError};
use crate::protocol::ChatMessage;

use super::ReplicaCore;

impl ReplicaCore {
    /// Accepts a `prepare(view, op, message)` from the current primary.
    /// Requires the view to match, the op to be the next expected one, and
    /// the sender to actually be this view's primary. On success, appends
    /// durably and applies to room state, then returns the op so the caller
    /// can reply `prepare_ok`.
    pub fn handle_prepare(
        &mut self,
        view: u32,
        sender_id: u8,
        message: &ChatMessage,
        now_us: u64,
    ) -> Result<u64> {
        if view != self.view() {
            return Err(VsrError::OldView);
        }
        if sender_id != self.primary_id_for_view() {
            return Err(VsrError::NotPrimary);
        }
        let op = self.wal().last_op() + 1;

        self.wal_mut().append(op, message)?;
        let room = self.get_or_create_room(message.room_id);
        room.apply(op, message)?;

        self.timeout_tracker.record_prepare(now_us);
        Ok(op)
    }

    /// Accepts a `commit(new_commit_num)` from the primary. Advances this
    /// replica's `commit_num` to `min(new_commit_num, wal.last_op)`; never
    /// regresses it.
    pub fn handle_commit(&mut self, new_commit_num: u64) {
        let bound = new_commit_num.min(self.wal().last_op());
        if bound > self.commit_num {
            self.commit_num = bound;
        }
    }
}
