//! View-change protocol: timeout detection, vote collection, election, and
//! view installation.
//!
//! Timestamps throughout this module are supplied by the caller
//! (microseconds from whatever clock the event loop uses) rather than read
//! internally, so the protocol logic stays deterministic and testable
//! without touching the wall clock directly.

use std::collections::HashMap;

use tracing::info;

use crate::error::{Result, VsrError};

use super::ReplicaCore;

/// Default prepare timeout, in microseconds (spec default: 50 ms).
pub const DEFAULT_PREPARE_TIMEOUT_US: u64 = 50_000;

/// Default view-change liveness budget, in microseconds (spec default: 300 ms).
pub const DEFAULT_VIEW_CHANGE_TIMEOUT_US: u64 = 300_000;

/// Tracks whether the current primary appears alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutTracker {
    last_prepare_time_us: Option<u64>,
}

impl TimeoutTracker {
    /// Records that a prepare (or, on the primary, nothing; only backups
    /// call this) was just observed at `now_us`.
    pub fn record_prepare(&mut self, now_us: u64) {
        self.last_prepare_time_us = Some(now_us);
    }

    /// True iff a prepare has ever been recorded and `now_us` is at least
    /// `prepare_timeout_us` past it. A replica that has never seen a
    /// prepare never times out, avoiding a thundering herd at cluster
    /// start.
    pub fn has_timed_out(&self, now_us: u64, prepare_timeout_us: u64) -> bool {
        match self.last_prepare_time_us {
            Some(last) => now_us.saturating_sub(last) >= prepare_timeout_us,
            None => false,
        }
    }
}

/// Collects `start_view_change` votes for one pending view.
#[derive(Debug, Default)]
pub struct VoteAccumulator {
    pending_view: u32,
    votes: [bool; 3],
    vote_count: u8,
}

impl VoteAccumulator {
    /// Records a vote from `from` for `view`, resetting the accumulator if
    /// `view` supersedes the view currently being tallied. Returns the
    /// total distinct vote count for `view` after recording.
    fn record(&mut self, view: u32, from: u8) -> u8 {
        if view > self.pending_view {
            self.pending_view = view;
            self.votes = [false; 3];
            self.vote_count = 0;
        }
        if view == self.pending_view {
            let slot = &mut self.votes[from as usize];
            if !*slot {
                *slot = true;
                self.vote_count += 1;
            }
        }
        self.vote_count
    }
}

/// One replica's reported log state during a view change, including any
/// entries the election coordinator might be missing.
#[derive(Debug, Clone)]
pub struct LogState {
    pub last_op: u64,
    pub commit_num: u64,
    pub entries: Vec<(u64, crate::protocol::ChatMessage)>,
}

/// Collects `do_view_change` reports for a prospective new primary.
#[derive(Debug, Default)]
pub struct DoViewChangeTracker {
    view: u32,
    reports: HashMap<u8, LogState>,
}

impl DoViewChangeTracker {
    fn record(&mut self, view: u32, from: u8, state: LogState) {
        if view != self.view {
            self.view = view;
            self.reports.clear();
        }
        self.reports.insert(from, state);
    }

    fn count(&self) -> usize {
        self.reports.len()
    }

    /// Picks the log state to install: highest `last_op`, ties broken by
    /// highest `commit_num` (any remaining tie is safe: such states agree
    /// on the committed prefix).
    fn merge(&self) -> LogState {
        self.reports
            .values()
            .max_by_key(|s| (s.last_op, s.commit_num))
            .cloned()
            .expect("merge called with no recorded reports")
    }
}

impl ReplicaCore {
    /// Periodic liveness check for backups: if the current primary has
    /// timed out, begins a view change and returns the new pending view to
    /// broadcast as `start_view_change`. Returns `None` if no timeout has
    /// occurred, or if this replica is itself the primary.
    pub fn maybe_start_view_change(&mut self, now_us: u64) -> Option<u32> {
        if self.role() != super::Role::Normal || self.is_primary() {
            return None;
        }
        let timeout_us = (self.config().prepare_timeout_ms as u64) * 1000;
        if !self.timeout_tracker.has_timed_out(now_us, timeout_us) {
            return None;
        }
        let pending_view = self.view() + 1;
        self.start_view_change(pending_view);
        Some(pending_view)
    }

    /// Handles an incoming `start_view_change(v, from)`. Adopts `v` if it is
    /// newer than this replica's view. Once at least [`super::primary::QUORUM`]
    /// distinct votes (including any local vote already implied by
    /// `self.view`) have been seen for the current pending view, returns
    /// the view to send `do_view_change` for, to the prospective primary.
    pub fn handle_start_view_change(&mut self, v: u32, from: u8) -> Option<u32> {
        if v < self.view() {
            return None;
        }
        if v > self.view() {
            self.start_view_change(v);
        }
        let votes = self.vote_accumulator.record(v, from);
        if votes >= super::primary::QUORUM {
            Some(v)
        } else {
            None
        }
    }

    /// Builds this replica's own log-state report for a `do_view_change(v)`
    /// it is about to send, including every WAL entry beyond `commit_num`
    /// (the only entries a peer might be missing).
    pub fn build_log_state(&mut self) -> Result<LogState> {
        let commit_num = self.commit_num();
        let last_op = self.wal().last_op();
        let mut entries = Vec::new();
        for op in (commit_num + 1)..=last_op {
            if let Some(message) = self.wal_mut().read(op)? {
                entries.push((op, message));
            }
        }
        Ok(LogState {
            last_op,
            commit_num,
            entries,
        })
    }

    /// Handles an incoming `do_view_change(v, from, log_state)` at the
    /// prospective new primary. Only processes the message if this replica
    /// is actually `v`'s primary and is in `ViewChange`. Once quorum is
    /// reached, merges the reported states, installs the result, and
    /// returns the merged state to broadcast as `start_view(v, ..)`.
    pub fn handle_do_view_change(&mut self, v: u32, from: u8, state: LogState) -> Option<LogState> {
        if self.config().replica_id != (v % 3) as u8 {
            return None;
        }
        if self.role() != super::Role::ViewChange {
            return None;
        }
        self.do_view_change_tracker.record(v, from, state);
        if self.do_view_change_tracker.count() < super::primary::QUORUM as usize {
            return None;
        }
        let merged = self.do_view_change_tracker.merge();
        self.install_log_state(&merged);
        self.complete_view_change(v);
        info!(view = v, last_op = merged.last_op, "elected as new primary");
        Some(merged)
    }

    /// Handles an incoming `start_view(v, log_state)` at any replica.
    /// Installs the log state and completes the view change.
    pub fn handle_start_view(&mut self, v: u32, state: &LogState) -> Result<()> {
        if v < self.view() {
            return Err(VsrError::OldView);
        }
        if self.role() != super::Role::ViewChange {
            return Err(VsrError::NotInViewChangeState);
        }
        self.install_log_state(state);
        self.complete_view_change(v);
        Ok(())
    }

    /// Applies any entries from `state` this replica is missing, then
    /// advances `commit_num` to the merged value.
    fn install_log_state(&mut self, state: &LogState) {
        for (op, message) in &state.entries {
            if *op > self.wal().last_op() {
                if self.wal_mut().append(*op, message).is_ok() {
                    let room = self.get_or_create_room(message.room_id);
                    let _ = room.apply(*op, message);
                }
            }
        }
        self.commit_num = state.commit_num;
    }
}
