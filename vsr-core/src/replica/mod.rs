//! Per-replica state: role, view, commit number, room table, and the
//! operations the rest of the system drives it through.

pub mod backup;
pub mod primary;
pub mod view_change;

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use crate::config::ClusterConfig;
use crate::error::Result;
use crate::protocol::TransportHeader;
use crate::state_machine::RoomState;
use crate::wal::Wal;

pub use primary::PrepareTracker;
pub use view_change::{DoViewChangeTracker, LogState, TimeoutTracker, VoteAccumulator};

/// A replica's current phase.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// Replaying the WAL and rebuilding room state; not yet serving traffic.
    Recovering,
    /// Serving normal-case traffic (prepare/prepare_ok/commit).
    Normal,
    /// Participating in a view change; normal-case messages are ignored.
    ViewChange,
}

/// Holds everything owned exclusively by one replica process: its
/// configuration, WAL, room table, per-sender nonce table, and VSR phase.
pub struct ReplicaCore {
    config: ClusterConfig,
    wal: Wal,
    rooms: HashMap<u128, RoomState>,
    last_seen_nonce: [u64; 3],
    pub(super) role: Role,
    pub(super) view: u32,
    pub(super) commit_num: u64,
    pub(super) prepare_trackers: HashMap<u64, PrepareTracker>,
    pub(super) timeout_tracker: TimeoutTracker,
    pub(super) vote_accumulator: VoteAccumulator,
    pub(super) do_view_change_tracker: DoViewChangeTracker,
}

impl ReplicaCore {
    /// Opens the WAL at `wal_path`, recovers it, replays every entry to
    /// rebuild room state, then transitions to `Normal` with
    /// `commit_num = last_op` (see the module-level open question on
    /// single-replica recovery).
    pub fn open(config: ClusterConfig, wal_path: &Path, max_entries: u64) -> Result<Self> {
        let wal = Wal::open(wal_path, max_entries)?;

        let mut replica = Self {
            config,
            wal,
            rooms: HashMap::new(),
            last_seen_nonce: [0; 3],
            role: Role::Recovering,
            view: 0,
            commit_num: 0,
            prepare_trackers: HashMap::new(),
            timeout_tracker: TimeoutTracker::default(),
            vote_accumulator: VoteAccumulator::default(),
            do_view_change_tracker: DoViewChangeTracker::default(),
        };

        let entries = replica.wal.replay()?;
        for (op, message) in &entries {
            let room = replica
                .rooms
                .entry(message.room_id)
                .or_insert_with(|| RoomState::new(message.room_id));
            room.apply(*op, message)?;
        }

        replica.commit_num = replica.wal.last_op();
        replica.role = Role::Normal;

        info!(
            replica_id = replica.config.replica_id,
            last_op = replica.commit_num,
            rooms = replica.rooms.len(),
            "recovered write-ahead log"
        );

        Ok(replica)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn view(&self) -> u32 {
        self.view
    }

    pub fn commit_num(&self) -> u64 {
        self.commit_num
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn wal(&self) -> &Wal {
        &self.wal
    }

    pub fn wal_mut(&mut self) -> &mut Wal {
        &mut self.wal
    }

    /// True if `header.cluster_id` matches this replica's configured
    /// cluster.
    pub fn verify_cluster(&self, header: &TransportHeader) -> bool {
        header.cluster_id == self.config.cluster_id
    }

    /// True if `nonce` is strictly greater than the last nonce accepted from
    /// `sender_id`. Updates the table on success (SE2): nonce verification
    /// is the one place this replica's otherwise-read-only transport state
    /// mutates as a side effect of a successful check.
    pub fn verify_nonce(&mut self, sender_id: u8, nonce: u64) -> bool {
        let slot = &mut self.last_seen_nonce[sender_id as usize];
        if nonce > *slot {
            *slot = nonce;
            true
        } else {
            false
        }
    }

    /// Returns the room for `room_id`, creating an empty one if absent.
    pub fn get_or_create_room(&mut self, room_id: u128) -> &mut RoomState {
        self.rooms.entry(room_id).or_insert_with(|| RoomState::new(room_id))
    }

    pub fn room(&self, room_id: u128) -> Option<&RoomState> {
        self.rooms.get(&room_id)
    }

    /// Begins a view change to `new_view`. Requires `new_view > view`.
    ///
    /// # Panics
    /// Panics if `new_view <= view`: view numbers on one replica must be
    /// strictly increasing (S4); a caller asking to move to a lower or equal
    /// view is a protocol bug, not an expected failure.
    pub fn start_view_change(&mut self, new_view: u32) {
        assert!(new_view > self.view, "start_view_change requires new_view > view");
        warn!(from = self.view, to = new_view, "entering view change");
        self.view = new_view;
        self.role = Role::ViewChange;
        self.prepare_trackers.clear();
    }

    /// Completes a view change, installing `new_view` and returning to
    /// `Normal`. Requires `new_view >= view`.
    ///
    /// # Panics
    /// Panics if `new_view < view`.
    pub fn complete_view_change(&mut self, new_view: u32) {
        assert!(
            new_view >= self.view,
            "complete_view_change requires new_view >= view"
        );
        info!(view = new_view, "view change complete");
        self.view = new_view;
        self.role = Role::Normal;
        self.prepare_trackers.clear();
    }

    /// The replica id that is primary for `self.view`: deterministic
    /// round-robin leader selection.
    pub fn primary_id_for_view(&self) -> u8 {
        (self.view % 3) as u8
    }

    /// True if this replica is the primary for its current view.
    pub fn is_primary(&self) -> bool {
        self.primary_id_for_view() == self.config.replica_id
    }
}
