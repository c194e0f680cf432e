//! Viewstamped Replication consensus core for a per-room-shard chat backend.
//!
//! This crate implements the replicated part of the system: a crash-safe
//! write-ahead log, a deterministic per-room state machine, a signed and
//! checksummed wire transport, and the normal-case and view-change VSR
//! protocols across a fixed group of three replicas (`N = 3`, `f = 1`,
//! `Q = 2`).
//!
//! Everything outside the consensus boundary (the WebSocket edge gateway,
//! JWT validation, rate limiting, the fan-out bus, metrics export, the
//! signed audit log, and the operator CLI) is deliberately out of scope
//! and consumes this crate through [`replica::ReplicaCore`] and the
//! `protocol` types.
//!
//! # Requirements
//!
//! - A POSIX platform with `epoll` or `kqueue` (via `mio`).
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::Path;
//! use vsr_core::config::{ClusterConfig, PeerDescriptor};
//! use vsr_core::replica::ReplicaCore;
//!
//! let config = ClusterConfig {
//!     cluster_id: 1,
//!     replica_id: 0,
//!     bind_host: [0, 0, 0, 0],
//!     bind_port: 4000,
//!     peers: [
//!         PeerDescriptor { replica_id: 1, host: [127, 0, 0, 1], port: 4001, public_key: [0; 32] },
//!         PeerDescriptor { replica_id: 2, host: [127, 0, 0, 1], port: 4002, public_key: [0; 32] },
//!     ],
//!     prepare_timeout_ms: 50,
//!     view_change_timeout_ms: 300,
//!     queue_capacity: 4096,
//!     secret_key: [0; 32],
//! };
//! config.validate().expect("invalid cluster configuration");
//! let replica = ReplicaCore::open(config, Path::new("replica-0.wal"), 1_000_000)
//!     .expect("failed to open write-ahead log");
//! assert_eq!(replica.commit_num(), 0);
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod io;
pub mod protocol;
pub mod queue;
pub mod replica;
pub mod state_machine;
pub mod transport;
pub mod wal;

pub use error::{Result, VsrError};
pub use queue::BoundedQueue;
pub use transport::Transport;

/// Generates a globally unique, time-ordered identifier from the wall clock
/// plus OS randomness. Used by edge-side code to mint `msg_id`s before
/// submission; never called from inside [`state_machine::RoomState::apply`],
/// which must stay a pure function of its inputs (determinism property X1).
///
/// # Example
///
/// ```
/// let a = vsr_core::id();
/// let b = vsr_core::id();
/// assert_ne!(a, b);
/// ```
pub fn id() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as u64;

    let random: u64 = rand::random();

    ((timestamp as u128) << 64) | (random as u128)
}
