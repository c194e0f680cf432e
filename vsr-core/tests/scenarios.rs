//! End-to-end scenarios driving a small in-process three-replica harness
//! directly through [`vsr_core::replica::ReplicaCore`], bypassing the wire
//! transport so each scenario isolates VSR protocol logic from socket I/O.

use tempfile::tempdir;

use vsr_core::config::{ClusterConfig, PeerDescriptor};
use vsr_core::protocol::ChatMessage;
use vsr_core::replica::ReplicaCore;
use vsr_core::wal::Wal;
use vsr_core::VsrError;

const CLUSTER_ID: u128 = 0xDEAD_BEEF;

fn config(replica_id: u8) -> ClusterConfig {
    let ids: Vec<u8> = (0..3u8).filter(|&i| i != replica_id).collect();
    ClusterConfig {
        cluster_id: CLUSTER_ID,
        replica_id,
        bind_host: [127, 0, 0, 1],
        bind_port: 5000 + replica_id as u16,
        peers: [
            PeerDescriptor {
                replica_id: ids[0],
                host: [127, 0, 0, 1],
                port: 5000 + ids[0] as u16,
                public_key: [ids[0] + 1; 32],
            },
            PeerDescriptor {
                replica_id: ids[1],
                host: [127, 0, 0, 1],
                port: 5000 + ids[1] as u16,
                public_key: [ids[1] + 1; 32],
            },
        ],
        prepare_timeout_ms: 50,
        view_change_timeout_ms: 300,
        queue_capacity: 1024,
        secret_key: [replica_id + 1; 32],
    }
}

fn open_three(dir: &std::path::Path) -> [ReplicaCore; 3] {
    std::array::from_fn(|i| {
        let path = dir.join(format!("replica-{i}.wal"));
        ReplicaCore::open(config(i as u8), &path, 1000).unwrap()
    })
}

/// S-1: normal commit, three replicas, primary for view 0 is replica 0.
#[test]
fn s1_normal_commit_three_replicas() {
    let dir = tempdir().unwrap();
    let [mut r0, mut r1, mut r2] = open_three(dir.path());

    let message = ChatMessage::build(1, 100, 1, 0, 1000, 1, b"hello", [0; 32]);

    let op = r0.accept_client_request(&message).unwrap();
    assert_eq!(op, 1);

    let op1 = r1.handle_prepare(0, 0, &message, 1_000).unwrap();
    let op2 = r2.handle_prepare(0, 0, &message, 1_000).unwrap();
    assert_eq!(op1, 1);
    assert_eq!(op2, 1);

    // The primary's self-vote already counts one; the first backup ack
    // reaches quorum (Q=2) on its own.
    assert!(r0.handle_prepare_ok(1, op));
    assert_eq!(r0.commit_num(), 1);
    assert!(!r0.handle_prepare_ok(2, op));

    r1.handle_commit(1);
    r2.handle_commit(1);

    let hash0 = r0.room(1).unwrap().head_hash();
    let hash1 = r1.room(1).unwrap().head_hash();
    let hash2 = r2.room(1).unwrap().head_hash();
    assert_eq!(hash0, hash1);
    assert_eq!(hash1, hash2);
}

/// S-2: resubmitting the same (author_id, client_sequence) under a new
/// msg_id is reported as a duplicate, with no new log entry.
#[test]
fn s2_idempotent_replay() {
    let dir = tempdir().unwrap();
    let [mut r0, _r1, _r2] = open_three(dir.path());

    let first = ChatMessage::build(1, 100, 1, 0, 1000, 1, b"hello", [0; 32]);
    let op = r0.accept_client_request(&first).unwrap();
    assert_eq!(op, 1);

    let replay = ChatMessage::build(1, 999, 1, 0, 1000, 1, b"hello", [0; 32]);
    assert_eq!(r0.room(1).unwrap().message_count(), 1);

    // Applying the duplicate directly against the room (as the primary's
    // dedup path would, before deciding whether to assign a fresh op)
    // reports applied=false at the original op and leaves state untouched.
    let room = r0.get_or_create_room(1);
    let outcome = room.apply(2, &replay).unwrap();
    assert!(!outcome.applied);
    assert_eq!(outcome.op, 1);
    assert_eq!(r0.wal().last_op(), 1);
    assert_eq!(r0.room(1).unwrap().message_count(), 1);
}

/// S-3: primary crash and view change. Replicas 1 and 2 time out on
/// replica 0, elect replica 1 (primary for view 1), and converge.
#[test]
fn s3_primary_crash_and_view_change() {
    let dir = tempdir().unwrap();
    let [mut r0, mut r1, mut r2] = open_three(dir.path());

    let message = ChatMessage::build(1, 100, 1, 0, 1000, 1, b"hello", [0; 32]);
    r0.accept_client_request(&message).unwrap();
    r1.handle_prepare(0, 0, &message, 1_000).unwrap();
    r2.handle_prepare(0, 0, &message, 1_000).unwrap();

    // replica 0 is now unreachable; 1 and 2 each time out at t=52_000us.
    let pending1 = r1.maybe_start_view_change(52_000).unwrap();
    let pending2 = r2.maybe_start_view_change(52_000).unwrap();
    assert_eq!(pending1, 1);
    assert_eq!(pending2, 1);

    // Each backup votes for the other's start_view_change, plus its own.
    assert!(r1.handle_start_view_change(1, 1).is_none());
    let elect1 = r1.handle_start_view_change(1, 2);
    assert_eq!(elect1, Some(1));

    assert!(r2.handle_start_view_change(1, 2).is_none());
    let elect2 = r2.handle_start_view_change(1, 1);
    assert_eq!(elect2, Some(1));

    // Both send do_view_change to replica 1, the primary for view 1.
    let state1 = r1.build_log_state().unwrap();
    let state2 = r2.build_log_state().unwrap();

    assert!(r1.handle_do_view_change(1, 1, state1.clone()).is_none());
    let merged = r1.handle_do_view_change(1, 2, state2).unwrap();

    r2.handle_start_view(1, &merged).unwrap();

    assert_eq!(r1.role(), vsr_core::replica::Role::Normal);
    assert_eq!(r2.role(), vsr_core::replica::Role::Normal);
    assert_eq!(r1.view(), 1);
    assert_eq!(r2.view(), 1);
    assert_eq!(r1.commit_num(), r2.commit_num());
    let _ = state1;
}

/// S-4: log-merge tie-break picks the highest last_op; commit_num is
/// whatever that reporter sent, not separately maximized.
#[test]
fn s4_log_merge_tie_break() {
    use vsr_core::replica::LogState;

    let dir = tempdir().unwrap();
    let path = dir.path().join("replica-1.wal");
    let mut aspirant = ReplicaCore::open(config(1), &path, 100).unwrap();
    aspirant.start_view_change(1);

    let report_a = LogState { last_op: 6, commit_num: 6, entries: vec![] };
    let report_b = LogState { last_op: 7, commit_num: 5, entries: vec![] };

    assert!(aspirant.handle_do_view_change(1, 0, report_a).is_none());
    let merged = aspirant.handle_do_view_change(1, 2, report_b).unwrap();

    assert_eq!(merged.last_op, 7);
    assert_eq!(merged.commit_num, 5);
}

/// S-5: a single flipped body bit is caught by the checksum before the
/// signature is ever checked against a (here, intentionally wrong) key.
#[test]
fn s5_tampered_envelope() {
    use vsr_core::protocol::{Command, HEADER_SIZE};
    use vsr_core::transport::Transport;

    let keys = [[9u8; 32]; 3];
    let mut sender = Transport::new(CLUSTER_ID, 0, [1; 32], keys);
    let receiver = Transport::new(CLUSTER_ID, 1, [2; 32], keys);

    let mut wire = sender.send(Command::Prepare, 0, 1, 0, b"hello");
    wire[HEADER_SIZE] ^= 0xFF;

    let result = receiver.verify(&wire);
    assert!(matches!(result, Err(VsrError::ChecksumMismatch)));
}

/// S-6: a truncated trailing entry is fatal corruption, not a silently
/// truncated log; the replica must refuse to start.
#[test]
fn s6_wal_recovery_with_trailing_corruption() {
    use vsr_core::wal::ENTRY_SIZE;

    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    {
        let mut wal = Wal::open(&path, 100).unwrap();
        let m1 = ChatMessage::build(1, 1, 1, 0, 100, 0, b"one", [0; 32]);
        let m2 = ChatMessage::build(1, 2, 1, 0, 200, 1, b"two", m1.calculate_hash());
        wal.append(1, &m1).unwrap();
        wal.append(2, &m2).unwrap();
    }

    let file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    let current_len = file.metadata().unwrap().len();
    file.set_len(current_len + ENTRY_SIZE as u64 / 2).unwrap();
    drop(file);

    let result = Wal::open(&path, 100);
    assert!(matches!(result, Err(VsrError::CorruptLog)));

    let replica_result = ReplicaCore::open(config(0), &path, 100);
    assert!(replica_result.is_err());
}
