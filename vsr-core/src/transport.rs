//! Signed, checksummed envelope transport.
//!
//! A stateless-per-envelope verifier plus the small amount of per-sender
//! state the contract requires: a monotonic outbound nonce counter and, per
//! peer, the last nonce accepted from them.

use crate::crypto::{crc32c, ed25519_sign, ed25519_verify};
use crate::error::{Result, VsrError};
use crate::protocol::{Command, TransportHeader, HEADER_SIZE};

/// Maximum envelope body size.
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Signature length appended after the header and body.
pub const SIGNATURE_SIZE: usize = 64;

/// A verified, ready-to-inspect envelope: header plus owned body bytes.
#[derive(Debug)]
pub struct Envelope {
    pub header: TransportHeader,
    pub body: Vec<u8>,
}

/// Per-replica transport state: identity, peer keys, and nonce bookkeeping.
pub struct Transport {
    cluster_id: u128,
    sender_id: u8,
    secret_key: [u8; 32],
    peer_public_keys: [[u8; 32]; 3],
    outbound_nonce: u64,
    last_seen_nonce: [u64; 3],
}

impl Transport {
    /// Creates transport state for a replica identified by `sender_id` in
    /// `{0, 1, 2}`, with Ed25519 key material for itself and all three
    /// cluster members (including itself, at `peer_public_keys[sender_id]`).
    pub fn new(
        cluster_id: u128,
        sender_id: u8,
        secret_key: [u8; 32],
        peer_public_keys: [[u8; 32]; 3],
    ) -> Self {
        assert!(sender_id < 3, "sender_id must be in 0..3");
        Self {
            cluster_id,
            sender_id,
            secret_key,
            peer_public_keys,
            outbound_nonce: 0,
            last_seen_nonce: [0; 3],
        }
    }

    /// Builds and signs an outbound envelope, advancing the outbound nonce.
    pub fn send(
        &mut self,
        command: Command,
        view: u32,
        op: u64,
        commit: u64,
        body: &[u8],
    ) -> Vec<u8> {
        assert!(body.len() <= MAX_BODY_SIZE, "envelope body exceeds MAX_BODY_SIZE");
        self.outbound_nonce += 1;

        let mut header = TransportHeader::default();
        header.set_command(command);
        header.cluster_id = self.cluster_id;
        header.sender_id = self.sender_id;
        header.view = view;
        header.op = op;
        header.commit = commit;
        header.nonce = self.outbound_nonce;
        header.timestamp_us = current_timestamp_us();
        header.size = (HEADER_SIZE + body.len() + SIGNATURE_SIZE) as u32;
        header.set_checksum(body);

        let mut wire = Vec::with_capacity(header.size as usize);
        wire.extend_from_slice(header.as_bytes());
        wire.extend_from_slice(body);
        let signature = ed25519_sign(&wire, &self.secret_key);
        wire.extend_from_slice(&signature);
        wire
    }

    /// Verifies `wire` per the receive contract and, on success, returns the
    /// decoded envelope. Does not update the nonce table; callers must call
    /// [`Transport::record_nonce`] once the message is fully accepted so that
    /// a message later rejected by the state machine does not poison replay
    /// detection.
    pub fn verify(&self, wire: &[u8]) -> Result<Envelope> {
        if wire.len() < HEADER_SIZE + SIGNATURE_SIZE {
            return Err(VsrError::CorruptLog);
        }
        let header_bytes: &[u8; HEADER_SIZE] = wire[..HEADER_SIZE].try_into().unwrap();
        let header = *TransportHeader::from_bytes(header_bytes);

        if !header.valid_magic_and_version() {
            return Err(VsrError::InvalidMagicOrVersion);
        }
        if header.cluster_id != self.cluster_id {
            return Err(VsrError::ClusterIdMismatch);
        }
        if header.sender_id >= 3 {
            return Err(VsrError::InvalidSenderId);
        }

        let body_end = wire.len() - SIGNATURE_SIZE;
        let body = &wire[HEADER_SIZE..body_end];
        if crc32c(&[&wire[12..HEADER_SIZE], body].concat()) != header.checksum {
            return Err(VsrError::ChecksumMismatch);
        }

        let signature: [u8; SIGNATURE_SIZE] = wire[body_end..].try_into().unwrap();
        let signed_part = &wire[..body_end];
        let public_key = &self.peer_public_keys[header.sender_id as usize];
        if !ed25519_verify(signed_part, &signature, public_key) {
            return Err(VsrError::InvalidSignature);
        }

        if header.nonce <= self.last_seen_nonce[header.sender_id as usize] {
            return Err(VsrError::ReplayedNonce);
        }

        Ok(Envelope {
            header,
            body: body.to_vec(),
        })
    }

    /// Records `nonce` as the last accepted nonce from `sender_id`. Called
    /// only after a verified envelope has been fully accepted downstream.
    pub fn record_nonce(&mut self, sender_id: u8, nonce: u64) {
        self.last_seen_nonce[sender_id as usize] = nonce;
    }

    /// The outbound nonce of the most recently sent envelope.
    pub fn outbound_nonce(&self) -> u64 {
        self.outbound_nonce
    }
}

fn current_timestamp_us() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ed25519_keypair_from_seed;

    fn make_pair(cluster_id: u128) -> (Transport, Transport) {
        let kp0 = ed25519_keypair_from_seed(&[1; 32]);
        let kp1 = ed25519_keypair_from_seed(&[2; 32]);
        let kp2 = ed25519_keypair_from_seed(&[3; 32]);
        let keys = [kp0.public(), kp1.public(), kp2.public()];
        let t0 = Transport::new(cluster_id, 0, kp0.secret(), keys);
        let t1 = Transport::new(cluster_id, 1, kp1.secret(), keys);
        (t0, t1)
    }

    #[test]
    fn send_then_verify_round_trips() {
        let (mut sender, receiver) = make_pair(42);
        let wire = sender.send(Command::Prepare, 0, 1, 0, b"hello");
        let envelope = receiver.verify(&wire).unwrap();
        assert_eq!(envelope.body, b"hello");
        assert_eq!(envelope.header.command(), Some(Command::Prepare));
    }

    #[test]
    fn wrong_cluster_is_rejected() {
        let (mut sender, _) = make_pair(42);
        let (_, receiver) = make_pair(99);
        let wire = sender.send(Command::Prepare, 0, 1, 0, b"hi");
        assert!(matches!(
            receiver.verify(&wire),
            Err(VsrError::ClusterIdMismatch)
        ));
    }

    #[test]
    fn tampered_body_fails_checksum() {
        let (mut sender, receiver) = make_pair(1);
        let mut wire = sender.send(Command::Commit, 0, 1, 1, b"payload");
        let body_index = HEADER_SIZE;
        wire[body_index] ^= 0xFF;
        let result = receiver.verify(&wire);
        assert!(matches!(
            result,
            Err(VsrError::ChecksumMismatch) | Err(VsrError::InvalidSignature)
        ));
    }

    #[test]
    fn replay_is_rejected_after_recording_nonce() {
        let (mut sender, mut receiver) = make_pair(7);
        let wire = sender.send(Command::PrepareOk, 0, 1, 0, b"ok");
        let envelope = receiver.verify(&wire).unwrap();
        receiver.record_nonce(envelope.header.sender_id, envelope.header.nonce);
        assert!(matches!(
            receiver.verify(&wire),
            Err(VsrError::ReplayedNonce)
        ));
    }

    #[test]
    fn outbound_nonce_increases_per_send() {
        let (mut sender, _) = make_pair(1);
        sender.send(Command::Prepare, 0, 1, 0, b"a");
        assert_eq!(sender.outbound_nonce(), 1);
        sender.send(Command::Prepare, 0, 2, 0, b"b");
        assert_eq!(sender.outbound_nonce(), 2);
    }
}
