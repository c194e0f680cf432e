//! Ed25519 keypair generation, signing, and verification for peer envelopes.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

/// An Ed25519 keypair derived deterministically from a 32-byte seed.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// The public key, to be distributed to peers out of band.
    pub fn public(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// The raw signing key bytes (kept only in memory, never logged).
    pub fn secret(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

/// Derives a keypair from a 32-byte seed. Deterministic: the same seed always
/// produces the same keypair.
pub fn ed25519_keypair_from_seed(seed: &[u8; 32]) -> Keypair {
    Keypair {
        signing_key: SigningKey::from_bytes(seed),
    }
}

/// Signs `msg` with `secret`, returning a 64-byte signature.
pub fn ed25519_sign(msg: &[u8], secret: &[u8; 32]) -> [u8; 64] {
    let signing_key = SigningKey::from_bytes(secret);
    signing_key.sign(msg).to_bytes()
}

/// Verifies that `sig` is a valid Ed25519 signature over `msg` under `public`.
///
/// Returns `false` on a malformed public key or signature rather than
/// propagating an error. Callers treat any verification failure uniformly
/// as `InvalidSignature` (spec transport contract, step 5).
pub fn ed25519_verify(msg: &[u8], sig: &[u8; 64], public: &[u8; 32]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public) else {
        return false;
    };
    let signature = Signature::from_bytes(sig);
    verifying_key.verify(msg, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let keypair = ed25519_keypair_from_seed(&[7u8; 32]);
        let msg = b"prepare(view=0, op=1)";
        let sig = ed25519_sign(msg, &keypair.secret());
        assert!(ed25519_verify(msg, &sig, &keypair.public()));
    }

    #[test]
    fn tampered_message_fails_verification() {
        let keypair = ed25519_keypair_from_seed(&[7u8; 32]);
        let sig = ed25519_sign(b"hello", &keypair.secret());
        assert!(!ed25519_verify(b"hellp", &sig, &keypair.public()));
    }

    #[test]
    fn wrong_public_key_fails_verification() {
        let a = ed25519_keypair_from_seed(&[1u8; 32]);
        let b = ed25519_keypair_from_seed(&[2u8; 32]);
        let sig = ed25519_sign(b"hello", &a.secret());
        assert!(!ed25519_verify(b"hello", &sig, &b.public()));
    }

    #[test]
    fn same_seed_produces_same_keypair() {
        let a = ed25519_keypair_from_seed(&[9u8; 32]);
        let b = ed25519_keypair_from_seed(&[9u8; 32]);
        assert_eq!(a.public(), b.public());
    }
}
