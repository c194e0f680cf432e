//! Pure cryptographic primitives used throughout the wire and storage layers.
//!
//! Every function here operates on borrowed byte slices and allocates no heap
//! memory on the steady-state path. None of these functions read the clock or
//! touch global state; the PRNG is the one exception, and it is explicitly
//! seeded and reproducible rather than relying on OS entropy.

mod crc32c;
mod ed25519;
mod prng;
mod sha256;

pub use crc32c::crc32c;
pub use ed25519::{ed25519_keypair_from_seed, ed25519_sign, ed25519_verify, Keypair};
pub use prng::Xorshift64Star;
pub use sha256::sha256;
