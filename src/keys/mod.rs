//! Key derivation and the secret-value cipher.
//!
//! Both halves deliberately reproduce the reference deployment's weak
//! construction: a fixed salt for every derivation and a fixed all-zero IV
//! for every encryption. Identical passwords derive identical keys, and
//! identical plaintext under the same password encrypts to identical
//! ciphertext. A hardened version would store a random salt per account and
//! a random IV per secret.

mod account_key;
mod cipher;

pub use account_key::AccountKey;
pub use cipher::{decrypt, encrypt, CipherError};

/// Salt fed to every key derivation. Fixed so that the giver and the
/// receiver can independently recompute the same key from the same password
/// instead of the key ever being stored.
pub(crate) const FIXED_SALT: &[u8] = b"salt";

/// scrypt cost parameters, matching Node's `scryptSync` defaults
/// (N = 2^14, r = 8, p = 1).
pub(crate) const SCRYPT_LOG_N: u8 = 14;
pub(crate) const SCRYPT_R: u32 = 8;
pub(crate) const SCRYPT_P: u32 = 1;

pub(crate) const DERIVED_KEY_LEN: usize = 32;
