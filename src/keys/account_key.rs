use crate::keys::{self, CipherError};
use scrypt::Params;
use std::{
    fmt::{self, Debug, Formatter},
    ops::Deref,
};

/// A symmetric key derived from an account's password.
///
/// Derivation is deterministic: the same password always yields the same
/// key, which is what lets an acceptance attempt be checked against the
/// giver's independently recomputed key. The hex encoding doubles as the
/// out-of-band credential handed to a receiver.
#[derive(Copy, Clone)]
pub struct AccountKey([u8; AccountKey::LEN]);

impl AccountKey {
    pub const LEN: usize = keys::DERIVED_KEY_LEN;

    /// Stretch a password into a key with scrypt and the fixed salt.
    pub fn derive(password: &str) -> Result<Self, CipherError> {
        let params = Params::new(
            keys::SCRYPT_LOG_N,
            keys::SCRYPT_R,
            keys::SCRYPT_P,
            AccountKey::LEN,
        )?;
        let mut key = [0; AccountKey::LEN];
        scrypt::scrypt(
            password.as_bytes(),
            keys::FIXED_SALT,
            &params,
            &mut key,
        )?;

        Ok(AccountKey(key))
    }

    pub const fn from_raw(key: [u8; AccountKey::LEN]) -> Self {
        AccountKey(key)
    }

    /// The lowercase hex encoding used as an acceptance credential.
    pub fn as_hex(&self) -> String { hex::encode(self.0) }

    /// Compare a caller-supplied hex credential against this key without
    /// short-circuiting on the first mismatched byte. Malformed hex fails
    /// the comparison rather than erroring.
    pub fn matches_hex(&self, candidate: &str) -> bool {
        let mut decoded = [0; AccountKey::LEN];
        if hex::decode_to_slice(candidate, &mut decoded).is_err() {
            return false;
        }

        let mut difference = 0;
        for (ours, theirs) in self.0.iter().zip(decoded.iter()) {
            difference |= ours ^ theirs;
        }

        difference == 0
    }

    pub(crate) fn to_bytes(self) -> [u8; AccountKey::LEN] { self.0 }
}

impl Deref for AccountKey {
    type Target = [u8];

    fn deref(&self) -> &[u8] { &self.0 }
}

impl AsRef<[u8]> for AccountKey {
    fn as_ref(&self) -> &[u8] { self.deref() }
}

impl<T> PartialEq<T> for AccountKey
where
    T: PartialEq<[u8]>,
{
    fn eq(&self, other: &T) -> bool { other == self.as_ref() }
}

impl Debug for AccountKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccountKey").field(&"<redacted>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let password = "My Super Secret Password!";

        let first = AccountKey::derive(password).unwrap();
        let second = AccountKey::derive(password).unwrap();

        assert_eq!(first.as_hex(), second.as_hex());
    }

    #[test]
    fn different_passwords_derive_different_keys() {
        let first = AccountKey::derive("correct horse").unwrap();
        let second = AccountKey::derive("battery staple").unwrap();

        assert_ne!(first.as_hex(), second.as_hex());
    }

    #[test]
    fn hex_credential_is_lowercase_and_64_chars() {
        let key = AccountKey::derive("hunter2").unwrap();
        let hex = key.as_hex();

        assert_eq!(hex.len(), AccountKey::LEN * 2);
        assert_eq!(hex, hex.to_lowercase());
    }

    #[test]
    fn matching_accepts_the_credential_in_either_case() {
        let key = AccountKey::derive("hunter2").unwrap();
        let hex = key.as_hex();

        assert!(key.matches_hex(&hex));
        assert!(key.matches_hex(&hex.to_uppercase()));
    }

    #[test]
    fn malformed_or_wrong_credentials_fail_the_match() {
        let key = AccountKey::derive("hunter2").unwrap();

        assert!(!key.matches_hex("not hex at all"));
        assert!(!key.matches_hex("abcd"));
        assert!(!key.matches_hex(&"00".repeat(AccountKey::LEN)));
    }

    #[test]
    fn debug_never_prints_key_material() {
        let key = AccountKey::from_raw([42; AccountKey::LEN]);

        assert_eq!(format!("{:?}", key), "AccountKey(\"<redacted>\")");
    }
}
