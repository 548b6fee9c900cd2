//! Account-keyed secret storage with a time-boxed secret-sharing handoff.
//!
//! Secrets are encrypted at rest under a key derived from the owning
//! account's password. Transferring a secret to another account goes
//! through a [`sharing::ShareService`] share: time-boxed, attempt-limited,
//! and unlocked by presenting the giver's hex key credential together with
//! a one-time passcode emailed through a separate channel.

#![forbid(unsafe_code)]

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

mod account;
mod id;
mod secret;
mod share;

pub mod email;
pub mod keys;
pub mod secrets;
pub mod sharing;
pub mod store;
pub mod verification;

pub use account::{Account, Membership, User};
pub use id::Id;
pub use keys::{AccountKey, CipherError};
pub use secret::{NewSecret, Secret, SecretPatch};
pub use share::{AttemptOutcome, NewShare, Share};
