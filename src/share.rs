use crate::Id;
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

/// A time-boxed, attempt-limited authorization to transfer one secret from
/// a giver account to a receiver account.
///
/// `number_of_tries` only ever decreases, and `is_accepted` flips
/// false→true at most once; both transitions happen inside
/// [`crate::store::ShareStore::settle_attempt`] so concurrent acceptance
/// attempts can't race each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Share {
    pub id: Id,
    pub secret_id: Id,
    pub giver_account_id: Id,
    pub receiver_account_id: Id,
    pub expiration_time: DateTime<Utc>,
    pub number_of_tries: u32,
    pub passcode: Option<u32>,
    pub is_accepted: bool,
    pub created_at: DateTime<Utc>,
}

impl Share {
    /// Expiry is evaluated against wall-clock time on every acceptance
    /// attempt, not just at creation.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration_time
    }
}

/// Everything needed to persist a fresh share. The store fills in the id,
/// creation time, a `None` passcode and `is_accepted = false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewShare {
    pub secret_id: Id,
    pub giver_account_id: Id,
    pub receiver_account_id: Id,
    pub expiration_time: DateTime<Utc>,
    pub number_of_tries: u32,
}

/// What a single settled acceptance attempt did to a share.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The credentials were good; the share is now accepted.
    Accepted,
    /// The credentials were bad; one try was consumed.
    Rejected { tries_left: u32 },
    /// No tries remained. Nothing was mutated.
    Exhausted,
    /// The share was accepted by an earlier attempt. Nothing was mutated.
    AlreadyAccepted,
}
