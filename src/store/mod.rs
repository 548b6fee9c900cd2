//! Persistence seams.
//!
//! The services only ever talk to these traits, so swapping the in-memory
//! store for a database is a matter of implementing them against the real
//! schema.

mod memory;

pub use memory::MemoryStore;

use crate::{
    Account, AttemptOutcome, Id, Membership, NewSecret, NewShare, Secret,
    SecretPatch, Share, User,
};
use async_trait::async_trait;

/// An error raised by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("The store's lock was poisoned")]
    Poisoned,
    #[error("The storage backend failed: {0}")]
    Backend(String),
}

/// Read access to accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up an account by id. Soft-deleted accounts are not returned.
    async fn account(&self, id: &Id) -> Result<Option<Account>, StoreError>;
}

/// Resolves receiver emails to accounts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn membership_for_user(
        &self,
        user_id: &Id,
    ) -> Result<Option<Membership>, StoreError>;

    /// The reverse direction, used when a share only records the receiver's
    /// account and the verification code needs an address to go to.
    async fn user_for_account(
        &self,
        account_id: &Id,
    ) -> Result<Option<User>, StoreError>;
}

/// Persistence for secrets and the account↔secret association.
///
/// Values are stored exactly as given; encryption happens in
/// [`crate::secrets::SecretService`] before anything reaches this trait.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Persist a new secret owned by `account_id`.
    async fn insert(
        &self,
        secret: NewSecret,
        account_id: &Id,
    ) -> Result<Secret, StoreError>;

    /// Fetch a secret, but only if it is associated with `account_id` and
    /// not soft-deleted.
    async fn get(
        &self,
        id: &Id,
        account_id: &Id,
    ) -> Result<Option<Secret>, StoreError>;

    async fn list(&self, account_id: &Id) -> Result<Vec<Secret>, StoreError>;

    /// Apply a patch to an association-scoped secret, returning the updated
    /// record.
    async fn update(
        &self,
        id: &Id,
        patch: SecretPatch,
        account_id: &Id,
    ) -> Result<Option<Secret>, StoreError>;

    /// Soft-delete. Returns whether anything matched.
    async fn soft_delete(
        &self,
        id: &Id,
        account_id: &Id,
    ) -> Result<bool, StoreError>;

    /// Associate an existing secret with a further account.
    async fn attach(
        &self,
        secret_id: &Id,
        account_id: &Id,
    ) -> Result<(), StoreError>;
}

/// Persistence for shares.
#[async_trait]
pub trait ShareStore: Send + Sync {
    async fn insert(&self, share: NewShare) -> Result<Share, StoreError>;

    async fn get(&self, id: &Id) -> Result<Option<Share>, StoreError>;

    /// Store the one-time passcode on a share. Returns whether the share
    /// exists.
    async fn set_passcode(
        &self,
        id: &Id,
        code: u32,
    ) -> Result<bool, StoreError>;

    /// Settle one acceptance attempt as a single read-modify-write.
    ///
    /// The acceptance state and remaining tries are re-checked under the
    /// store's lock, so two racing attempts can never both succeed or
    /// double-decrement: the contract is decrement-and-check, not
    /// check-then-decrement. Returns `None` when the share doesn't exist.
    async fn settle_attempt(
        &self,
        id: &Id,
        credentials_ok: bool,
    ) -> Result<Option<AttemptOutcome>, StoreError>;
}
