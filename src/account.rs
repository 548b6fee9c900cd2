use crate::Id;
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

/// An organizational account that owns secrets.
///
/// The password is only ever consumed as key derivation input; login and
/// session handling live elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Account {
    pub id: Id,
    pub name: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Someone who can be addressed by email when a secret is shared with their
/// account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct User {
    pub id: Id,
    pub email: String,
}

/// Links a [`User`] to the [`Account`] they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Membership {
    pub user_id: Id,
    pub account_id: Id,
}
