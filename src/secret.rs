use crate::Id;
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

/// A stored secret.
///
/// `value` holds ciphertext hex at rest; plaintext only exists in transit
/// through [`crate::secrets::SecretService`]. A secret can be associated
/// with more than one account, e.g. after it has been shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Secret {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Payload for creating a secret. `value` is plaintext here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSecret {
    pub name: String,
    pub description: String,
    pub value: String,
}

/// A partial update; fields left as `None` are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub value: Option<String>,
}
