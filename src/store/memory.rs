use crate::{
    store::{
        AccountStore, SecretStore, ShareStore, StoreError, UserDirectory,
    },
    Account, AttemptOutcome, Id, Membership, NewSecret, NewShare, Secret,
    SecretPatch, Share, User,
};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// An in-memory implementation of every persistence trait, for tests and
/// demos.
///
/// All state sits behind one `RwLock`, which is what makes
/// [`ShareStore::settle_attempt`] a genuinely atomic read-modify-write.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    accounts: HashMap<Id, Account>,
    users: HashMap<Id, User>,
    memberships: Vec<Membership>,
    secrets: HashMap<Id, Secret>,
    /// (secret id, account id) ownership associations.
    associations: HashSet<(Id, Id)>,
    shares: HashMap<Id, Share>,
}

impl MemoryStore {
    pub fn new() -> Self { MemoryStore::default() }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }

    /// Seed an account, returning its id.
    pub fn add_account(
        &self,
        name: &str,
        password: &str,
    ) -> Result<Id, StoreError> {
        let mut inner = self.write()?;
        let id = inner.next_id();
        let now = Utc::now();
        inner.accounts.insert(
            id.clone(),
            Account {
                id: id.clone(),
                name: name.to_string(),
                password: password.to_string(),
                created_at: now,
                updated_at: now,
                deleted_at: None,
            },
        );

        Ok(id)
    }

    /// Seed a user, returning their id.
    pub fn add_user(&self, email: &str) -> Result<Id, StoreError> {
        let mut inner = self.write()?;
        let id = inner.next_id();
        inner.users.insert(
            id.clone(),
            User {
                id: id.clone(),
                email: email.to_string(),
            },
        );

        Ok(id)
    }

    /// Seed a membership linking a user to an account.
    pub fn add_membership(
        &self,
        user_id: &Id,
        account_id: &Id,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.memberships.push(Membership {
            user_id: user_id.clone(),
            account_id: account_id.clone(),
        });

        Ok(())
    }
}

impl Inner {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        Id::from(self.next_id.to_string())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn account(&self, id: &Id) -> Result<Option<Account>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .accounts
            .get(id)
            .filter(|account| account.deleted_at.is_none())
            .cloned())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn membership_for_user(
        &self,
        user_id: &Id,
    ) -> Result<Option<Membership>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .memberships
            .iter()
            .find(|membership| membership.user_id == *user_id)
            .cloned())
    }

    async fn user_for_account(
        &self,
        account_id: &Id,
    ) -> Result<Option<User>, StoreError> {
        let inner = self.read()?;
        let membership = inner
            .memberships
            .iter()
            .find(|membership| membership.account_id == *account_id);

        Ok(membership
            .and_then(|membership| inner.users.get(&membership.user_id))
            .cloned())
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn insert(
        &self,
        secret: NewSecret,
        account_id: &Id,
    ) -> Result<Secret, StoreError> {
        let mut inner = self.write()?;
        let id = inner.next_id();
        let now = Utc::now();
        let record = Secret {
            id: id.clone(),
            name: secret.name,
            description: secret.description,
            value: secret.value,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        inner.secrets.insert(id.clone(), record.clone());
        inner.associations.insert((id, account_id.clone()));

        Ok(record)
    }

    async fn get(
        &self,
        id: &Id,
        account_id: &Id,
    ) -> Result<Option<Secret>, StoreError> {
        let inner = self.read()?;
        if !inner
            .associations
            .contains(&(id.clone(), account_id.clone()))
        {
            return Ok(None);
        }

        Ok(inner
            .secrets
            .get(id)
            .filter(|secret| secret.deleted_at.is_none())
            .cloned())
    }

    async fn list(&self, account_id: &Id) -> Result<Vec<Secret>, StoreError> {
        let inner = self.read()?;
        let mut secrets: Vec<_> = inner
            .associations
            .iter()
            .filter(|(_, owner)| owner == account_id)
            .filter_map(|(secret_id, _)| inner.secrets.get(secret_id))
            .filter(|secret| secret.deleted_at.is_none())
            .cloned()
            .collect();
        secrets.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(secrets)
    }

    async fn update(
        &self,
        id: &Id,
        patch: SecretPatch,
        account_id: &Id,
    ) -> Result<Option<Secret>, StoreError> {
        let mut inner = self.write()?;
        if !inner
            .associations
            .contains(&(id.clone(), account_id.clone()))
        {
            return Ok(None);
        }

        let secret = match inner
            .secrets
            .get_mut(id)
            .filter(|secret| secret.deleted_at.is_none())
        {
            Some(secret) => secret,
            None => return Ok(None),
        };

        if let Some(name) = patch.name {
            secret.name = name;
        }
        if let Some(description) = patch.description {
            secret.description = description;
        }
        if let Some(value) = patch.value {
            secret.value = value;
        }
        secret.updated_at = Utc::now();

        Ok(Some(secret.clone()))
    }

    async fn soft_delete(
        &self,
        id: &Id,
        account_id: &Id,
    ) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        if !inner
            .associations
            .contains(&(id.clone(), account_id.clone()))
        {
            return Ok(false);
        }

        match inner
            .secrets
            .get_mut(id)
            .filter(|secret| secret.deleted_at.is_none())
        {
            Some(secret) => {
                secret.deleted_at = Some(Utc::now());
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn attach(
        &self,
        secret_id: &Id,
        account_id: &Id,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner
            .associations
            .insert((secret_id.clone(), account_id.clone()));

        Ok(())
    }
}

#[async_trait]
impl ShareStore for MemoryStore {
    async fn insert(&self, share: NewShare) -> Result<Share, StoreError> {
        let mut inner = self.write()?;
        let id = inner.next_id();
        let record = Share {
            id: id.clone(),
            secret_id: share.secret_id,
            giver_account_id: share.giver_account_id,
            receiver_account_id: share.receiver_account_id,
            expiration_time: share.expiration_time,
            number_of_tries: share.number_of_tries,
            passcode: None,
            is_accepted: false,
            created_at: Utc::now(),
        };
        inner.shares.insert(id, record.clone());

        Ok(record)
    }

    async fn get(&self, id: &Id) -> Result<Option<Share>, StoreError> {
        let inner = self.read()?;
        Ok(inner.shares.get(id).cloned())
    }

    async fn set_passcode(
        &self,
        id: &Id,
        code: u32,
    ) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        match inner.shares.get_mut(id) {
            Some(share) => {
                share.passcode = Some(code);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn settle_attempt(
        &self,
        id: &Id,
        credentials_ok: bool,
    ) -> Result<Option<AttemptOutcome>, StoreError> {
        let mut inner = self.write()?;
        let share = match inner.shares.get_mut(id) {
            Some(share) => share,
            None => return Ok(None),
        };

        let outcome = if share.is_accepted {
            AttemptOutcome::AlreadyAccepted
        } else if share.number_of_tries == 0 {
            AttemptOutcome::Exhausted
        } else if credentials_ok {
            share.is_accepted = true;
            AttemptOutcome::Accepted
        } else {
            share.number_of_tries -= 1;
            AttemptOutcome::Rejected {
                tries_left: share.number_of_tries,
            }
        };

        Ok(Some(outcome))
    }
}
