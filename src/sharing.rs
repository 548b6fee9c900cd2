//! The secret-sharing lifecycle.
//!
//! A share authorizes the transfer of one secret between accounts through a
//! two-factor-like handoff: the giver passes the receiver their hex key
//! credential out of band, while a one-time passcode is emailed to the
//! receiver through a second channel. Acceptance presents both.

use crate::{
    email::{EmailError, EmailSender},
    keys::{AccountKey, CipherError},
    store::{
        AccountStore, SecretStore, ShareStore, StoreError, UserDirectory,
    },
    verification, AttemptOutcome, Id, NewShare, Share,
};
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::sync::Arc;

/// Request payload for creating a share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateShareRequest {
    pub secret_id: Id,
    pub receiver_email: String,
    pub expiration_time: DateTime<Utc>,
    pub number_of_tries: u32,
}

/// The credentials presented when accepting a share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptShareRequest {
    pub hex_key: String,
    pub code: u32,
}

/// Things that can go wrong across the share lifecycle.
///
/// A wrong key and a wrong code are deliberately collapsed into one
/// [`ShareError::InvalidCredentials`] so a caller can't probe the factors
/// separately.
#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("Account not found")]
    AccountNotFound,
    #[error("Receiver user not found")]
    ReceiverNotFound,
    #[error("Receiver user is not a member of any account")]
    ReceiverNotMember,
    #[error("Secret not found or does not belong to this account")]
    SecretNotFound,
    #[error("Shared secret not found")]
    ShareNotFound,
    #[error("Expiration time cannot be in the past")]
    ExpirationInPast,
    #[error("The secret sharing has expired")]
    Expired,
    #[error("All acceptance attempts have been used up")]
    Exhausted,
    #[error("The share has already been accepted")]
    AlreadyAccepted,
    #[error("Key or code are invalid")]
    InvalidCredentials,
    #[error("Unable to send the email")]
    Email(
        #[source]
        #[from]
        EmailError,
    ),
    #[error("Unable to derive the account key")]
    Cipher(
        #[source]
        #[from]
        CipherError,
    ),
    #[error("The store failed")]
    Store(
        #[source]
        #[from]
        StoreError,
    ),
}

/// The share state machine: create, dispatch the passcode, accept.
#[derive(Clone)]
pub struct ShareService {
    accounts: Arc<dyn AccountStore>,
    directory: Arc<dyn UserDirectory>,
    secrets: Arc<dyn SecretStore>,
    shares: Arc<dyn ShareStore>,
    mailer: Arc<dyn EmailSender>,
}

impl ShareService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        directory: Arc<dyn UserDirectory>,
        secrets: Arc<dyn SecretStore>,
        shares: Arc<dyn ShareStore>,
        mailer: Arc<dyn EmailSender>,
    ) -> Self {
        ShareService {
            accounts,
            directory,
            secrets,
            shares,
            mailer,
        }
    }

    /// Derive the hex credential for an account. Nothing is stored; the
    /// same password always reproduces the same credential.
    pub async fn generate_key(
        &self,
        account_id: &Id,
    ) -> Result<String, ShareError> {
        let account = self.account(account_id).await?;
        Ok(AccountKey::derive(&account.password)?.as_hex())
    }

    /// Open a share from `giver_account_id` to the account behind
    /// `receiver_email`, then send the notification and the passcode.
    pub async fn create(
        &self,
        giver_account_id: &Id,
        request: CreateShareRequest,
    ) -> Result<Share, ShareError> {
        self.account(giver_account_id).await?;

        let receiver_user = self
            .directory
            .user_by_email(&request.receiver_email)
            .await?
            .ok_or(ShareError::ReceiverNotFound)?;
        let membership = self
            .directory
            .membership_for_user(&receiver_user.id)
            .await?
            .ok_or(ShareError::ReceiverNotMember)?;
        let receiver = self.account(&membership.account_id).await?;

        let secret = self
            .secrets
            .get(&request.secret_id, giver_account_id)
            .await?
            .ok_or(ShareError::SecretNotFound)?;

        if request.expiration_time < Utc::now() {
            return Err(ShareError::ExpirationInPast);
        }

        let share = self
            .shares
            .insert(NewShare {
                secret_id: request.secret_id,
                giver_account_id: giver_account_id.clone(),
                receiver_account_id: receiver.id.clone(),
                expiration_time: request.expiration_time,
                number_of_tries: request.number_of_tries,
            })
            .await?;

        log::info!(
            "Account {} shared secret {} with account {} as share {}",
            giver_account_id,
            share.secret_id,
            receiver.id,
            share.id
        );

        self.mailer
            .send_share_notification(
                &receiver_user.email,
                &secret.name,
                &share.id,
            )
            .await?;
        self.send_verification_code(&share.id).await?;

        Ok(share)
    }

    /// Generate a passcode, persist it on the share and email it to the
    /// receiver — the second channel of the handoff.
    pub async fn send_verification_code(
        &self,
        share_id: &Id,
    ) -> Result<(), ShareError> {
        let share = self.share(share_id).await?;
        let receiver = self
            .directory
            .user_for_account(&share.receiver_account_id)
            .await?
            .ok_or(ShareError::ReceiverNotFound)?;

        let code = verification::generate_code();
        if !self.shares.set_passcode(share_id, code).await? {
            return Err(ShareError::ShareNotFound);
        }

        self.mailer
            .send_verification_code(&receiver.email, code)
            .await?;

        log::debug!("Verification code dispatched for share {}", share_id);
        Ok(())
    }

    /// Try to accept a share with the giver's hex credential and the
    /// emailed passcode.
    ///
    /// Checks run in a fixed order so callers get the most specific
    /// rejection: expiry, then prior acceptance, then try exhaustion, then
    /// the credentials. Only a credential failure consumes a try; expired,
    /// exhausted and already-accepted rejections never mutate the share.
    pub async fn accept(
        &self,
        share_id: &Id,
        request: AcceptShareRequest,
    ) -> Result<Share, ShareError> {
        let share = self.share(share_id).await?;

        if share.is_expired(Utc::now()) {
            return Err(ShareError::Expired);
        }
        if share.is_accepted {
            return Err(ShareError::AlreadyAccepted);
        }
        if share.number_of_tries == 0 {
            return Err(ShareError::Exhausted);
        }

        let giver = self.account(&share.giver_account_id).await?;
        let giver_key = AccountKey::derive(&giver.password)?;
        let key_ok = giver_key.matches_hex(&request.hex_key);
        let code_ok = share.passcode == Some(request.code);

        // The decrement (or the flip to accepted) happens atomically in the
        // store, which re-checks the share's state under its own lock.
        let outcome = self
            .shares
            .settle_attempt(share_id, key_ok && code_ok)
            .await?
            .ok_or(ShareError::ShareNotFound)?;

        match outcome {
            AttemptOutcome::Accepted => {
                self.secrets
                    .attach(&share.secret_id, &share.receiver_account_id)
                    .await?;
                log::info!(
                    "Share {} accepted; secret {} is now associated with account {}",
                    share_id,
                    share.secret_id,
                    share.receiver_account_id
                );

                self.share(share_id).await
            },
            AttemptOutcome::Rejected { tries_left } => {
                log::warn!(
                    "Rejected an acceptance attempt for share {} ({} tries left)",
                    share_id,
                    tries_left
                );
                Err(ShareError::InvalidCredentials)
            },
            AttemptOutcome::Exhausted => Err(ShareError::Exhausted),
            AttemptOutcome::AlreadyAccepted => Err(ShareError::AlreadyAccepted),
        }
    }

    async fn account(
        &self,
        account_id: &Id,
    ) -> Result<crate::Account, ShareError> {
        self.accounts
            .account(account_id)
            .await?
            .ok_or(ShareError::AccountNotFound)
    }

    async fn share(&self, share_id: &Id) -> Result<Share, ShareError> {
        self.shares
            .get(share_id)
            .await?
            .ok_or(ShareError::ShareNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        email::{RecordingMailer, SentEmail},
        secrets::SecretService,
        store::MemoryStore,
        NewSecret,
    };
    use chrono::Duration;

    struct World {
        store: Arc<MemoryStore>,
        mailer: Arc<RecordingMailer>,
        sharing: ShareService,
        secrets: SecretService,
        giver: Id,
        receiver: Id,
        secret_id: Id,
    }

    const GIVER_PASSWORD: &str = "giver password";
    const RECEIVER_EMAIL: &str = "receiver@example.com";

    async fn world() -> World {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());

        let giver = store.add_account("giver", GIVER_PASSWORD).unwrap();
        let receiver = store.add_account("receiver", "receiver pw").unwrap();
        let user = store.add_user(RECEIVER_EMAIL).unwrap();
        store.add_membership(&user, &receiver).unwrap();

        let secrets = SecretService::new(store.clone(), store.clone());
        let secret = secrets
            .create(
                &giver,
                NewSecret {
                    name: "prod db".to_string(),
                    description: String::new(),
                    value: "postgres://prod".to_string(),
                },
            )
            .await
            .unwrap();

        let sharing = ShareService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            mailer.clone(),
        );

        World {
            store,
            mailer,
            sharing,
            secrets,
            giver,
            receiver,
            secret_id: secret.id,
        }
    }

    fn request(world: &World, expires_in: Duration, tries: u32) -> CreateShareRequest {
        CreateShareRequest {
            secret_id: world.secret_id.clone(),
            receiver_email: RECEIVER_EMAIL.to_string(),
            expiration_time: Utc::now() + expires_in,
            number_of_tries: tries,
        }
    }

    async fn good_credentials(world: &World) -> AcceptShareRequest {
        AcceptShareRequest {
            hex_key: world.sharing.generate_key(&world.giver).await.unwrap(),
            code: world.mailer.last_verification_code().unwrap(),
        }
    }

    #[tokio::test]
    async fn creating_a_share_sends_both_emails() {
        let world = world().await;

        let share = world
            .sharing
            .create(&world.giver, request(&world, Duration::hours(1), 3))
            .await
            .unwrap();

        assert_eq!(share.passcode, None);
        assert!(!share.is_accepted);

        let sent = world.mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0],
            SentEmail::ShareNotification {
                recipient: RECEIVER_EMAIL.to_string(),
                secret_name: "prod db".to_string(),
                share_id: share.id.clone(),
            }
        );
        assert!(matches!(sent[1], SentEmail::VerificationCode { .. }));
    }

    #[tokio::test]
    async fn the_happy_path_attaches_the_secret_to_the_receiver() {
        let world = world().await;
        let share = world
            .sharing
            .create(&world.giver, request(&world, Duration::hours(1), 3))
            .await
            .unwrap();

        let accepted = world
            .sharing
            .accept(&share.id, good_credentials(&world).await)
            .await
            .unwrap();

        assert!(accepted.is_accepted);
        // tries are only consumed by failures
        assert_eq!(accepted.number_of_tries, 3);

        // the receiver now owns an association to the shared secret
        let listed = world
            .store
            .list(&world.receiver)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, world.secret_id);
    }

    #[tokio::test]
    async fn a_wrong_code_consumes_a_try_then_the_right_one_succeeds() {
        let world = world().await;
        let share = world
            .sharing
            .create(&world.giver, request(&world, Duration::hours(1), 2))
            .await
            .unwrap();

        let mut wrong = good_credentials(&world).await;
        wrong.code = wrong.code.wrapping_add(1);

        let got = world.sharing.accept(&share.id, wrong).await;
        assert!(matches!(got, Err(ShareError::InvalidCredentials)));

        let after_failure =
            ShareStore::get(world.store.as_ref(), &share.id)
                .await
                .unwrap()
                .unwrap();
        assert_eq!(after_failure.number_of_tries, 1);
        assert!(!after_failure.is_accepted);

        let accepted = world
            .sharing
            .accept(&share.id, good_credentials(&world).await)
            .await
            .unwrap();
        assert!(accepted.is_accepted);
    }

    #[tokio::test]
    async fn a_wrong_key_is_indistinguishable_from_a_wrong_code() {
        let world = world().await;
        let share = world
            .sharing
            .create(&world.giver, request(&world, Duration::hours(1), 5))
            .await
            .unwrap();

        let mut bad_key = good_credentials(&world).await;
        bad_key.hex_key = "00".repeat(32);
        let mut bad_code = good_credentials(&world).await;
        bad_code.code = bad_code.code.wrapping_sub(1);

        let first = world.sharing.accept(&share.id, bad_key).await;
        let second = world.sharing.accept(&share.id, bad_code).await;

        assert_eq!(
            first.unwrap_err().to_string(),
            second.unwrap_err().to_string()
        );
    }

    #[tokio::test]
    async fn expired_shares_reject_without_consuming_tries() {
        let world = world().await;

        // the service refuses to create an already-expired share, so plant
        // one directly in the store
        let share = ShareStore::insert(
            world.store.as_ref(),
            NewShare {
                secret_id: world.secret_id.clone(),
                giver_account_id: world.giver.clone(),
                receiver_account_id: world.receiver.clone(),
                expiration_time: Utc::now() - Duration::hours(1),
                number_of_tries: 3,
            },
        )
        .await
        .unwrap();

        let got = world
            .sharing
            .accept(&share.id, good_credentials_for_planted(&world).await)
            .await;
        assert!(matches!(got, Err(ShareError::Expired)));

        let untouched = ShareStore::get(world.store.as_ref(), &share.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched.number_of_tries, 3);
        assert!(!untouched.is_accepted);
    }

    // A planted share never had a passcode dispatched, so use a dummy code;
    // expiry must reject before credentials are even looked at.
    async fn good_credentials_for_planted(world: &World) -> AcceptShareRequest {
        AcceptShareRequest {
            hex_key: world.sharing.generate_key(&world.giver).await.unwrap(),
            code: 123_456,
        }
    }

    #[tokio::test]
    async fn exhausted_shares_reject_without_mutating_state() {
        let world = world().await;
        let share = world
            .sharing
            .create(&world.giver, request(&world, Duration::hours(1), 1))
            .await
            .unwrap();

        let mut wrong = good_credentials(&world).await;
        wrong.code = wrong.code.wrapping_add(1);
        let _ = world.sharing.accept(&share.id, wrong).await;

        // even perfect credentials bounce off an exhausted share
        let got = world
            .sharing
            .accept(&share.id, good_credentials(&world).await)
            .await;
        assert!(matches!(got, Err(ShareError::Exhausted)));

        let after = ShareStore::get(world.store.as_ref(), &share.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.number_of_tries, 0);
        assert!(!after.is_accepted);
    }

    #[tokio::test]
    async fn accepted_shares_cannot_be_accepted_again() {
        let world = world().await;
        let share = world
            .sharing
            .create(&world.giver, request(&world, Duration::hours(1), 3))
            .await
            .unwrap();

        world
            .sharing
            .accept(&share.id, good_credentials(&world).await)
            .await
            .unwrap();
        let again = world
            .sharing
            .accept(&share.id, good_credentials(&world).await)
            .await;

        assert!(matches!(again, Err(ShareError::AlreadyAccepted)));

        let after = ShareStore::get(world.store.as_ref(), &share.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.number_of_tries, 3);
    }

    #[tokio::test]
    async fn sharing_a_foreign_secret_is_refused() {
        let world = world().await;
        let outsider = world.store.add_account("outsider", "pw").unwrap();

        let got = world
            .sharing
            .create(&outsider, request(&world, Duration::hours(1), 3))
            .await;

        assert!(matches!(got, Err(ShareError::SecretNotFound)));
    }

    #[tokio::test]
    async fn an_expiration_in_the_past_is_refused_at_creation() {
        let world = world().await;

        let got = world
            .sharing
            .create(&world.giver, request(&world, -Duration::hours(1), 3))
            .await;

        assert!(matches!(got, Err(ShareError::ExpirationInPast)));
    }

    #[tokio::test]
    async fn an_unknown_receiver_email_is_refused() {
        let world = world().await;

        let mut req = request(&world, Duration::hours(1), 3);
        req.receiver_email = "nobody@example.com".to_string();
        let got = world.sharing.create(&world.giver, req).await;

        assert!(matches!(got, Err(ShareError::ReceiverNotFound)));
    }

    #[tokio::test]
    async fn generate_key_matches_the_account_password() {
        let world = world().await;

        let hex = world.sharing.generate_key(&world.giver).await.unwrap();
        let key = AccountKey::derive(GIVER_PASSWORD).unwrap();

        assert_eq!(hex, key.as_hex());
        assert!(key.matches_hex(&hex));
    }

    #[tokio::test]
    async fn racing_accepts_settle_to_exactly_one_first_attempt() {
        let world = world().await;
        let share = world
            .sharing
            .create(&world.giver, request(&world, Duration::hours(1), 1))
            .await
            .unwrap();

        let good = good_credentials(&world).await;
        let mut bad = good.clone();
        bad.code = bad.code.wrapping_add(1);

        let sharing = world.sharing.clone();
        let id = share.id.clone();
        let winner =
            tokio::spawn(async move { sharing.accept(&id, good).await });
        let sharing = world.sharing.clone();
        let id = share.id.clone();
        let loser =
            tokio::spawn(async move { sharing.accept(&id, bad).await });

        let outcomes = vec![
            winner.await.unwrap().is_ok(),
            loser.await.unwrap().is_ok(),
        ];
        let successes = outcomes.iter().filter(|ok| **ok).count();
        assert!(successes <= 1);

        // whichever attempt was first, the final state is consistent
        let after = ShareStore::get(world.store.as_ref(), &share.id)
            .await
            .unwrap()
            .unwrap();
        if after.is_accepted {
            assert_eq!(successes, 1);
            assert_eq!(after.number_of_tries, 1);
        } else {
            assert_eq!(successes, 0);
            assert_eq!(after.number_of_tries, 0);
        }
    }

    #[tokio::test]
    async fn the_receivers_copy_still_needs_the_givers_key() {
        let world = world().await;
        let share = world
            .sharing
            .create(&world.giver, request(&world, Duration::hours(1), 3))
            .await
            .unwrap();
        world
            .sharing
            .accept(&share.id, good_credentials(&world).await)
            .await
            .unwrap();

        // the association exists, but the ciphertext is still under the
        // giver's key, so a receiver-keyed read can never recover the
        // plaintext
        match world.secrets.get(&world.secret_id, &world.receiver).await {
            Err(_) => {},
            Ok(secret) => assert_ne!(secret.value, "postgres://prod"),
        }
    }
}
