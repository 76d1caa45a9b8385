//! Approve/reject token lifecycle.
//!
//! # Responsibilities
//! - Issue single-use tokens bound to a subject and an action
//! - Redeem tokens exactly once, refusing expired ones
//! - Retry transient store failures once before giving up
//!
//! # Design Decisions
//! - The token value only ever leaves this module in an [`IssuedToken`];
//!   the store sees its digest
//! - Expiry is checked at redemption time against the injected clock, so a
//!   lagging purge never extends a token's life
//! - Atomicity of redemption is the store's contract; this layer adds no
//!   check-then-act step of its own

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::clock::SharedClock;
use crate::observability::metrics;
use crate::resilience::backoff::BackoffPolicy;
use crate::resilience::retries::with_retry;
use crate::security::vault::{self, VaultError};
use crate::store::{Action, ActionTokenRecord, ActionTokenStore, RedeemError, StoreError};

/// Extra attempts for a transient store failure.
const STORE_RETRIES: u32 = 1;

/// Issuance failures.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A token handed to the caller for delivery (e.g. in a notification link).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub value: String,
    pub subject_id: String,
    pub action: Action,
    pub expires_at: DateTime<Utc>,
}

/// The approve and reject tokens for one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedPair {
    pub approve: IssuedToken,
    pub reject: IssuedToken,
}

/// A successful redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub subject_id: String,
    pub action: Action,
}

/// Issues and redeems action tokens.
#[derive(Debug, Clone)]
pub struct ActionTokenManager {
    store: Arc<dyn ActionTokenStore>,
    ttl: Duration,
    clock: SharedClock,
    backoff: BackoffPolicy,
}

impl ActionTokenManager {
    pub fn new(store: Arc<dyn ActionTokenStore>, ttl: Duration, clock: SharedClock) -> Self {
        Self {
            store,
            ttl,
            clock,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Override the delay used between store retries.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Issue one token for `subject_id`.
    pub async fn issue(&self, subject_id: &str, action: Action) -> Result<IssuedToken, IssueError> {
        let value = vault::generate_default()?;
        let issued_at = self.clock.now();
        let record = ActionTokenRecord {
            digest: vault::digest(&value),
            subject_id: subject_id.to_string(),
            action,
            issued_at,
            expires_at: issued_at + self.ttl,
            consumed: false,
        };
        let expires_at = record.expires_at;

        let store = &self.store;
        let record = &record;
        with_retry(STORE_RETRIES, self.backoff, StoreError::is_transient, move || {
            store.create_action_token(record.clone())
        })
        .await?;

        tracing::info!(subject = %subject_id, action = action.as_str(), "Issued action token");
        Ok(IssuedToken {
            value,
            subject_id: subject_id.to_string(),
            action,
            expires_at,
        })
    }

    /// Issue the approve and reject tokens for a new subject.
    pub async fn issue_pair(&self, subject_id: &str) -> Result<IssuedPair, IssueError> {
        Ok(IssuedPair {
            approve: self.issue(subject_id, Action::Approve).await?,
            reject: self.issue(subject_id, Action::Reject).await?,
        })
    }

    /// Redeem a token value for `action`. A token issued for the other
    /// action is refused and stays redeemable for its own.
    pub async fn redeem(&self, token: &str, action: Action) -> Result<Redemption, RedeemError> {
        let result = self.redeem_inner(token, action).await;
        match &result {
            Ok(redemption) => {
                tracing::info!(
                    subject = %redemption.subject_id,
                    action = redemption.action.as_str(),
                    "Action token redeemed"
                );
                metrics::record_redemption("redeemed");
            }
            Err(e) => {
                tracing::warn!(outcome = e.outcome(), "Action token redemption refused");
                metrics::record_redemption(e.outcome());
            }
        }
        result
    }

    async fn redeem_inner(&self, token: &str, action: Action) -> Result<Redemption, RedeemError> {
        if !vault::is_well_formed(token) {
            return Err(RedeemError::NotFound);
        }

        let digest = vault::digest(token);
        let now = self.clock.now();
        let store = &self.store;
        let digest = digest.as_str();
        let record = with_retry(
            STORE_RETRIES,
            self.backoff,
            |e: &RedeemError| matches!(e, RedeemError::Store(s) if s.is_transient()),
            move || store.redeem_action_token(digest, action, now),
        )
        .await?;

        Ok(Redemption {
            subject_id: record.subject_id,
            action: record.action,
        })
    }

    /// Purge expired tokens from the store.
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.store.purge_expired(self.clock.now()).await
    }
}
