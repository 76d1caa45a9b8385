//! Action token persistence.
//!
//! # Responsibilities
//! - Define the collaborator contract the lifecycle manager depends on
//! - Provide the in-memory implementation used by the service
//!
//! # Design Decisions
//! - Records are keyed by token digest; the token itself is never stored
//! - `redeem_action_token` is the single atomic check-and-consume point
//! - Expiry is decided by the caller-supplied `now`, independent of purging

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;

pub use memory::MemoryActionTokenStore;

/// What redeeming a token does to its subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Approve,
    Reject,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

/// A persisted action token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTokenRecord {
    /// Digest of the token value.
    pub digest: String,
    /// The request awaiting a decision.
    pub subject_id: String,
    pub action: Action,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

/// Storage failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backend could not be reached; the operation may succeed later.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("token digest already present")]
    Duplicate,

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl StoreError {
    /// Whether a retry could help.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Redemption failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedeemError {
    #[error("action token not found")]
    NotFound,
    #[error("action token expired")]
    Expired,
    #[error("action token already used")]
    AlreadyUsed,
    #[error("action token presented for the other action")]
    WrongAction,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RedeemError {
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::AlreadyUsed => "already_used",
            Self::WrongAction => "wrong_action",
            Self::Store(_) => "store_error",
        }
    }
}

/// Persistence collaborator for action tokens.
#[async_trait]
pub trait ActionTokenStore: Send + Sync + std::fmt::Debug {
    /// Persist a new, unconsumed record.
    async fn create_action_token(&self, record: ActionTokenRecord) -> Result<(), StoreError>;

    /// Atomically check and consume the record for `digest`.
    ///
    /// Concurrent calls for the same digest yield exactly one `Ok`; every
    /// other caller sees `AlreadyUsed`. A record whose action is not
    /// `expected` is refused with `WrongAction` and left unconsumed.
    async fn redeem_action_token(
        &self,
        digest: &str,
        expected: Action,
        now: DateTime<Utc>,
    ) -> Result<ActionTokenRecord, RedeemError>;

    /// Remove records that expired at or before `now`. Returns how many.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}
