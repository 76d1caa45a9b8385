//! CSRF tokens for state-changing requests.
//!
//! A token is bound to the context that will submit it (the normalized action
//! path) and moves `Issued → Consumed` on its first successful validation or
//! is treated as `Expired` once its TTL has passed. Both are terminal.
//! Records are keyed by the token digest.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use thiserror::Error;

use crate::clock::SharedClock;
use crate::observability::metrics;
use crate::security::vault::{self, VaultError};

/// Why a CSRF token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CsrfRejection {
    #[error("csrf token missing")]
    Missing,
    #[error("csrf token malformed or unknown")]
    Malformed,
    #[error("csrf token expired")]
    Expired,
    #[error("csrf token already used")]
    AlreadyUsed,
    #[error("csrf token bound to another context")]
    ContextMismatch,
}

impl CsrfRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Malformed => "malformed",
            Self::Expired => "expired",
            Self::AlreadyUsed => "already_used",
            Self::ContextMismatch => "context_mismatch",
        }
    }
}

/// A freshly issued token. `value` is handed to the client once.
#[derive(Debug, Clone)]
pub struct CsrfToken {
    pub value: String,
    pub context: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CsrfRecord {
    context: String,
    expires_at: DateTime<Utc>,
    consumed: bool,
}

/// Issues and validates CSRF tokens.
#[derive(Debug)]
pub struct CsrfGuard {
    records: DashMap<String, CsrfRecord>,
    ttl: Duration,
    clock: SharedClock,
}

impl CsrfGuard {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// Issue a token bound to `context`.
    pub fn issue(&self, context: &str) -> Result<CsrfToken, VaultError> {
        let value = vault::generate_default()?;
        let issued_at = self.clock.now();
        let expires_at = issued_at + self.ttl;
        self.records.insert(
            vault::digest(&value),
            CsrfRecord {
                context: context.to_string(),
                expires_at,
                consumed: false,
            },
        );
        Ok(CsrfToken {
            value,
            context: context.to_string(),
            issued_at,
            expires_at,
        })
    }

    /// Validate and consume `token` for `context`.
    ///
    /// The check and the transition to consumed happen under the record's
    /// shard lock, so a token is accepted at most once. A context mismatch
    /// leaves the token usable for its real context.
    pub fn validate(&self, token: Option<&str>, context: &str) -> Result<(), CsrfRejection> {
        let result = self.check_and_consume(token, context);
        if let Err(rejection) = &result {
            tracing::debug!(reason = rejection.reason(), context = %context, "CSRF validation failed");
            metrics::record_csrf_rejection(rejection.reason());
        }
        result
    }

    /// Checks run in the order missing, malformed, expired, already used,
    /// context; the first failure is reported.
    fn check_and_consume(&self, token: Option<&str>, context: &str) -> Result<(), CsrfRejection> {
        let token = match token.map(str::trim) {
            None | Some("") => return Err(CsrfRejection::Missing),
            Some(token) => token,
        };
        if !vault::is_well_formed(token) {
            return Err(CsrfRejection::Malformed);
        }

        let mut record = self
            .records
            .get_mut(&vault::digest(token))
            .ok_or(CsrfRejection::Malformed)?;

        if self.clock.now() >= record.expires_at {
            return Err(CsrfRejection::Expired);
        }
        if record.consumed {
            return Err(CsrfRejection::AlreadyUsed);
        }
        if !vault::compare(&record.context, context) {
            return Err(CsrfRejection::ContextMismatch);
        }

        record.consumed = true;
        Ok(())
    }

    /// Drop expired records. Consumed records stay until they expire so a
    /// replay is still reported as `AlreadyUsed`.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.records.len();
        self.records.retain(|_, record| record.expires_at > now);
        let evicted = before.saturating_sub(self.records.len());
        if evicted > 0 {
            metrics::record_evicted("csrf", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
