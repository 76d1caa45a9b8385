//! Token-bucket rate limiting.
//!
//! # Responsibilities
//! - One bucket per (client identity, scope), created lazily
//! - Route each request to a scope by path, falling back to `global`
//! - Report how long a rejected client must wait for the next token
//!
//! # Design Decisions
//! - Each bucket has its own mutex; the map only hands out `Arc`s, so
//!   unrelated clients never contend on a shared lock
//! - Time comes from an injected [`Clock`] so refill is testable
//! - Idle buckets are dropped by an explicit sweep, never by timers

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::clock::SharedClock;
use crate::config::schema::RateLimitConfig;
use crate::observability::metrics;
use crate::security::classifier::{EndpointKind, PathPattern};

/// Name of the fallback scope.
pub const GLOBAL_SCOPE: &str = "global";

/// Scope used for webhook paths that no scope claims explicitly.
pub const WEBHOOK_SCOPE: &str = "webhook";

/// Upper bound on a reported wait.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Admit,
    Reject { retry_after: Duration },
}

impl Decision {
    pub fn is_admit(&self) -> bool {
        matches!(self, Self::Admit)
    }

    /// Whole seconds for a `Retry-After` header, rounded up, at least 1.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Admit => None,
            Self::Reject { retry_after } => {
                Some((retry_after.as_secs_f64().ceil() as u64).max(1))
            }
        }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: DateTime<Utc>,
}

impl TokenBucket {
    fn new(capacity: f64, now: DateTime<Utc>) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_per_minute: f64, now: DateTime<Utc>) -> Decision {
        let elapsed = (now - self.last_refill).num_milliseconds().max(0) as f64 / 1000.0;

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_per_minute / 60.0).min(capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Decision::Admit
        } else {
            let wait = (1.0 - self.tokens) * 60.0 / refill_per_minute;
            let retry_after = Duration::try_from_secs_f64(wait)
                .unwrap_or(MAX_RETRY_AFTER)
                .min(MAX_RETRY_AFTER);
            Decision::Reject { retry_after }
        }
    }
}

#[derive(Debug)]
struct Scope {
    name: String,
    capacity: f64,
    refill_per_minute: f64,
    patterns: Vec<PathPattern>,
    per_endpoint: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    identity: String,
    scope: usize,
    endpoint: Option<String>,
}

/// Rate limiter state shared by every request.
#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    scopes: Vec<Scope>,
    global: usize,
    webhook: Option<usize>,
    buckets: DashMap<BucketKey, Arc<Mutex<TokenBucket>>>,
    clock: SharedClock,
}

impl RateLimiter {
    /// Build from configuration. A missing `global` scope falls back to a
    /// 60 per minute bucket; validation normally rejects that earlier.
    pub fn new(config: &RateLimitConfig, clock: SharedClock) -> Self {
        let mut scopes: Vec<Scope> = config
            .scopes
            .iter()
            .map(|scope| Scope {
                name: scope.name.clone(),
                capacity: f64::from(scope.capacity),
                refill_per_minute: scope.refill_per_minute,
                patterns: scope.paths.iter().filter_map(|p| PathPattern::parse(p)).collect(),
                per_endpoint: scope.per_endpoint,
            })
            .collect();

        let global = match scopes.iter().position(|s| s.name == GLOBAL_SCOPE) {
            Some(index) => index,
            None => {
                scopes.push(Scope {
                    name: GLOBAL_SCOPE.to_string(),
                    capacity: 60.0,
                    refill_per_minute: 60.0,
                    patterns: Vec::new(),
                    per_endpoint: false,
                });
                scopes.len() - 1
            }
        };
        let webhook = scopes.iter().position(|s| s.name == WEBHOOK_SCOPE);

        Self {
            enabled: config.enabled,
            scopes,
            global,
            webhook,
            buckets: DashMap::new(),
            clock,
        }
    }

    fn resolve_scope(&self, path: &str, kind: EndpointKind) -> usize {
        let claimed = self
            .scopes
            .iter()
            .enumerate()
            .flat_map(|(index, scope)| {
                scope
                    .patterns
                    .iter()
                    .filter(|pattern| pattern.matches(path))
                    .map(move |pattern| (pattern.specificity(), index))
            })
            .max_by_key(|(specificity, _)| *specificity)
            .map(|(_, index)| index);

        match (claimed, kind) {
            (Some(index), _) => index,
            (None, EndpointKind::Webhook) => self.webhook.unwrap_or(self.global),
            (None, _) => self.global,
        }
    }

    /// Name of the scope a request would be charged to.
    pub fn scope_name(&self, path: &str, kind: EndpointKind) -> &str {
        &self.scopes[self.resolve_scope(path, kind)].name
    }

    /// Charge one request from `identity` to the scope for `path`
    /// (already normalized).
    pub fn check(&self, identity: &str, path: &str, kind: EndpointKind) -> Decision {
        if !self.enabled {
            return Decision::Admit;
        }

        let index = self.resolve_scope(path, kind);
        let scope = &self.scopes[index];
        let key = BucketKey {
            identity: identity.to_string(),
            scope: index,
            endpoint: scope.per_endpoint.then(|| path.to_string()),
        };

        let now = self.clock.now();
        let bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(scope.capacity, now))))
            .clone();

        let decision = bucket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(scope.capacity, scope.refill_per_minute, now);

        if let Decision::Reject { retry_after } = decision {
            tracing::warn!(
                client = %identity,
                scope = %scope.name,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(&scope.name);
        }

        decision
    }

    /// Drop every bucket.
    pub fn reset(&self) {
        self.buckets.clear();
    }

    /// Drop buckets untouched for at least `max_idle`. Returns how many.
    pub fn evict_idle(&self, max_idle: chrono::Duration) -> usize {
        let cutoff = self.clock.now() - max_idle;
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            bucket.lock().unwrap_or_else(PoisonError::into_inner).last_refill > cutoff
        });
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            metrics::record_evicted("rate_limit", evicted);
        }
        evicted
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
