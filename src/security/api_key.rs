//! The static API key credential.
//!
//! The key is the only setting that may change while the service runs: the
//! config watcher swaps it in through [`ApiKeyHandle::reload`]. Readers load
//! the current value without locking.

use arc_swap::ArcSwap;

use crate::config::schema::AuthConfig;
use crate::security::vault;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ApiKey {
    enabled: bool,
    key: String,
}

impl ApiKey {
    fn from_config(auth: &AuthConfig) -> Self {
        Self {
            enabled: auth.api_key_enabled,
            key: auth.api_key.clone(),
        }
    }
}

/// Shared, hot-swappable API key.
#[derive(Debug)]
pub struct ApiKeyHandle {
    current: ArcSwap<ApiKey>,
}

impl ApiKeyHandle {
    pub fn new(auth: &AuthConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(ApiKey::from_config(auth)),
        }
    }

    /// Constant-time check of a presented key. A disabled or empty key
    /// never matches.
    pub fn verify(&self, presented: Option<&str>) -> bool {
        let current = self.current.load();
        match presented {
            Some(presented) if current.enabled && !current.key.is_empty() => {
                vault::compare(presented.trim(), &current.key)
            }
            _ => false,
        }
    }

    /// Replace the key. Returns whether anything changed.
    pub fn reload(&self, auth: &AuthConfig) -> bool {
        let next = ApiKey::from_config(auth);
        if **self.current.load() == next {
            return false;
        }
        self.current.store(next.into());
        tracing::info!(enabled = auth.api_key_enabled, "API key reloaded");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(enabled: bool, key: &str) -> AuthConfig {
        AuthConfig {
            api_key_enabled: enabled,
            api_key: key.to_string(),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn verifies_only_the_current_key() {
        let handle = ApiKeyHandle::new(&auth(true, "first-key"));
        assert!(handle.verify(Some("first-key")));
        assert!(!handle.verify(Some("other")));
        assert!(!handle.verify(None));

        assert!(handle.reload(&auth(true, "second-key")));
        assert!(!handle.verify(Some("first-key")));
        assert!(handle.verify(Some("second-key")));
        assert!(!handle.reload(&auth(true, "second-key")));
    }

    #[test]
    fn disabled_or_empty_key_never_matches() {
        assert!(!ApiKeyHandle::new(&auth(false, "k")).verify(Some("k")));
        assert!(!ApiKeyHandle::new(&auth(true, "")).verify(Some("")));
    }
}
