//! In-memory action token store with optional JSON snapshots.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::observability::metrics;
use crate::store::{Action, ActionTokenRecord, ActionTokenStore, RedeemError, StoreError};

/// A thread-safe store for action tokens.
///
/// Records are grouped by subject so that redeeming a token and revoking its
/// siblings happen under one entry lock.
#[derive(Debug, Clone, Default)]
pub struct MemoryActionTokenStore {
    /// subject id -> every token issued for it.
    subjects: Arc<DashMap<String, Vec<ActionTokenRecord>>>,
    /// token digest -> subject id.
    index: Arc<DashMap<String, String>>,
    revoke_siblings: bool,
    snapshot_path: Option<PathBuf>,
}

impl MemoryActionTokenStore {
    /// Create a new empty store.
    pub fn new(revoke_siblings: bool, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            subjects: Arc::new(DashMap::new()),
            index: Arc::new(DashMap::new()),
            revoke_siblings,
            snapshot_path,
        }
    }

    /// Load from the snapshot file if it exists.
    pub fn load_from_file(path: impl AsRef<Path>, revoke_siblings: bool) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let store = Self::new(revoke_siblings, Some(path.to_path_buf()));
        if path.exists() {
            let file = File::open(path).map_err(|e| StoreError::Snapshot(e.to_string()))?;
            let records: Vec<ActionTokenRecord> = serde_json::from_reader(BufReader::new(file))
                .map_err(|e| StoreError::Snapshot(e.to_string()))?;

            for record in records {
                store.index.insert(record.digest.clone(), record.subject_id.clone());
                store
                    .subjects
                    .entry(record.subject_id.clone())
                    .or_default()
                    .push(record);
            }
            tracing::info!(tokens = store.len(), path = %path.display(), "Loaded action tokens from snapshot");
        }
        Ok(store)
    }

    /// Write every record to the snapshot file, if one is configured.
    pub fn save_to_file(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let mut records: Vec<ActionTokenRecord> = self
            .subjects
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.issued_at.cmp(&b.issued_at));

        let file = File::create(path).map_err(|e| StoreError::Snapshot(e.to_string()))?;
        serde_json::to_writer(BufWriter::new(file), &records)
            .map_err(|e| StoreError::Snapshot(e.to_string()))?;
        tracing::info!(tokens = records.len(), path = %path.display(), "Saved action tokens to snapshot");
        Ok(())
    }

    /// Total number of stored records.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[async_trait]
impl ActionTokenStore for MemoryActionTokenStore {
    async fn create_action_token(&self, record: ActionTokenRecord) -> Result<(), StoreError> {
        match self.index.entry(record.digest.clone()) {
            Entry::Occupied(_) => return Err(StoreError::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(record.subject_id.clone());
            }
        }
        self.subjects
            .entry(record.subject_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn redeem_action_token(
        &self,
        digest: &str,
        expected: Action,
        now: DateTime<Utc>,
    ) -> Result<ActionTokenRecord, RedeemError> {
        let subject = self
            .index
            .get(digest)
            .map(|entry| entry.value().clone())
            .ok_or(RedeemError::NotFound)?;

        let mut records = self.subjects.get_mut(&subject).ok_or(RedeemError::NotFound)?;
        let position = records
            .iter()
            .position(|record| record.digest == digest)
            .ok_or(RedeemError::NotFound)?;

        if records[position].consumed {
            return Err(RedeemError::AlreadyUsed);
        }
        if now >= records[position].expires_at {
            return Err(RedeemError::Expired);
        }
        if records[position].action != expected {
            return Err(RedeemError::WrongAction);
        }

        if self.revoke_siblings {
            records.iter_mut().for_each(|record| record.consumed = true);
        } else {
            records[position].consumed = true;
        }
        Ok(records[position].clone())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut removed = Vec::new();
        self.subjects.retain(|_, records| {
            records.retain(|record| {
                let live = record.expires_at > now;
                if !live {
                    removed.push(record.digest.clone());
                }
                live
            });
            !records.is_empty()
        });

        for digest in &removed {
            self.index.remove(digest);
        }
        if !removed.is_empty() {
            metrics::record_evicted("action_tokens", removed.len());
        }
        Ok(removed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(digest: &str, subject: &str, action: Action, now: DateTime<Utc>) -> ActionTokenRecord {
        ActionTokenRecord {
            digest: digest.to_string(),
            subject_id: subject.to_string(),
            action,
            issued_at: now,
            expires_at: now + Duration::hours(24),
            consumed: false,
        }
    }

    #[tokio::test]
    async fn redeem_consumes_and_revokes_sibling() {
        let store = MemoryActionTokenStore::new(true, None);
        let now = Utc::now();
        store.create_action_token(record("a", "req-1", Action::Approve, now)).await.unwrap();
        store.create_action_token(record("r", "req-1", Action::Reject, now)).await.unwrap();

        let redeemed = store.redeem_action_token("a", Action::Approve, now).await.unwrap();
        assert_eq!(redeemed.action, Action::Approve);
        assert!(redeemed.consumed);
        assert_eq!(store.redeem_action_token("a", Action::Approve, now).await, Err(RedeemError::AlreadyUsed));
        assert_eq!(store.redeem_action_token("r", Action::Reject, now).await, Err(RedeemError::AlreadyUsed));
    }

    #[tokio::test]
    async fn wrong_action_is_refused_without_consuming() {
        let store = MemoryActionTokenStore::new(true, None);
        let now = Utc::now();
        store.create_action_token(record("a", "req-1", Action::Approve, now)).await.unwrap();
        store.create_action_token(record("r", "req-1", Action::Reject, now)).await.unwrap();

        assert_eq!(
            store.redeem_action_token("a", Action::Reject, now).await,
            Err(RedeemError::WrongAction)
        );
        assert!(store.redeem_action_token("r", Action::Reject, now).await.is_ok());
        assert_eq!(
            store.redeem_action_token("a", Action::Approve, now).await,
            Err(RedeemError::AlreadyUsed)
        );
    }

    #[tokio::test]
    async fn siblings_survive_when_revocation_is_off() {
        let store = MemoryActionTokenStore::new(false, None);
        let now = Utc::now();
        store.create_action_token(record("a", "req-1", Action::Approve, now)).await.unwrap();
        store.create_action_token(record("r", "req-1", Action::Reject, now)).await.unwrap();

        store.redeem_action_token("a", Action::Approve, now).await.unwrap();
        assert!(store.redeem_action_token("r", Action::Reject, now).await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_digest_is_refused() {
        let store = MemoryActionTokenStore::new(true, None);
        let now = Utc::now();
        store.create_action_token(record("a", "req-1", Action::Approve, now)).await.unwrap();
        assert_eq!(
            store.create_action_token(record("a", "req-2", Action::Approve, now)).await,
            Err(StoreError::Duplicate)
        );
    }

    #[tokio::test]
    async fn expiry_is_enforced_without_purge() {
        let store = MemoryActionTokenStore::new(true, None);
        let now = Utc::now();
        store.create_action_token(record("a", "req-1", Action::Approve, now)).await.unwrap();
        assert_eq!(
            store.redeem_action_token("a", Action::Approve, now + Duration::hours(24)).await,
            Err(RedeemError::Expired)
        );
        assert_eq!(store.redeem_action_token("missing", Action::Approve, now).await, Err(RedeemError::NotFound));
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = MemoryActionTokenStore::new(true, None);
        let now = Utc::now();
        store.create_action_token(record("old", "req-1", Action::Approve, now)).await.unwrap();
        store
            .create_action_token(record("new", "req-2", Action::Approve, now + Duration::hours(12)))
            .await
            .unwrap();

        let purged = store.purge_expired(now + Duration::hours(25)).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.redeem_action_token("old", Action::Approve, now).await,
            Err(RedeemError::NotFound)
        );
    }

    #[tokio::test]
    async fn snapshot_preserves_consumed_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let now = Utc::now();

        let store = MemoryActionTokenStore::load_from_file(&path, true).unwrap();
        assert!(store.is_empty());
        store.create_action_token(record("a", "req-1", Action::Approve, now)).await.unwrap();
        store.create_action_token(record("b", "req-2", Action::Reject, now)).await.unwrap();
        store.redeem_action_token("a", Action::Approve, now).await.unwrap();
        store.save_to_file().unwrap();

        let restored = MemoryActionTokenStore::load_from_file(&path, true).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.redeem_action_token("a", Action::Approve, now).await, Err(RedeemError::AlreadyUsed));
        assert_eq!(restored.redeem_action_token("b", Action::Reject, now).await.unwrap().subject_id, "req-2");
    }
}
