use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use metrics::{counter, gauge};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::document::IndicatorDocument;
use crate::filter::DocumentFilter;
use crate::identity::{DocumentKey, FullMetadataIdentity, IdentityResolver};
use crate::time::TimeSource;

struct StoredDocument {
    document: IndicatorDocument,
    written_at: OffsetDateTime,
}

impl StoredDocument {
    fn is_live(&self, now: OffsetDateTime, ttl: Duration) -> bool {
        now - self.written_at <= ttl
    }
}

/// Latest document per identity key, each entry readable for `ttl` after its
/// last write. Expired entries are skipped on read and dropped by
/// `purge_expired`.
pub struct DocumentStore {
    entries: RwLock<HashMap<DocumentKey, StoredDocument>>,
    ttl: Duration,
    timesource: Arc<dyn TimeSource + Send + Sync>,
    identity: Arc<dyn IdentityResolver + Send + Sync>,
}

impl DocumentStore {
    pub fn new(ttl: Duration, timesource: Arc<dyn TimeSource + Send + Sync>) -> Self {
        Self::with_identity(ttl, timesource, Arc::new(FullMetadataIdentity))
    }

    pub fn with_identity(
        ttl: Duration,
        timesource: Arc<dyn TimeSource + Send + Sync>,
        identity: Arc<dyn IdentityResolver + Send + Sync>,
    ) -> Self {
        DocumentStore {
            entries: RwLock::new(HashMap::new()),
            ttl,
            timesource,
            identity,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn upsert_document(&self, document: IndicatorDocument) {
        let key = self.identity.document_key(&document);
        let written_at = self.timesource.current_time();

        let stored = {
            let mut entries = self.write();
            entries.insert(
                key,
                StoredDocument {
                    document,
                    written_at,
                },
            );
            entries.len()
        };

        counter!("registry_documents_upserted_total").increment(1);
        gauge!("registry_documents_stored").set(stored as f64);
    }

    pub fn all_documents(&self) -> Vec<IndicatorDocument> {
        self.live_documents(|_| true)
    }

    pub fn filtered_documents(&self, filter: &DocumentFilter) -> Vec<IndicatorDocument> {
        self.live_documents(|document| filter.matches(document))
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.timesource.current_time();

        let (purged, stored) = {
            let mut entries = self.write();
            let before = entries.len();
            entries.retain(|_, entry| entry.is_live(now, self.ttl));
            (before - entries.len(), entries.len())
        };

        if purged > 0 {
            debug!(purged, "purged expired documents");
            counter!("registry_documents_expired_total").increment(purged as u64);
        }
        gauge!("registry_documents_stored").set(stored as f64);

        purged
    }

    fn live_documents<F>(&self, predicate: F) -> Vec<IndicatorDocument>
    where
        F: Fn(&IndicatorDocument) -> bool,
    {
        let now = self.timesource.current_time();

        self.read()
            .values()
            .filter(|entry| entry.is_live(now, self.ttl))
            .map(|entry| &entry.document)
            .filter(|document| predicate(document))
            .cloned()
            .collect()
    }

    // Every operation leaves the map consistent, so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<DocumentKey, StoredDocument>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<DocumentKey, StoredDocument>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
