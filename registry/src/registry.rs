use std::sync::Arc;

use time::Duration;
use tracing::instrument;

use crate::document::IndicatorDocument;
use crate::document_store::DocumentStore;
use crate::executor::PatchExecutor;
use crate::filter::DocumentFilter;
use crate::identity::IdentityResolver;
use crate::patch::{Patch, PatchList};
use crate::patch_store::PatchStore;
use crate::resolver::{PatchResolver, Resolution, ResolutionFailure, ResolvedDocument};
use crate::time::TimeSource;

/// Documents and patches of one registry instance, sharing a single clock.
///
/// Reads hand out copies: resolution runs on snapshots, never under a store lock.
pub struct Registry {
    documents: DocumentStore,
    patches: PatchStore,
    resolver: PatchResolver,
    timesource: Arc<dyn TimeSource + Send + Sync>,
}

impl Registry {
    pub fn new(ttl: Duration, timesource: Arc<dyn TimeSource + Send + Sync>) -> Self {
        Registry {
            documents: DocumentStore::new(ttl, timesource.clone()),
            patches: PatchStore::new(),
            resolver: PatchResolver::default(),
            timesource,
        }
    }

    /// Replaces how documents are deduplicated. Meant for construction time,
    /// the document store starts out empty again.
    pub fn with_identity(mut self, identity: Arc<dyn IdentityResolver + Send + Sync>) -> Self {
        self.documents =
            DocumentStore::with_identity(self.documents.ttl(), self.timesource.clone(), identity);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn PatchExecutor + Send + Sync>) -> Self {
        self.resolver = PatchResolver::new(executor);
        self
    }

    pub fn upsert_document(&self, document: IndicatorDocument) {
        self.documents.upsert_document(document)
    }

    pub fn upsert_patches(&self, list: PatchList) {
        self.patches.upsert_patches(list)
    }

    pub fn all_documents(&self) -> Vec<IndicatorDocument> {
        self.documents.all_documents()
    }

    pub fn filtered_documents(&self, filter: &DocumentFilter) -> Vec<IndicatorDocument> {
        self.documents.filtered_documents(filter)
    }

    pub fn all_patches(&self) -> Vec<Patch> {
        self.patches.all_patches()
    }

    pub fn resolve_document(
        &self,
        document: &IndicatorDocument,
    ) -> Result<ResolvedDocument, ResolutionFailure> {
        self.resolver
            .resolve_document(document, &self.patches.all_patches())
    }

    #[instrument(skip_all)]
    pub fn resolve_all(&self) -> Resolution {
        let documents = self.documents.all_documents();
        let patches = self.patches.all_patches();

        self.resolver.resolve_all(&documents, &patches)
    }

    pub fn purge_expired(&self) -> usize {
        self.documents.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentMetadata, DocumentSpec, IndicatorSpec, Product};
    use crate::executor::PatchError;
    use crate::identity::LabelSubsetIdentity;
    use crate::time::ManualTime;
    use serde_json::json;
    use time::OffsetDateTime;

    fn document(name: &str, deployment: &str) -> IndicatorDocument {
        IndicatorDocument {
            metadata: DocumentMetadata {
                name: String::new(),
                labels: [
                    ("deployment".to_string(), deployment.to_string()),
                    ("source_id".to_string(), "abc".to_string()),
                ]
                .into(),
            },
            spec: DocumentSpec {
                product: Product {
                    name: name.to_string(),
                    version: "1".to_string(),
                },
                indicators: vec![IndicatorSpec {
                    name: "latency".to_string(),
                    promql: "latency".to_string(),
                    ..Default::default()
                }],
                layout: None,
            },
            ..Default::default()
        }
    }

    fn patches(source: &str, product: &str, promql: &str) -> PatchList {
        serde_json::from_value(json!({
            "source": source,
            "patches": [{
                "match": {"product": {"name": product}},
                "operations": [{
                    "type": "replace",
                    "path": "/spec/indicators/name=latency/promql",
                    "value": promql
                }]
            }]
        }))
        .unwrap()
    }

    fn registry() -> (Registry, ManualTime) {
        let clock = ManualTime::new(OffsetDateTime::now_utc());
        (Registry::new(Duration::hours(1), Arc::new(clock.clone())), clock)
    }

    #[test]
    fn resolves_every_live_document() {
        let (registry, clock) = registry();
        registry.upsert_document(document("a", "one"));
        clock.advance(Duration::minutes(30));
        registry.upsert_document(document("b", "two"));
        let list = patches("git:repo", "b", "patched");
        registry.upsert_patches(list.clone());

        clock.advance(Duration::minutes(45));
        let resolution = registry.resolve_all();

        assert!(resolution.failures.is_empty());
        assert_eq!(resolution.resolved.len(), 1);
        assert_eq!(resolution.resolved[0].applied_patches, list.patches);
        assert_eq!(
            resolution.resolved[0].document.spec.indicators[0].promql,
            "patched"
        );
    }

    #[test]
    fn patches_do_not_expire() {
        let (registry, clock) = registry();
        registry.upsert_patches(patches("git:repo", "a", "patched"));

        clock.advance(Duration::days(30));
        registry.upsert_document(document("a", "one"));

        let resolved = registry.resolve_document(&document("a", "one")).unwrap();
        assert_eq!(resolved.document.spec.indicators[0].promql, "patched");
        assert_eq!(registry.all_patches().len(), 1);
    }

    #[test]
    fn patches_apply_in_source_order() {
        let (registry, _) = registry();
        registry.upsert_document(document("a", "one"));
        let last = patches("git:z-repo", "a", "last");
        let first = patches("git:a-repo", "a", "first");
        registry.upsert_patches(last.clone());
        registry.upsert_patches(first.clone());

        let resolution = registry.resolve_all();

        assert_eq!(
            resolution.resolved[0].applied_patches,
            [first.patches, last.patches].concat()
        );
        assert_eq!(resolution.resolved[0].document.spec.indicators[0].promql, "last");
    }

    #[test]
    fn failures_are_isolated() {
        let (registry, _) = registry();
        registry.upsert_document(document("a", "one"));
        registry.upsert_document(document("b", "two"));
        registry.upsert_patches(
            serde_json::from_value(json!({
                "source": "git:repo",
                "patches": [{
                    "match": {"product": {"name": "a"}},
                    "operations": [{"type": "remove", "path": "/spec/indicators/name=unknown"}]
                }]
            }))
            .unwrap(),
        );

        let resolution = registry.resolve_all();

        assert_eq!(resolution.resolved.len(), 1);
        assert_eq!(resolution.resolved[0].document, document("b", "two"));
        assert_eq!(resolution.failures.len(), 1);
        assert_eq!(resolution.failures[0].document, document("a", "one"));
        assert!(matches!(
            resolution.failures[0].source,
            PatchError::NotFound(_)
        ));
    }

    #[test]
    fn filters_documents() {
        let (registry, _) = registry();
        registry.upsert_document(document("a", "one"));
        registry.upsert_document(document("b", "two"));

        let found = registry.filtered_documents(&DocumentFilter::from_pairs(vec![(
            "deployment".to_string(),
            "two".to_string(),
        )]));

        assert_eq!(found, vec![document("b", "two")]);
        assert_eq!(registry.all_documents().len(), 2);
    }

    #[test]
    fn identity_is_swappable() {
        let (registry, _) = registry();
        let registry = registry.with_identity(Arc::new(LabelSubsetIdentity::new(vec![
            "source_id".to_string(),
        ])));

        registry.upsert_document(document("a", "one"));
        registry.upsert_document(document("a", "two"));

        assert_eq!(registry.all_documents(), vec![document("a", "two")]);
    }

    #[test]
    fn purges_with_the_shared_clock() {
        let (registry, clock) = registry();
        registry.upsert_document(document("a", "one"));

        assert_eq!(registry.purge_expired(), 0);
        clock.advance(Duration::hours(2));
        assert_eq!(registry.purge_expired(), 1);
    }
}
