use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::document::IndicatorDocument;
use crate::executor::{PatchError, PatchExecutor, PathOpsExecutor};
use crate::identity::patch_matches;
use crate::patch::Patch;

/// A document after every matching patch has been applied to it, along with
/// those patches in the order they were applied.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedDocument {
    pub document: IndicatorDocument,
    pub applied_patches: Vec<Patch>,
}

/// A document for which one of its matching patches could not be applied.
/// Nothing is partially applied: the document is reported as it was stored.
#[derive(Error, Debug)]
#[error("patch {patch_index} could not be applied: {source}")]
pub struct ResolutionFailure {
    pub document: IndicatorDocument,
    pub patch_index: usize,
    #[source]
    pub source: PatchError,
}

#[derive(Debug, Default)]
pub struct Resolution {
    pub resolved: Vec<ResolvedDocument>,
    pub failures: Vec<ResolutionFailure>,
}

pub struct PatchResolver {
    executor: Arc<dyn PatchExecutor + Send + Sync>,
}

impl Default for PatchResolver {
    fn default() -> Self {
        Self::new(Arc::new(PathOpsExecutor))
    }
}

impl PatchResolver {
    pub fn new(executor: Arc<dyn PatchExecutor + Send + Sync>) -> Self {
        PatchResolver { executor }
    }

    /// Applies, in order, every patch whose match selects `document`.
    /// `patches` must already be in resolution order.
    pub fn resolve_document(
        &self,
        document: &IndicatorDocument,
        patches: &[Patch],
    ) -> Result<ResolvedDocument, ResolutionFailure> {
        let mut current = document.clone();
        let mut applied_patches = Vec::new();

        for (patch_index, patch) in patches.iter().enumerate() {
            if !patch_matches(patch, document) {
                continue;
            }

            current = self
                .executor
                .apply(&current, patch)
                .map_err(|source| ResolutionFailure {
                    document: document.clone(),
                    patch_index,
                    source,
                })?;
            applied_patches.push(patch.clone());
        }

        Ok(ResolvedDocument {
            document: current,
            applied_patches,
        })
    }

    pub fn resolve_all(&self, documents: &[IndicatorDocument], patches: &[Patch]) -> Resolution {
        let mut resolution = Resolution::default();

        for document in documents {
            match self.resolve_document(document, patches) {
                Ok(resolved) => resolution.resolved.push(resolved),
                Err(failure) => {
                    warn!(
                        product = %failure.document.product().name,
                        patch = failure.patch_index,
                        error = %failure.source,
                        "failed to apply patch"
                    );
                    counter!("registry_resolution_failures_total").increment(1);
                    resolution.failures.push(failure);
                }
            }
        }

        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentMetadata, DocumentSpec, IndicatorSpec, Product};
    use serde_json::json;

    fn document(name: &str, version: &str) -> IndicatorDocument {
        IndicatorDocument {
            metadata: DocumentMetadata {
                name: String::new(),
                labels: [("deployment".to_string(), "abc-123".to_string())].into(),
            },
            spec: DocumentSpec {
                product: Product {
                    name: name.to_string(),
                    version: version.to_string(),
                },
                indicators: vec![IndicatorSpec {
                    name: "success_percentage".to_string(),
                    promql: "success".to_string(),
                    ..Default::default()
                }],
                layout: None,
            },
            ..Default::default()
        }
    }

    fn patch(value: serde_json::Value) -> Patch {
        serde_json::from_value(value).unwrap()
    }

    fn replace_promql(name: Option<&str>, version: Option<&str>, promql: &str) -> Patch {
        let mut product = serde_json::Map::new();
        if let Some(name) = name {
            product.insert("name".to_string(), json!(name));
        }
        if let Some(version) = version {
            product.insert("version".to_string(), json!(version));
        }
        patch(json!({
            "match": {"product": product},
            "operations": [{
                "type": "replace",
                "path": "/spec/indicators/name=success_percentage/promql",
                "value": promql
            }]
        }))
    }

    #[test]
    fn applies_matching_patches_only() {
        let resolver = PatchResolver::default();
        let patches = vec![
            replace_promql(Some("other-app"), None, "other"),
            replace_promql(Some("test-app"), Some("test-version"), "patched"),
        ];

        let resolved = resolver
            .resolve_document(&document("test-app", "test-version"), &patches)
            .unwrap();

        assert_eq!(resolved.applied_patches, vec![patches[1].clone()]);
        assert_eq!(resolved.document.spec.indicators[0].promql, "patched");
    }

    #[test]
    fn applies_patches_in_order() {
        let resolver = PatchResolver::default();
        let patches = vec![
            replace_promql(Some("test-app"), None, "first"),
            replace_promql(None, Some("test-version"), "second"),
        ];

        let resolved = resolver
            .resolve_document(&document("test-app", "test-version"), &patches)
            .unwrap();

        assert_eq!(resolved.applied_patches, patches);
        assert_eq!(resolved.document.spec.indicators[0].promql, "second");
    }

    #[test]
    fn unpatched_documents_are_returned_unchanged() {
        let resolver = PatchResolver::default();
        let original = document("test-app", "test-version");

        let resolved = resolver.resolve_document(&original, &[]).unwrap();

        assert!(resolved.applied_patches.is_empty());
        assert_eq!(resolved.document, original);
    }

    #[test]
    fn reports_the_failing_patch_with_the_stored_document() {
        let resolver = PatchResolver::default();
        let original = document("test-app", "test-version");
        let broken = patch(json!({
            "match": {"product": {"name": "test-app"}},
            "operations": [{"type": "remove", "path": "/spec/indicators/name=missing"}]
        }));
        let patches = vec![replace_promql(Some("test-app"), None, "patched"), broken];

        let failure = resolver.resolve_document(&original, &patches).unwrap_err();

        assert_eq!(failure.patch_index, 1);
        assert_eq!(failure.document, original);
        assert!(matches!(failure.source, PatchError::NotFound(_)));
    }

    #[test]
    fn one_failing_document_does_not_block_the_others() {
        let resolver = PatchResolver::default();
        let documents = vec![document("test-app", "1"), document("other-app", "1")];
        let patches = vec![patch(json!({
            "match": {"product": {"name": "test-app"}},
            "operations": [{"type": "test", "path": "/spec/product/version", "value": "2"}]
        }))];

        let resolution = resolver.resolve_all(&documents, &patches);

        assert_eq!(resolution.resolved.len(), 1);
        assert_eq!(resolution.resolved[0].document.product().name, "other-app");
        assert_eq!(resolution.failures.len(), 1);
        assert_eq!(resolution.failures[0].document.product().name, "test-app");
    }
}
