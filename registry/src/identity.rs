use std::collections::{BTreeMap, BTreeSet};

use crate::document::IndicatorDocument;
use crate::patch::Patch;

/// Deduplication key of a stored document. Labels are kept sorted so two
/// documents with the same label set produce the same key whatever order
/// they were published in. The product version is not part of the key:
/// publishing a new version replaces the old entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    pub product_name: String,
    pub labels: BTreeMap<String, String>,
}

pub trait IdentityResolver {
    fn document_key(&self, document: &IndicatorDocument) -> DocumentKey;
}

/// Every label takes part in the identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct FullMetadataIdentity;

impl IdentityResolver for FullMetadataIdentity {
    fn document_key(&self, document: &IndicatorDocument) -> DocumentKey {
        DocumentKey {
            product_name: document.product().name.clone(),
            labels: document.labels().clone(),
        }
    }
}

/// Only the configured labels take part in the identity, e.g. `deployment`.
/// Documents that differ in any other label overwrite each other.
#[derive(Clone, Debug, Default)]
pub struct LabelSubsetIdentity {
    keys: BTreeSet<String>,
}

impl LabelSubsetIdentity {
    pub fn new<I: IntoIterator<Item = String>>(keys: I) -> Self {
        LabelSubsetIdentity {
            keys: keys.into_iter().collect(),
        }
    }
}

impl IdentityResolver for LabelSubsetIdentity {
    fn document_key(&self, document: &IndicatorDocument) -> DocumentKey {
        DocumentKey {
            product_name: document.product().name.clone(),
            labels: document
                .labels()
                .iter()
                .filter(|(key, _)| self.keys.contains(*key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }
}

/// Whether `patch` targets `document`. Absent selectors match anything.
pub fn patch_matches(patch: &Patch, document: &IndicatorDocument) -> bool {
    let selector = &patch.match_;
    let product = document.product();

    let name_matches = selector
        .name
        .as_ref()
        .map_or(true, |name| *name == product.name);
    let version_matches = selector
        .version
        .as_ref()
        .map_or(true, |version| *version == product.version);
    let labels_match = selector.metadata.as_ref().map_or(true, |wanted| {
        wanted
            .iter()
            .all(|(key, value)| document.labels().get(key) == Some(value))
    });

    name_matches && version_matches && labels_match
}
