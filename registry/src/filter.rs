use std::collections::HashMap;

use crate::document::IndicatorDocument;

/// Synthetic filter key bound to the product name instead of a label.
pub const PRODUCT_NAME_FILTER: &str = "product-name";
/// Reserved for callers (auth, pagination), never a document attribute.
pub const IGNORED_FILTER: &str = "token";

/// Label constraints on a document listing: AND across keys, OR across the
/// accepted values of a single key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    constraints: HashMap<String, Vec<String>>,
}

impl DocumentFilter {
    pub fn new(constraints: HashMap<String, Vec<String>>) -> Self {
        DocumentFilter { constraints }
    }

    /// Builds a filter from `key=value` pairs, repeated keys accumulate.
    pub fn from_pairs<I: IntoIterator<Item = (String, String)>>(pairs: I) -> Self {
        let mut constraints: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in pairs {
            constraints.entry(key).or_default().push(value);
        }
        DocumentFilter { constraints }
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.keys().all(|key| key == IGNORED_FILTER)
    }

    pub fn matches(&self, document: &IndicatorDocument) -> bool {
        self.constraints
            .iter()
            .filter(|(key, _)| *key != IGNORED_FILTER)
            .all(|(key, accepted)| {
                let actual = match key.as_str() {
                    PRODUCT_NAME_FILTER => Some(&document.product().name),
                    label => document.labels().get(label),
                };
                actual.map_or(false, |value| accepted.contains(value))
            })
    }
}
