use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use metrics::counter;

use crate::patch::{Patch, PatchList};

/// The current patch list of every source. Patches never expire: they are
/// standing corrections that stay until their source submits a new list.
#[derive(Default)]
pub struct PatchStore {
    // Ordered by source so flattening is deterministic.
    entries: RwLock<BTreeMap<String, Vec<Patch>>>,
}

impl PatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces everything previously submitted under `list.source`.
    pub fn upsert_patches(&self, list: PatchList) {
        {
            let mut entries = self
                .entries
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            entries.insert(list.source, list.patches);
        }

        counter!("registry_patch_lists_upserted_total").increment(1);
    }

    /// Every stored patch, sources in lexicographic order and each source's
    /// patches in submission order.
    pub fn all_patches(&self) -> Vec<Patch> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flatten()
            .cloned()
            .collect()
    }
}
