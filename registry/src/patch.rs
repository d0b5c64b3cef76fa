use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::API_VERSION;

pub const PATCH_KIND: &str = "IndicatorDocumentPatch";

/// An out-of-band correction targeted at every document the `Match` accepts.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default, rename = "match")]
    pub match_: Match,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

/// Selects the documents a patch applies to. `None` is a wildcard, not an
/// empty string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "MatchWire", into = "MatchWire")]
pub struct Match {
    pub name: Option<String>,
    pub version: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Add,
    Replace,
    Remove,
    Test,
}

/// Everything one source currently wants applied. Submitting a new list for
/// the same source replaces the previous one entirely.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct PatchList {
    pub source: String,
    #[serde(default)]
    pub patches: Vec<Patch>,
}

// On the wire the product selector is nested, as it is in documents.
#[derive(Default, Deserialize, Serialize)]
struct MatchWire {
    #[serde(default, skip_serializing_if = "ProductMatchWire::is_empty")]
    product: ProductMatchWire,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<BTreeMap<String, String>>,
}

#[derive(Default, Deserialize, Serialize)]
struct ProductMatchWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl ProductMatchWire {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.version.is_none()
    }
}

impl From<MatchWire> for Match {
    fn from(wire: MatchWire) -> Self {
        Match {
            name: wire.product.name,
            version: wire.product.version,
            metadata: wire.metadata,
        }
    }
}

impl From<Match> for MatchWire {
    fn from(m: Match) -> Self {
        MatchWire {
            product: ProductMatchWire {
                name: m.name,
                version: m.version,
            },
            metadata: m.metadata,
        }
    }
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    PATCH_KIND.to_string()
}
