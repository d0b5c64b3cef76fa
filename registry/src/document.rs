use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const API_VERSION: &str = "indicatorprotocol.io/v1";
pub const DOCUMENT_KIND: &str = "IndicatorDocument";

// Indicator names end up as prometheus alert names.
static INDICATOR_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("valid indicator name regex"));

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Product {
    pub name: String,
    pub version: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// A product's published description of its health indicators.
///
/// The registry only ever looks at the product and the metadata labels,
/// the indicators themselves are carried through untouched.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorDocument {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    pub spec: DocumentSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct DocumentSpec {
    pub product: Product,
    #[serde(default)]
    pub indicators: Vec<IndicatorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct IndicatorSpec {
    pub name: String,
    #[serde(default)]
    pub promql: String,
    #[serde(default)]
    pub thresholds: Vec<Threshold>,
    #[serde(default)]
    pub presentation: Presentation,
    #[serde(default)]
    pub documentation: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Threshold {
    pub level: String,
    pub operator: ThresholdOperator,
    pub value: f64,
    #[serde(default)]
    pub alert: Alert,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdOperator {
    Lt,
    Lte,
    Eq,
    Neq,
    Gte,
    Gt,
}

impl ThresholdOperator {
    /// The promql comparison operator for this threshold.
    pub fn symbol(&self) -> &'static str {
        match self {
            ThresholdOperator::Lt => "<",
            ThresholdOperator::Lte => "<=",
            ThresholdOperator::Eq => "==",
            ThresholdOperator::Neq => "!=",
            ThresholdOperator::Gte => ">=",
            ThresholdOperator::Gt => ">",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Alert {
    #[serde(rename = "for")]
    pub for_duration: String,
    pub step: String,
}

impl Default for Alert {
    fn default() -> Self {
        Alert {
            for_duration: "1m".to_string(),
            step: "1m".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Presentation {
    pub chart_type: String,
    pub current_value: bool,
    pub frequency: i64,
    pub labels: Vec<String>,
    pub units: String,
}

impl Default for Presentation {
    fn default() -> Self {
        Presentation {
            chart_type: "step".to_string(),
            current_value: false,
            frequency: 0,
            labels: Vec::new(),
            units: "short".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Layout {
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub sections: Vec<Section>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Section {
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub indicators: Vec<String>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported apiVersion: {0}")]
    UnsupportedApiVersion(String),
    #[error("product name is required")]
    MissingProductName,
    #[error("product version is required")]
    MissingProductVersion,
    #[error("indicators[{0}] name is required")]
    MissingIndicatorName(usize),
    #[error("indicators[{index}] name {name} is not a valid prometheus identifier")]
    InvalidIndicatorName { index: usize, name: String },
    #[error("indicators[{index}] name {name} is used more than once")]
    DuplicateIndicatorName { index: usize, name: String },
    #[error("indicators[{0}] promql is required")]
    MissingPromql(usize),
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    DOCUMENT_KIND.to_string()
}

impl IndicatorDocument {
    pub fn product(&self) -> &Product {
        &self.spec.product
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.metadata.labels
    }

    /// Fills in the layout when the publisher did not provide one: a single
    /// "Metrics" section listing every indicator in order.
    pub fn populate_defaults(&mut self) {
        if self.spec.layout.is_some() {
            return;
        }

        let product = &self.spec.product;
        self.spec.layout = Some(Layout {
            title: format!("{} - {}", product.name, product.version),
            description: String::new(),
            sections: vec![Section {
                title: "Metrics".to_string(),
                description: String::new(),
                indicators: self.spec.indicators.iter().map(|i| i.name.clone()).collect(),
            }],
        });
    }

    /// Minimal shape checks for documents coming in over the wire.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.api_version != API_VERSION {
            errors.push(ValidationError::UnsupportedApiVersion(
                self.api_version.clone(),
            ));
        }
        if self.spec.product.name.is_empty() {
            errors.push(ValidationError::MissingProductName);
        }
        if self.spec.product.version.is_empty() {
            errors.push(ValidationError::MissingProductVersion);
        }

        let mut seen = HashSet::new();
        for (index, indicator) in self.spec.indicators.iter().enumerate() {
            if indicator.name.is_empty() {
                errors.push(ValidationError::MissingIndicatorName(index));
            } else if !INDICATOR_NAME.is_match(&indicator.name) {
                errors.push(ValidationError::InvalidIndicatorName {
                    index,
                    name: indicator.name.clone(),
                });
            } else if !seen.insert(indicator.name.as_str()) {
                errors.push(ValidationError::DuplicateIndicatorName {
                    index,
                    name: indicator.name.clone(),
                });
            }

            if indicator.promql.is_empty() {
                errors.push(ValidationError::MissingPromql(index));
            }
        }

        match errors.is_empty() {
            true => Ok(()),
            false => Err(errors),
        }
    }
}
