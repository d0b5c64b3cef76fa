//! Prometheus alerting rules derived from indicator thresholds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::document::{IndicatorDocument, IndicatorSpec, Threshold};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AlertDocument {
    pub groups: Vec<Group>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Group {
    pub name: String,
    pub rules: Vec<Rule>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Rule {
    pub alert: String,
    pub expr: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    #[serde(rename = "for")]
    pub for_duration: String,
}

/// One group per document, named after the product, with a rule for every
/// threshold of every indicator.
pub fn alert_document_from(document: &IndicatorDocument) -> AlertDocument {
    let rules = document
        .spec
        .indicators
        .iter()
        .flat_map(|indicator| {
            indicator
                .thresholds
                .iter()
                .map(move |threshold| rule(document, indicator, threshold))
        })
        .collect();

    AlertDocument {
        groups: vec![Group {
            name: document.product().name.clone(),
            rules,
        }],
    }
}

/// Content addressed so that a changed document lands in a new file.
pub fn alert_document_filename(document: &[u8], product_name: &str) -> String {
    let digest = Sha1::digest(document);
    format!("{}_{:x}.yml", product_name, digest)
}

fn rule(document: &IndicatorDocument, indicator: &IndicatorSpec, threshold: &Threshold) -> Rule {
    let mut labels = document.labels().clone();
    labels.insert("product".to_string(), document.product().name.clone());
    labels.insert("version".to_string(), document.product().version.clone());
    labels.insert("level".to_string(), threshold.level.clone());

    Rule {
        alert: indicator.name.clone(),
        expr: expression(indicator, threshold),
        labels,
        annotations: indicator.documentation.clone(),
        for_duration: threshold.alert.for_duration.clone(),
    }
}

fn expression(indicator: &IndicatorSpec, threshold: &Threshold) -> String {
    format!(
        "{} {} {}",
        indicator.promql.replace("$step", &threshold.alert.step),
        threshold.operator.symbol(),
        threshold.value
    )
}
