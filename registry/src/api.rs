use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alerts::AlertDocument;
use crate::document::{IndicatorDocument, ValidationError};
use crate::resolver::ResolutionFailure;

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum RegistryResponseCode {
    Ok = 1,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegistryResponse {
    pub status: RegistryResponseCode,
}

impl RegistryResponse {
    pub fn ok() -> Self {
        RegistryResponse {
            status: RegistryResponseCode::Ok,
        }
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error("failed to parse query: {0}")]
    InvalidQuery(#[from] serde_urlencoded::de::Error),

    #[error("invalid document: {}", join(.0))]
    InvalidDocument(Vec<ValidationError>),
    #[error("patch list submitted without a source")]
    MissingPatchSource,

    #[error("failed to encode response: {0}")]
    ResponseEncodingError(#[source] serde_json::Error),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        match self {
            RegistryError::RequestParsingError(_) | RegistryError::InvalidQuery(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            RegistryError::InvalidDocument(_) | RegistryError::MissingPatchSource => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }

            RegistryError::ResponseEncodingError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        }
        .into_response()
    }
}

/// Body of `GET /v1/resolved-documents`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ResolvedDocuments {
    pub documents: Vec<IndicatorDocument>,
    pub failures: Vec<FailedDocument>,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct FailedDocument {
    pub product: String,
    pub labels: BTreeMap<String, String>,
    pub error: String,
}

impl From<&ResolutionFailure> for FailedDocument {
    fn from(failure: &ResolutionFailure) -> Self {
        FailedDocument {
            product: failure.document.product().name.clone(),
            labels: failure.document.labels().clone(),
            error: failure.to_string(),
        }
    }
}

/// One entry of `GET /v1/alert-rules`.
#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct AlertRuleFile {
    pub filename: String,
    pub document: AlertDocument,
}
