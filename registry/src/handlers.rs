use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::Json;
use tracing::{debug, instrument};

use crate::alerts::{alert_document_filename, alert_document_from};
use crate::api::{
    AlertRuleFile, FailedDocument, RegistryError, RegistryResponse, ResolvedDocuments,
};
use crate::document::IndicatorDocument;
use crate::filter::DocumentFilter;
use crate::patch::{Patch, PatchList};
use crate::router;

#[instrument(skip_all)]
pub async fn register(
    state: State<router::State>,
    body: Bytes,
) -> Result<Json<RegistryResponse>, RegistryError> {
    let mut document: IndicatorDocument = serde_json::from_slice(&body)?;
    document.populate_defaults();
    document.validate().map_err(RegistryError::InvalidDocument)?;

    debug!(
        product = %document.product().name,
        version = %document.product().version,
        "registering document"
    );
    state.registry.upsert_document(document);

    Ok(Json(RegistryResponse::ok()))
}

#[instrument(skip_all)]
pub async fn indicator_documents(
    state: State<router::State>,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<IndicatorDocument>>, RegistryError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query.as_deref().unwrap_or(""))?;
    let filter = DocumentFilter::from_pairs(pairs);

    let documents = match filter.is_empty() {
        true => state.registry.all_documents(),
        false => state.registry.filtered_documents(&filter),
    };

    Ok(Json(documents))
}

#[instrument(skip_all)]
pub async fn upsert_patches(
    state: State<router::State>,
    body: Bytes,
) -> Result<Json<RegistryResponse>, RegistryError> {
    let list: PatchList = serde_json::from_slice(&body)?;
    if list.source.is_empty() {
        return Err(RegistryError::MissingPatchSource);
    }

    debug!(source = %list.source, patches = list.patches.len(), "replacing patches");
    state.registry.upsert_patches(list);

    Ok(Json(RegistryResponse::ok()))
}

pub async fn patches(state: State<router::State>) -> Json<Vec<Patch>> {
    Json(state.registry.all_patches())
}

#[instrument(skip_all)]
pub async fn resolved_documents(state: State<router::State>) -> Json<ResolvedDocuments> {
    let resolution = state.registry.resolve_all();

    Json(ResolvedDocuments {
        failures: resolution.failures.iter().map(FailedDocument::from).collect(),
        documents: resolution
            .resolved
            .into_iter()
            .map(|resolved| resolved.document)
            .collect(),
    })
}

#[instrument(skip_all)]
pub async fn alert_rules(
    state: State<router::State>,
) -> Result<Json<Vec<AlertRuleFile>>, RegistryError> {
    let resolution = state.registry.resolve_all();

    let files = resolution
        .resolved
        .iter()
        .map(|resolved| {
            let document = &resolved.document;
            let bytes = serde_json::to_vec(document).map_err(RegistryError::ResponseEncodingError)?;
            Ok(AlertRuleFile {
                filename: alert_document_filename(&bytes, &document.product().name),
                document: alert_document_from(document),
            })
        })
        .collect::<Result<Vec<_>, RegistryError>>()?;

    Ok(Json(files))
}
