//! Admin routes. Every body carries `admin_secret`; a mismatch is rejected before any other
//! field is looked at or any command runs.

use axum::{body::Bytes, extract::State, Json};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;

use super::routes::{message, parse_body};
use super::server::GatewayState;
use crate::error::ApiError;

const UPDATED: &str = "Taxonomies updated successfully.";

#[derive(Debug, Deserialize)]
struct InitTaxonomiesBody {
    repositories: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct ReloadTaxonomyBody {
    repository: Option<String>,
    branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateTaxonomiesBody {
    repositories: Option<BTreeMap<String, String>>,
    tdt_version: Option<String>,
}

/// Constant-time comparison against the configured secret. No configured secret rejects everything.
fn check_admin_secret(configured: Option<&str>, provided: Option<&str>) -> Result<(), ApiError> {
    let denied = || ApiError::Auth("Invalid admin secret.".to_string());
    let (Some(expected), Some(provided)) = (configured, provided) else {
        return Err(denied());
    };
    if bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
        Ok(())
    } else {
        Err(denied())
    }
}

/// Gate on the body's `admin_secret`, then parse it. An unparseable body counts as a missing secret.
fn authorized<T: DeserializeOwned>(state: &GatewayState, body: &Bytes) -> Result<T, ApiError> {
    let raw: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
    let provided = raw.get("admin_secret").and_then(Value::as_str);
    check_admin_secret(state.admin_secret.as_deref(), provided)?;
    parse_body(body)
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Invalid request data. '{}' is mandatory data.",
            field
        ))
    })
}

fn non_empty(
    repositories: Option<BTreeMap<String, String>>,
) -> Result<BTreeMap<String, String>, ApiError> {
    required(repositories.filter(|r| !r.is_empty()), "repositories")
}

/// POST /init_taxonomies `{repositories: {url: branch}, admin_secret}`: add the missing ones.
pub(crate) async fn init_taxonomies(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body: InitTaxonomiesBody = authorized(&state, &body)?;
    let repositories = non_empty(body.repositories)?;
    let created = state.lifecycle.init_taxonomies(&repositories).await?;
    log::info!("init_taxonomies created {:?}", created);
    Ok(message(UPDATED))
}

/// POST /reload_taxonomy `{repository, branch, admin_secret}`: delete and re-create.
pub(crate) async fn reload_taxonomy(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body: ReloadTaxonomyBody = authorized(&state, &body)?;
    let repository = required(body.repository, "repository")?;
    let branch = required(body.branch, "branch")?;
    state.lifecycle.reload_taxonomy(&repository, &branch).await?;
    Ok(message(UPDATED))
}

/// POST /update_taxonomies `{repositories: {url: branch}, tdt_version, admin_secret}`.
pub(crate) async fn update_taxonomies(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body: UpdateTaxonomiesBody = authorized(&state, &body)?;
    let repositories = non_empty(body.repositories)?;
    let version = required(body.tdt_version, "tdt_version")?;
    state
        .lifecycle
        .update_taxonomies(&repositories, &version)
        .await?;
    Ok(message(UPDATED))
}
