//! Taxonomy and permission routes open to every caller.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::browse::{request_session, TokenParam};
use super::server::GatewayState;
use crate::error::ApiError;
use crate::taxonomy::AddOutcome;

/// Parse a JSON body, rendering failures as 400 with a `message`.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request data: {}", e)))
}

pub(crate) fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

fn status_of(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY)
}

#[derive(Debug, Deserialize)]
struct AddTaxonomyBody {
    repo_url: String,
    branch: String,
}

/// GET /init_taxonomy/{taxonomy}: run `make init` again.
pub(crate) async fn init_taxonomy(
    State(state): State<GatewayState>,
    Path(taxonomy): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let taxonomy = state.lifecycle.volume().taxonomy(&taxonomy)?;
    state.lifecycle.init_taxonomy(&taxonomy).await?;
    Ok(message("Taxonomy initialized successfully."))
}

/// POST /add_taxonomy `{repo_url, branch}`.
pub(crate) async fn add_taxonomy(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body: AddTaxonomyBody = parse_body(&body)?;
    let outcome = state
        .lifecycle
        .add_taxonomy(&body.repo_url, &body.branch)
        .await?;
    Ok(message(match outcome {
        AddOutcome::Created => "Repository cloned and initialized successfully.",
        AddOutcome::AlreadyInitialized => "Taxonomy already initialized.",
    }))
}

/// GET /check_permissions/{org}/{repo}/{user}; the status mirrors the lookup.
pub(crate) async fn check_permissions(
    State(state): State<GatewayState>,
    Path((org, repo, user)): Path<(String, String, String)>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let grant = state.gate.check(Some(&org), &repo, &user).await?;
    Ok((
        status_of(grant.status),
        Json(json!({
            "permission": grant.permission,
            "readonly": grant.permission.readonly(),
        })),
    ))
}

/// GET /session_info/{repo_name}: caller identity plus permission on the repository.
pub(crate) async fn session_info(
    State(state): State<GatewayState>,
    Path(repo_name): Path<String>,
    token: Option<Query<TokenParam>>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let session = request_session(&state, token.as_ref(), &headers)?;
    let (info, status) = state.gate.describe_session(&session, &repo_name).await?;
    let body = serde_json::to_value(info).map_err(anyhow::Error::from)?;
    Ok((status_of(status), Json(body)))
}

/// GET /api/taxonomies: taxonomy directories present on the volume.
pub(crate) async fn list_taxonomies(
    State(state): State<GatewayState>,
) -> Result<Json<Value>, ApiError> {
    let names = state.lifecycle.volume().list()?;
    Ok(Json(json!({ "taxonomies": names })))
}
