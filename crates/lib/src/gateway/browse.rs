//! `/browser/{taxonomy}/{path}`: proxy browse and edit calls to the taxonomy's tool.

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, RawQuery, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::server::GatewayState;
use crate::auth::{Permission, Session};
use crate::cgi::{CgiMethod, CgiRequest, CgiResponse};
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenParam {
    token: Option<String>,
}

/// Session for the request: `token` query parameter, then the auth cookie.
pub(crate) fn request_session(
    state: &GatewayState,
    token: Option<&Query<TokenParam>>,
    headers: &HeaderMap,
) -> Result<Session, ApiError> {
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok());
    let token = token.and_then(|q| q.token.as_deref());
    Ok(state.sessions.decode_request(token, cookie)?)
}

pub(crate) async fn browse_root(
    State(state): State<GatewayState>,
    Path(taxonomy): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    token: Option<Query<TokenParam>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    proxy(&state, &taxonomy, "", method, query, token, headers, body).await
}

pub(crate) async fn browse_path(
    State(state): State<GatewayState>,
    Path((taxonomy, path)): Path<(String, String)>,
    method: Method,
    RawQuery(query): RawQuery,
    token: Option<Query<TokenParam>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    proxy(&state, &taxonomy, &path, method, query, token, headers, body).await
}

#[allow(clippy::too_many_arguments)]
async fn proxy(
    state: &GatewayState,
    taxonomy: &str,
    path: &str,
    method: Method,
    query: Option<String>,
    token: Option<Query<TokenParam>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let taxonomy = state.lifecycle.volume().taxonomy(taxonomy)?;
    let session = request_session(state, token.as_ref(), &headers)?;
    let permission = state.gate.browse_permission(&session, &taxonomy.name).await?;

    let _guard = state.lifecycle.ensure_initialized(&taxonomy).await?;

    let cgi_method = if method == Method::POST {
        CgiMethod::Post
    } else {
        CgiMethod::Get
    };
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let request = tool_request(state, &taxonomy.name, &session, permission, cgi_method, path)
        .with_query(query.unwrap_or_default())
        .with_content_type(content_type)
        .with_body(body.to_vec());

    log::debug!(
        "browse {} {}/{} as {} ({})",
        cgi_method.as_str(),
        taxonomy.name,
        path,
        session.user,
        permission.as_str()
    );
    let tool = taxonomy.directory.join(&state.tool_path);
    let response = state
        .bridge
        .invoke(&tool, &taxonomy.directory, request)
        .await?;
    Ok(into_http(response))
}

/// CGI request with the tool extensions: read-only flag, user, and URL root.
fn tool_request(
    state: &GatewayState,
    taxonomy: &str,
    session: &Session,
    permission: Permission,
    method: CgiMethod,
    path: &str,
) -> CgiRequest {
    let mut request = CgiRequest::new(method, path)
        .with_env("RLTBL_READONLY", permission.readonly_flag())
        .with_env("RLTBL_USER", session.user.clone());
    if let Some(ref root) = state.rltbl_root {
        request = request.with_env(
            "RLTBL_ROOT",
            format!("{}/{}", root.trim_end_matches('/'), taxonomy),
        );
    }
    request
}

/// Forward status, headers and body as the tool emitted them. Header lines axum cannot
/// represent are skipped.
fn into_http(cgi: CgiResponse) -> Response {
    let status = StatusCode::from_u16(cgi.status).unwrap_or(StatusCode::OK);
    let mut response = (status, Body::from(cgi.body)).into_response();
    let out = response.headers_mut();
    for (name, value) in cgi.headers.iter() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(n), Ok(v)) => {
                out.insert(n, v);
            }
            _ => log::debug!("skipping unrepresentable tool header {:?}", name),
        }
    }
    response
}
