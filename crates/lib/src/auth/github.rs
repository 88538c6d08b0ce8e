//! GitHub collaborator permission client (https://api.github.com by default).

use async_trait::async_trait;
use serde::Deserialize;

use super::permission::{Permission, PermissionError, PermissionGrant, PermissionLookup};

const USER_AGENT: &str = concat!("tdt-api/", env!("CARGO_PKG_VERSION"));

/// Client for `GET /repos/{org}/{repo}/collaborators/{user}/permission`.
#[derive(Clone)]
pub struct GithubClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CollaboratorPermission {
    user: Option<CollaboratorUser>,
}

#[derive(Debug, Deserialize)]
struct CollaboratorUser {
    #[serde(default)]
    permissions: CollaboratorFlags,
}

#[derive(Debug, Default, Deserialize)]
struct CollaboratorFlags {
    #[serde(default)]
    push: bool,
}

impl GithubClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }
}

impl GithubClient {
    /// Lookup URL with each of org, repo and user as a single encoded path segment.
    fn permission_url(
        &self,
        org: &str,
        repo: &str,
        user: &str,
    ) -> Result<reqwest::Url, PermissionError> {
        for name in [org, repo, user] {
            if name.is_empty() || name == "." || name == ".." {
                return Err(PermissionError::InvalidName(name.to_string()));
            }
        }
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| PermissionError::BaseUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| PermissionError::BaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["repos", org, repo, "collaborators", user, "permission"]);
        Ok(url)
    }
}

/// Push rights mean write; any other successful answer is read.
fn grant_from_body(body: &str) -> Result<Permission, PermissionError> {
    let data: CollaboratorPermission =
        serde_json::from_str(body).map_err(|e| PermissionError::Body(e.to_string()))?;
    let user = data
        .user
        .ok_or_else(|| PermissionError::Body("missing user".to_string()))?;
    Ok(if user.permissions.push {
        Permission::Write
    } else {
        Permission::Read
    })
}

#[async_trait]
impl PermissionLookup for GithubClient {
    async fn lookup(
        &self,
        org: &str,
        repo: &str,
        user: &str,
    ) -> Result<PermissionGrant, PermissionError> {
        let url = self.permission_url(org, repo, user)?;
        let mut req = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
            .header(reqwest::header::USER_AGENT, USER_AGENT);
        if let Some(ref token) = self.token {
            req = req.header(reqwest::header::AUTHORIZATION, format!("token {}", token));
        }
        let res = req.send().await?;
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        if status == 200 {
            let permission = grant_from_body(&body)?;
            Ok(PermissionGrant { permission, status })
        } else {
            log::error!("github permission lookup {} -> {}: {}", url, status, body);
            Ok(PermissionGrant {
                permission: Permission::NoAccess,
                status,
            })
        }
    }
}
