//! Repository permissions and the cached resolver in front of the upstream lookup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::cache::TtlCache;
use crate::error::ApiError;

/// What a user may do in a taxonomy repository. Ordered: no_access < read < write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    NoAccess,
    Read,
    Write,
}

impl Permission {
    /// Only `write` may mutate taxonomy state through the tool.
    pub fn readonly(self) -> bool {
        !matches!(self, Permission::Write)
    }

    /// `RLTBL_READONLY` value.
    pub fn readonly_flag(self) -> &'static str {
        if self.readonly() {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::NoAccess => "no_access",
            Permission::Read => "read",
            Permission::Write => "write",
        }
    }
}

/// A resolved permission plus the status code of the lookup that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionGrant {
    pub permission: Permission,
    pub status: u16,
}

impl PermissionGrant {
    /// No org context or anonymous user: nothing to check against.
    pub fn anonymous() -> Self {
        Self {
            permission: Permission::NoAccess,
            status: 403,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("permission lookup request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("permission lookup returned an unexpected body: {0}")]
    Body(String),
    #[error("invalid permission lookup base URL: {0}")]
    BaseUrl(String),
    #[error("invalid org, repository or user name: {0:?}")]
    InvalidName(String),
}

impl From<PermissionError> for ApiError {
    fn from(e: PermissionError) -> Self {
        match e {
            PermissionError::InvalidName(name) => ApiError::InvalidName(name),
            other => ApiError::UpstreamLookup {
                status: 502,
                message: other.to_string(),
            },
        }
    }
}

/// Upstream source of truth for collaborator permissions (GitHub in production).
#[async_trait]
pub trait PermissionLookup: Send + Sync {
    async fn lookup(
        &self,
        org: &str,
        repo: &str,
        user: &str,
    ) -> Result<PermissionGrant, PermissionError>;
}

/// Cache key: (org, repo, user).
pub type GrantKey = (String, String, String);

/// Cached front of a [`PermissionLookup`]. The cache is constructed by the caller and shared
/// process-wide; every returned grant, including non-200 ones, is cached for the TTL.
#[derive(Clone)]
pub struct PermissionResolver {
    upstream: Arc<dyn PermissionLookup>,
    cache: Arc<TtlCache<GrantKey, PermissionGrant>>,
}

impl PermissionResolver {
    pub fn new(
        upstream: Arc<dyn PermissionLookup>,
        cache: Arc<TtlCache<GrantKey, PermissionGrant>>,
    ) -> Self {
        Self { upstream, cache }
    }

    /// Permission of `user` in `org/repo`, from cache when fresh.
    pub async fn resolve(
        &self,
        org: &str,
        repo: &str,
        user: &str,
    ) -> Result<PermissionGrant, PermissionError> {
        let key = (org.to_string(), repo.to_string(), user.to_string());
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }
        let grant = self.upstream.lookup(org, repo, user).await?;
        log::debug!(
            "permission {}/{} for {}: {} ({})",
            org,
            repo,
            user,
            grant.permission.as_str(),
            grant.status
        );
        self.cache.insert(key, grant).await;
        Ok(grant)
    }
}
