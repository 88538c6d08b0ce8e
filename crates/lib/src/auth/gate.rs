//! Access gate: turns a session into a permission decision and the tool's read-only flag.

use serde::Serialize;

use super::permission::{Permission, PermissionError, PermissionGrant, PermissionResolver};
use super::session::{Session, DEFAULT_USER};
use crate::config::NoAccessPolicy;
use crate::error::ApiError;

/// Result of [`AccessGate::describe_session`], returned as JSON by `/session_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub user: String,
    pub email: Option<String>,
    pub repo_org: Option<String>,
    pub permission: Permission,
    pub readonly: bool,
}

#[derive(Clone)]
pub struct AccessGate {
    resolver: PermissionResolver,
    policy: NoAccessPolicy,
}

impl AccessGate {
    pub fn new(resolver: PermissionResolver, policy: NoAccessPolicy) -> Self {
        Self { resolver, policy }
    }

    /// Raw permission of `user` in `org/repo`. Anonymous users and a missing org get
    /// `(no_access, 403)` without consulting the resolver.
    pub async fn check(
        &self,
        org: Option<&str>,
        repo: &str,
        user: &str,
    ) -> Result<PermissionGrant, PermissionError> {
        let org = match org.map(str::trim).filter(|o| !o.is_empty()) {
            Some(o) if !user.is_empty() && user != DEFAULT_USER => o,
            _ => return Ok(PermissionGrant::anonymous()),
        };
        self.resolver.resolve(org, repo, user).await
    }

    /// Permission of the session's user on `taxonomy` within `org`; the status mirrors the lookup.
    pub async fn decide(
        &self,
        session: &Session,
        org: Option<&str>,
        taxonomy: &str,
    ) -> Result<PermissionGrant, PermissionError> {
        self.check(org, taxonomy, &session.user).await
    }

    /// Permission used for a browse call. Lookup failures degrade to `no_access` (read-only view);
    /// under [`NoAccessPolicy::Deny`] a `no_access` caller is rejected instead.
    pub async fn browse_permission(
        &self,
        session: &Session,
        taxonomy: &str,
    ) -> Result<Permission, ApiError> {
        let permission = match self
            .decide(session, session.repo_org.as_deref(), taxonomy)
            .await
        {
            Ok(grant) => grant.permission,
            Err(e) => {
                log::warn!(
                    "permission lookup for {} on {} failed, serving read-only: {}",
                    session.user,
                    taxonomy,
                    e
                );
                Permission::NoAccess
            }
        };
        if permission == Permission::NoAccess && self.policy == NoAccessPolicy::Deny {
            return Err(ApiError::Auth(format!(
                "{} has no access to {}",
                session.user, taxonomy
            )));
        }
        Ok(permission)
    }

    /// Session plus its permission on `repo_name`, with the lookup's status code.
    pub async fn describe_session(
        &self,
        session: &Session,
        repo_name: &str,
    ) -> Result<(SessionInfo, u16), PermissionError> {
        let grant = self
            .decide(session, session.repo_org.as_deref(), repo_name)
            .await?;
        let info = SessionInfo {
            user: session.user.clone(),
            email: session.email.clone(),
            repo_org: session.repo_org.clone(),
            permission: grant.permission,
            readonly: grant.permission.readonly(),
        };
        Ok((info, grant.status))
    }
}
