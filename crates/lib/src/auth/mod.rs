//! Caller identity and permissions: session tokens, the cached GitHub permission lookup,
//! and the access gate that derives the tool's read-only flag.

mod cache;
mod gate;
mod github;
mod permission;
mod session;

pub use cache::TtlCache;
pub use gate::{AccessGate, SessionInfo};
pub use github::GithubClient;
pub use permission::{
    GrantKey, Permission, PermissionError, PermissionGrant, PermissionLookup, PermissionResolver,
};
pub use session::{
    sign_token, Session, SessionClaims, SessionDecoder, SessionError, AUTH_COOKIE, DEFAULT_USER,
};
