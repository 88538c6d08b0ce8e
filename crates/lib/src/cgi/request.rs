//! Inbound side of the bridge: the CGI environment for one call.

use std::collections::BTreeMap;

/// Content type passed to the tool when the request carries none.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgiMethod {
    Get,
    Post,
}

impl CgiMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            CgiMethod::Get => "GET",
            CgiMethod::Post => "POST",
        }
    }
}

/// One proxied call. Consumed by [`super::CgiBridge::invoke`].
#[derive(Debug, Clone)]
pub struct CgiRequest {
    pub method: CgiMethod,
    /// Route remainder; becomes `PATH_INFO` with a leading `/`.
    pub path_info: String,
    pub query_string: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Extra variables merged over the base CGI set (read-only flag, user, root).
    pub extra_env: BTreeMap<String, String>,
}

impl CgiRequest {
    pub fn new(method: CgiMethod, path_info: impl Into<String>) -> Self {
        Self {
            method,
            path_info: path_info.into(),
            query_string: String::new(),
            content_type: None,
            body: Vec::new(),
            extra_env: BTreeMap::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query_string = query.into();
        self
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.insert(name.into(), value.into());
        self
    }

    /// `PATH_INFO` value: always starts with exactly one `/`.
    pub fn path_info(&self) -> String {
        format!("/{}", self.path_info.trim_start_matches('/'))
    }

    /// The complete environment for the tool. Nothing else from the server's environment is passed.
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string());
        env.insert(
            "REQUEST_METHOD".to_string(),
            self.method.as_str().to_string(),
        );
        env.insert("PATH_INFO".to_string(), self.path_info());
        env.insert("QUERY_STRING".to_string(), self.query_string.clone());
        let content_type = self
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        env.insert("CONTENT_TYPE".to_string(), content_type.to_string());
        if !self.body.is_empty() {
            env.insert("CONTENT_LENGTH".to_string(), self.body.len().to_string());
        }
        for (k, v) in &self.extra_env {
            env.insert(k.clone(), v.clone());
        }
        env
    }
}
