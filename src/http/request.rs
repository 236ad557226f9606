//! Transport-neutral request and response values.

use crate::error::CoreError;
use crate::model::ClientContext;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Other,
}

impl Method {
    pub fn parse(method: &str) -> Self {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            _ => Method::Other,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Other => "OTHER",
        };
        f.write_str(name)
    }
}

/// An inbound request, detached from the HTTP server.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: String,
    /// Header names are lowercased
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ApiRequest {
    /// Split `target` (`/path?query`) into path and query.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (target.to_string(), String::new()),
        };
        Self {
            method,
            path,
            query,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Token of an `Authorization: Bearer <token>` header.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header("authorization")?;
        let (scheme, token) = value.split_once(' ')?;
        let token = token.trim();
        (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
    }

    /// Caller address (first `X-Forwarded-For` hop) and user agent.
    pub fn client_context(&self) -> ClientContext {
        let ip_address = self
            .header("x-forwarded-for")
            .and_then(|value| value.split(',').next())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
            .or_else(|| self.header("x-real-ip").map(str::to_string));
        let user_agent = self.header("user-agent").map(str::to_string);
        ClientContext::new(ip_address, user_agent)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        if self.body.is_empty() {
            return Err(CoreError::validation("Request body is required"));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| CoreError::validation(format!("Invalid JSON body: {e}")))
    }
}

/// Decoded `key=value` pairs of a query string. Later duplicates win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(HashMap<String, String>);

impl QueryParams {
    pub fn parse(query: &str) -> Self {
        let pairs = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (key.to_string(), value.replace('+', " ")),
                None => (pair.to_string(), String::new()),
            })
            .collect();
        Self(pairs)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Parse an integer parameter; absent or empty means `None`.
    pub fn get_i64(&self, key: &str) -> Result<Option<i64>, CoreError> {
        self.get(key)
            .map(|value| {
                value
                    .parse::<i64>()
                    .map_err(|_| CoreError::validation(format!("{key} must be an integer")))
            })
            .transpose()
    }
}

/// An outbound response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json(status: u16, value: &impl Serialize) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_else(|e| {
            log::error!("failed to encode response body: {}", e);
            br#"{"success":false,"message":"Internal server error"}"#.to_vec()
        });
        Self {
            status,
            content_type: "Content-Type: application/json",
            body,
        }
    }

    /// `{"success": true, "data": ...}`
    pub fn ok(data: &impl Serialize) -> Self {
        Self::json(200, &serde_json::json!({ "success": true, "data": data }))
    }

    /// `{"success": false, "message": ...}`
    pub fn message(status: u16, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "success": false, "message": message }))
    }

    pub fn from_error(err: &CoreError) -> Self {
        match err {
            CoreError::Infrastructure(_) | CoreError::Internal(_) => {
                log::error!("request failed: {}", err)
            }
            _ => log::debug!("request rejected: {}", err),
        }
        Self::message(err.status(), &err.public_message())
    }

    pub fn text(status: u16, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    pub fn not_found() -> Self {
        Self::message(404, "Route not found")
    }

    pub fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            409 => "Conflict",
            413 => "Payload Too Large",
            423 => "Locked",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }

    pub fn body_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}
