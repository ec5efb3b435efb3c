//! HTTP transport for the Bitbucket maintenance API
//!
//! The lock session talks to the server only through the [`Transport`] trait,
//! so a different backend can be injected. [`HttpTransport`] is the default
//! implementation built on `reqwest` with basic auth on every request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, Method,
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    config::LockClientConfig,
    constants::MAINTENANCE_TOKEN_HEADER,
    error::{LockError, Result},
};

/// A single request against the maintenance API
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the server address
    pub path: &'static str,
    pub query: Vec<(&'static str, String)>,
    /// Unlock token sent as the maintenance token header
    pub maintenance_token: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: &'static str) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            maintenance_token: None,
        }
    }

    pub fn get(path: &'static str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &'static str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: &'static str) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter
    pub fn with_query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    /// Attach the maintenance token header, if a token is known
    pub fn with_maintenance_token(mut self, token: Option<&str>) -> Self {
        self.maintenance_token = token.map(str::to_string);
        self
    }
}

/// Raw response: status code and body text
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self, action: &'static str) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|source| LockError::Decode { action, source })
    }
}

/// Sends maintenance API requests
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// `reqwest` based transport with basic auth and JSON content negotiation
pub struct HttpTransport {
    client: Client,
    server_addr: String,
    username: String,
    password: String,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(config: &LockClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;

        Ok(Self {
            client,
            server_addr: config.server_addr.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Build full URL from the server address
    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.server_addr.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = self.build_url(request.path);
        debug!(method = %request.method, url = %url, "Sending maintenance request");

        let mut builder = self
            .client
            .request(request.method, &url)
            .basic_auth(&self.username, Some(&self.password));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.maintenance_token {
            builder = builder.header(MAINTENANCE_TOKEN_HEADER, token);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(url = %url, status, "Received maintenance response");

        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        let config = LockClientConfig::new("https://bitbucket.local:7990/");
        let transport = HttpTransport::new(&config).unwrap();

        assert_eq!(
            transport.build_url("/mvc/maintenance"),
            "https://bitbucket.local:7990/mvc/maintenance"
        );
    }

    #[test]
    fn test_request_builder() {
        let request = ApiRequest::post("/mvc/admin/backups/progress/client")
            .with_query("token", "T1")
            .with_query("percentage", 42)
            .with_maintenance_token(Some("T1"));

        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.query,
            vec![("token", "T1".to_string()), ("percentage", "42".to_string())]
        );
        assert_eq!(request.maintenance_token.as_deref(), Some("T1"));
    }

    #[test]
    fn test_response_json() {
        let response = ApiResponse::new(202, r#"{"unlockToken":"T1"}"#);
        assert!(response.is_success());
        let value: serde_json::Value = response.json("initiating lock").unwrap();
        assert_eq!(value["unlockToken"], "T1");

        let response = ApiResponse::new(500, "<html>oops</html>");
        assert!(!response.is_success());
        let err = response
            .json::<serde_json::Value>("initiating lock")
            .unwrap_err();
        assert!(matches!(err, LockError::Decode { .. }));
    }
}
