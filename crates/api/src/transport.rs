//! The transport seam between the rate-limit discipline and the wire.
//!
//! The client's retry/backoff loop is written against this trait so tests
//! can drive it with scripted responses; production uses the reqwest-backed
//! implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApiError;

/// How a request authenticates, per platform convention.
#[derive(Debug, Clone)]
pub enum AuthScheme {
    /// The token verbatim in the Authorization header.
    Raw(String),
    /// `Bearer <token>`.
    Bearer(String),
    None,
}

impl AuthScheme {
    pub(crate) fn header_value(&self) -> Option<String> {
        match self {
            AuthScheme::Raw(token) => Some(token.clone()),
            AuthScheme::Bearer(token) => Some(format!("Bearer {token}")),
            AuthScheme::None => None,
        }
    }
}

/// One part of a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadPart {
    pub name: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(Vec<UploadPart>),
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: String,
    pub url: String,
    pub auth: Option<String>,
    pub body: RequestBody,
}

/// A received response, headers lowercased.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub(crate) fn body_snippet(&self) -> String {
        const LIMIT: usize = 256;
        let text = String::from_utf8_lossy(&self.body);
        text.chars().take(LIMIT).collect()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("sessrec/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ApiError::Platform(format!("bad method: {}", request.method)))?;
        let mut builder = self.client.request(method, &request.url);
        if let Some(auth) = &request.auth {
            builder = builder.header(reqwest::header::AUTHORIZATION, auth);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(parts) => {
                let mut form = reqwest::multipart::Form::new();
                for part in parts {
                    form = form.part(
                        part.name,
                        reqwest::multipart::Part::bytes(part.bytes).file_name(part.file_name),
                    );
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }
        let body = response.bytes().await?.to_vec();
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
