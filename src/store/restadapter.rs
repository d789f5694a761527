use std::fs;
use std::path::Path;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::LogLevel;
use crate::error::AdapterError;
use crate::model::typedescriptor::TypeDescriptor;
use crate::model::value::PrimaryKey;
use crate::store::adapter::Adapter;
use crate::store::parse::unwrap_root;

/// Connection settings for [`RestAdapter`].
#[derive(Debug, Clone, Deserialize)]
pub struct RestAdapterConfig {
    /// Root URL of the API, e.g. `https://example.com`.
    pub base_url: String,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,
    /// Path prefix between the base URL and collection, e.g. `api/v1`.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub log_level: LogLevel,
}

impl RestAdapterConfig {
    /// Read settings from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        serde_json::from_str(&contents).map_err(|e| format!("Invalid {}: {e}", path.display()))
    }
}

/// Adapter speaking JSON over HTTP.
///
/// `GET {base}/{namespace}/{collection}/{id}`, `POST {base}/{namespace}/{collection}`
/// and `PATCH {base}/{namespace}/{collection}/{id}`. Request bodies are
/// wrapped in a root key named after the type; responses may be.
pub struct RestAdapter {
    client: Client,
    base_url: String,
    token: Option<String>,
    log_level: LogLevel,
}

impl RestAdapter {
    /// Build an adapter; an empty token or namespace is ignored.
    pub fn new(config: RestAdapterConfig) -> Self {
        let mut base_url = config.base_url.trim_end_matches('/').to_string();
        if let Some(namespace) = config
            .namespace
            .as_deref()
            .map(|ns| ns.trim_matches('/'))
            .filter(|ns| !ns.is_empty())
        {
            base_url.push('/');
            base_url.push_str(namespace);
        }

        Self {
            client: Client::new(),
            base_url,
            token: config.token.filter(|token| !token.trim().is_empty()),
            log_level: config.log_level,
        }
    }

    pub(crate) fn collection_url(&self, descriptor: &TypeDescriptor) -> String {
        format!(
            "{}/{}",
            self.base_url,
            urlencoding::encode(descriptor.collection_name())
        )
    }

    pub(crate) fn record_url(&self, descriptor: &TypeDescriptor, id: &PrimaryKey) -> String {
        format!(
            "{}/{}",
            self.collection_url(descriptor),
            urlencoding::encode(&id.to_string())
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", "application/json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        descriptor: &TypeDescriptor,
        request: RequestBuilder,
    ) -> Result<JsonValue, AdapterError> {
        let resp = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| AdapterError::Request(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AdapterError::NotFound);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AdapterError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| AdapterError::Request(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(JsonValue::Null);
        }

        let json: JsonValue = serde_json::from_str(&body)
            .map_err(|e| AdapterError::InvalidResponse(format!("Failed to parse JSON: {e}")))?;
        Ok(unwrap_root(json, descriptor.name()))
    }
}

fn wrap_root(descriptor: &TypeDescriptor, payload: JsonValue) -> JsonValue {
    let mut root = Map::new();
    root.insert(descriptor.name().to_string(), payload);
    JsonValue::Object(root)
}

#[async_trait]
impl Adapter for RestAdapter {
    async fn find(
        &self,
        descriptor: &TypeDescriptor,
        id: &PrimaryKey,
    ) -> Result<JsonValue, AdapterError> {
        let url = self.record_url(descriptor, id);
        if matches!(self.log_level, LogLevel::Debug) {
            debug!("GET {}", url);
        }
        self.send(descriptor, self.client.get(&url)).await
    }

    async fn create_record(
        &self,
        descriptor: &TypeDescriptor,
        payload: JsonValue,
    ) -> Result<JsonValue, AdapterError> {
        let url = self.collection_url(descriptor);
        if matches!(self.log_level, LogLevel::Debug) {
            debug!("POST {}", url);
        }
        let request = self.client.post(&url).json(&wrap_root(descriptor, payload));
        self.send(descriptor, request).await
    }

    async fn update_record(
        &self,
        descriptor: &TypeDescriptor,
        id: &PrimaryKey,
        changes: JsonValue,
    ) -> Result<JsonValue, AdapterError> {
        let url = self.record_url(descriptor, id);
        if matches!(self.log_level, LogLevel::Debug) {
            debug!("PATCH {}", url);
        }
        let request = self.client.patch(&url).json(&wrap_root(descriptor, changes));
        self.send(descriptor, request).await
    }
}
