//! reqwest-backed `RemoteClient`
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error};

use super::{Endpoint, Payload, RemoteClient};
use crate::config::Config;
use crate::error::RemoteError;

pub struct HttpRemoteClient {
    client: Client,
    base_url: String,
}

impl HttpRemoteClient {
    pub fn new(config: &Config) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn call(&self, endpoint: Endpoint, payload: Payload) -> Result<Value, RemoteError> {
        let url = self.url_for(endpoint);
        let request = self.client.post(&url);

        let request = match payload {
            Payload::Empty => request,
            Payload::Json(body) => request.json(&body),
            Payload::Multipart(file) => {
                let part = Part::bytes(file.bytes().to_vec()).file_name(file.file_name().to_string());
                request.multipart(Form::new().part("file", part))
            }
        };

        let response = request.send().await.map_err(|e| {
            error!(endpoint = %endpoint, "Backend request failed: {}", e);
            RemoteError::Unreachable(e.to_string())
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!(endpoint = %endpoint, "Failed to read backend response: {}", e);
            RemoteError::Unreachable(e.to_string())
        })?;

        debug!(endpoint = %endpoint, status = status.as_u16(), "Backend responded");

        if !status.is_success() {
            return Err(RemoteError::ServerRejected {
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }

        serde_json::from_str(&body).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }
}
