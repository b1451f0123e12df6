//! REST key-value backend.
//!
//! Talks to a minimal key-value service:
//!
//! - `GET {base_url}/{key}` returns the raw value, or 404 when unset
//! - `PUT {base_url}/{key}` replaces the value
//!
//! Authentication is an optional bearer token.

use super::KvBackend;
use crate::config::SecretString;
use crate::error::StateStoreError;
use async_trait::async_trait;
use reqwest::StatusCode;

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpBackend {
    pub fn new(client: reqwest::Client, base_url: &str, token: Option<SecretString>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref token) => request.bearer_auth(token.expose()),
            None => request,
        }
    }
}

fn classify_status(status: StatusCode, operation: &str) -> StateStoreError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        StateStoreError::Unauthorized(format!("{} returned {}", operation, status))
    } else {
        StateStoreError::Transport(format!("{} returned {}", operation, status))
    }
}

#[async_trait]
impl KvBackend for HttpBackend {
    fn backend_type(&self) -> &str {
        "http"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateStoreError> {
        let response = self
            .authorize(self.client.get(self.url_for(key)))
            .send()
            .await
            .map_err(|e| StateStoreError::Transport(format!("GET failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_status(status, "GET"));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| StateStoreError::Transport(format!("GET body read failed: {}", e)))?;
        Ok(Some(body.to_vec()))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StateStoreError> {
        let response = self
            .authorize(self.client.put(self.url_for(key)))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(value.to_vec())
            .send()
            .await
            .map_err(|e| StateStoreError::Transport(format!("PUT failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(classify_status(status, "PUT"))
        }
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("token", &self.token)
            .finish()
    }
}
