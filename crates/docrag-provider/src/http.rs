//! JSON-over-HTTP plumbing shared by every remote backend.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use docrag_core::config::HttpSettings;
use docrag_core::error::{Error, Result};

use crate::retry::RetryPolicy;

const MAX_ERROR_BODY: usize = 512;

/// A named client with a request timeout and a retry policy.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    name: String,
    client: Client,
    retry: RetryPolicy,
}

impl HttpBackend {
    pub fn new(name: impl Into<String>, settings: &HttpSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { name: name.into(), client, retry: RetryPolicy::from(settings) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// POST `body` as JSON and decode the JSON response, retrying transient failures.
    pub async fn post_json<B, R>(&self, url: &str, bearer: Option<&str>, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        self.retry.execute(|| self.post_once(url, bearer, body)).await
    }

    async fn post_once<B, R>(&self, url: &str, bearer: Option<&str>, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        debug!(backend = %self.name, url, "POST");
        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::backend(
                &self.name,
                format!("HTTP {status}: {}", truncate(&text, MAX_ERROR_BODY)),
                is_retryable_status(status),
            ));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| Error::backend(&self.name, format!("malformed response: {e}"), false))
    }

    fn transport_error(&self, e: &reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::backend(&self.name, format!("request timed out: {e}"), true)
        } else {
            Error::backend(&self.name, e.to_string(), e.is_connect() || e.is_request())
        }
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT || status.is_server_error()
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
