//! HTTP access to the generation service.
//!
//! Everything the clients send goes through [`GenerativeTransport`], so tests can
//! script responses without a network.

use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::debug;

use crate::credentials::Credential;
use crate::error::{Result, StudioError};

/// Raw result of a plain GET, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBody {
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FetchedBody {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait GenerativeTransport: Send + Sync {
    /// POST a JSON body with the key as a query parameter; non-2xx is an error.
    fn post_json(
        &self,
        service: &str,
        url: &str,
        credential: &Credential,
        payload: &Value,
    ) -> Result<Value>;

    /// GET a JSON resource with the key as a query parameter; non-2xx is an error.
    fn get_json(&self, service: &str, url: &str, credential: &Credential) -> Result<Value>;

    /// GET an arbitrary URL and hand back whatever came back.
    fn fetch(&self, url: &str) -> Result<FetchedBody>;
}

pub struct HttpTransport {
    http: HttpClient,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: HttpClient::new(),
            timeout,
        }
    }

    /// Ignores proxy settings from the environment so loopback servers are reachable.
    #[cfg(test)]
    pub(crate) fn without_proxy(timeout: Duration) -> Self {
        Self {
            http: HttpClient::builder().no_proxy().build().unwrap_or_default(),
            timeout,
        }
    }
}

impl GenerativeTransport for HttpTransport {
    fn post_json(
        &self,
        service: &str,
        url: &str,
        credential: &Credential,
        payload: &Value,
    ) -> Result<Value> {
        debug!(service, url, "POST");
        let response = self
            .http
            .post(url)
            .query(&[("key", credential.expose())])
            .timeout(self.timeout)
            .json(payload)
            .send()
            .map_err(|err| transport_error(service, url, err))?;
        response_json_or_error(service, response)
    }

    fn get_json(&self, service: &str, url: &str, credential: &Credential) -> Result<Value> {
        debug!(service, url, "GET");
        let response = self
            .http
            .get(url)
            .query(&[("key", credential.expose())])
            .timeout(self.timeout)
            .send()
            .map_err(|err| transport_error(service, url, err))?;
        response_json_or_error(service, response)
    }

    fn fetch(&self, url: &str) -> Result<FetchedBody> {
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .map_err(|err| transport_error("download", redact_key(url).as_str(), err))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .map_err(|err| StudioError::Transport(format!("failed reading download body: {err}")))?
            .to_vec();
        Ok(FetchedBody {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            content_type,
            bytes,
        })
    }
}

fn transport_error(service: &str, url: &str, err: reqwest::Error) -> StudioError {
    // reqwest includes the URL in its message; keep the key out of it.
    StudioError::Transport(format!(
        "{service} request failed ({url}): {}",
        err.without_url()
    ))
}

fn response_json_or_error(service: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let body = response.text().map_err(|err| {
        StudioError::Transport(format!("{service} response body read failed: {err}"))
    })?;
    if !status.is_success() {
        return Err(StudioError::Api {
            service: service.to_string(),
            status: status.as_u16(),
            message: remote_error_message(&body),
        });
    }
    serde_json::from_str(&body)
        .map_err(|err| StudioError::malformed(format!("{service} returned invalid JSON: {err}")))
}

/// Prefers the service's `error.message`; falls back to the truncated body.
pub(crate) fn remote_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|payload| {
            payload
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| truncate_text(body.trim(), 512))
}

pub(crate) fn redact_key(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(name, value)| {
                    let value = if name == "key" {
                        "<redacted>".to_string()
                    } else {
                        value.into_owned()
                    };
                    (name.into_owned(), value)
                })
                .collect();
            if !pairs.is_empty() {
                parsed.query_pairs_mut().clear().extend_pairs(pairs);
            }
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
