//! # Remote Store Client
//!
//! Blocking HTTP client for the calculation service, exposed as a
//! [`CalculationStore`] so the engine can run against it directly.
//!
//! ## Endpoints
//!
//! - `GET {api_url}/calc/{id}?context={ctx}` - fetch a calculation
//! - `POST {api_url}/calc?context={ctx}` - post a calculation, returns `{"id"}`
//!
//! Every call blocks the current thread. Inside an async runtime, run it on a
//! blocking thread (`tokio::task::spawn_blocking`).

use crate::config::Config;
use regraft_core::{CalculationNode, CalculationStore, Identifier, StoreError};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

/// Timeout applied to every request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response body of a successful post.
#[derive(Debug, Deserialize)]
struct PostedId {
    id: Identifier,
}

/// Calculation store backed by the remote service.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    http: Client,
    api_url: String,
    base: Url,
    api_token: Option<String>,
    context_id: String,
}

impl RemoteStore {
    /// Create a client for the service described by `config`.
    pub fn new(config: &Config) -> Result<Self, StoreError> {
        let base = Url::parse(&config.api_url)
            .map_err(|e| StoreError::Transport(format!("invalid api url {}: {e}", config.api_url)))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Transport(format!(
                "api url cannot carry a path: {}",
                config.api_url
            )));
        }
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            base,
            api_token: config.api_token.clone(),
            context_id: config.context_id.clone().unwrap_or_default(),
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// `base` with `segments` appended, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Build a request with context and optional Bearer auth.
    fn request(&self, method: reqwest::Method, segments: &[&str]) -> RequestBuilder {
        let mut req = self
            .http
            .request(method, self.url(segments))
            .query(&[("context", self.context_id.as_str())]);
        if let Some(ref token) = self.api_token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Send a request and map connection failures.
    fn send(&self, req: RequestBuilder) -> Result<Response, StoreError> {
        req.send()
            .map_err(|e| StoreError::Transport(format!("{}: {e}", self.api_url)))
    }
}

/// Map a non-success status to a store error.
fn failure(status: StatusCode, body: String, id: Option<&Identifier>) -> StoreError {
    match (status, id) {
        (StatusCode::NOT_FOUND, Some(id)) => StoreError::NotFound(id.clone()),
        (StatusCode::UNAUTHORIZED, _) => StoreError::Transport("unauthorized".to_string()),
        (StatusCode::TOO_MANY_REQUESTS, _) => StoreError::Transport("rate limited".to_string()),
        (StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY, _) => {
            StoreError::Rejected(body)
        }
        (status, _) => StoreError::Transport(format!("status {}: {body}", status.as_u16())),
    }
}

impl CalculationStore for RemoteStore {
    fn fetch_calculation(&mut self, id: &Identifier) -> Result<CalculationNode, StoreError> {
        tracing::debug!(%id, "GET calculation");
        let req = self.request(reqwest::Method::GET, &["calc", id.as_str()]);
        let resp = self.send(req)?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(failure(status, body, Some(id)));
        }

        serde_json::from_str(&body).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    fn post_calculation(&mut self, node: &CalculationNode) -> Result<Identifier, StoreError> {
        tracing::debug!(tag = node.tag(), "POST calculation");
        let req = self
            .request(reqwest::Method::POST, &["calc"])
            .json(&node.sanitized());
        let resp = self.send(req)?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(failure(status, body, None));
        }

        serde_json::from_str::<PostedId>(&body)
            .map(|posted| posted.id)
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let id = Identifier::new("abc");
        assert_eq!(
            failure(StatusCode::NOT_FOUND, String::new(), Some(&id)),
            StoreError::NotFound(id.clone())
        );
        assert_eq!(
            failure(StatusCode::UNAUTHORIZED, String::new(), Some(&id)),
            StoreError::Transport("unauthorized".into())
        );
        assert_eq!(
            failure(StatusCode::TOO_MANY_REQUESTS, String::new(), None),
            StoreError::Transport("rate limited".into())
        );
        assert_eq!(
            failure(StatusCode::UNPROCESSABLE_ENTITY, "bad".into(), None),
            StoreError::Rejected("bad".into())
        );
        assert!(matches!(
            failure(StatusCode::BAD_GATEWAY, String::new(), None),
            StoreError::Transport(_)
        ));
    }

    fn store(api_url: &str) -> RemoteStore {
        let config = Config {
            api_url: api_url.to_string(),
            api_token: None,
            context_id: None,
        };
        match RemoteStore::new(&config) {
            Ok(store) => store,
            Err(e) => panic!("{e}"),
        }
    }

    #[test]
    fn identifiers_are_encoded_as_one_segment() {
        let url = store("http://calc.example/api/v1.0").url(&["calc", "a/b?c#d"]);
        assert_eq!(url.as_str(), "http://calc.example/api/v1.0/calc/a%2Fb%3Fc%23d");
    }

    #[test]
    fn bare_host_gets_single_separator() {
        let url = store("http://127.0.0.1:8080").url(&["calc"]);
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/calc");
    }

    #[test]
    fn invalid_api_url_is_rejected() {
        let config = Config {
            api_url: "not a url".to_string(),
            api_token: None,
            context_id: None,
        };
        assert!(matches!(RemoteStore::new(&config), Err(StoreError::Transport(_))));
    }

    #[test]
    fn not_found_on_post_is_transport() {
        assert!(matches!(
            failure(StatusCode::NOT_FOUND, String::new(), None),
            StoreError::Transport(_)
        ));
    }
}
