//! News passthrough relay
//!
//! Stateless handler that forwards `page`/`size` plus the server-held API key
//! to the news API and relays the answer. No caching, no retry: every call
//! is independent.
//!
//! | Outcome | Status | Body |
//! |---|---|---|
//! | success | 200 | `{count, results, next, previous}` |
//! | upstream error status | upstream's | `{"error": "Failed to fetch news"}` |
//! | anything else | 500 | `{"error": message}` |

use crate::{
    config::NewsRelayConfig,
    error::{ProviderError, RelayError},
    transport::{HttpTransport, Transport},
    types::null_as_default,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

const UPSTREAM_FAILURE_MESSAGE: &str = "Failed to fetch news";

/// Status and JSON body produced by the relay
#[derive(Debug, Clone, PartialEq)]
pub struct RelayResponse {
    pub status: u16,
    pub body: Value,
}

impl RelayResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    /// An `{"error": message}` body with the given status
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

/// Pagination coordinates parsed out of an upstream link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRef {
    pub page: Option<String>,
    pub size: Option<String>,
}

/// One page of news as returned to relay callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsPage {
    pub count: u64,
    pub results: Vec<Value>,
    pub next: Option<PageRef>,
    pub previous: Option<PageRef>,
}

#[derive(Debug, Deserialize)]
struct RawNewsEnvelope {
    data: RawNewsPage,
}

#[derive(Debug, Deserialize)]
struct RawNewsPage {
    #[serde(default, deserialize_with = "null_as_default")]
    count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    results: Vec<Value>,
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    previous: Option<String>,
}

/// Outcome of one upstream call
enum Upstream {
    Page(NewsPage),
    Failed(u16),
}

/// Passthrough relay for the news API
pub struct NewsRelay {
    transport: Arc<dyn Transport>,
    config: NewsRelayConfig,
}

impl NewsRelay {
    /// Creates a relay backed by a reqwest transport
    pub fn new(config: NewsRelayConfig) -> Result<Self, RelayError> {
        let transport = Arc::new(HttpTransport::new()?);
        Ok(Self::with_transport(config, transport))
    }

    /// Creates a relay on top of a custom transport
    pub fn with_transport(config: NewsRelayConfig, transport: Arc<dyn Transport>) -> Self {
        Self { transport, config }
    }

    /// Handles one relay call given its raw query parameters
    pub async fn handle(&self, params: &HashMap<String, String>) -> RelayResponse {
        let result = match self.parse_params(params) {
            Ok((page, size)) => self.forward(page, size).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(Upstream::Page(page)) => match serde_json::to_value(&page) {
                Ok(body) => RelayResponse::ok(body),
                Err(e) => RelayResponse::error(500, e.to_string()),
            },
            Ok(Upstream::Failed(status)) => RelayResponse::error(status, UPSTREAM_FAILURE_MESSAGE),
            Err(e) => {
                tracing::error!(error = %e, "News relay failed");
                RelayResponse::error(500, e.to_string())
            }
        }
    }

    /// Fetches one page of news directly
    ///
    /// An upstream error status is reported as [`RelayError::Upstream`].
    pub async fn fetch_page(&self, page: u32, size: u32) -> Result<NewsPage, RelayError> {
        match self.forward(page, size).await? {
            Upstream::Page(news) => Ok(news),
            Upstream::Failed(status) => Err(RelayError::Upstream(ProviderError::status(
                status,
                UPSTREAM_FAILURE_MESSAGE,
            ))),
        }
    }

    fn parse_params(&self, params: &HashMap<String, String>) -> Result<(u32, u32), RelayError> {
        let page = parse_positive(params, "page", self.config.default_page)?;
        let size = parse_positive(params, "size", self.config.default_size)?;
        Ok((page, size))
    }

    async fn forward(&self, page: u32, size: u32) -> Result<Upstream, RelayError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(RelayError::MissingApiKey)?;

        let query = [
            ("apikey", api_key.to_string()),
            ("page", page.to_string()),
            ("size", size.to_string()),
        ];
        tracing::debug!(page, size, "Relaying news request");

        let response = self.transport.get(&self.config.base_url, &query).await?;
        if !response.is_success() {
            tracing::warn!(status = response.status, "News API returned an error status");
            return Ok(Upstream::Failed(response.status));
        }

        let envelope: RawNewsEnvelope = serde_json::from_str(&response.body)
            .map_err(|e| RelayError::MalformedBody(e.to_string()))?;
        let data = envelope.data;

        Ok(Upstream::Page(NewsPage {
            count: data.count,
            results: data.results,
            next: parse_page_link(data.next.as_deref())?,
            previous: parse_page_link(data.previous.as_deref())?,
        }))
    }
}

fn parse_positive(
    params: &HashMap<String, String>,
    name: &str,
    default: u32,
) -> Result<u32, RelayError> {
    match params.get(name) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(RelayError::invalid_param(name, raw.as_str())),
        },
    }
}

/// Extracts `{page, size}` from a pagination link
fn parse_page_link(link: Option<&str>) -> Result<Option<PageRef>, RelayError> {
    let Some(link) = link.filter(|l| !l.is_empty()) else {
        return Ok(None);
    };

    let url = Url::parse(link)
        .map_err(|e| RelayError::MalformedBody(format!("bad pagination link {:?}: {}", link, e)))?;
    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };

    Ok(Some(PageRef {
        page: param("page"),
        size: param("size"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    const NEWS_URL: &str = "https://news.example.com/crypto";

    fn relay(transport: Arc<MockTransport>, api_key: Option<&str>) -> NewsRelay {
        let config = NewsRelayConfig {
            base_url: NEWS_URL.to_string(),
            api_key: api_key.map(str::to_string),
            ..NewsRelayConfig::default()
        };
        NewsRelay::with_transport(config, transport)
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_forwards_page_and_size() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            "/crypto",
            json!({ "data": {
                "count": 42,
                "results": [{ "title": "BTC breaks out" }],
                "next": "https://news.example.com/crypto?apikey=k&page=3&size=5",
                "previous": "https://news.example.com/crypto?apikey=k&page=1&size=5"
            }}),
        );
        let relay = relay(transport.clone(), Some("secret"));

        let response = relay.handle(&params(&[("page", "2"), ("size", "5")])).await;

        let request = &transport.requests()[0];
        assert_eq!(request.url, NEWS_URL);
        assert_eq!(request.param("page"), Some("2"));
        assert_eq!(request.param("size"), Some("5"));
        assert_eq!(request.param("apikey"), Some("secret"));

        assert_eq!(response.status, 200);
        assert_eq!(response.body["count"], 42);
        assert_eq!(response.body["results"][0]["title"], "BTC breaks out");
        assert_eq!(response.body["next"], json!({ "page": "3", "size": "5" }));
        assert_eq!(response.body["previous"], json!({ "page": "1", "size": "5" }));
    }

    #[tokio::test]
    async fn test_defaults_and_null_links() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            "/crypto",
            json!({ "data": { "count": 0, "results": [], "next": null, "previous": null } }),
        );
        let relay = relay(transport.clone(), Some("secret"));

        let response = relay.handle(&HashMap::new()).await;

        let request = &transport.requests()[0];
        assert_eq!(request.param("page"), Some("1"));
        assert_eq!(request.param("size"), Some("6"));
        assert_eq!(response.status, 200);
        assert_eq!(response.body["next"], Value::Null);
        assert_eq!(response.body["previous"], Value::Null);
    }

    #[tokio::test]
    async fn test_null_count_reads_as_zero() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            "/crypto",
            json!({ "data": { "count": null, "results": [{ "title": "ETF flows" }] } }),
        );
        let relay = relay(transport, Some("secret"));

        let response = relay.handle(&HashMap::new()).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["count"], json!(0));
        assert_eq!(response.body["results"][0]["title"], "ETF flows");
    }

    #[tokio::test]
    async fn test_upstream_status_relayed_verbatim() {
        let transport = Arc::new(MockTransport::new());
        transport.push_status("/crypto", 429, "rate limited");
        let relay = relay(transport, Some("secret"));

        let response = relay.handle(&params(&[("page", "2"), ("size", "5")])).await;
        assert_eq!(response, RelayResponse::error(429, "Failed to fetch news"));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_internal_error() {
        let transport = Arc::new(MockTransport::new());
        let relay = relay(transport.clone(), None);

        let response = relay.handle(&params(&[("page", "2")])).await;
        assert_eq!(response.status, 500);
        assert_eq!(response.body["error"], "News API key is not configured");
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_params_are_internal_error() {
        let transport = Arc::new(MockTransport::new());
        let relay = relay(transport.clone(), Some("secret"));

        let response = relay.handle(&params(&[("page", "two")])).await;
        assert_eq!(response.status, 500);
        assert!(response.body["error"].as_str().unwrap().contains("page"));

        let response = relay.handle(&params(&[("size", "0")])).await;
        assert_eq!(response.status, 500);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_network_failure_and_bad_body() {
        let transport = Arc::new(MockTransport::new());
        transport.push_error("/crypto", ProviderError::NoResponse("connection reset".into()));
        transport.push_json("/crypto", json!({ "status": "ok" }));
        let relay = relay(transport, Some("secret"));

        let response = relay.handle(&HashMap::new()).await;
        assert_eq!(response, RelayResponse::error(500, "No response: connection reset"));

        let response = relay.handle(&HashMap::new()).await;
        assert_eq!(response.status, 500);
        assert!(response.body["error"]
            .as_str()
            .unwrap()
            .starts_with("Malformed news response"));
    }

    #[tokio::test]
    async fn test_fetch_page_typed() {
        let transport = Arc::new(MockTransport::new());
        transport.push_status("/crypto", 503, "");
        transport.push_json(
            "/crypto",
            json!({ "data": {
                "count": 1,
                "results": [{}],
                "next": "https://news.example.com/crypto?page=2"
            } }),
        );
        let relay = relay(transport, Some("secret"));

        let err = relay.fetch_page(1, 6).await.unwrap_err();
        assert_eq!(
            err,
            RelayError::Upstream(ProviderError::status(503, "Failed to fetch news"))
        );

        let page = relay.fetch_page(1, 6).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(
            page.next,
            Some(PageRef {
                page: Some("2".into()),
                size: None
            })
        );
        assert_eq!(page.previous, None);
    }
}
