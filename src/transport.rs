//! HTTP transport abstraction
//!
//! Everything that talks to the network goes through [`Transport`], so the
//! client and the news relay can be exercised against a scripted transport.

use crate::{
    constants::{REQUEST_TIMEOUT_SECS, USER_AGENT},
    error::ProviderError,
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Raw upstream reply: status code and body text
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Converts a non-success status into [`ProviderError::Status`]
    pub fn error_for_status(self) -> Result<Self, ProviderError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ProviderError::status(self.status, self.body))
        }
    }
}

/// Trait for HTTP GET transports
///
/// A response with any status code is `Ok`; `Err` means no usable response
/// was obtained (construction failure, connection failure or timeout).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues a GET request to `url` with the given query parameters
    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<TransportResponse, ProviderError>;

    /// Returns the name of this transport
    fn transport_name(&self) -> &'static str;
}

/// reqwest-backed transport with a fixed per-request timeout
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with the default timeout
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    /// Creates a transport whose attempts give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::setup(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<TransportResponse, ProviderError> {
        let request = self
            .client
            .get(url)
            .query(query)
            .build()
            .map_err(|e| ProviderError::setup(e.to_string()))?;

        tracing::debug!(url = %request.url(), "Sending request");

        let response = self.client.execute(request).await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(TransportResponse { status, body })
    }

    fn transport_name(&self) -> &'static str {
        "reqwest"
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    /// A recorded request
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedRequest {
        pub url: String,
        pub query: Vec<(String, String)>,
    }

    impl RecordedRequest {
        pub fn param(&self, name: &str) -> Option<&str> {
            self.query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        }
    }

    /// Scripted transport for testing
    ///
    /// Replies are queued per URL suffix and consumed in order; the last
    /// queued reply for a URL is repeated once the queue runs dry.
    #[derive(Default)]
    pub struct MockTransport {
        replies: Mutex<HashMap<String, VecDeque<Result<TransportResponse, ProviderError>>>>,
        requests: Mutex<Vec<RecordedRequest>>,
        delay: Option<Duration>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Adds a simulated network latency to every call
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn push_json(&self, path: &str, body: serde_json::Value) {
            self.push(path, Ok(TransportResponse::new(200, body.to_string())));
        }

        pub fn push_status(&self, path: &str, status: u16, body: &str) {
            self.push(path, Ok(TransportResponse::new(status, body)));
        }

        pub fn push_error(&self, path: &str, error: ProviderError) {
            self.push(path, Err(error));
        }

        pub fn push(&self, path: &str, reply: Result<TransportResponse, ProviderError>) {
            self.replies
                .lock()
                .unwrap()
                .entry(path.to_string())
                .or_default()
                .push_back(reply);
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        /// Number of calls whose URL ends with `path`
        pub fn calls_to(&self, path: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.url.ends_with(path))
                .count()
        }

        fn next_reply(&self, url: &str) -> Result<TransportResponse, ProviderError> {
            let mut replies = self.replies.lock().unwrap();
            // Longest matching suffix wins so "/search/trending" beats "/search".
            let key = replies
                .keys()
                .filter(|path| url.ends_with(path.as_str()))
                .max_by_key(|path| path.len())
                .cloned();

            match key.and_then(|k| replies.get_mut(&k)) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue
                    .front()
                    .cloned()
                    .unwrap_or_else(|| Ok(TransportResponse::new(404, "no reply scripted"))),
                None => Ok(TransportResponse::new(404, "no reply scripted")),
            }
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn get(
            &self,
            url: &str,
            query: &[(&str, String)],
        ) -> Result<TransportResponse, ProviderError> {
            self.requests.lock().unwrap().push(RecordedRequest {
                url: url.to_string(),
                query: query
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            });
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.next_reply(url)
        }

        fn transport_name(&self) -> &'static str {
            "mock"
        }
    }
}
