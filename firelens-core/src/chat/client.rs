//! Transport for the streaming chat endpoint
//!
//! `POST {base_url}/api/chat` with `{query, user}`; the response body is an
//! event stream consumed chunk by chunk.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Serialize;

use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// Body of a chat request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub query: String,
    pub user: String,
}

/// Raw response body chunks
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Opens a response stream for a chat request.
pub trait ChatTransport: Send + Sync + 'static {
    fn open(&self, request: &ChatRequest) -> impl Future<Output = Result<ChatStream>> + Send;
}

/// [`ChatTransport`] backed by the `/api/chat` endpoint.
#[derive(Clone)]
pub struct HttpChatClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpChatClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("api.base_url is required".to_string()));
        }

        // Streams run as long as the model talks; only bound the connect.
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

impl ChatTransport for HttpChatClient {
    fn open(&self, request: &ChatRequest) -> impl Future<Output = Result<ChatStream>> + Send {
        let url = self.endpoint();
        let http_client = self.http_client.clone();
        let request = request.clone();

        async move {
            tracing::debug!(url = %url, user = %request.user, "Opening chat stream");

            let response = http_client
                .post(&url)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .json(&request)
                .send()
                .await
                .map_err(|e| Error::Http(format!("request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(Error::Http(format!("API error ({}): {}", status, error_text)));
            }

            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| Error::Http(format!("stream read failed: {}", e))));
            Ok(Box::pin(stream) as ChatStream)
        }
    }
}
