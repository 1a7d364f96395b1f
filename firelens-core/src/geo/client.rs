//! HTTP client for the geo-query endpoint
//!
//! `GET {base_url}/api/map?minLat&maxLat&minLon&maxLon&<filters...>`

use std::future::Future;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::{Error, Result};

use super::viewport::ViewportQuery;

/// Anything that can answer a viewport query with a raw response body.
///
/// The body is returned undecoded so the synchronizer can decide whether the
/// shape is acceptable; shape errors are not transport errors.
pub trait FeatureSource: Send + Sync + 'static {
    fn fetch(
        &self,
        query: &ViewportQuery,
    ) -> impl Future<Output = Result<serde_json::Value>> + Send;
}

/// [`FeatureSource`] backed by the `/api/map` endpoint.
#[derive(Clone)]
pub struct HttpFeatureSource {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpFeatureSource {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("api.base_url is required".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Full request URL for a query
    pub fn url_for(&self, query: &ViewportQuery) -> String {
        format!("{}/api/map?{}", self.base_url, query.to_query_string())
    }
}

impl FeatureSource for HttpFeatureSource {
    fn fetch(
        &self,
        query: &ViewportQuery,
    ) -> impl Future<Output = Result<serde_json::Value>> + Send {
        let url = self.url_for(query);
        let http_client = self.http_client.clone();

        async move {
            tracing::debug!(url = %url, "Fetching hotspots");

            let response = http_client
                .get(&url)
                .send()
                .await
                .map_err(|e| Error::Http(format!("request failed: {}", e)))?;

            let status = response.status();

            if status.is_success() {
                response
                    .json::<serde_json::Value>()
                    .await
                    .map_err(|e| Error::MalformedResponse(format!("body is not JSON: {}", e)))
            } else {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                Err(Error::Http(format!("API error ({}): {}", status, error_text)))
            }
        }
    }
}
