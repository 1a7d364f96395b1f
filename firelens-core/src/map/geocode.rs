//! Reverse geocoding of selected hotspots

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::config::GeocodingConfig;
use crate::error::{Error, Result};

/// Resolves a coordinate to a human-readable administrative region.
pub trait Geocoder: Send + Sync + 'static {
    /// `Ok(None)` when nothing matched the coordinate
    fn reverse_geocode(
        &self,
        longitude: f64,
        latitude: f64,
    ) -> impl Future<Output = Result<Option<String>>> + Send;
}

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    #[serde(default)]
    features: Vec<Place>,
}

#[derive(Debug, Deserialize)]
struct Place {
    #[serde(default)]
    context: Vec<PlaceContext>,
}

#[derive(Debug, Deserialize)]
struct PlaceContext {
    id: String,
    #[serde(default)]
    text: String,
}

impl Place {
    fn context_text(&self, kind: &str) -> &str {
        self.context
            .iter()
            .find(|c| c.id.contains(kind))
            .map(|c| c.text.as_str())
            .unwrap_or("")
    }

    /// `"{country} {region} {place}{locality}"`
    fn district(&self) -> String {
        format!(
            "{} {} {}{}",
            self.context_text("country"),
            self.context_text("region"),
            self.context_text("place"),
            self.context_text("locality"),
        )
    }
}

/// Mapbox places API client
#[derive(Clone)]
pub struct MapboxGeocoder {
    http_client: reqwest::Client,
    endpoint: String,
    access_token: String,
    language: String,
}

impl MapboxGeocoder {
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
        let access_token = config
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Config("geocoding.access_token is not set".to_string()))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            access_token,
            language: config.language.clone(),
        })
    }

    fn url_for(&self, longitude: f64, latitude: f64) -> String {
        format!(
            "{}/geocoding/v5/mapbox.places/{},{}.json?access_token={}&limit=1&language={}",
            self.endpoint,
            longitude,
            latitude,
            urlencoding::encode(&self.access_token),
            urlencoding::encode(&self.language),
        )
    }
}

impl Geocoder for MapboxGeocoder {
    fn reverse_geocode(
        &self,
        longitude: f64,
        latitude: f64,
    ) -> impl Future<Output = Result<Option<String>>> + Send {
        let url = self.url_for(longitude, latitude);
        let http_client = self.http_client.clone();

        async move {
            let response = http_client
                .get(&url)
                .send()
                .await
                .map_err(|e| Error::Geocoding(format!("request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(Error::Geocoding(format!("geocoding API error ({})", status)));
            }

            let places: PlacesResponse = response
                .json()
                .await
                .map_err(|e| Error::Geocoding(format!("invalid response: {}", e)))?;

            Ok(places.features.first().map(Place::district))
        }
    }
}
