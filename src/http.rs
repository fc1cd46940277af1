//! HTTP collaborators.
//!
//! - [`GoogleDirectionsProvider`]: Google Directions JSON API as a
//!   [`DirectionsProvider`], with retry and exponential backoff on 429,
//!   `OVER_QUERY_LIMIT` and transport errors
//! - [`HttpSamplePublisher`]: POSTs every trajectory sample as JSON to an
//!   endpoint, for consumers that want a live-looking feed

use base64::Engine;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::directions::{DirectionsOutcome, DirectionsProvider, TravelMode};
use crate::error::{Result, TrackError};
use crate::{FleetResult, GeoPoint, Route, TrajectorySample};

const DIRECTIONS_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const POLYLINE_PRECISION: u32 = 5;
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Directions API response (only the fields we read)
#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    routes: Vec<ApiRoute>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiRoute {
    overview_polyline: ApiPolyline,
}

#[derive(Debug, Deserialize)]
struct ApiPolyline {
    points: String,
}

/// Interpret a Directions API response body.
pub fn parse_directions(body: &str) -> DirectionsOutcome {
    let response: DirectionsResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return DirectionsOutcome::ApiError(format!("Parse error: {}", e)),
    };

    match response.status.as_str() {
        "OK" => {
            let Some(route) = response.routes.first() else {
                return DirectionsOutcome::NoPath;
            };
            match polyline::decode_polyline(&route.overview_polyline.points, POLYLINE_PRECISION) {
                Ok(line) => {
                    let route = Route::from(line);
                    if route.is_empty() {
                        DirectionsOutcome::NoPath
                    } else {
                        DirectionsOutcome::Found(route)
                    }
                }
                Err(e) => DirectionsOutcome::ApiError(format!("Polyline decode error: {}", e)),
            }
        }
        "ZERO_RESULTS" | "NOT_FOUND" => DirectionsOutcome::NoPath,
        status => match response.error_message {
            Some(message) => DirectionsOutcome::ApiError(format!("{}: {}", status, message)),
            None => DirectionsOutcome::ApiError(status.to_string()),
        },
    }
}

fn lat_lng(p: &GeoPoint) -> String {
    format!("{},{}", p.latitude, p.longitude)
}

fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| TrackError::ProviderError {
            message: format!("Failed to create HTTP client: {}", e),
            status_code: None,
        })
}

/// Google Directions API client.
pub struct GoogleDirectionsProvider {
    client: Client,
    api_key: String,
    base_url: String,
    backoff_base: Duration,
}

impl GoogleDirectionsProvider {
    /// Create a provider with the given API key
    pub fn new(api_key: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_key: api_key.to_string(),
            base_url: DIRECTIONS_URL.to_string(),
            backoff_base: BACKOFF_BASE,
        })
    }

    /// Point requests somewhere other than the public endpoint (proxies, stubs).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    /// First retry waits twice this long; each further retry doubles it.
    /// Default: 500ms
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    fn query(&self, origin: GeoPoint, destination: GeoPoint, mode: TravelMode) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("origin", lat_lng(&origin)),
            ("destination", lat_lng(&destination)),
            ("units", "metric".to_string()),
            ("key", self.api_key.clone()),
        ];
        match mode {
            TravelMode::Rail => {
                query.push(("mode", "transit".to_string()));
                query.push(("transit_mode", "rail".to_string()));
            }
            TravelMode::Driving => query.push(("mode", "driving".to_string())),
        }
        query
    }

    fn backoff(&self, retries: u32) -> Duration {
        // 1s, 2s, 4s, ... with the default base
        self.backoff_base * (1 << retries.min(4))
    }
}

impl DirectionsProvider for GoogleDirectionsProvider {
    async fn directions(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        mode: TravelMode,
    ) -> DirectionsOutcome {
        let query = self.query(origin, destination, mode);
        let mut retries = 0;

        loop {
            let response = self.client.get(&self.base_url).query(&query).send().await;

            let retry_reason = match response {
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => "429".to_string(),
                Ok(resp) if !resp.status().is_success() => {
                    return DirectionsOutcome::ApiError(format!("HTTP {}", resp.status()));
                }
                Ok(resp) => match resp.text().await {
                    Ok(body) => match parse_directions(&body) {
                        DirectionsOutcome::ApiError(message) if message.starts_with("OVER_QUERY_LIMIT") => message,
                        outcome => {
                            debug!("[GoogleDirections] {} request answered", mode);
                            return outcome;
                        }
                    },
                    Err(e) => format!("Body read error: {}", e.without_url()),
                },
                // The request URL carries the API key
                Err(e) => format!("Request error: {}", e.without_url()),
            };

            retries += 1;
            if retries > MAX_RETRIES {
                return DirectionsOutcome::ApiError(format!("Max retries exceeded ({})", retry_reason));
            }

            let backoff = self.backoff(retries);
            warn!(
                "[GoogleDirections] {} for {} request, retry {} after {:?}",
                retry_reason, mode, retries, backoff
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

/// JSON body posted for each sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePayload {
    pub train_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// RFC 3339
    pub timestamp: String,
}

impl SamplePayload {
    pub fn new(train_id: &str, sample: &TrajectorySample) -> Self {
        Self {
            train_id: train_id.to_string(),
            latitude: sample.position.latitude,
            longitude: sample.position.longitude,
            timestamp: sample.timestamp.to_rfc3339(),
        }
    }
}

/// Publishes samples to an HTTP endpoint, one POST per sample.
pub struct HttpSamplePublisher {
    client: Client,
    endpoint: String,
    auth_header: Option<String>,
}

impl HttpSamplePublisher {
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            endpoint: endpoint.to_string(),
            auth_header: None,
        })
    }

    /// Send HTTP basic credentials with every request.
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", username, password));
        self.auth_header = Some(format!("Basic {}", encoded));
        self
    }

    pub async fn publish_sample(&self, train_id: &str, sample: &TrajectorySample) -> Result<()> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&SamplePayload::new(train_id, sample));
        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth);
        }

        let resp = request.send().await.map_err(|e| TrackError::ProviderError {
            message: format!("Request error: {}", e.without_url()),
            status_code: None,
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TrackError::ProviderError {
                message: format!("Publish rejected for {}", train_id),
                status_code: Some(status.as_u16()),
            });
        }
        Ok(())
    }

    /// Post every sample of every trajectory, in time order per train.
    ///
    /// Returns the number of samples accepted. Failures are logged and skipped.
    pub async fn publish(&self, result: &FleetResult) -> usize {
        let mut accepted = 0;
        for trajectory in &result.trajectories {
            for sample in &trajectory.samples {
                match self.publish_sample(&trajectory.train_id, sample).await {
                    Ok(()) => accepted += 1,
                    Err(e) => warn!("[HttpSamplePublisher] {}", e),
                }
            }
        }

        info!(
            "[HttpSamplePublisher] Published {}/{} samples to {}",
            accepted,
            result.sample_count(),
            self.endpoint
        );
        accepted
    }
}
