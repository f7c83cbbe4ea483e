use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::constant::{API_MAX_ELEMENTS, MAX_SAFE_DISTANCE, MAX_SAFE_TIME};
use crate::config::Settings;
use crate::domain::Location;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("retries exhausted: {0}")]
    RetriesExhausted(String),
}

/// Client for the Google Distance Matrix API. Requests are batched so that
/// origins x destinations stays within the API element budget, and each
/// batch is retried with exponential backoff. Rate-limit responses retry;
/// auth failures fail fast so the caller can fall back immediately.
pub struct RoutingApiClient {
    client: Client,
    settings: Settings,
}

impl RoutingApiClient {
    pub fn new(settings: Settings) -> Self {
        let client = Client::builder()
            .timeout(settings.api_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, settings }
    }

    /// Fetches full NxN distance (km) and time (minutes) matrices for the
    /// given locations.
    pub async fn fetch_matrices(
        &self,
        locations: &[Location],
        api_key: &str,
    ) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>), ApiError> {
        if locations.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let addresses: Vec<String> = locations
            .iter()
            .map(|loc| format!("{},{}", loc.latitude, loc.longitude))
            .collect();

        // Batch origins so that each request stays within the element budget.
        let rows_per_batch = (API_MAX_ELEMENTS / addresses.len()).max(1);
        let batches: Vec<&[String]> = addresses.chunks(rows_per_batch).collect();
        info!(
            "Fetching distance matrix for {} locations in {} batches",
            addresses.len(),
            batches.len()
        );

        let futures = batches
            .iter()
            .map(|&origins| self.send_with_retry(origins, &addresses, api_key));
        let responses = join_all(futures).await;

        let mut distances = Vec::with_capacity(addresses.len());
        let mut times = Vec::with_capacity(addresses.len());
        for response in responses {
            let (dist_rows, time_rows) = process_response(response?);
            distances.extend(dist_rows);
            times.extend(time_rows);
        }

        Ok((distances, times))
    }

    async fn send_with_retry(
        &self,
        origins: &[String],
        destinations: &[String],
        api_key: &str,
    ) -> Result<MatrixResponse, ApiError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_request(origins, destinations, api_key).await {
                Ok(response) => match response.status.as_str() {
                    "OK" => return Ok(response),
                    "OVER_QUERY_LIMIT" => {
                        if attempt >= self.settings.max_retries {
                            return Err(ApiError::RetriesExhausted(
                                "rate limit retries exhausted".to_string(),
                            ));
                        }
                        let delay = self.backoff_delay(attempt);
                        info!("Rate limit exceeded, retrying in {:.2}s", delay.as_secs_f64());
                        tokio::time::sleep(delay).await;
                    }
                    "REQUEST_DENIED" => {
                        return Err(ApiError::Auth(
                            response
                                .error_message
                                .unwrap_or_else(|| "request denied".to_string()),
                        ))
                    }
                    other => {
                        return Err(ApiError::Request(format!(
                            "distance matrix API status {other}: {}",
                            response.error_message.as_deref().unwrap_or("unknown error")
                        )))
                    }
                },
                Err(e) => {
                    warn!("Distance matrix request failed: {e}");
                    if attempt >= self.settings.max_retries {
                        error!("Max retries reached, giving up on batch");
                        return Err(ApiError::RetriesExhausted(e.to_string()));
                    }
                    let delay = self.backoff_delay(attempt);
                    info!("Retrying in {:.2}s", delay.as_secs_f64());
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> std::time::Duration {
        self.settings
            .retry_delay
            .mul_f64(self.settings.backoff_factor.powi(attempt as i32 - 1))
    }

    async fn send_request(
        &self,
        origins: &[String],
        destinations: &[String],
        api_key: &str,
    ) -> Result<MatrixResponse, reqwest::Error> {
        let origins_param = origins.join("|");
        let destinations_param = destinations.join("|");
        self.client
            .get(&self.settings.google_maps_api_url)
            .query(&[
                ("units", "metric"),
                ("origins", origins_param.as_str()),
                ("destinations", destinations_param.as_str()),
                ("key", api_key),
            ])
            .send()
            .await?
            .json::<MatrixResponse>()
            .await
    }
}

/// Converts a response batch to km/minute rows. Elements that are not OK
/// substitute safe maxima instead of aborting the whole matrix.
fn process_response(response: MatrixResponse) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let mut distances = Vec::with_capacity(response.rows.len());
    let mut times = Vec::with_capacity(response.rows.len());

    for row in response.rows {
        let mut dist_row = Vec::with_capacity(row.elements.len());
        let mut time_row = Vec::with_capacity(row.elements.len());
        for element in row.elements {
            if element.status == "OK" {
                dist_row.push(element.distance.map_or(0.0, |d| d.value / 1000.0));
                time_row.push(element.duration.map_or(0.0, |d| d.value / 60.0));
            } else {
                warn!(
                    "Distance matrix element status {:?}, substituting safe maxima",
                    element.status
                );
                dist_row.push(MAX_SAFE_DISTANCE);
                time_row.push(MAX_SAFE_TIME);
            }
        }
        distances.push(dist_row);
        times.push(time_row);
    }

    (distances, times)
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    distance: Option<ValueField>,
    duration: Option<ValueField>,
}

#[derive(Debug, Deserialize)]
struct ValueField {
    value: f64,
}
