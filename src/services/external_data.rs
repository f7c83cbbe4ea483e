use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use reqwest::Client;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::domain::Location;

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherInfo {
    pub condition: String,
    pub temperature: f64,
    pub impact_factor: f64,
}

/// Collects traffic factors, weather impact, and roadblock segments from
/// external providers. Backends are optional: with `use_mocks` (or when a
/// key/URL is missing, or after retries are exhausted) the service falls
/// back to seeded mock data so planning stays available.
pub struct ExternalDataService {
    settings: Settings,
    client: Client,
    use_mocks: bool,
    traffic_api_url: Option<String>,
    weather_api_url: Option<String>,
    roadblock_api_url: Option<String>,
    traffic_api_key: Option<String>,
    weather_api_key: Option<String>,
    mock_seed: u64,
}

impl ExternalDataService {
    pub fn new(
        settings: Settings,
        traffic_api_url: Option<String>,
        weather_api_url: Option<String>,
        roadblock_api_url: Option<String>,
        traffic_api_key: Option<String>,
        weather_api_key: Option<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(settings.api_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            settings,
            client,
            use_mocks: false,
            traffic_api_url,
            weather_api_url,
            roadblock_api_url,
            traffic_api_key,
            weather_api_key,
            mock_seed: 42,
        }
    }

    /// Mock-only service for tests and offline operation.
    pub fn mocked(settings: Settings) -> Self {
        Self {
            use_mocks: true,
            ..Self::new(settings, None, None, None, None, None)
        }
    }

    pub async fn get_traffic_data(
        &self,
        locations: &[Location],
    ) -> HashMap<(usize, usize), f64> {
        if self.use_mocks {
            return self.mock_traffic_data(locations);
        }
        let (Some(url), Some(key)) = (&self.traffic_api_url, &self.traffic_api_key) else {
            warn!("Traffic API not configured, falling back to mock data");
            return self.mock_traffic_data(locations);
        };

        let ids: Vec<&str> = locations.iter().map(|l| l.id.as_str()).collect();
        let params = [("location_ids", ids.join(","))];
        match self.request_json(url, &params, Some(key)).await {
            Some(body) if body["status"] == "success" => {
                let mut factors = HashMap::new();
                for entry in body["traffic_factors"].as_array().into_iter().flatten() {
                    let (from, to) = (
                        entry["from_idx"].as_u64(),
                        entry["to_idx"].as_u64(),
                    );
                    if let (Some(from), Some(to), Some(factor)) =
                        (from, to, entry["factor"].as_f64())
                    {
                        let (from, to) = (from as usize, to as usize);
                        if from < locations.len() && to < locations.len() && from != to {
                            factors.insert((from, to), factor);
                        }
                    }
                }
                info!("Processed {} traffic factors from API", factors.len());
                factors
            }
            _ => {
                warn!("Failed to fetch traffic data, falling back to mock data");
                self.mock_traffic_data(locations)
            }
        }
    }

    pub async fn get_weather_data(
        &self,
        locations: &[Location],
    ) -> HashMap<String, WeatherInfo> {
        if self.use_mocks {
            return self.mock_weather_data(locations);
        }
        let (Some(url), Some(key)) = (&self.weather_api_url, &self.weather_api_key) else {
            warn!("Weather API not configured, falling back to mock data");
            return self.mock_weather_data(locations);
        };

        let mut weather = HashMap::new();
        for location in locations {
            let params = [
                ("lat", location.latitude.to_string()),
                ("lon", location.longitude.to_string()),
                ("units", "metric".to_string()),
            ];
            match self.request_json(url, &params, Some(key)).await {
                Some(body) if body["status"] == "success" => {
                    let info = &body["weather"];
                    weather.insert(
                        location.id.clone(),
                        WeatherInfo {
                            condition: info["condition"].as_str().unwrap_or("Unknown").to_string(),
                            temperature: info["temperature_celsius"].as_f64().unwrap_or(0.0),
                            impact_factor: info["impact_factor"].as_f64().unwrap_or(1.0),
                        },
                    );
                }
                _ => {
                    warn!(
                        "Failed to fetch weather for location {}, using mock value",
                        location.id
                    );
                    let mock = self.mock_weather_data(std::slice::from_ref(location));
                    weather.extend(mock);
                }
            }
        }
        weather
    }

    pub async fn get_roadblock_data(&self, locations: &[Location]) -> Vec<(String, String)> {
        if self.use_mocks {
            return self.mock_roadblock_data(locations);
        }
        let Some(url) = &self.roadblock_api_url else {
            warn!("Roadblock API not configured, falling back to mock data");
            return self.mock_roadblock_data(locations);
        };
        if locations.is_empty() {
            return Vec::new();
        }

        let bbox = bounding_box(locations);
        let params = [("bbox", bbox)];
        match self.request_json(url, &params, None).await {
            Some(body) if body["status"] == "success" => {
                let mut blocks = Vec::new();
                for entry in body["roadblocks"].as_array().into_iter().flatten() {
                    if let (Some(from), Some(to)) = (
                        entry["from_location_id"].as_str(),
                        entry["to_location_id"].as_str(),
                    ) {
                        blocks.push((from.to_string(), to.to_string()));
                    }
                }
                info!("Processed {} roadblocks from API", blocks.len());
                blocks
            }
            _ => {
                warn!("Failed to fetch roadblock data, falling back to mock data");
                self.mock_roadblock_data(locations)
            }
        }
    }

    /// Per-arc weather impact: the max of the endpoint impact factors,
    /// reported only where it actually slows the arc down.
    pub fn calculate_weather_impact(
        &self,
        weather: &HashMap<String, WeatherInfo>,
        locations: &[Location],
    ) -> HashMap<(usize, usize), f64> {
        let mut impact = HashMap::new();
        for (i, from) in locations.iter().enumerate() {
            for (j, to) in locations.iter().enumerate() {
                if i == j {
                    continue;
                }
                let from_factor = weather.get(&from.id).map_or(1.0, |w| w.impact_factor);
                let to_factor = weather.get(&to.id).map_or(1.0, |w| w.impact_factor);
                let factor = from_factor.max(to_factor);
                if factor > 1.0 {
                    impact.insert((i, j), factor);
                }
            }
        }
        impact
    }

    /// Overlapping cells multiply; cells only present in the weather map
    /// are inserted as-is.
    pub fn combine_traffic_and_weather(
        traffic: &HashMap<(usize, usize), f64>,
        weather_impact: &HashMap<(usize, usize), f64>,
    ) -> HashMap<(usize, usize), f64> {
        let mut combined = traffic.clone();
        for (&cell, &factor) in weather_impact {
            combined
                .entry(cell)
                .and_modify(|existing| *existing *= factor)
                .or_insert(factor);
        }
        combined
    }

    /// GET with the same bounded retry/backoff discipline as the matrix
    /// builder: rate limits retry with exponential backoff, auth errors
    /// fail fast, anything else exhausts the retry budget.
    async fn request_json(
        &self,
        url: &str,
        params: &[(&str, String)],
        api_key: Option<&str>,
    ) -> Option<Value> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut request = self.client.get(url).query(params);
            if let Some(key) = api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.as_u16() == 429 {
                        if attempt >= self.settings.max_retries {
                            error!("Max retries reached for rate limit on {url}");
                            return None;
                        }
                        let delay = self.backoff_delay(attempt);
                        info!("Rate limit exceeded, retrying in {:.2}s", delay.as_secs_f64());
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    if status.as_u16() == 401 || status.as_u16() == 403 {
                        error!("Authentication error calling {url}, check API key");
                        return None;
                    }
                    if !status.is_success() {
                        error!("External API {url} returned HTTP {status}");
                        return None;
                    }
                    match response.json::<Value>().await {
                        Ok(body) => return Some(body),
                        Err(e) => {
                            error!("Failed to decode JSON response from {url}: {e}");
                            return None;
                        }
                    }
                }
                Err(e) => {
                    warn!("Request to {url} failed: {e}");
                    if attempt >= self.settings.max_retries {
                        error!("Max retries reached for {url}");
                        return None;
                    }
                    let delay = self.backoff_delay(attempt);
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

    fn mock_traffic_data(&self, locations: &[Location]) -> HashMap<(usize, usize), f64> {
        let n = locations.len();
        if n <= 1 {
            return HashMap::new();
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.mock_seed);
        let entries = (0.3 * (n * (n - 1)) as f64) as usize;
        let mut factors = HashMap::new();
        for _ in 0..entries {
            let from = rng.gen_range(0..n);
            let to = rng.gen_range(0..n);
            if from != to {
                factors.insert((from, to), 1.0 + rng.gen::<f64>());
            }
        }
        factors
    }

    fn mock_weather_data(&self, locations: &[Location]) -> HashMap<String, WeatherInfo> {
        const CONDITIONS: [(&str, f64); 5] = [
            ("Clear", 1.0),
            ("Cloudy", 1.0),
            ("Rain", 1.2),
            ("Snow", 1.5),
            ("Thunderstorm", 1.8),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(self.mock_seed);
        locations
            .iter()
            .map(|location| {
                let (condition, impact_factor) = CONDITIONS[rng.gen_range(0..CONDITIONS.len())];
                (
                    location.id.clone(),
                    WeatherInfo {
                        condition: condition.to_string(),
                        temperature: rng.gen_range(-5.0..35.0),
                        impact_factor,
                    },
                )
            })
            .collect()
    }

    fn mock_roadblock_data(&self, locations: &[Location]) -> Vec<(String, String)> {
        let n = locations.len();
        if n <= 1 {
            return Vec::new();
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.mock_seed);
        let count = ((0.05 * (n * (n - 1)) as f64) as usize).min(3);
        let mut roadblocks = Vec::new();
        for _ in 0..count {
            let a = rng.gen_range(0..n);
            let b = rng.gen_range(0..n);
            if a != b {
                roadblocks.push((locations[a].id.clone(), locations[b].id.clone()));
            }
        }
        roadblocks
    }
}

fn bounding_box(locations: &[Location]) -> String {
    let min_lat = locations.iter().map(|l| l.latitude).fold(f64::INFINITY, f64::min);
    let max_lat = locations.iter().map(|l| l.latitude).fold(f64::NEG_INFINITY, f64::max);
    let min_lon = locations.iter().map(|l| l.longitude).fold(f64::INFINITY, f64::min);
    let max_lon = locations.iter().map(|l| l.longitude).fold(f64::NEG_INFINITY, f64::max);
    format!("{min_lon},{min_lat},{max_lon},{max_lat}")
}
