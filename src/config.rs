use std::env;
use std::time::Duration;

pub mod constant {
    /// Converts floating-point kilometres to the solver's integer cost units.
    pub const DISTANCE_SCALING_FACTOR: f64 = 100.0;
    /// Converts floating-point capacities/demands to integer units.
    pub const CAPACITY_SCALING_FACTOR: f64 = 100.0;
    /// Converts minutes to seconds for the time dimension.
    pub const TIME_SCALING_FACTOR: f64 = 60.0;

    /// Maximum safe distance value in kilometres; anything above (or
    /// non-finite) is clamped here during sanitization.
    pub const MAX_SAFE_DISTANCE: f64 = 1e6;
    /// Maximum safe time value in minutes (24 hours).
    pub const MAX_SAFE_TIME: f64 = 24.0 * 60.0;
    /// Traffic factors are clamped to 1.0..=MAX_SAFE_TRAFFIC_FACTOR.
    pub const MAX_SAFE_TRAFFIC_FACTOR: f64 = 5.0;

    /// Per-vehicle bound on total route duration, in minutes.
    pub const MAX_ROUTE_DURATION_MIN: f64 = 24.0 * 60.0;
    /// Per-vehicle bound on total route distance, in kilometres.
    pub const MAX_ROUTE_DISTANCE_KM: f64 = 5000.0;
    /// Weight of the max-span term in the solver objective. Higher values
    /// prioritize balancing work across vehicles.
    pub const GLOBAL_SPAN_COST_COEFFICIENT: i64 = 100;
    /// Waiting allowed at a stop before a time window opens, in minutes.
    pub const TIME_WINDOW_SLACK_MIN: f64 = 60.0;
    /// Travel speed assumed when estimating times from distances.
    pub const DEFAULT_SPEED_KMH: f64 = 50.0;

    pub const EARTH_RADIUS_KM: f64 = 6371.0;

    /// Element budget (origins x destinations) per Distance Matrix request.
    pub const API_MAX_ELEMENTS: usize = 100;

    pub const PRIORITY_LOW: i32 = 1;
    pub const PRIORITY_NORMAL: i32 = 2;
    pub const PRIORITY_HIGH: i32 = 3;
    pub const PRIORITY_URGENT: i32 = 4;
    pub const DEFAULT_DELIVERY_PRIORITY: i32 = PRIORITY_NORMAL;
}

/// Runtime configuration, loaded once from the environment and passed
/// explicitly into the services that need it.
#[derive(Debug, Clone)]
pub struct Settings {
    pub google_maps_api_key: Option<String>,
    pub google_maps_api_url: String,
    pub use_api_by_default: bool,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub retry_delay: Duration,
    pub api_timeout: Duration,
    pub cache_expiry_days: i64,
    pub result_cache_timeout: Duration,
    pub solver_time_limit: Duration,
    pub database_url: String,
    pub service_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            google_maps_api_key: None,
            google_maps_api_url: "https://maps.googleapis.com/maps/api/distancematrix/json"
                .to_string(),
            use_api_by_default: false,
            max_retries: 3,
            backoff_factor: 2.0,
            retry_delay: Duration::from_secs(1),
            api_timeout: Duration::from_secs(10),
            cache_expiry_days: 30,
            result_cache_timeout: Duration::from_secs(3600),
            solver_time_limit: Duration::from_secs(30),
            database_url: "sqlite:route_optimizer.sqlite".to_string(),
            service_port: 8080,
        }
    }
}

impl Settings {
    /// Reads settings from the environment, falling back to defaults for
    /// anything unset or unparseable. Call `dotenv().ok()` first if a
    /// `.env` file should be honoured.
    pub fn from_env() -> Self {
        let defaults = Settings::default();

        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            env::var(name).ok().and_then(|raw| match raw.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring unparseable {} value: {:?}", name, raw);
                    None
                }
            })
        }

        Settings {
            google_maps_api_key: env::var("GOOGLE_MAPS_API_KEY").ok().filter(|k| !k.is_empty()),
            google_maps_api_url: env::var("GOOGLE_MAPS_API_URL")
                .unwrap_or(defaults.google_maps_api_url),
            use_api_by_default: env::var("USE_API_BY_DEFAULT")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.use_api_by_default),
            max_retries: parsed("MAX_RETRIES").unwrap_or(defaults.max_retries),
            backoff_factor: parsed("BACKOFF_FACTOR").unwrap_or(defaults.backoff_factor),
            retry_delay: parsed::<f64>("RETRY_DELAY_SECONDS")
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.retry_delay),
            api_timeout: defaults.api_timeout,
            cache_expiry_days: parsed("CACHE_EXPIRY_DAYS").unwrap_or(defaults.cache_expiry_days),
            result_cache_timeout: parsed::<u64>("OPTIMIZATION_RESULT_CACHE_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.result_cache_timeout),
            solver_time_limit: parsed::<u64>("SOLVER_TIME_LIMIT_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.solver_time_limit),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| {
                tracing::warn!("DATABASE_URL not set, using default SQLite file");
                defaults.database_url
            }),
            service_port: parsed("SERVICE_PORT").unwrap_or(defaults.service_port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.backoff_factor, 2.0);
        assert_eq!(settings.retry_delay, Duration::from_secs(1));
        assert_eq!(settings.cache_expiry_days, 30);
        assert_eq!(settings.result_cache_timeout, Duration::from_secs(3600));
        assert!(!settings.use_api_by_default);
    }
}
