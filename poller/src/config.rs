use crate::errors::{Error, Result};
use crate::model::{Keys, TelemetryQuery};
use crate::poll::{PollSettings, DEFAULT_POLL_INTERVAL};
use crate::session::DEFAULT_HOST;
use crate::timefmt::{TimeBound, Zone};
use clap::Parser;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Polls one device's timeseries from a CoreIoT / ThingsBoard server.
#[derive(Debug, Clone, Parser)]
#[command(name = "coreiot-poller", version, about, args_override_self = true)]
pub struct Config {
    /// Platform base URL
    #[arg(long, env = "COREIOT_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    #[arg(long, env = "COREIOT_USERNAME")]
    pub username: String,

    #[arg(long, env = "COREIOT_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Device UUID
    #[arg(long, env = "DEVICE_ID")]
    pub device_id: String,

    /// Comma-separated telemetry keys
    #[arg(long, env = "TELEMETRY_KEYS", default_value = "temperature")]
    pub keys: String,

    /// Range start: epoch milliseconds or "DD-MM-YYYY HH:MM:SS"
    #[arg(long, env = "START_TIME", value_parser = TimeBound::from_str)]
    pub start: TimeBound,

    /// Range end: epoch milliseconds or "DD-MM-YYYY HH:MM:SS"
    #[arg(long, env = "END_TIME", value_parser = TimeBound::from_str)]
    pub end: TimeBound,

    /// Maximum points per key
    #[arg(long, env = "TELEMETRY_LIMIT", default_value_t = crate::model::DEFAULT_LIMIT)]
    pub limit: u32,

    /// Aggregation interval in milliseconds, 0 for raw values
    #[arg(long, env = "AGGREGATION_INTERVAL_MS", default_value_t = crate::model::DEFAULT_AGGREGATION_INTERVAL_MS)]
    pub aggregation_interval_ms: u64,

    /// Zone of text time bounds: local, utc or +HH:MM
    #[arg(long, env = "TELEMETRY_TZ", default_value = "local")]
    pub timezone: Zone,

    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    pub poll_interval_secs: u64,

    /// Per-request timeout; unset leaves the HTTP client default
    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(Error::Config(
                "username and password must not be empty".to_string(),
            ));
        }

        Uuid::parse_str(&self.device_id).map_err(|e| {
            Error::Config(format!("device id {:?} is not a UUID: {}", self.device_id, e))
        })?;

        if Keys::from(self.keys.as_str()).0.is_empty() {
            return Err(Error::Config("at least one telemetry key is required".to_string()));
        }

        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll interval must be at least 1s".to_string()));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn query(&self) -> TelemetryQuery {
        TelemetryQuery::new(
            self.device_id.clone(),
            self.keys.as_str(),
            self.start.clone(),
            self.end.clone(),
        )
        .with_limit(self.limit)
        .with_interval_ms(self.aggregation_interval_ms)
        .with_zone(self.timezone)
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            username: self.username.clone(),
            password: self.password.clone(),
            query: self.query(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }
}
