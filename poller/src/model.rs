use crate::errors::Result;
use crate::timefmt::{TimeBound, Zone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_LIMIT: u32 = 1000;
pub const DEFAULT_AGGREGATION_INTERVAL_MS: u64 = 0;

/// Bearer credentials issued by a successful login.
///
/// Only [`crate::session::Session::login`] constructs these, so holding a
/// `&Credentials` proves a login succeeded.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_token: String,
    refresh_token: Option<String>,
}

impl Credentials {
    pub(crate) fn new(access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Login endpoint request body
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Login endpoint response body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Parameters of one timeseries read for a single device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryQuery {
    pub device_id: String,
    pub keys: Vec<String>,
    pub start: TimeBound,
    pub end: TimeBound,
    pub limit: u32,
    pub interval_ms: u64,
    /// Zone for text time bounds.
    pub zone: Zone,
}

impl TelemetryQuery {
    pub fn new(
        device_id: impl Into<String>,
        keys: impl Into<Keys>,
        start: impl Into<TimeBound>,
        end: impl Into<TimeBound>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            keys: keys.into().0,
            start: start.into(),
            end: end.into(),
            limit: DEFAULT_LIMIT,
            interval_ms: DEFAULT_AGGREGATION_INTERVAL_MS,
            zone: Zone::Local,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.zone = zone;
        self
    }

    /// Resolves both bounds to epoch milliseconds.
    pub fn time_range(&self) -> Result<(i64, i64)> {
        Ok((self.start.to_millis(self.zone)?, self.end.to_millis(self.zone)?))
    }

    pub fn keys_param(&self) -> String {
        self.keys.join(",")
    }
}

/// Telemetry key list, accepted either as a list or as `"a,b,c"`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Keys(pub Vec<String>);

impl From<&str> for Keys {
    fn from(s: &str) -> Self {
        Keys(
            s.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

impl From<String> for Keys {
    fn from(s: String) -> Self {
        Keys::from(s.as_str())
    }
}

impl From<Vec<String>> for Keys {
    fn from(keys: Vec<String>) -> Self {
        Keys(keys)
    }
}

/// A single reading. Values arrive as strings unless strict typing is on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub ts: i64,
    pub value: serde_json::Value,
}

/// Timeseries response: key -> readings, in the order the platform sent them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeseriesData(pub BTreeMap<String, Vec<DataPoint>>);

impl TimeseriesData {
    pub fn get(&self, key: &str) -> Option<&[DataPoint]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn point_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Newest reading for `key`, by timestamp.
    pub fn latest(&self, key: &str) -> Option<&DataPoint> {
        self.0.get(key)?.iter().max_by_key(|p| p.ts)
    }

    pub fn is_empty(&self) -> bool {
        self.point_count() == 0
    }
}
