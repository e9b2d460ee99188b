//! Polling client for a CoreIoT / ThingsBoard telemetry server.

pub mod config;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod poll;
pub mod session;
pub mod telemetry;
pub mod timefmt;

pub use errors::{Error, Result};
pub use model::{Credentials, DataPoint, TelemetryQuery, TimeseriesData};
pub use poll::{Backoff, LogSink, PollSettings, Poller, Step, TelemetrySink};
pub use session::Session;
pub use telemetry::fetch_telemetry;
pub use timefmt::{TimeBound, Zone};
