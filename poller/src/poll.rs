use crate::errors::{Error, Result};
use crate::metrics::NEXT_POLL_DELAY_SECONDS;
use crate::model::{TelemetryQuery, TimeseriesData};
use crate::session::Session;
use crate::telemetry::fetch_telemetry;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Receives every successfully fetched batch.
pub trait TelemetrySink {
    fn handle(&mut self, data: &TimeseriesData);
}

impl<F> TelemetrySink for F
where
    F: FnMut(&TimeseriesData),
{
    fn handle(&mut self, data: &TimeseriesData) {
        self(data)
    }
}

/// Default sink: logs a per-key summary and the raw payload at debug.
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn handle(&mut self, data: &TimeseriesData) {
        info!("Data retrieved successfully: {} points", data.point_count());
        for key in data.keys() {
            match data.latest(key) {
                Some(point) => info!("{}: latest value {} at {}", key, point.value, point.ts),
                None => info!("{}: no data in range", key),
            }
        }
        debug!("Data: {:?}", data);
    }
}

/// Bounded exponential backoff.
///
/// The delay after `n` consecutive failures is `base * 2^(n-1)`, capped at
/// [`MAX_BACKOFF`] (or at `base` when the poll interval is longer). A success
/// resets the delay to `base`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            max: MAX_BACKOFF.max(base),
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn on_success(&mut self) -> Duration {
        self.failures = 0;
        self.base
    }

    pub fn on_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let factor = 2_u32.saturating_pow(self.failures - 1);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Static inputs of the poll loop.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub username: String,
    pub password: String,
    pub query: TelemetryQuery,
    pub poll_interval: Duration,
}

/// What one iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fetched { points: usize },
    Reauthenticated,
    ReauthFailed,
    Failed,
}

impl Step {
    fn succeeded(self) -> bool {
        matches!(self, Step::Fetched { .. } | Step::Reauthenticated)
    }
}

/// Polls one device: fetch, hand off, sleep, with re-login on 401.
pub struct Poller<S> {
    session: Session,
    settings: PollSettings,
    sink: S,
    backoff: Backoff,
}

impl<S: TelemetrySink> Poller<S> {
    pub fn new(session: Session, settings: PollSettings, sink: S) -> Self {
        let backoff = Backoff::new(settings.poll_interval);
        Self {
            session,
            settings,
            sink,
            backoff,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Checks the time range and logs in once. Either failing is fatal.
    pub async fn start(&mut self) -> Result<()> {
        let (start_ts, end_ts) = self.settings.query.time_range().map_err(|e| {
            error!("{}", e);
            e
        })?;
        info!(
            "Polling device {} keys [{}] from {} to {} every {:?}",
            self.settings.query.device_id,
            self.settings.query.keys_param(),
            start_ts,
            end_ts,
            self.settings.poll_interval
        );

        if let Err(e) = self
            .session
            .login(&self.settings.username, &self.settings.password)
            .await
        {
            error!("Failed to login. Exiting.");
            return Err(e);
        }
        Ok(())
    }

    /// Runs a single fetch and reacts to its outcome.
    ///
    /// Only fatal errors are returned; everything else is logged and
    /// reported as a [`Step`].
    pub async fn step(&mut self) -> Result<Step> {
        let result = match self.session.credentials() {
            Some(credentials) => {
                fetch_telemetry(&self.session, credentials, &self.settings.query).await
            }
            None => {
                return Err(Error::Config(
                    "cannot poll before a successful login".to_string(),
                ))
            }
        };

        match result {
            Ok(data) => {
                self.sink.handle(&data);
                Ok(Step::Fetched {
                    points: data.point_count(),
                })
            }
            Err(Error::TokenExpired) => {
                warn!("Token expired. Attempting to login again.");
                match self
                    .session
                    .login(&self.settings.username, &self.settings.password)
                    .await
                {
                    Ok(_) => Ok(Step::Reauthenticated),
                    Err(_) => Ok(Step::ReauthFailed),
                }
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!("Error: {}", e);
                Ok(Step::Failed)
            }
        }
    }

    /// Delay to wait after `step` before the next fetch.
    pub fn delay_after(&mut self, step: Step) -> Duration {
        let delay = if step.succeeded() {
            self.backoff.on_success()
        } else {
            let delay = self.backoff.on_failure();
            warn!(
                "{} consecutive failures, backing off for {:?}",
                self.backoff.failures(),
                delay
            );
            delay
        };

        NEXT_POLL_DELAY_SECONDS.set(delay.as_secs_f64());
        delay
    }

    /// Logs in, then polls until `shutdown` resolves or a fatal error occurs.
    ///
    /// `shutdown` is observed both while a request is in flight and while
    /// sleeping between iterations.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tokio::select! {
            _ = &mut shutdown => {
                info!("Program terminated by user");
                return Ok(());
            }
            started = self.start() => started?,
        }

        loop {
            let step = tokio::select! {
                _ = &mut shutdown => break,
                step = self.step() => step?,
            };

            let delay = self.delay_after(step);
            debug!("Next poll in {:?}", delay);

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Program terminated by user");
        Ok(())
    }
}
