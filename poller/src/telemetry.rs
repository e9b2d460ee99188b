use crate::errors::{Error, Result};
use crate::metrics::{
    FETCHES_TOTAL, FETCH_FAILURES_TOTAL, FETCH_LATENCY_SECONDS, POINTS_RECEIVED_TOTAL,
};
use crate::model::{Credentials, TelemetryQuery, TimeseriesData};
use crate::session::Session;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::Instant;
use tracing::{debug, error, info};

pub fn timeseries_path(device_id: &str) -> String {
    format!("/api/plugins/telemetry/DEVICE/{device_id}/values/timeseries")
}

/// Reads one page of timeseries values for `query.device_id`.
///
/// Text time bounds are converted before anything is sent, so a malformed
/// bound fails with [`Error::InvalidTimeFormat`] without a request. A 401
/// maps to [`Error::TokenExpired`] whatever the body says. No retries here;
/// the poll loop owns that.
pub async fn fetch_telemetry(
    session: &Session,
    credentials: &Credentials,
    query: &TelemetryQuery,
) -> Result<TimeseriesData> {
    let (start_ts, end_ts) = query.time_range().map_err(|e| {
        error!("Error converting time: {}", e);
        e
    })?;

    FETCHES_TOTAL.inc();
    let started = Instant::now();
    let result = send_query(session, credentials, query, start_ts, end_ts).await;
    FETCH_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());

    match &result {
        Ok(data) => {
            POINTS_RECEIVED_TOTAL.inc_by(data.point_count() as f64);
            info!(
                "Successfully retrieved telemetry for keys: {}",
                query.keys_param()
            );
            for key in data.keys() {
                debug!(
                    "Key {}: {} points",
                    key,
                    data.get(key).map_or(0, <[_]>::len)
                );
            }
        }
        Err(e) => {
            FETCH_FAILURES_TOTAL.with_label_values(&[e.kind()]).inc();
            debug!("Telemetry request failed: {}", e);
        }
    }

    result
}

async fn send_query(
    session: &Session,
    credentials: &Credentials,
    query: &TelemetryQuery,
    start_ts: i64,
    end_ts: i64,
) -> Result<TimeseriesData> {
    let url = session.url(&timeseries_path(&query.device_id));
    let params = [
        ("keys", query.keys_param()),
        ("startTs", start_ts.to_string()),
        ("endTs", end_ts.to_string()),
        ("interval", query.interval_ms.to_string()),
        ("limit", query.limit.to_string()),
        ("useStrictDataTypes", "false".to_string()),
    ];

    debug!("GET {} startTs={} endTs={}", url, start_ts, end_ts);

    let response = session
        .http()
        .get(url)
        .query(&params)
        .header(AUTHORIZATION, credentials.bearer())
        .header(CONTENT_TYPE, "application/json")
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::TokenExpired);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Request { status, body });
    }

    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}
