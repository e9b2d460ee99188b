use rand::Rng;
use serde::Serialize;

/// Spacing between generated readings.
pub const SAMPLE_PERIOD_MS: i64 = 60_000;

#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub ts: i64,
    pub value: serde_json::Value,
}

/// Generates readings for `key` in `[start_ts, end_ts]`, newest first, at
/// most `limit` of them.
pub fn generate_readings(
    rng: &mut impl Rng,
    key: &str,
    start_ts: i64,
    end_ts: i64,
    limit: usize,
    strict_types: bool,
) -> Vec<Reading> {
    if end_ts < start_ts || limit == 0 {
        return Vec::new();
    }

    // Align to the sample grid so repeated polls see stable timestamps.
    let Some(newest) = end_ts.checked_sub(end_ts.rem_euclid(SAMPLE_PERIOD_MS)) else {
        return Vec::new();
    };

    let mut readings = Vec::with_capacity(limit.min(1024));
    let mut ts = newest;
    while ts >= start_ts && readings.len() < limit {
        let value = sample(rng, key);
        let value = if strict_types {
            serde_json::json!(value)
        } else {
            serde_json::Value::String(format!("{:.2}", value))
        };
        readings.push(Reading { ts, value });
        match ts.checked_sub(SAMPLE_PERIOD_MS) {
            Some(next) => ts = next,
            None => break,
        }
    }

    readings
}

fn sample(rng: &mut impl Rng, key: &str) -> f64 {
    match key {
        "temperature" => {
            if rng.gen_bool(0.05) {
                rng.gen_range(-50.0..100.0) // 5% outliers
            } else {
                rng.gen_range(15.0..35.0)
            }
        }
        "humidity" => {
            if rng.gen_bool(0.05) {
                rng.gen_range(0.0..100.0)
            } else {
                rng.gen_range(30.0..80.0)
            }
        }
        "battery" => {
            if rng.gen_bool(0.02) {
                rng.gen_range(0.0..20.0) // low battery
            } else {
                rng.gen_range(20.0..100.0)
            }
        }
        _ => rng.gen_range(0.0..100.0),
    }
}
