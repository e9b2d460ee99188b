mod telemetry;
mod tokens;

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telemetry::{generate_readings, Reading};
use tokens::TokenStore;
use tracing::{debug, error, info, warn};

/// Local stand-in for the platform's login and timeseries endpoints.
#[derive(Debug, Parser)]
#[command(name = "platform-sim", version, about)]
struct Args {
    #[arg(long, env = "SIM_ADDR", default_value = "127.0.0.1:8081")]
    addr: SocketAddr,

    #[arg(long, env = "SIM_USERNAME", default_value = "tenant@thingsboard.org")]
    username: String,

    #[arg(long, env = "SIM_PASSWORD", default_value = "tenant")]
    password: String,

    /// Lifetime of issued tokens; short values exercise client re-login
    #[arg(long, env = "SIM_TOKEN_TTL_SECS", default_value_t = 900)]
    token_ttl_secs: u64,
}

struct AppState {
    username: String,
    password: String,
    tokens: Mutex<TokenStore>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeseriesQuery {
    keys: String,
    start_ts: i64,
    end_ts: i64,
    limit: Option<usize>,
    use_strict_data_types: Option<bool>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting platform simulator");
    info!(
        "Listening on {}, user: {}, token TTL: {}s",
        args.addr, args.username, args.token_ttl_secs
    );

    let state = Arc::new(AppState {
        username: args.username,
        password: args.password,
        tokens: Mutex::new(TokenStore::new(Duration::from_secs(args.token_ttl_secs))),
    });

    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route(
            "/api/plugins/telemetry/DEVICE/:device_id/values/timeseries",
            get(timeseries),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to bind to {}: {}", args.addr, e);
            std::process::exit(1);
        });

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("HTTP server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
}

async fn login(State(state): State<Arc<AppState>>, Json(req): Json<LoginRequest>) -> Response {
    if req.username != state.username || req.password != state.password {
        warn!("Rejected login for {}", req.username);
        return platform_error(StatusCode::UNAUTHORIZED, "Invalid username or password", 10);
    }

    let Ok(mut store) = state.tokens.lock() else {
        return platform_error(StatusCode::INTERNAL_SERVER_ERROR, "Token store unavailable", 2);
    };
    let token = store.issue();
    let refresh_token = tokens::refresh_token();

    info!("Issued token for {}", req.username);
    Json(json!({"token": token, "refreshToken": refresh_token})).into_response()
}

async fn timeseries(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Query(query): Query<TimeseriesQuery>,
    headers: HeaderMap,
) -> Response {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let authorized = match (token, state.tokens.lock()) {
        (Some(token), Ok(tokens)) => tokens.is_valid(token),
        _ => false,
    };
    if !authorized {
        debug!("Rejected telemetry request for {}", device_id);
        return platform_error(StatusCode::UNAUTHORIZED, "Token has expired", 11);
    }

    let body = build_timeseries(&query);
    debug!(
        "Serving {} keys for device {} ({}..{})",
        body.len(),
        device_id,
        query.start_ts,
        query.end_ts
    );

    Json(body).into_response()
}

fn build_timeseries(query: &TimeseriesQuery) -> BTreeMap<String, Vec<Reading>> {
    let mut rng = rand::thread_rng();
    let limit = query.limit.unwrap_or(100);
    let strict = query.use_strict_data_types.unwrap_or(false);

    query
        .keys
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|key| {
            let readings =
                generate_readings(&mut rng, key, query.start_ts, query.end_ts, limit, strict);
            (key.to_string(), readings)
        })
        .collect()
}

fn platform_error(status: StatusCode, message: &str, error_code: u32) -> Response {
    (
        status,
        Json(json!({
            "status": status.as_u16(),
            "message": message,
            "errorCode": error_code,
            "timestamp": Utc::now().timestamp_millis(),
        })),
    )
        .into_response()
}
