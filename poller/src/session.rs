use crate::errors::{Error, Result};
use crate::metrics::{LOGINS_TOTAL, LOGIN_FAILURES_TOTAL};
use crate::model::{Credentials, LoginRequest, LoginResponse};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, error, info};

pub const DEFAULT_HOST: &str = "https://app.coreiot.io";
pub const LOGIN_PATH: &str = "/api/auth/login";

/// Connection state for one platform host: a pooled HTTP client plus the
/// credentials of the last successful login.
pub struct Session {
    host: String,
    http: reqwest::Client,
    credentials: Option<Credentials>,
}

impl Session {
    /// Without a `timeout` requests wait as long as the HTTP client allows.
    pub fn new(host: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let host = host.into().trim_end_matches('/').to_string();
        if host.is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            host,
            http: builder.build()?,
            credentials: None,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Credentials of the last successful login, if any.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    /// Logs in and replaces the stored credentials.
    ///
    /// On failure the previous credentials are kept and the error is logged;
    /// the caller decides whether to retry or give up.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<&Credentials> {
        match self.request_token(username, password).await {
            Ok(credentials) => {
                LOGINS_TOTAL.inc();
                info!("Login successful");
                let credentials: &Credentials = self.credentials.insert(credentials);
                Ok(credentials)
            }
            Err(e) => {
                LOGIN_FAILURES_TOTAL.inc();
                error!("Login failed: {}", e);
                Err(e)
            }
        }
    }

    async fn request_token(&self, username: &str, password: &str) -> Result<Credentials> {
        if username.is_empty() || password.is_empty() {
            return Err(Error::Config(
                "username and password must not be empty".to_string(),
            ));
        }

        debug!("Logging in to {} as {}", self.host, username);

        let response = self
            .http
            .post(self.url(LOGIN_PATH))
            .header(CONTENT_TYPE, "application/json")
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth { status, body });
        }

        let body = response.bytes().await?;
        let parsed: LoginResponse = serde_json::from_slice(&body)?;

        match parsed.token {
            Some(token) if !token.is_empty() => Ok(Credentials::new(token, parsed.refresh_token)),
            _ => Err(Error::MissingToken),
        }
    }
}
