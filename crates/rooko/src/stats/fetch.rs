// HTTP access to the chess.com published-data API.
//
// The aggregator only ever needs "GET this URL and give me JSON", so the
// network sits behind a one-method trait. `HttpFetcher` is the reqwest
// implementation; tests plug in canned responses.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to decode JSON from {url}: {message}")]
    Decode { url: String, message: String },
}

impl FetchError {
    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_decode() {
            FetchError::Decode {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fetcher trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait JsonFetcher: Send + Sync {
    /// GET `url` and decode the body as JSON. Non-2xx responses are errors.
    async fn get_json(&self, url: &str) -> Result<Value, FetchError>;
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

/// Identifies this client to chess.com, as their API guidelines ask.
pub fn user_agent(username: &str, email: &str) -> String {
    format!(
        "Rooko/{} (username:{username}; contact:{email})",
        env!("CARGO_PKG_VERSION")
    )
}

pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client that sends `user_agent` on every request and gives up
    /// on any single request after `timeout`.
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            &user_agent(&config.player.username, &config.player.email),
            Duration::from_secs(config.api.timeout_secs),
        )
    }
}

#[async_trait]
impl JsonFetcher for HttpFetcher {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))
    }
}
