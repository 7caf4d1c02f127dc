//! HTTP client utilities.
//!
//! Provides the client used to reach the price source.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, Url};

use crate::error::{Result, SurfError};

/// Default timeout for HTTP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("cloudsurf/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SurfError::Network(e.to_string()))
}

/// Get or create a default HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn default_client() -> Result<Client> {
    build_client(DEFAULT_TIMEOUT)
}

/// Fetch JSON from a URL.
///
/// `timeout` is only used to describe a timed-out request; the client's own
/// timeout applies.
///
/// # Errors
///
/// Returns error on network failure, a non-success status, or JSON parse failure.
pub async fn fetch_json<T: serde::de::DeserializeOwned>(
    client: &Client,
    url: Url,
    timeout: Duration,
) -> Result<T> {
    let shown = redact_query(&url);
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                SurfError::Timeout(timeout.as_secs())
            } else {
                SurfError::Network(e.without_url().to_string())
            }
        })?;

    if !response.status().is_success() {
        return Err(SurfError::Network(format!(
            "HTTP {} from {shown}",
            response.status()
        )));
    }

    response
        .json()
        .await
        .map_err(|e| SurfError::Network(format!("invalid JSON from {shown}: {}", e.without_url())))
}

/// URL without its query string, so API keys never reach logs or errors.
fn redact_query(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}
