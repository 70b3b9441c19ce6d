//! Shared HTTP client configuration for cloud requests.
//!
//! Provides the client factory and the retry policy applied to every
//! request sent to the identity provider and the device API.

use std::time::Duration;

use daikin_dump_core::Error;
use reqwest::{Client, RequestBuilder, Response};
use tracing::warn;

/// Default connect timeout (10 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// User agent sent with cloud requests
pub const USER_AGENT: &str = concat!("daikin_dump/", env!("CARGO_PKG_VERSION"));

/// Build a configured HTTP client for cloud requests.
///
/// The connect timeout never exceeds the overall communication timeout.
pub fn build_cloud_client(timeout: Duration) -> Result<Client, Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
        .build()
        .map_err(|e| Error::Network(format!("failed to create cloud HTTP client: {}", e)))
}

/// Whether a failed request is worth another attempt
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

/// Send a request, retrying up to `retries` more times on timeouts and
/// connection failures. Other errors are returned immediately.
pub async fn send_with_retries(
    request: RequestBuilder,
    retries: u32,
    what: &str,
) -> Result<Response, Error> {
    let mut attempt = 0;
    loop {
        let Some(this_attempt) = request.try_clone() else {
            // Streaming bodies cannot be replayed; send once.
            return request
                .send()
                .await
                .map_err(|e| Error::Network(format!("{} failed: {}", what, e)));
        };

        match this_attempt.send().await {
            Ok(response) => return Ok(response),
            Err(e) if is_transient(&e) && attempt < retries => {
                attempt += 1;
                warn!(attempt, retries, error = %e, "{} failed, retrying", what);
            }
            Err(e) => return Err(Error::Network(format!("{} failed: {}", what, e))),
        }
    }
}
