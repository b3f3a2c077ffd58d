//! HTTP fetch with retry and jittered exponential backoff.

use std::time::Duration;

use rand::Rng;
use reqwest::Client;

use vtrack_util::errors::VtrackError;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the shared reqwest client. Redirects are followed by default.
pub fn build_client() -> miette::Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(READ_TIMEOUT)
        .user_agent(concat!("vtrackd/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            VtrackError::Network {
                message: format!("Failed to create HTTP client: {e}"),
            }
            .into()
        })
}

/// Fetch a text resource.
///
/// Returns `Ok(None)` for 404. Transient conditions (5xx, connect errors,
/// timeouts) are retried with exponential backoff (500 ms initial, factor
/// 2, ±25 % jitter, 3 attempts); exhaustion or a terminal status yields an
/// error.
pub async fn fetch_text(client: &Client, url: &str) -> miette::Result<Option<String>> {
    let mut last_err = String::new();

    for attempt in 0..MAX_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(backoff_delay(attempt)).await;
        }

        match client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if status.is_server_error() {
                    last_err = format!("HTTP {status} from {url}");
                    continue;
                }
                if !status.is_success() {
                    return Err(VtrackError::Network {
                        message: format!("HTTP {status} fetching {url}"),
                    }
                    .into());
                }

                let body = resp.text().await.map_err(|e| VtrackError::Network {
                    message: format!("Failed to read response from {url}: {e}"),
                })?;
                return Ok(Some(body));
            }
            Err(e) if e.is_timeout() || e.is_connect() => {
                last_err = format!("{e}");
                continue;
            }
            Err(e) => {
                return Err(VtrackError::Network {
                    message: format!("Request to {url} failed: {e}"),
                }
                .into());
            }
        }
    }

    Err(VtrackError::Network {
        message: format!("Failed after {MAX_ATTEMPTS} attempts for {url}: {last_err}"),
    }
    .into())
}

/// Delay before the given retry attempt: `500ms * 2^(attempt-1)`, ±25 %
/// jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let base = INITIAL_BACKOFF * 2u32.saturating_pow(attempt.saturating_sub(1));
    let jitter: f64 = rand::rng().random_range(0.75..=1.25);
    base.mul_f64(jitter)
}
