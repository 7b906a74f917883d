//! HTTP reachability check for a freshly started endpoint

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Verification options
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Requests before giving up
    pub attempts: u32,

    /// Backoff between requests
    pub cooldown: CooldownOptions,

    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            attempts: 10,
            cooldown: CooldownOptions {
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(5),
                multiplier: 2.0,
            },
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Wait until `url` answers with anything but a server error
///
/// Returns the HTTP status that was observed. Exhausting the attempts is a
/// run failure of `container`.
pub async fn verify_endpoint(
    url: &str,
    container: &str,
    options: &VerifyOptions,
) -> Result<u16, DeployError> {
    let client = reqwest::Client::builder()
        .timeout(options.request_timeout)
        .build()
        .map_err(|e| DeployError::Config(format!("unable to create HTTP client: {}", e)))?;

    let attempts = options.attempts.max(1);
    let mut last_failure = String::new();

    for attempt in 0..attempts {
        match client.get(url).send().await {
            Ok(response) if !response.status().is_server_error() => {
                let status = response.status().as_u16();
                info!("{} answered with HTTP {}", url, status);
                return Ok(status);
            }
            Ok(response) => {
                last_failure = format!("HTTP {}", response.status().as_u16());
            }
            Err(e) => {
                last_failure = e.to_string();
            }
        }
        debug!(
            "{} not ready (attempt {}/{}): {}",
            url,
            attempt + 1,
            attempts,
            last_failure
        );

        if attempt + 1 < attempts {
            tokio::time::sleep(calc_exp_backoff(&options.cooldown, attempt)).await;
        }
    }

    warn!("{} never became ready", url);
    Err(DeployError::Run {
        container: container.to_string(),
        message: format!(
            "{} not reachable after {} attempts: {}",
            url, attempts, last_failure
        ),
    })
}
