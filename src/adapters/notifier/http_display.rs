//! HTTP client for the remote status display.
//!
//! The display exposes a single endpoint, `GET /display?text=<message>`, and
//! answers 200 once the text is shown. Delivery is retried a fixed number of times
//! without backoff; a display that stays unreachable never holds up a build for
//! longer than `max_attempts * timeout`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, error, warn};

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::NotifierConfig;
use crate::domain::ports::StatusNotifier;

const DISPLAY_PATH: &str = "/display";
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// [`StatusNotifier`] backed by the display's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpDisplayNotifier {
    http: Client,
    enabled: bool,
    base_url: String,
    timeout: Duration,
    max_attempts: u32,
}

impl HttpDisplayNotifier {
    pub fn new(config: &NotifierConfig) -> BuildResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("kernelwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BuildError::Notify(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            enabled: config.enabled,
            base_url: format!("http://{}", config.address.trim_end_matches('/')),
            timeout: Duration::from_secs(config.timeout_secs),
            max_attempts: config.max_attempts.max(1),
        })
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn attempt(&self, message: &str) -> Result<(), String> {
        let response = self
            .http
            .get(format!("{}{DISPLAY_PATH}", self.base_url))
            .query(&[("text", message)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(format!("display answered {status}")),
        }
    }
}

#[async_trait]
impl StatusNotifier for HttpDisplayNotifier {
    async fn notify(&self, message: &str) -> bool {
        if !self.enabled {
            return true;
        }

        for attempt in 1..=self.max_attempts {
            match self.attempt(message).await {
                Ok(()) => {
                    debug!(message, attempt, "display updated");
                    return true;
                }
                Err(e) => warn!(
                    message,
                    attempt,
                    max_attempts = self.max_attempts,
                    error = %e,
                    "display notification failed"
                ),
            }
        }

        error!(
            message,
            attempts = self.max_attempts,
            "giving up on display notification"
        );
        false
    }

    /// Any answer below 400 from the display root counts as online.
    async fn is_reachable(&self) -> bool {
        if !self.enabled {
            return false;
        }
        self.http
            .get(format!("{}/", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .is_ok_and(|r| !r.status().is_client_error() && !r.status().is_server_error())
    }
}
