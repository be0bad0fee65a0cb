use std::fmt::Display;
use std::future::Future;

use tokio::time::{sleep, Duration};
use tracing::{error, warn};

use crate::config::settings::RetryConfig;
use crate::utils::constants::{
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS,
};

/// Caller-side retry with exponential backoff around token acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

impl From<Option<&RetryConfig>> for RetrySettings {
    fn from(config: Option<&RetryConfig>) -> Self {
        let defaults = Self::default();
        match config {
            None => defaults,
            Some(cfg) => Self {
                attempts: cfg.attempts.unwrap_or(defaults.attempts).max(1),
                base_delay_ms: cfg.base_delay_ms.unwrap_or(defaults.base_delay_ms),
                max_delay_ms: cfg.max_delay_ms.unwrap_or(defaults.max_delay_ms),
            },
        }
    }
}

impl RetrySettings {
    pub async fn run_with_retry<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.attempts.max(1);
        let mut delay = self.base_delay_ms;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    warn!("attempt {attempt}/{attempts} failed: {e}");
                    sleep(Duration::from_millis(delay)).await;
                    delay = delay.saturating_mul(2).min(self.max_delay_ms);
                    attempt += 1;
                }
                Err(e) => {
                    error!("all {attempt} attempts failed: {e}");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::AuthError;

    fn fast(attempts: u32) -> RetrySettings {
        RetrySettings {
            attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fast(3)
            .run_with_retry(move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AuthError::token_request_status(503, "busy"))
                } else {
                    Ok("token")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "token");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_error_after_all_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), AuthError> = fast(2)
            .run_with_retry(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AuthError::token_request_status(500, "down"))
            })
            .await;

        assert_eq!(result.unwrap_err().status(), Some(500));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn config_overrides_defaults() {
        let config = RetryConfig {
            attempts: Some(0),
            base_delay_ms: Some(50),
            max_delay_ms: None,
        };
        let settings = RetrySettings::from(Some(&config));
        assert_eq!(settings.attempts, 1);
        assert_eq!(settings.base_delay_ms, 50);
        assert_eq!(settings.max_delay_ms, DEFAULT_RETRY_MAX_DELAY_MS);
        assert_eq!(RetrySettings::from(None), RetrySettings::default());
    }
}
