//! Feed Store Health Check Background Job
//!
//! Pings Redis on a fixed interval so stale connections are noticed (and
//! re-established by the connection manager) between bursts of post events
//! rather than on the first write after a quiet period.

use crate::feed_store::FeedStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Failures in a row before the log level escalates to error.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

#[derive(Clone)]
pub struct StoreHealthConfig {
    pub enabled: bool,
    pub check_interval: Duration,
}

impl Default for StoreHealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: HEALTH_CHECK_INTERVAL,
        }
    }
}

pub async fn start_store_health_check(store: Arc<dyn FeedStore>, config: StoreHealthConfig) {
    if !config.enabled {
        tracing::info!("Feed store health check disabled by configuration");
        return;
    }

    tracing::info!(
        interval_secs = config.check_interval.as_secs(),
        "Starting feed store health check background job"
    );

    let mut consecutive_failures = 0;
    loop {
        sleep(config.check_interval).await;
        consecutive_failures = check_once(store.as_ref(), consecutive_failures).await;
    }
}

/// One PING; returns the updated consecutive failure count.
pub async fn check_once(store: &dyn FeedStore, consecutive_failures: u32) -> u32 {
    match store.ping().await {
        Ok(()) => {
            if consecutive_failures > 0 {
                tracing::info!(
                    previous_failures = consecutive_failures,
                    "Feed store connection recovered"
                );
            }
            tracing::debug!("Feed store health check: OK");
            0
        }
        Err(e) => {
            let failures = consecutive_failures + 1;
            if failures >= MAX_CONSECUTIVE_FAILURES {
                tracing::error!(
                    consecutive_failures = failures,
                    error = %e,
                    "Feed store health check: CRITICAL - multiple consecutive failures"
                );
            } else {
                tracing::warn!(
                    consecutive_failures = failures,
                    error = %e,
                    "Feed store health check: FAILED"
                );
            }
            failures
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakyStore {
        up: AtomicBool,
    }

    #[async_trait]
    impl FeedStore for FlakyStore {
        async fn push_front(&self, _key: &str, _value: &str) -> Result<usize, StoreError> {
            Ok(1)
        }

        async fn trim(&self, _key: &str, _start: isize, _stop: isize) -> Result<(), StoreError> {
            Ok(())
        }

        async fn range(
            &self,
            _key: &str,
            _start: isize,
            _stop: isize,
        ) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }

        async fn ping(&self) -> Result<(), StoreError> {
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(StoreError::Unavailable("connection refused".into()))
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = StoreHealthConfig::default();
        assert!(config.enabled);
        assert_eq!(config.check_interval, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_failures_accumulate_and_reset() {
        let store = FlakyStore {
            up: AtomicBool::new(false),
        };

        let failures = check_once(&store, 0).await;
        let failures = check_once(&store, failures).await;
        assert_eq!(failures, 2);

        store.up.store(true, Ordering::SeqCst);
        assert_eq!(check_once(&store, failures).await, 0);
    }

    #[tokio::test]
    async fn test_disabled_job_returns_immediately() {
        let store = Arc::new(FlakyStore {
            up: AtomicBool::new(true),
        });
        let config = StoreHealthConfig {
            enabled: false,
            ..StoreHealthConfig::default()
        };

        start_store_health_check(store, config).await;
    }
}
