use std::sync::Arc;
use std::time::{Duration, Instant};

use calgpt_core::config::BridgeConfig;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::error::BridgeError;

/// RAII guard for one subprocess slot. Dropping it frees the slot.
pub struct Permit {
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
    waited: Duration,
}

impl Permit {
    /// How long the caller queued before the slot was granted.
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("waited", &self.waited)
            .finish()
    }
}

/// Bounds the number of answering processes running at once.
///
/// Callers queue for a slot for at most `queue_timeout`; past that they get
/// [`BridgeError::Saturated`] instead of piling up more subprocesses.
#[derive(Debug, Clone)]
pub struct Admission {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    queue_timeout: Duration,
}

impl Admission {
    pub fn new(capacity: usize, queue_timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            queue_timeout,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.max_concurrent, config.queue_timeout())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots free right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a free slot, up to the queue timeout.
    pub async fn acquire(&self) -> Result<Permit, BridgeError> {
        let started = Instant::now();
        let acquire = self.semaphore.clone().acquire_owned();
        match tokio::time::timeout(self.queue_timeout, acquire).await {
            Ok(Ok(permit)) => {
                let waited = started.elapsed();
                debug!(
                    waited_ms = waited.as_millis() as u64,
                    available = self.available(),
                    "Admitted query"
                );
                Ok(Permit { permit, waited })
            }
            Ok(Err(_closed)) => Err(BridgeError::Saturated),
            Err(_) => {
                warn!(
                    capacity = self.capacity,
                    queue_timeout_ms = self.queue_timeout.as_millis() as u64,
                    "Query admission timed out"
                );
                Err(BridgeError::Saturated)
            }
        }
    }

    /// Take a slot only if one is free immediately.
    pub fn try_acquire(&self) -> Result<Permit, BridgeError> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .map(|permit| Permit {
                permit,
                waited: Duration::ZERO,
            })
            .map_err(|_| BridgeError::Saturated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_within_capacity() {
        let admission = Admission::new(2, Duration::from_millis(50));
        let a = admission.acquire().await.unwrap();
        let b = admission.acquire().await.unwrap();
        assert_eq!(admission.available(), 0);
        drop(a);
        assert_eq!(admission.available(), 1);
        drop(b);
        assert_eq!(admission.available(), 2);
    }

    #[tokio::test]
    async fn test_saturated_after_queue_timeout() {
        let admission = Admission::new(1, Duration::from_millis(50));
        let _held = admission.acquire().await.unwrap();
        let err = admission.acquire().await.unwrap_err();
        assert!(matches!(err, BridgeError::Saturated));
    }

    #[tokio::test]
    async fn test_queued_caller_admitted_when_slot_frees() {
        let admission = Admission::new(1, Duration::from_secs(5));
        let held = admission.acquire().await.unwrap();

        let waiter = {
            let admission = admission.clone();
            tokio::spawn(async move { admission.acquire().await.map(|p| p.waited()) })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(held);

        let waited = waiter.await.unwrap().unwrap();
        assert!(waited >= Duration::from_millis(20));
    }

    #[test]
    fn test_try_acquire() {
        let admission = Admission::new(1, Duration::from_secs(1));
        let permit = admission.try_acquire().unwrap();
        assert_eq!(permit.waited(), Duration::ZERO);
        assert!(matches!(
            admission.try_acquire(),
            Err(BridgeError::Saturated)
        ));
        drop(permit);
        assert!(admission.try_acquire().is_ok());
    }

    #[test]
    fn test_from_config() {
        let config = BridgeConfig {
            max_concurrent: 3,
            queue_timeout_secs: 9,
            ..BridgeConfig::default()
        };
        let admission = Admission::from_config(&config);
        assert_eq!(admission.capacity(), 3);
        assert_eq!(admission.available(), 3);
        assert_eq!(admission.queue_timeout, Duration::from_secs(9));
    }
}
