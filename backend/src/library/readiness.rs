//! Library readiness gate
//!
//! The library host loads asynchronously. Before an orchestrator can be built
//! the bootstrap waits, polling at a fixed interval, until the library reports
//! itself present or the timeout elapses.

use super::MessagingLibrary;
use crate::config::ReadinessConfig;
use crate::error::SessionError;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Presence probe for a messaging library
///
/// Returns the library once it has finished loading, `None` until then.
/// Probing must be cheap and must not block.
pub trait LibraryProbe: Send + Sync {
    /// Check whether the library is available right now
    fn probe(&self) -> Option<Arc<dyn MessagingLibrary>>;
}

/// Poll `probe` until it yields a library or `config.timeout` elapses
///
/// Fails with `LibraryUnavailable` no earlier than the timeout and no later
/// than one poll interval after it.
pub async fn wait_for_library(
    probe: &dyn LibraryProbe,
    config: ReadinessConfig,
) -> Result<Arc<dyn MessagingLibrary>, SessionError> {
    let start = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        if let Some(library) = probe.probe() {
            info!(
                attempts,
                waited_ms = start.elapsed().as_millis() as u64,
                "Messaging library available"
            );
            return Ok(library);
        }

        let elapsed = start.elapsed();
        if elapsed >= config.timeout {
            let waited_ms = elapsed.as_millis() as u64;
            warn!(attempts, waited_ms, "Messaging library did not load in time");
            return Err(SessionError::LibraryUnavailable { waited_ms });
        }

        debug!(attempts, "Messaging library not loaded yet");
        sleep(config.poll_interval).await;
    }
}

/// Caching wrapper around [`wait_for_library`]
///
/// Once the library has been resolved, later calls return it immediately
/// without probing again.
pub struct LibraryGate {
    probe: Arc<dyn LibraryProbe>,
    config: ReadinessConfig,
    resolved: OnceCell<Arc<dyn MessagingLibrary>>,
}

impl LibraryGate {
    /// Create a gate over a probe
    pub fn new(probe: Arc<dyn LibraryProbe>, config: ReadinessConfig) -> Self {
        Self {
            probe,
            config,
            resolved: OnceCell::new(),
        }
    }

    /// Wait for the library, or return the cached one
    pub async fn ready(&self) -> Result<Arc<dyn MessagingLibrary>, SessionError> {
        if let Some(library) = self.resolved.get() {
            return Ok(library.clone());
        }

        let library = wait_for_library(self.probe.as_ref(), self.config).await?;
        // A concurrent waiter may have won the race; keep whichever landed first.
        Ok(self.resolved.get_or_init(|| library).clone())
    }

    /// True once the library has been resolved
    pub fn is_ready(&self) -> bool {
        self.resolved.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{ClientOptions, Credentials, LibraryError, MessagingClient};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NullLibrary;

    #[async_trait]
    impl MessagingLibrary for NullLibrary {
        async fn create_client(
            &self,
            _credentials: &Credentials,
            _options: ClientOptions,
        ) -> Result<Arc<dyn MessagingClient>, LibraryError> {
            Err(LibraryError::Remote("not used".to_string()))
        }
    }

    /// Becomes ready after `ready_after` probes; `usize::MAX` means never
    struct CountingProbe {
        calls: AtomicUsize,
        ready_after: usize,
    }

    impl CountingProbe {
        fn new(ready_after: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                ready_after,
            }
        }
    }

    impl LibraryProbe for CountingProbe {
        fn probe(&self) -> Option<Arc<dyn MessagingLibrary>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.ready_after {
                Some(Arc::new(NullLibrary))
            } else {
                None
            }
        }
    }

    fn config(timeout_ms: u64, poll_ms: u64) -> ReadinessConfig {
        ReadinessConfig {
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(poll_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_within_one_interval() {
        for timeout_ms in [0u64, 250, 1000, 1050] {
            let probe = CountingProbe::new(usize::MAX);
            let start = Instant::now();
            let result = wait_for_library(&probe, config(timeout_ms, 100)).await;
            let elapsed = start.elapsed();

            assert!(matches!(
                result,
                Err(SessionError::LibraryUnavailable { .. })
            ));
            assert!(elapsed >= Duration::from_millis(timeout_ms));
            assert!(elapsed <= Duration::from_millis(timeout_ms + 100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_at_fixed_interval() {
        let probe = CountingProbe::new(usize::MAX);
        let _ = wait_for_library(&probe, config(1000, 100)).await;
        // Probes at 0, 100, ..., 1000 ms.
        assert_eq!(probe.calls.load(Ordering::SeqCst), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_when_library_appears() {
        let probe = CountingProbe::new(3);
        let start = Instant::now();
        let result = wait_for_library(&probe, config(10_000, 100)).await;
        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_is_idempotent() {
        let probe = Arc::new(CountingProbe::new(2));
        let gate = LibraryGate::new(probe.clone(), config(10_000, 100));
        assert!(!gate.is_ready());

        assert!(gate.ready().await.is_ok());
        let calls_after_first = probe.calls.load(Ordering::SeqCst);
        assert!(gate.is_ready());

        assert!(gate.ready().await.is_ok());
        assert_eq!(probe.calls.load(Ordering::SeqCst), calls_after_first);
    }
}
