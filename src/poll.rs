//! Polling for vendor-side asynchronous operations.
//!
//! Most OVH objects are provisioned or torn down by asynchronous backend
//! tasks: the REST call returns immediately and the object (or its task)
//! exposes a status string that eventually reaches a terminal value.
//! [`StateWaiter`] samples a status-retrieval operation on an interval
//! until one of the configured target statuses is observed, the retrieval
//! fails, or the overall timeout elapses.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{ApiError, ProviderError};

/// Waits for a retrieval operation to report one of a set of target
/// statuses.
///
/// Statuses in the pending set keep the wait going; a status in neither
/// set is logged and also keeps the wait going, so such a wait can only
/// end via the timeout. Retrieval errors abort the wait, except a vendor
/// 404 when [`absent_means`](Self::absent_means) is configured — used by
/// delete paths, where absence of the object is completion.
///
/// # Example
///
/// ```ignore
/// let network = StateWaiter::new(format!("private network {id}"))
///     .pending(&["BUILDING"])
///     .target(&["ACTIVE"])
///     .wait_for(|| {
///         let client = client.clone();
///         let path = path.clone();
///         async move {
///             let net: Network = client.get(&path).await?;
///             let status = net.status.clone();
///             Ok((net, status))
///         }
///     })
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct StateWaiter {
    resource: String,
    pending: Vec<String>,
    target: Vec<String>,
    timeout: Duration,
    delay: Duration,
    interval: Duration,
    min_interval: Duration,
    absent_status: Option<String>,
}

impl StateWaiter {
    /// Create a waiter for the named resource with the defaults used
    /// across this provider: 10 minute timeout, 10 second initial delay,
    /// 3 second minimum interval between probes.
    ///
    /// The name appears in timeout errors, so it should identify the
    /// object under wait.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            pending: Vec::new(),
            target: Vec::new(),
            timeout: Duration::from_secs(600),
            delay: Duration::from_secs(10),
            interval: Duration::ZERO,
            min_interval: Duration::from_secs(3),
            absent_status: None,
        }
    }

    /// Statuses that mean the operation is still in progress.
    pub fn pending(mut self, statuses: &[&str]) -> Self {
        self.pending = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Statuses that mean the operation finished successfully.
    pub fn target(mut self, statuses: &[&str]) -> Self {
        self.target = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Overall time allowed before the wait fails.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Time to wait before the first probe.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Requested interval between probes. Probes never run more often
    /// than the minimum interval allows, whatever is requested here.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Minimum interval between probes.
    pub fn min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Treat a vendor 404 from the retrieval operation as an observation
    /// of `status`.
    ///
    /// Delete paths configure this with their terminal status: once the
    /// object is gone the status endpoint itself disappears, and that
    /// absence is success, not failure.
    pub fn absent_means(mut self, status: &str) -> Self {
        self.absent_status = Some(status.to_string());
        self
    }

    /// Sample `refresh` until a target status is observed.
    ///
    /// Returns the retrieval result that carried the target status, or
    /// `None` when the wait was satisfied by an absent object (see
    /// [`absent_means`](Self::absent_means)).
    pub async fn wait_for<T, F, Fut>(&self, mut refresh: F) -> Result<Option<T>, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(T, String), ApiError>>,
    {
        let started = Instant::now();
        sleep(self.delay).await;

        let mut last_status: Option<String> = None;
        loop {
            let status = match refresh().await {
                Ok((result, status)) => {
                    if self.target.iter().any(|t| *t == status) {
                        debug!(resource = %self.resource, %status, "wait complete");
                        return Ok(Some(result));
                    }
                    status
                }
                Err(e) if e.is_not_found() && self.absent_status.is_some() => {
                    let status = self.absent_status.clone().unwrap_or_default();
                    if self.target.iter().any(|t| *t == status) {
                        debug!(resource = %self.resource, "object gone, wait complete");
                        return Ok(None);
                    }
                    status
                }
                Err(e) => return Err(e.into()),
            };

            if !self.pending.iter().any(|p| *p == status) {
                // Neither pending nor target: by contract the wait keeps
                // sampling and can only converge via timeout.
                debug!(resource = %self.resource, %status, "status outside pending set");
            } else {
                debug!(resource = %self.resource, %status, "still pending");
            }
            last_status = Some(status);

            if started.elapsed() >= self.timeout {
                return Err(ProviderError::DeadlineExceeded(format!(
                    "timed out waiting for {} (last status: {})",
                    self.resource,
                    last_status.as_deref().unwrap_or("unknown"),
                )));
            }

            sleep(self.interval.max(self.min_interval)).await;
        }
    }
}
