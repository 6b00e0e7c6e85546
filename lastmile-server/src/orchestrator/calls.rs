//! Timeouts and retries around individual store calls.

use std::future::Future;

use tracing::{debug, warn};

use crate::notify::Notifier;
use crate::store::{RiderDirectory, RouteRegistry, StoreError, TripLedger};

use super::Orchestrator;

impl<D, R, L, N> Orchestrator<D, R, L, N>
where
    D: RiderDirectory,
    R: RouteRegistry,
    L: TripLedger,
    N: Notifier,
{
    /// Run one store call under the store timeout.
    ///
    /// A [`StoreError::Timeout`] means the call's effect is unknown.
    pub(super) async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.inner.config.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, "store call timed out");
                Err(StoreError::Timeout(op))
            }
        }
    }

    /// Run an idempotent store call up to `attempts` times, backing off
    /// between transient failures.
    pub(super) async fn retrying<T, F, Fut>(
        &self,
        op: &'static str,
        attempts: u32,
        mut call: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut delay = self.inner.config.reserve_backoff;
        let mut attempt = 1;

        loop {
            match self.bounded(op, call()).await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    debug!(op, attempt, error = %e, "retrying store call");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
