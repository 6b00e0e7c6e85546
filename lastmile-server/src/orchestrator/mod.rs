//! Matching orchestrator.
//!
//! Turns a driver's arrival at a station into a committed trip. There is no
//! transaction spanning the rider, route and trip stores, so a match runs as
//! a saga: reserve seats, claim riders under a provisional trip id, append
//! the trip, then retag the riders to the real id. Every step has a
//! compensating action, and any failure after seats are reserved undoes the
//! attempt before the error is returned.
//!
//! The orchestrator keeps no authoritative state. Identical calls that
//! overlap in time share one attempt through a memo keyed by [`DedupeKey`];
//! an entry lives only while its attempt runs. Later retries are answered
//! by the ledger's dedupe lookup, which also sees what other instances did.

mod calls;
mod config;
mod lifecycle;
mod protocol;

use std::future::Future;
use std::sync::Arc;

use moka::future::Cache as MokaCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{DedupeKey, DriverId, RouteId, StationId, Trip, TripId, TripStatus};
use crate::notify::{MatchEvent, Notifier};
use crate::store::{RiderDirectory, RouteRegistry, StoreError, TripLedger};

pub use config::{MatchConfig, WindowMode};

/// A driver reaching a station on one of their routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub driver_id: DriverId,
    pub route_id: RouteId,
    pub station_id: StationId,
    pub arrival_eta_unix: i64,
}

impl MatchRequest {
    pub fn dedupe_key(&self) -> DedupeKey {
        DedupeKey::new(
            &self.driver_id,
            &self.route_id,
            &self.station_id,
            self.arrival_eta_unix,
        )
    }
}

/// Why a match attempt produced no trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoMatchReason {
    /// No pending rider in the window.
    NoCandidates,
    /// The route has no free seats.
    NoSeats,
    /// Every selected rider was claimed by another match first.
    CandidatesTaken,
}

/// Result of a match attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// This call created the trip.
    Committed(Trip),
    /// A trip for the same dedupe key already existed.
    Existing(Trip),
    NoMatch(NoMatchReason),
}

impl MatchOutcome {
    pub fn trip(&self) -> Option<&Trip> {
        match self {
            MatchOutcome::Committed(trip) | MatchOutcome::Existing(trip) => Some(trip),
            MatchOutcome::NoMatch(_) => None,
        }
    }
}

/// Errors from the orchestrator.
///
/// Whenever one of these is returned from a match attempt, the attempt's
/// side effects have already been compensated.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MatchError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("trip {trip_id} cannot move from {from} to {to}")]
    InvalidTransition {
        trip_id: TripId,
        from: TripStatus,
        to: TripStatus,
    },

    /// Lost the seat reservation race on every attempt.
    #[error("seat reservation on {route_id} lost {attempts} times to concurrent matches")]
    Contention { route_id: RouteId, attempts: u32 },

    #[error("store error: {0}")]
    Store(StoreError),

    /// The task running the protocol panicked or was shut down.
    #[error("match task aborted: {0}")]
    Aborted(String),
}

impl MatchError {
    /// Whether the same call may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            MatchError::Contention { .. } | MatchError::Aborted(_) => true,
            MatchError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<StoreError> for MatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => MatchError::NotFound { kind, id },
            StoreError::InvalidArgument(msg) => MatchError::InvalidArgument(msg),
            StoreError::Conflict(msg) => MatchError::Conflict(msg),
            other => MatchError::Store(other),
        }
    }
}

struct Inner<D, R, L, N> {
    directory: Arc<D>,
    registry: Arc<R>,
    ledger: Arc<L>,
    notifier: Arc<N>,
    config: MatchConfig,
    /// Attempts in flight by dedupe key.
    in_flight: MokaCache<DedupeKey, MatchOutcome>,
}

/// Coordinates the three stores. Cheap to clone.
pub struct Orchestrator<D, R, L, N> {
    inner: Arc<Inner<D, R, L, N>>,
}

impl<D, R, L, N> Clone for Orchestrator<D, R, L, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D, R, L, N> Orchestrator<D, R, L, N>
where
    D: RiderDirectory,
    R: RouteRegistry,
    L: TripLedger,
    N: Notifier,
{
    pub fn new(
        directory: Arc<D>,
        registry: Arc<R>,
        ledger: Arc<L>,
        notifier: N,
        config: MatchConfig,
    ) -> Self {
        let in_flight = MokaCache::builder()
            .time_to_live(config.dedupe_window)
            .max_capacity(config.dedupe_capacity)
            .build();

        Self {
            inner: Arc::new(Inner {
                directory,
                registry,
                ledger,
                notifier: Arc::new(notifier),
                config,
                in_flight,
            }),
        }
    }

    pub fn directory(&self) -> &Arc<D> {
        &self.inner.directory
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.inner.registry
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.inner.ledger
    }

    pub fn notifier(&self) -> &N {
        &self.inner.notifier
    }

    pub fn config(&self) -> &MatchConfig {
        &self.inner.config
    }

    /// Match pending riders at the station to the route and commit a trip.
    ///
    /// Identical calls are idempotent within the dedupe window: a retry
    /// returns [`MatchOutcome::Existing`] with the trip the first call made,
    /// as the ledger currently records it. Once that trip is cancelled the
    /// arrival can be matched again.
    /// The protocol runs on its own task, so dropping the returned future
    /// does not interrupt it or its compensation.
    pub async fn try_match(&self, request: MatchRequest) -> Result<MatchOutcome, MatchError> {
        let this = self.clone();
        detached(async move { this.coalesced(request).await }).await
    }

    async fn coalesced(&self, request: MatchRequest) -> Result<MatchOutcome, MatchError> {
        let key = request.dedupe_key();
        let mut fresh = false;
        let init = async {
            fresh = true;
            self.run_match(&request, &key).await
        };

        let outcome = self
            .inner
            .in_flight
            .try_get_with(key.clone(), init)
            .await
            .map_err(|e: Arc<MatchError>| MatchError::clone(&e))?;

        if fresh {
            // Replays go to the ledger, which sees cancellations and status
            // changes made through any instance.
            self.inner.in_flight.invalidate(&key).await;
        }

        match outcome {
            MatchOutcome::NoMatch(reason) => {
                debug!(key = %key, ?reason, "no match");
                Ok(outcome)
            }
            MatchOutcome::Committed(trip) if !fresh => Ok(MatchOutcome::Existing(trip)),
            outcome => Ok(outcome),
        }
    }

    /// Deliver `event` on a detached task. Failures are logged only.
    fn notify(&self, event: MatchEvent) {
        let notifier = Arc::clone(&self.inner.notifier);
        let timeout = self.inner.config.notify_timeout;

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, notifier.notify(&event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(trip = %event.trip().id, error = %e, "notification failed");
                }
                Err(_) => {
                    warn!(trip = %event.trip().id, "notification timed out");
                }
            }
        });
    }
}

/// Run `fut` on its own task and wait for it.
async fn detached<T>(
    fut: impl Future<Output = Result<T, MatchError>> + Send + 'static,
) -> Result<T, MatchError>
where
    T: Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| MatchError::Aborted(e.to_string()))?
}
