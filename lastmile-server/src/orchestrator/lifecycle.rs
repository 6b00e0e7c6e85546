//! Trip lifecycle after commit: start, complete, cancel.

use tracing::{debug, info, warn};

use crate::domain::{Trip, TripId, TripStatus};
use crate::notify::{MatchEvent, Notifier};
use crate::store::{RiderDirectory, RouteRegistry, TripLedger};

use super::{MatchError, Orchestrator, detached};

impl<D, R, L, N> Orchestrator<D, R, L, N>
where
    D: RiderDirectory,
    R: RouteRegistry,
    L: TripLedger,
    N: Notifier,
{
    /// SCHEDULED → IN_PROGRESS.
    pub async fn start_trip(&self, id: &TripId) -> Result<Trip, MatchError> {
        let this = self.clone();
        let id = id.clone();
        detached(async move {
            let (trip, _) = this.transition(&id, TripStatus::InProgress).await?;
            Ok(trip)
        })
        .await
    }

    /// IN_PROGRESS → COMPLETED. The trip's riders leave the directory.
    pub async fn complete_trip(&self, id: &TripId) -> Result<Trip, MatchError> {
        let this = self.clone();
        let id = id.clone();
        detached(async move {
            let (trip, changed) = this.transition(&id, TripStatus::Completed).await?;

            let tries = this.inner.config.compensation_attempts;
            let archived = this
                .retrying("archive", tries, || {
                    this.inner.directory.archive(&trip.rider_ids, &trip.id)
                })
                .await?;
            debug!(trip = %trip.id, archived, "archived riders");

            if changed {
                this.notify(MatchEvent::TripCompleted(trip.clone()));
            }
            Ok(trip)
        })
        .await
    }

    /// SCHEDULED → CANCELLED. Riders go back to PENDING and the trip's
    /// seats return to the route.
    ///
    /// Cancelling an already cancelled trip repeats the cleanup, which is
    /// a no-op once it has fully run.
    pub async fn cancel_trip(&self, id: &TripId) -> Result<Trip, MatchError> {
        let this = self.clone();
        let id = id.clone();
        detached(async move {
            let (trip, changed) = this.transition(&id, TripStatus::Cancelled).await?;

            let tries = this.inner.config.compensation_attempts;
            let released = this
                .retrying("release", tries, || {
                    this.inner.directory.release(&trip.rider_ids, &trip.id)
                })
                .await?;
            let seats = u32::try_from(trip.rider_ids.len()).unwrap_or(u32::MAX);
            let freed = this
                .retrying("release_seats", tries, || {
                    this.inner
                        .registry
                        .release_seats(&trip.route_id, trip.hold, seats)
                })
                .await?;
            debug!(trip = %trip.id, released, freed, "returned riders and seats");

            if changed {
                this.notify(MatchEvent::TripCancelled(trip.clone()));
            }
            Ok(trip)
        })
        .await
    }

    /// Move a trip to `next`. Returns the trip and whether it changed.
    ///
    /// The status is written with a compare-and-set against the status that
    /// was checked, so a concurrent transition makes this one fail rather
    /// than overwrite it.
    async fn transition(&self, id: &TripId, next: TripStatus) -> Result<(Trip, bool), MatchError> {
        let ledger = &self.inner.ledger;
        let trip = self.bounded("get_trip", ledger.get_trip(id)).await?;

        if trip.status == next {
            debug!(trip = %id, status = %next, "trip already in requested status");
            return Ok((trip, false));
        }
        if !trip.status.can_transition_to(next) {
            return Err(MatchError::InvalidTransition {
                trip_id: id.clone(),
                from: trip.status,
                to: next,
            });
        }

        let tries = self.inner.config.compensation_attempts;
        let updated = self
            .retrying("update_trip_status", tries, || {
                ledger.update_trip_status_if(id, trip.status, next)
            })
            .await?;
        if let Some(updated) = updated {
            info!(trip = %id, from = %trip.status, to = %next, "trip status changed");
            return Ok((updated, true));
        }

        // Someone else moved the trip between the read and the write
        let current = self.bounded("get_trip", ledger.get_trip(id)).await?;
        if current.status == next {
            debug!(trip = %id, status = %next, "trip reached requested status concurrently");
            return Ok((current, false));
        }
        warn!(trip = %id, from = %trip.status, now = %current.status, to = %next,
            "lost trip status race");
        Err(MatchError::InvalidTransition {
            trip_id: id.clone(),
            from: current.status,
            to: next,
        })
    }
}
