//! The match-and-commit saga and its compensation.

use std::collections::HashSet;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::domain::{
    DedupeKey, DriverRoute, HoldId, NewTrip, RequestId, RiderRequest, RouteId, TripId, TripStatus,
};
use crate::notify::{MatchEvent, Notifier};
use crate::store::{CreateTrip, PendingQuery, RiderDirectory, RouteRegistry, StoreError, TripLedger};

use super::{MatchError, MatchOutcome, MatchRequest, NoMatchReason, Orchestrator, WindowMode};

/// Side effects of one match attempt that compensation may need to undo.
#[derive(Debug)]
pub(super) struct Attempt {
    route_id: RouteId,
    hold: HoldId,
    provisional: TripId,
    /// A reservation was requested under `hold`, so seats may be held
    /// even after a round reported none.
    reserved: bool,
    /// Riders that may be assigned to `provisional` or `trip`.
    riders: Vec<RequestId>,
    trip: Option<TripId>,
}

impl Attempt {
    fn new(route_id: RouteId) -> Self {
        let hold = HoldId::new();
        Self {
            route_id,
            hold,
            provisional: TripId::provisional(&hold),
            reserved: false,
            riders: Vec::new(),
            trip: None,
        }
    }
}

enum Reservation {
    Held(Vec<RequestId>),
    NoMatch(NoMatchReason),
}

impl<D, R, L, N> Orchestrator<D, R, L, N>
where
    D: RiderDirectory,
    R: RouteRegistry,
    L: TripLedger,
    N: Notifier,
{
    /// Unix time before which trips no longer count for deduplication.
    fn dedupe_cutoff(&self) -> i64 {
        let window = i64::try_from(self.inner.config.dedupe_window.as_secs()).unwrap_or(i64::MAX);
        Utc::now().timestamp().saturating_sub(window)
    }

    pub(super) async fn run_match(
        &self,
        request: &MatchRequest,
        key: &DedupeKey,
    ) -> Result<MatchOutcome, MatchError> {
        let ledger = &self.inner.ledger;
        let not_before = self.dedupe_cutoff();

        if let Some(trip) = self
            .bounded("find_by_dedupe_key", ledger.find_by_dedupe_key(key, not_before))
            .await?
        {
            debug!(key = %key, trip = %trip.id, "dedupe key already committed");
            return Ok(MatchOutcome::Existing(trip));
        }

        let route = self
            .bounded("get_route", self.inner.registry.get_route(&request.route_id))
            .await?;
        if route.driver_id != request.driver_id {
            return Err(MatchError::InvalidArgument(format!(
                "route {} belongs to driver {}, not {}",
                route.id, route.driver_id, request.driver_id
            )));
        }
        let Some(station) = route.station(&request.station_id) else {
            return Err(MatchError::InvalidArgument(format!(
                "station {} is not on route {}",
                request.station_id, route.id
            )));
        };
        let window = self.inner.config.window_minutes(station.match_window_minutes);

        let mut attempt = Attempt::new(route.id.clone());
        match self.commit(request, key, route, window, &mut attempt).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(key = %key, error = %e, "match failed, compensating");
                self.compensate(&attempt).await;
                Err(e)
            }
        }
    }

    async fn commit(
        &self,
        request: &MatchRequest,
        key: &DedupeKey,
        route: DriverRoute,
        window: u32,
        attempt: &mut Attempt,
    ) -> Result<MatchOutcome, MatchError> {
        let selected = match self.reserve(request, route, window, attempt).await? {
            Reservation::Held(selected) => selected,
            Reservation::NoMatch(reason) => {
                if attempt.reserved {
                    // A timed-out round may still have left seats under the hold
                    self.compensate(attempt).await;
                }
                return Ok(MatchOutcome::NoMatch(reason));
            }
        };

        attempt.riders = selected.clone();
        let confirmed = self.assign(&selected, &attempt.provisional).await?;
        if confirmed.is_empty() {
            info!(route = %attempt.route_id, "every candidate was taken by another match");
            self.compensate(attempt).await;
            return Ok(MatchOutcome::NoMatch(NoMatchReason::CandidatesTaken));
        }
        if confirmed.len() < selected.len() {
            debug!(
                selected = selected.len(),
                confirmed = confirmed.len(),
                "returning seats for riders taken concurrently"
            );
            self.shrink_hold(
                &attempt.route_id,
                attempt.hold,
                seat_count(&selected),
                seat_count(&confirmed),
            )
            .await?;
        }
        attempt.riders = confirmed.clone();

        let trip = match self.create_trip(request, key, &confirmed, attempt.hold).await? {
            CreateTrip::Created(trip) => trip,
            CreateTrip::Existing(trip) => {
                info!(key = %key, trip = %trip.id, "trip already committed by a concurrent match");
                self.compensate(attempt).await;
                return Ok(MatchOutcome::Existing(trip));
            }
        };
        attempt.trip = Some(trip.id.clone());

        self.retag(&confirmed, &attempt.provisional, &trip.id).await?;

        info!(
            trip = %trip.id,
            route = %trip.route_id,
            station = %trip.station_id,
            riders = trip.rider_ids.len(),
            "trip committed"
        );
        self.notify(MatchEvent::TripCommitted(trip.clone()));
        Ok(MatchOutcome::Committed(trip))
    }

    /// Pending riders compatible with the arrival, earliest deadline first.
    async fn candidates(
        &self,
        request: &MatchRequest,
        route: &DriverRoute,
        window: u32,
    ) -> Result<Vec<RiderRequest>, MatchError> {
        let query = PendingQuery {
            station_id: request.station_id.clone(),
            dest_area: Some(route.dest_area.clone()),
            now_unix: request.arrival_eta_unix,
            window_minutes: window,
        };
        let mut candidates = self
            .bounded(
                "list_pending_at_station",
                self.inner.directory.list_pending_at_station(&query),
            )
            .await?;

        if self.inner.config.window_mode == WindowMode::BeforeDeadline {
            candidates.retain(|r| r.eta_unix >= request.arrival_eta_unix);
        }
        Ok(candidates)
    }

    /// Pick candidates and reserve a seat for each, retrying lost races.
    async fn reserve(
        &self,
        request: &MatchRequest,
        mut route: DriverRoute,
        window: u32,
        attempt: &mut Attempt,
    ) -> Result<Reservation, MatchError> {
        let config = &self.inner.config;
        let mut backoff = config.reserve_backoff;

        for round in 1..=config.max_reserve_attempts {
            let candidates = self.candidates(request, &route, window).await?;
            if candidates.is_empty() {
                return Ok(Reservation::NoMatch(NoMatchReason::NoCandidates));
            }

            let k = candidates.len().min(route.seats_free as usize);
            if k == 0 {
                return Ok(Reservation::NoMatch(NoMatchReason::NoSeats));
            }
            let mut selected: Vec<RequestId> =
                candidates.into_iter().take(k).map(|r| r.id).collect();
            let wanted = seat_count(&selected);

            attempt.reserved = true;
            let held = self.reserve_seats(&route.id, attempt.hold, wanted).await?;
            if held > 0 {
                // A reservation from an earlier round may have landed late
                // under the same hold.
                if held > wanted {
                    self.shrink_hold(&route.id, attempt.hold, held, wanted).await?;
                }
                selected.truncate(usize::try_from(held).unwrap_or(usize::MAX));
                debug!(route = %route.id, hold = %attempt.hold, seats = selected.len(), "seats reserved");
                return Ok(Reservation::Held(selected));
            }

            warn!(route = %route.id, round, "lost seat reservation race");
            if round < config.max_reserve_attempts {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                route = self
                    .bounded("get_route", self.inner.registry.get_route(&route.id))
                    .await?;
            }
        }

        Err(MatchError::Contention {
            route_id: route.id,
            attempts: config.max_reserve_attempts,
        })
    }

    /// Reserve `n` seats under `hold` and return how many seats the hold
    /// now covers, which is 0 when the reservation was refused.
    ///
    /// A grant or a timeout is followed by a look at the hold itself, since
    /// the registry grants a repeated hold without checking its size.
    async fn reserve_seats(&self, route_id: &RouteId, hold: HoldId, n: u32) -> Result<u32, MatchError> {
        let registry = &self.inner.registry;
        match self
            .bounded("reserve_seats", registry.reserve_seats(route_id, hold, n))
            .await
        {
            Ok(false) => Ok(0),
            Ok(true) | Err(StoreError::Timeout(_)) => {
                let held = self
                    .bounded("held_seats", registry.held_seats(route_id, hold))
                    .await?;
                if held != n {
                    debug!(route = %route_id, %hold, requested = n, held, "hold differs from request");
                }
                Ok(held)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Claim `selected` for `provisional`. Returns the riders actually
    /// claimed, in selection order.
    async fn assign(
        &self,
        selected: &[RequestId],
        provisional: &TripId,
    ) -> Result<Vec<RequestId>, MatchError> {
        match self
            .bounded(
                "mark_assigned",
                self.inner.directory.mark_assigned(selected, provisional),
            )
            .await
        {
            Ok(n) if n == selected.len() => Ok(selected.to_vec()),
            Ok(_) | Err(StoreError::Timeout(_)) => self.assigned_to(selected, provisional).await,
            Err(e) => Err(e.into()),
        }
    }

    /// The subset of `ids` currently assigned to `trip_id`, in input order.
    async fn assigned_to(
        &self,
        ids: &[RequestId],
        trip_id: &TripId,
    ) -> Result<Vec<RequestId>, MatchError> {
        let requests = self
            .bounded("get_many", self.inner.directory.get_many(ids))
            .await?;
        let assigned: HashSet<&RequestId> = requests
            .iter()
            .filter(|r| r.is_assigned_to(trip_id))
            .map(|r| &r.id)
            .collect();

        Ok(ids
            .iter()
            .filter(|id| assigned.contains(id))
            .cloned()
            .collect())
    }

    /// Give back seats so the hold covers exactly `target`.
    async fn shrink_hold(
        &self,
        route_id: &RouteId,
        hold: HoldId,
        held: u32,
        target: u32,
    ) -> Result<(), MatchError> {
        let registry = &self.inner.registry;
        match self
            .bounded(
                "release_seats",
                registry.release_seats(route_id, hold, held - target),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(StoreError::Timeout(_)) => {
                let held = self
                    .bounded("held_seats", registry.held_seats(route_id, hold))
                    .await?;
                if held > target {
                    self.bounded(
                        "release_seats",
                        registry.release_seats(route_id, hold, held - target),
                    )
                    .await?;
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Append the trip. After a timeout, the dedupe lookup says whether
    /// the append landed and whether the trip is ours.
    async fn create_trip(
        &self,
        request: &MatchRequest,
        key: &DedupeKey,
        riders: &[RequestId],
        hold: HoldId,
    ) -> Result<CreateTrip, MatchError> {
        let ledger = &self.inner.ledger;
        let not_before = self.dedupe_cutoff();
        let new_trip = NewTrip {
            driver_id: request.driver_id.clone(),
            route_id: request.route_id.clone(),
            station_id: request.station_id.clone(),
            rider_ids: riders.to_vec(),
            dedupe_key: key.clone(),
            hold,
        };

        match self
            .bounded("create_trip", ledger.create_trip(new_trip, not_before))
            .await
        {
            Ok(created) => Ok(created),
            Err(StoreError::Timeout(op)) => {
                match self
                    .bounded("find_by_dedupe_key", ledger.find_by_dedupe_key(key, not_before))
                    .await?
                {
                    Some(trip) if trip.hold == hold => Ok(CreateTrip::Created(trip)),
                    Some(trip) => Ok(CreateTrip::Existing(trip)),
                    None => Err(StoreError::Timeout(op).into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move riders from the provisional id to the committed trip.
    async fn retag(&self, ids: &[RequestId], from: &TripId, to: &TripId) -> Result<(), MatchError> {
        let mut last = MatchError::Conflict(format!("riders of {to} are not all assigned to it"));

        for _ in 0..self.inner.config.compensation_attempts {
            match self
                .bounded("retag", self.inner.directory.retag(ids, from, to))
                .await
            {
                Ok(n) if n == ids.len() => return Ok(()),
                Ok(_) => {}
                Err(e) if e.is_transient() => last = e.into(),
                Err(e) => return Err(e.into()),
            }
            // A timed-out or repeated retag may already have moved some riders.
            if self.assigned_to(ids, to).await?.len() == ids.len() {
                return Ok(());
            }
        }
        Err(last)
    }

    /// Undo whatever `attempt` did. Each step is retried a bounded number
    /// of times and logged if it still fails.
    pub(super) async fn compensate(&self, attempt: &Attempt) {
        let tries = self.inner.config.compensation_attempts;
        let directory = &self.inner.directory;
        let registry = &self.inner.registry;
        let ledger = &self.inner.ledger;

        if let Some(trip_id) = &attempt.trip
            && let Err(e) = self
                .retrying("update_trip_status", tries, || {
                    ledger.update_trip_status(trip_id, TripStatus::Cancelled)
                })
                .await
        {
            error!(trip = %trip_id, error = %e, "failed to cancel trip while compensating");
        }

        if !attempt.riders.is_empty() {
            let tags = std::iter::once(&attempt.provisional).chain(attempt.trip.as_ref());
            let releases = tags.map(move |tag| async move {
                let result = self
                    .retrying("release", tries, || directory.release(&attempt.riders, tag))
                    .await;
                (tag, result)
            });

            for (tag, result) in join_all(releases).await {
                if let Err(e) = result {
                    error!(trip = %tag, riders = attempt.riders.len(), error = %e,
                        "failed to release riders while compensating");
                }
            }
        }

        if attempt.reserved
            && let Err(e) = self
                .retrying("release_seats", tries, || {
                    registry.release_seats(&attempt.route_id, attempt.hold, u32::MAX)
                })
                .await
        {
            error!(route = %attempt.route_id, hold = %attempt.hold, error = %e,
                "failed to release seats while compensating");
        }

        debug!(route = %attempt.route_id, hold = %attempt.hold, "compensation finished");
    }
}

fn seat_count(riders: &[RequestId]) -> u32 {
    u32::try_from(riders.len()).unwrap_or(u32::MAX)
}
