//! Trip ledger.
//!
//! Append-only record of committed trips plus their status. Trips are also
//! indexed by dedupe key, so two match attempts for the same physical event
//! resolve to one trip even when they run on different orchestrators.
//! Cancelled trips no longer hold their key.

use std::collections::HashMap;
use std::future::Future;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::domain::{DedupeKey, NewTrip, Trip, TripId, TripStatus};

use super::error::StoreError;

/// Result of [`TripLedger::create_trip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateTrip {
    /// A new trip was appended.
    Created(Trip),
    /// A trip for the same dedupe key already exists inside the window.
    Existing(Trip),
}

/// Store of trips.
pub trait TripLedger: Send + Sync + 'static {
    /// Append a SCHEDULED trip, unless a live one with the same dedupe key
    /// was created after `not_before_unix`.
    fn create_trip(
        &self,
        trip: NewTrip,
        not_before_unix: i64,
    ) -> impl Future<Output = Result<CreateTrip, StoreError>> + Send;

    /// Most recent trip for `key` created after `not_before_unix`, unless
    /// it was cancelled.
    fn find_by_dedupe_key(
        &self,
        key: &DedupeKey,
        not_before_unix: i64,
    ) -> impl Future<Output = Result<Option<Trip>, StoreError>> + Send;

    fn get_trip(&self, id: &TripId) -> impl Future<Output = Result<Trip, StoreError>> + Send;

    /// Overwrite a trip's status. Only existence is checked.
    fn update_trip_status(
        &self,
        id: &TripId,
        status: TripStatus,
    ) -> impl Future<Output = Result<Trip, StoreError>> + Send;

    /// Set a trip's status if it is still `expected`. Returns `None` when
    /// the trip has moved to another status in the meantime.
    fn update_trip_status_if(
        &self,
        id: &TripId,
        expected: TripStatus,
        status: TripStatus,
    ) -> impl Future<Output = Result<Option<Trip>, StoreError>> + Send;
}

#[derive(Debug, Default)]
struct LedgerState {
    trips: HashMap<TripId, Trip>,
    by_dedupe_key: HashMap<DedupeKey, TripId>,
    next_seq: u64,
}

impl LedgerState {
    fn recent(&self, key: &DedupeKey, not_before_unix: i64) -> Option<&Trip> {
        self.by_dedupe_key
            .get(key)
            .and_then(|id| self.trips.get(id))
            .filter(|trip| {
                trip.status != TripStatus::Cancelled && trip.created_at_unix > not_before_unix
            })
    }
}

/// In-process ledger guarded by a single lock.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TripLedger for InMemoryLedger {
    async fn create_trip(
        &self,
        trip: NewTrip,
        not_before_unix: i64,
    ) -> Result<CreateTrip, StoreError> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.recent(&trip.dedupe_key, not_before_unix) {
            return Ok(CreateTrip::Existing(existing.clone()));
        }

        state.next_seq += 1;
        let id = TripId::parse(&format!("trip_{}", state.next_seq))
            .map_err(|e| StoreError::InvalidArgument(e.to_string()))?;

        let stored = Trip {
            id: id.clone(),
            driver_id: trip.driver_id,
            route_id: trip.route_id,
            station_id: trip.station_id,
            rider_ids: trip.rider_ids,
            status: TripStatus::Scheduled,
            dedupe_key: trip.dedupe_key,
            hold: trip.hold,
            created_at_unix: Utc::now().timestamp(),
        };

        state
            .by_dedupe_key
            .insert(stored.dedupe_key.clone(), id.clone());
        state.trips.insert(id, stored.clone());

        Ok(CreateTrip::Created(stored))
    }

    async fn find_by_dedupe_key(
        &self,
        key: &DedupeKey,
        not_before_unix: i64,
    ) -> Result<Option<Trip>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.recent(key, not_before_unix).cloned())
    }

    async fn get_trip(&self, id: &TripId) -> Result<Trip, StoreError> {
        let state = self.state.lock().await;
        state
            .trips
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("trip", id))
    }

    async fn update_trip_status(&self, id: &TripId, status: TripStatus) -> Result<Trip, StoreError> {
        let mut state = self.state.lock().await;
        let trip = state
            .trips
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("trip", id))?;

        trip.status = status;
        Ok(trip.clone())
    }

    async fn update_trip_status_if(
        &self,
        id: &TripId,
        expected: TripStatus,
        status: TripStatus,
    ) -> Result<Option<Trip>, StoreError> {
        let mut state = self.state.lock().await;
        let trip = state
            .trips
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("trip", id))?;

        if trip.status != expected {
            return Ok(None);
        }
        trip.status = status;
        Ok(Some(trip.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DriverId, HoldId, RequestId, RouteId, StationId};

    fn key(eta: i64) -> DedupeKey {
        DedupeKey::new(
            &DriverId::parse("d1").unwrap(),
            &RouteId::parse("route_1").unwrap(),
            &StationId::parse("A").unwrap(),
            eta,
        )
    }

    fn new_trip(eta: i64, riders: &[&str]) -> NewTrip {
        NewTrip {
            driver_id: DriverId::parse("d1").unwrap(),
            route_id: RouteId::parse("route_1").unwrap(),
            station_id: StationId::parse("A").unwrap(),
            rider_ids: riders.iter().map(|r| RequestId::parse(r).unwrap()).collect(),
            dedupe_key: key(eta),
            hold: HoldId::new(),
        }
    }

    fn long_ago() -> i64 {
        Utc::now().timestamp() - 600
    }

    #[tokio::test]
    async fn create_assigns_id_and_schedules() {
        let ledger = InMemoryLedger::new();
        let CreateTrip::Created(trip) = ledger
            .create_trip(new_trip(100, &["req_1", "req_2"]), long_ago())
            .await
            .unwrap()
        else {
            panic!("expected a new trip");
        };

        assert_eq!(trip.id.as_str(), "trip_1");
        assert_eq!(trip.status, TripStatus::Scheduled);
        assert_eq!(trip.rider_ids.len(), 2);
        assert_eq!(ledger.get_trip(&trip.id).await.unwrap(), trip);
    }

    #[tokio::test]
    async fn same_key_inside_window_returns_existing() {
        let ledger = InMemoryLedger::new();
        let first = ledger
            .create_trip(new_trip(100, &["req_1"]), long_ago())
            .await
            .unwrap();
        let second = ledger
            .create_trip(new_trip(100, &["req_2"]), long_ago())
            .await
            .unwrap();

        let (CreateTrip::Created(first), CreateTrip::Existing(second)) = (first, second) else {
            panic!("expected created then existing");
        };
        assert_eq!(first.id, second.id);
        assert_eq!(
            ledger
                .find_by_dedupe_key(&key(100), long_ago())
                .await
                .unwrap()
                .map(|t| t.id),
            Some(first.id)
        );
    }

    #[tokio::test]
    async fn same_key_outside_window_creates_new() {
        let ledger = InMemoryLedger::new();
        ledger
            .create_trip(new_trip(100, &["req_1"]), long_ago())
            .await
            .unwrap();

        // A cutoff in the future puts the first trip outside the window
        let cutoff = Utc::now().timestamp() + 1;
        assert!(
            ledger
                .find_by_dedupe_key(&key(100), cutoff)
                .await
                .unwrap()
                .is_none()
        );
        let again = ledger
            .create_trip(new_trip(100, &["req_2"]), cutoff)
            .await
            .unwrap();
        assert!(matches!(again, CreateTrip::Created(t) if t.id.as_str() == "trip_2"));
    }

    #[tokio::test]
    async fn cancelled_trip_frees_its_key() {
        let ledger = InMemoryLedger::new();
        let CreateTrip::Created(first) = ledger
            .create_trip(new_trip(100, &["req_1"]), long_ago())
            .await
            .unwrap()
        else {
            panic!("expected a new trip");
        };
        ledger
            .update_trip_status(&first.id, TripStatus::Cancelled)
            .await
            .unwrap();

        assert_eq!(ledger.find_by_dedupe_key(&key(100), long_ago()).await.unwrap(), None);
        let again = ledger
            .create_trip(new_trip(100, &["req_1"]), long_ago())
            .await
            .unwrap();
        assert!(matches!(again, CreateTrip::Created(t) if t.id != first.id));
    }

    #[tokio::test]
    async fn different_keys_do_not_collide() {
        let ledger = InMemoryLedger::new();
        ledger
            .create_trip(new_trip(100, &["req_1"]), long_ago())
            .await
            .unwrap();
        let other = ledger
            .create_trip(new_trip(101, &["req_2"]), long_ago())
            .await
            .unwrap();
        assert!(matches!(other, CreateTrip::Created(_)));
    }

    #[tokio::test]
    async fn update_status_checks_existence_only() {
        let ledger = InMemoryLedger::new();
        let CreateTrip::Created(trip) = ledger
            .create_trip(new_trip(100, &["req_1"]), long_ago())
            .await
            .unwrap()
        else {
            panic!("expected a new trip");
        };

        let updated = ledger
            .update_trip_status(&trip.id, TripStatus::Completed)
            .await
            .unwrap();
        assert_eq!(updated.status, TripStatus::Completed);

        let missing = ledger
            .update_trip_status(&TripId::parse("trip_9").unwrap(), TripStatus::Cancelled)
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn conditional_update_only_from_expected_status() {
        let ledger = InMemoryLedger::new();
        let CreateTrip::Created(trip) = ledger
            .create_trip(new_trip(100, &["req_1"]), long_ago())
            .await
            .unwrap()
        else {
            panic!("expected a new trip");
        };

        let cancelled = ledger
            .update_trip_status_if(&trip.id, TripStatus::Scheduled, TripStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.map(|t| t.status), Some(TripStatus::Cancelled));

        // A second writer still expecting SCHEDULED loses
        let started = ledger
            .update_trip_status_if(&trip.id, TripStatus::Scheduled, TripStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(started, None);
        assert_eq!(
            ledger.get_trip(&trip.id).await.unwrap().status,
            TripStatus::Cancelled
        );
    }
}
