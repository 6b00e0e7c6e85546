//! Fault-injecting store wrapper for tests.
//!
//! Wraps any store and, per operation, plays back a queue of faults:
//! refusing the call, stalling before it, applying it and then stalling so
//! the caller's timeout fires with the effect already done, or never
//! answering and applying it later on its own.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::{
    DedupeKey, DriverRoute, HoldId, NewDriverRoute, NewRiderRequest, NewTrip, RequestId,
    RiderRequest, RouteId, Trip, TripId, TripStatus,
};

use super::{CreateTrip, PendingQuery, RiderDirectory, RouteRegistry, StoreError, TripLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListPending,
    MarkAssigned,
    Release,
    Retag,
    Archive,
    GetRoute,
    ReserveSeats,
    ReleaseSeats,
    HeldSeats,
    CreateTrip,
    FindByDedupeKey,
    UpdateTripStatus,
}

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Fail without touching the store.
    Unavailable,
    /// Sleep, then apply the call.
    Stall(Duration),
    /// Apply the call, then sleep before answering.
    LoseResponse(Duration),
    /// Never answer; apply the call after the delay, on its own task.
    /// Only seat reservations support this.
    LandLate(Duration),
}

#[derive(Debug, Default)]
struct Plan {
    faults: HashMap<Op, VecDeque<Fault>>,
    calls: HashMap<Op, usize>,
}

pub struct Faulty<S> {
    inner: Arc<S>,
    plan: Mutex<Plan>,
}

impl<S> Faulty<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Arc::new(inner),
            plan: Mutex::new(Plan::default()),
        }
    }

    /// Queue `fault` for the next not-yet-faulted call of `op`.
    pub fn inject(&self, op: Op, fault: Fault) {
        let mut plan = self.plan.lock().unwrap();
        plan.faults.entry(op).or_default().push_back(fault);
    }

    /// How many times `op` has been called.
    pub fn calls(&self, op: Op) -> usize {
        let plan = self.plan.lock().unwrap();
        plan.calls.get(&op).copied().unwrap_or(0)
    }

    fn next_fault(&self, op: Op) -> Option<Fault> {
        let mut plan = self.plan.lock().unwrap();
        *plan.calls.entry(op).or_default() += 1;
        plan.faults.get_mut(&op).and_then(VecDeque::pop_front)
    }

    async fn run<T>(
        &self,
        op: Op,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let fault = self.next_fault(op);
        self.apply(op, fault, call).await
    }

    async fn apply<T>(
        &self,
        op: Op,
        fault: Option<Fault>,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match fault {
            None => call.await,
            Some(Fault::Unavailable) => Err(StoreError::Unavailable(format!("injected {op:?}"))),
            Some(Fault::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                call.await
            }
            Some(Fault::LoseResponse(delay)) => {
                let result = call.await;
                tokio::time::sleep(delay).await;
                result
            }
            Some(Fault::LandLate(_)) => panic!("{op:?} cannot land late"),
        }
    }
}

impl<S: RiderDirectory> RiderDirectory for Faulty<S> {
    async fn add(&self, request: NewRiderRequest) -> Result<RiderRequest, StoreError> {
        self.inner.add(request).await
    }

    async fn get(&self, id: &RequestId) -> Result<RiderRequest, StoreError> {
        self.inner.get(id).await
    }

    async fn get_many(&self, ids: &[RequestId]) -> Result<Vec<RiderRequest>, StoreError> {
        self.inner.get_many(ids).await
    }

    async fn list_pending_at_station(
        &self,
        query: &PendingQuery,
    ) -> Result<Vec<RiderRequest>, StoreError> {
        self.run(Op::ListPending, self.inner.list_pending_at_station(query))
            .await
    }

    async fn mark_assigned(&self, ids: &[RequestId], trip_id: &TripId) -> Result<usize, StoreError> {
        self.run(Op::MarkAssigned, self.inner.mark_assigned(ids, trip_id))
            .await
    }

    async fn release(&self, ids: &[RequestId], trip_id: &TripId) -> Result<usize, StoreError> {
        self.run(Op::Release, self.inner.release(ids, trip_id)).await
    }

    async fn retag(
        &self,
        ids: &[RequestId],
        from: &TripId,
        to: &TripId,
    ) -> Result<usize, StoreError> {
        self.run(Op::Retag, self.inner.retag(ids, from, to)).await
    }

    async fn cancel(&self, id: &RequestId) -> Result<RiderRequest, StoreError> {
        self.inner.cancel(id).await
    }

    async fn archive(&self, ids: &[RequestId], trip_id: &TripId) -> Result<usize, StoreError> {
        self.run(Op::Archive, self.inner.archive(ids, trip_id)).await
    }
}

impl<S: RouteRegistry> RouteRegistry for Faulty<S> {
    async fn register_route(&self, route: NewDriverRoute) -> Result<DriverRoute, StoreError> {
        self.inner.register_route(route).await
    }

    async fn get_route(&self, id: &RouteId) -> Result<DriverRoute, StoreError> {
        self.run(Op::GetRoute, self.inner.get_route(id)).await
    }

    async fn reserve_seats(&self, id: &RouteId, hold: HoldId, n: u32) -> Result<bool, StoreError> {
        match self.next_fault(Op::ReserveSeats) {
            Some(Fault::LandLate(delay)) => {
                let inner = Arc::clone(&self.inner);
                let id = id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = inner.reserve_seats(&id, hold, n).await;
                });
                std::future::pending().await
            }
            fault => {
                self.apply(Op::ReserveSeats, fault, self.inner.reserve_seats(id, hold, n))
                    .await
            }
        }
    }

    async fn release_seats(&self, id: &RouteId, hold: HoldId, n: u32) -> Result<u32, StoreError> {
        self.run(Op::ReleaseSeats, self.inner.release_seats(id, hold, n))
            .await
    }

    async fn held_seats(&self, id: &RouteId, hold: HoldId) -> Result<u32, StoreError> {
        self.run(Op::HeldSeats, self.inner.held_seats(id, hold)).await
    }

    async fn update_seats(
        &self,
        id: &RouteId,
        expected_free: u32,
        new_free: u32,
    ) -> Result<bool, StoreError> {
        self.inner.update_seats(id, expected_free, new_free).await
    }
}

impl<S: TripLedger> TripLedger for Faulty<S> {
    async fn create_trip(
        &self,
        trip: NewTrip,
        not_before_unix: i64,
    ) -> Result<CreateTrip, StoreError> {
        self.run(Op::CreateTrip, self.inner.create_trip(trip, not_before_unix))
            .await
    }

    async fn find_by_dedupe_key(
        &self,
        key: &DedupeKey,
        not_before_unix: i64,
    ) -> Result<Option<Trip>, StoreError> {
        self.run(
            Op::FindByDedupeKey,
            self.inner.find_by_dedupe_key(key, not_before_unix),
        )
        .await
    }

    async fn get_trip(&self, id: &TripId) -> Result<Trip, StoreError> {
        self.inner.get_trip(id).await
    }

    async fn update_trip_status(&self, id: &TripId, status: TripStatus) -> Result<Trip, StoreError> {
        self.run(Op::UpdateTripStatus, self.inner.update_trip_status(id, status))
            .await
    }

    async fn update_trip_status_if(
        &self,
        id: &TripId,
        expected: TripStatus,
        status: TripStatus,
    ) -> Result<Option<Trip>, StoreError> {
        self.run(
            Op::UpdateTripStatus,
            self.inner.update_trip_status_if(id, expected, status),
        )
        .await
    }
}
