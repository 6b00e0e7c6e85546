//! Rider request directory.
//!
//! Owns rider request records: a primary map keyed by request id plus a
//! secondary index of request ids per station. One lock guards both, so
//! every operation is linearizable.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use tokio::sync::Mutex;

use crate::domain::{
    DestArea, NewRiderRequest, RequestId, RequestStatus, RiderRequest, StationId, TripId,
};

use super::error::StoreError;

/// Query for pending requests around a driver's arrival.
#[derive(Debug, Clone)]
pub struct PendingQuery {
    pub station_id: StationId,
    /// `None` matches every destination area.
    pub dest_area: Option<DestArea>,
    /// Centre of the window, unix seconds.
    pub now_unix: i64,
    /// Half-width of the window in minutes.
    pub window_minutes: u32,
}

impl PendingQuery {
    /// Inclusive `[lo, hi]` bounds on `eta_unix`.
    pub fn bounds(&self) -> (i64, i64) {
        let half = i64::from(self.window_minutes) * 60;
        (
            self.now_unix.saturating_sub(half),
            self.now_unix.saturating_add(half),
        )
    }
}

/// Store of rider requests.
///
/// Mutations are conditional on the record's current status, so concurrent
/// callers resolve races by skip-if-not-pending rather than overwriting.
pub trait RiderDirectory: Send + Sync + 'static {
    /// Store a new request as PENDING, assigning an id if none was given.
    fn add(
        &self,
        request: NewRiderRequest,
    ) -> impl Future<Output = Result<RiderRequest, StoreError>> + Send;

    fn get(&self, id: &RequestId)
    -> impl Future<Output = Result<RiderRequest, StoreError>> + Send;

    /// Fetch several requests; unknown ids are skipped.
    fn get_many(
        &self,
        ids: &[RequestId],
    ) -> impl Future<Output = Result<Vec<RiderRequest>, StoreError>> + Send;

    /// Pending requests matching `query`, earliest deadline first.
    fn list_pending_at_station(
        &self,
        query: &PendingQuery,
    ) -> impl Future<Output = Result<Vec<RiderRequest>, StoreError>> + Send;

    /// Move still-PENDING requests to ASSIGNED under `trip_id`.
    ///
    /// Returns how many actually transitioned; others are skipped.
    fn mark_assigned(
        &self,
        ids: &[RequestId],
        trip_id: &TripId,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Return requests assigned to `trip_id` to PENDING.
    fn release(
        &self,
        ids: &[RequestId],
        trip_id: &TripId,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Re-stamp requests assigned to `from` with `to`.
    fn retag(
        &self,
        ids: &[RequestId],
        from: &TripId,
        to: &TripId,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Rider withdraws a pending request.
    fn cancel(&self, id: &RequestId)
    -> impl Future<Output = Result<RiderRequest, StoreError>> + Send;

    /// Drop requests of a finished trip from the directory.
    fn archive(
        &self,
        ids: &[RequestId],
        trip_id: &TripId,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;
}

#[derive(Debug, Default)]
struct DirectoryState {
    requests: HashMap<RequestId, RiderRequest>,
    by_station: HashMap<StationId, HashSet<RequestId>>,
    next_seq: u64,
}

impl DirectoryState {
    fn next_id(&mut self) -> RequestId {
        loop {
            self.next_seq += 1;
            if let Ok(id) = RequestId::parse(&format!("req_{}", self.next_seq))
                && !self.requests.contains_key(&id)
            {
                return id;
            }
        }
    }

    fn unindex(&mut self, request: &RiderRequest) {
        if let Some(ids) = self.by_station.get_mut(&request.station_id) {
            ids.remove(&request.id);
            if ids.is_empty() {
                self.by_station.remove(&request.station_id);
            }
        }
    }
}

/// In-process directory guarded by a single lock.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: Mutex<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Apply `f` to each distinct known id, counting the records it changed.
fn update_each(
    state: &mut DirectoryState,
    ids: &[RequestId],
    mut f: impl FnMut(&mut RiderRequest) -> bool,
) -> usize {
    let mut seen = HashSet::new();
    let mut changed = 0;

    for id in ids {
        if !seen.insert(id) {
            continue;
        }
        if let Some(request) = state.requests.get_mut(id)
            && f(request)
        {
            changed += 1;
        }
    }

    changed
}

impl RiderDirectory for InMemoryDirectory {
    async fn add(&self, request: NewRiderRequest) -> Result<RiderRequest, StoreError> {
        let mut state = self.state.lock().await;

        let id = match request.id {
            Some(id) if state.requests.contains_key(&id) => {
                return Err(StoreError::Conflict(format!("request {id} already exists")));
            }
            Some(id) => id,
            None => state.next_id(),
        };

        let stored = RiderRequest {
            id: id.clone(),
            rider_id: request.rider_id,
            station_id: request.station_id,
            dest_area: request.dest_area,
            eta_unix: request.eta_unix,
            status: RequestStatus::Pending,
        };

        state
            .by_station
            .entry(stored.station_id.clone())
            .or_default()
            .insert(id.clone());
        state.requests.insert(id, stored.clone());

        Ok(stored)
    }

    async fn get(&self, id: &RequestId) -> Result<RiderRequest, StoreError> {
        let state = self.state.lock().await;
        state
            .requests
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("request", id))
    }

    async fn get_many(&self, ids: &[RequestId]) -> Result<Vec<RiderRequest>, StoreError> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.requests.get(id).cloned())
            .collect())
    }

    async fn list_pending_at_station(
        &self,
        query: &PendingQuery,
    ) -> Result<Vec<RiderRequest>, StoreError> {
        let (lo, hi) = query.bounds();
        let state = self.state.lock().await;

        let Some(ids) = state.by_station.get(&query.station_id) else {
            return Ok(Vec::new());
        };

        let mut pending: Vec<RiderRequest> = ids
            .iter()
            .filter_map(|id| state.requests.get(id))
            .filter(|r| r.is_pending())
            .filter(|r| query.dest_area.as_ref().is_none_or(|area| &r.dest_area == area))
            .filter(|r| (lo..=hi).contains(&r.eta_unix))
            .cloned()
            .collect();

        // Earliest deadline first; id breaks ties so the order is total.
        pending.sort_by(|a, b| a.eta_unix.cmp(&b.eta_unix).then_with(|| a.id.cmp(&b.id)));

        Ok(pending)
    }

    async fn mark_assigned(&self, ids: &[RequestId], trip_id: &TripId) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        Ok(update_each(&mut state, ids, |request| {
            if !request.is_pending() {
                return false;
            }
            request.status = RequestStatus::Assigned {
                trip_id: trip_id.clone(),
            };
            true
        }))
    }

    async fn release(&self, ids: &[RequestId], trip_id: &TripId) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        Ok(update_each(&mut state, ids, |request| {
            if !request.is_assigned_to(trip_id) {
                return false;
            }
            request.status = RequestStatus::Pending;
            true
        }))
    }

    async fn retag(
        &self,
        ids: &[RequestId],
        from: &TripId,
        to: &TripId,
    ) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        Ok(update_each(&mut state, ids, |request| {
            if !request.is_assigned_to(from) {
                return false;
            }
            request.status = RequestStatus::Assigned {
                trip_id: to.clone(),
            };
            true
        }))
    }

    async fn cancel(&self, id: &RequestId) -> Result<RiderRequest, StoreError> {
        let mut state = self.state.lock().await;

        let request = state
            .requests
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("request", id))?;

        if let RequestStatus::Assigned { trip_id } = &request.status {
            return Err(StoreError::Conflict(format!(
                "request {id} is assigned to trip {trip_id}"
            )));
        }
        request.status = RequestStatus::Cancelled;

        let cancelled = request.clone();
        state.unindex(&cancelled);
        Ok(cancelled)
    }

    async fn archive(&self, ids: &[RequestId], trip_id: &TripId) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let mut archived = 0;

        for id in ids {
            if !state.requests.get(id).is_some_and(|r| r.is_assigned_to(trip_id)) {
                continue;
            }
            if let Some(request) = state.requests.remove(id) {
                state.unindex(&request);
                archived += 1;
            }
        }

        Ok(archived)
    }
}
