//! Driver route registry.
//!
//! Owns route records and their seat capacity. Seats move only through
//! conditional adjustments: a reservation succeeds only if enough seats are
//! free, and every reserved seat is recorded under the hold that took it,
//! so releases can never return more than was taken.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::Mutex;

use crate::domain::{DriverRoute, HoldId, NewDriverRoute, RouteId};

use super::error::StoreError;

/// Store of driver routes and seat holds.
pub trait RouteRegistry: Send + Sync + 'static {
    /// Register a route, assigning an id if none was given.
    fn register_route(
        &self,
        route: NewDriverRoute,
    ) -> impl Future<Output = Result<DriverRoute, StoreError>> + Send;

    fn get_route(&self, id: &RouteId)
    -> impl Future<Output = Result<DriverRoute, StoreError>> + Send;

    /// Take `n` seats under `hold` if at least `n` are free.
    ///
    /// Returns `false` and changes nothing when there are too few seats.
    /// Repeating the call for an existing hold returns `true` without
    /// taking more seats.
    fn reserve_seats(
        &self,
        id: &RouteId,
        hold: HoldId,
        n: u32,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Give back up to `n` seats held by `hold`, returning how many moved.
    fn release_seats(
        &self,
        id: &RouteId,
        hold: HoldId,
        n: u32,
    ) -> impl Future<Output = Result<u32, StoreError>> + Send;

    /// Seats currently held by `hold`.
    fn held_seats(
        &self,
        id: &RouteId,
        hold: HoldId,
    ) -> impl Future<Output = Result<u32, StoreError>> + Send;

    /// Set `seats_free` to `new_free` if it currently equals `expected_free`.
    fn update_seats(
        &self,
        id: &RouteId,
        expected_free: u32,
        new_free: u32,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

#[derive(Debug, Default)]
struct RegistryState {
    routes: HashMap<RouteId, DriverRoute>,
    next_seq: u64,
}

impl RegistryState {
    fn next_id(&mut self) -> RouteId {
        loop {
            self.next_seq += 1;
            if let Ok(id) = RouteId::parse(&format!("route_{}", self.next_seq))
                && !self.routes.contains_key(&id)
            {
                return id;
            }
        }
    }

    fn route_mut(&mut self, id: &RouteId) -> Result<&mut DriverRoute, StoreError> {
        self.routes
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("route", id))
    }
}

/// In-process registry guarded by a single lock.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: Mutex<RegistryState>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RouteRegistry for InMemoryRegistry {
    async fn register_route(&self, route: NewDriverRoute) -> Result<DriverRoute, StoreError> {
        route.validate()?;

        let mut state = self.state.lock().await;

        let id = match route.id {
            Some(id) if state.routes.contains_key(&id) => {
                return Err(StoreError::Conflict(format!("route {id} already exists")));
            }
            Some(id) => id,
            None => state.next_id(),
        };

        let stored = DriverRoute {
            id: id.clone(),
            driver_id: route.driver_id,
            dest_area: route.dest_area,
            seats_total: route.seats_total,
            seats_free: route.seats_free.unwrap_or(route.seats_total),
            stations: route.stations,
            holds: HashMap::new(),
        };
        state.routes.insert(id, stored.clone());

        Ok(stored)
    }

    async fn get_route(&self, id: &RouteId) -> Result<DriverRoute, StoreError> {
        let state = self.state.lock().await;
        state
            .routes
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("route", id))
    }

    async fn reserve_seats(&self, id: &RouteId, hold: HoldId, n: u32) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let route = state.route_mut(id)?;

        if route.holds.contains_key(&hold) {
            return Ok(true);
        }
        if n == 0 {
            return Ok(true);
        }
        if route.seats_free < n {
            return Ok(false);
        }

        route.seats_free -= n;
        route.holds.insert(hold, n);
        Ok(true)
    }

    async fn release_seats(&self, id: &RouteId, hold: HoldId, n: u32) -> Result<u32, StoreError> {
        let mut state = self.state.lock().await;
        let route = state.route_mut(id)?;

        let Some(held) = route.holds.get_mut(&hold) else {
            return Ok(0);
        };

        let released = n.min(*held);
        *held -= released;
        if *held == 0 {
            route.holds.remove(&hold);
        }
        route.seats_free = (route.seats_free + released).min(route.seats_total);

        Ok(released)
    }

    async fn held_seats(&self, id: &RouteId, hold: HoldId) -> Result<u32, StoreError> {
        let state = self.state.lock().await;
        state
            .routes
            .get(id)
            .map(|route| route.held_by(&hold))
            .ok_or_else(|| StoreError::not_found("route", id))
    }

    async fn update_seats(
        &self,
        id: &RouteId,
        expected_free: u32,
        new_free: u32,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let route = state.route_mut(id)?;

        if route.seats_free != expected_free {
            return Ok(false);
        }
        let in_use = new_free.checked_add(route.seats_held());
        if in_use.is_none_or(|seats| seats > route.seats_total) {
            return Err(StoreError::InvalidArgument(format!(
                "{new_free} free seats plus {} held exceeds {} total",
                route.seats_held(),
                route.seats_total
            )));
        }

        route.seats_free = new_free;
        Ok(true)
    }
}
