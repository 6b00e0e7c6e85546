//! Driver routes and seat capacity.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{DestArea, DomainError, DriverId, HoldId, RouteId, StationId};

/// A station on a route, with the window used when matching there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStation {
    pub station_id: StationId,

    /// Half-width of the match window in minutes. Zero means "use the
    /// configured default".
    #[serde(default)]
    pub match_window_minutes: u32,
}

/// A driver's registered route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverRoute {
    pub id: RouteId,
    pub driver_id: DriverId,
    pub dest_area: DestArea,
    pub seats_total: u32,
    pub seats_free: u32,
    pub stations: Vec<RouteStation>,

    /// Seats held per reservation. `seats_free + Σ holds <= seats_total`.
    #[serde(skip)]
    pub holds: HashMap<HoldId, u32>,
}

impl DriverRoute {
    /// Find a station on this route.
    pub fn station(&self, station_id: &StationId) -> Option<&RouteStation> {
        self.stations.iter().find(|s| &s.station_id == station_id)
    }

    /// Seats held under `hold` (zero if there is no such hold).
    pub fn held_by(&self, hold: &HoldId) -> u32 {
        self.holds.get(hold).copied().unwrap_or(0)
    }

    /// Total seats held across all reservations.
    pub fn seats_held(&self) -> u32 {
        self.holds.values().sum()
    }
}

/// A route as submitted for registration.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDriverRoute {
    #[serde(default)]
    pub id: Option<RouteId>,
    pub driver_id: DriverId,
    pub dest_area: DestArea,
    pub seats_total: u32,
    /// Defaults to `seats_total` when absent.
    #[serde(default)]
    pub seats_free: Option<u32>,
    pub stations: Vec<RouteStation>,
}

impl NewDriverRoute {
    /// Check the route is well-formed before registration.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.seats_total == 0 {
            return Err(DomainError::InvalidRoute("seats_total must be positive"));
        }

        if self.seats_free.is_some_and(|free| free > self.seats_total) {
            return Err(DomainError::InvalidRoute(
                "seats_free must not exceed seats_total",
            ));
        }

        if self.stations.is_empty() {
            return Err(DomainError::InvalidRoute("route must have at least one station"));
        }

        let mut seen = HashSet::new();
        if !self.stations.iter().all(|s| seen.insert(&s.station_id)) {
            return Err(DomainError::InvalidRoute("route visits a station twice"));
        }

        Ok(())
    }
}
