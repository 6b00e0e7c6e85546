//! Dedupe keys for match attempts.

use std::fmt;

use serde::Serialize;

use super::{DriverId, RouteId, StationId};

/// Deterministic identity of one physical match event.
///
/// Built from `(driver, route, station, arrival)`. Identifiers cannot
/// contain `|`, so the joined form is unambiguous.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DedupeKey(String);

impl DedupeKey {
    pub fn new(
        driver_id: &DriverId,
        route_id: &RouteId,
        station_id: &StationId,
        arrival_eta_unix: i64,
    ) -> Self {
        Self(format!(
            "{}|{}|{}|{}",
            driver_id, route_id, station_id, arrival_eta_unix
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DedupeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DedupeKey({})", self.0)
    }
}

impl fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
