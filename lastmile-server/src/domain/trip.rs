//! Trip records and their lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{DedupeKey, DriverId, HoldId, RequestId, RouteId, StationId, TripId};

/// Lifecycle status of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// SCHEDULED → IN_PROGRESS → COMPLETED, and SCHEDULED → CANCELLED.
    pub fn can_transition_to(self, next: TripStatus) -> bool {
        matches!(
            (self, next),
            (TripStatus::Scheduled, TripStatus::InProgress)
                | (TripStatus::InProgress, TripStatus::Completed)
                | (TripStatus::Scheduled, TripStatus::Cancelled)
        )
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TripStatus::Scheduled => "SCHEDULED",
            TripStatus::InProgress => "IN_PROGRESS",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// A committed match: one driver picking up riders at one station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trip {
    pub id: TripId,
    pub driver_id: DriverId,
    pub route_id: RouteId,
    pub station_id: StationId,
    pub rider_ids: Vec<RequestId>,
    pub status: TripStatus,

    /// Key of the match event that produced this trip.
    pub dedupe_key: DedupeKey,

    /// Seat reservation on the route backing this trip.
    #[serde(skip)]
    pub hold: HoldId,

    pub created_at_unix: i64,
}

/// Everything the ledger needs to append a trip.
#[derive(Debug, Clone)]
pub struct NewTrip {
    pub driver_id: DriverId,
    pub route_id: RouteId,
    pub station_id: StationId,
    pub rider_ids: Vec<RequestId>,
    pub dedupe_key: DedupeKey,
    pub hold: HoldId,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TripStatus; 4] = [
        TripStatus::Scheduled,
        TripStatus::InProgress,
        TripStatus::Completed,
        TripStatus::Cancelled,
    ];

    #[test]
    fn allowed_transitions() {
        use TripStatus::*;

        assert!(Scheduled.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(Scheduled.can_transition_to(Cancelled));

        assert!(!Scheduled.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Scheduled));
        assert!(!Cancelled.can_transition_to(Scheduled));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [TripStatus::Completed, TripStatus::Cancelled] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn display_matches_serde() {
        for status in ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
    }
}
