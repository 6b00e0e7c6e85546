//! Data transfer objects for web requests and responses.

use serde::{Deserialize, Serialize};

use crate::domain::{DestArea, RequestId, RiderId, RiderRequest, StationId, Trip};
use crate::orchestrator::{MatchOutcome, NoMatchReason};

/// A rider request as submitted over HTTP.
///
/// The deadline is either absolute (`eta_unix`) or relative to now
/// (`eta_minutes`); with neither, the rider is due in ten minutes.
#[derive(Debug, Deserialize)]
pub struct CreateRiderRequest {
    #[serde(default)]
    pub id: Option<RequestId>,
    pub rider_id: RiderId,
    pub station_id: StationId,
    pub dest_area: DestArea,
    pub eta_unix: Option<i64>,
    pub eta_minutes: Option<i64>,
}

/// Query for pending requests at a station.
#[derive(Debug, Deserialize)]
pub struct PendingRequestsQuery {
    pub station_id: String,

    /// Only requests heading here (all areas when absent)
    pub dest_area: Option<String>,

    /// Centre of the window, unix seconds (defaults to now)
    pub now_unix: Option<i64>,

    /// Half-width of the window in minutes
    pub window_minutes: Option<u32>,
}

/// Pending requests, earliest deadline first.
#[derive(Debug, Serialize)]
pub struct PendingRequestsResponse {
    pub requests: Vec<RiderRequest>,
}

/// Result of a match trigger.
#[derive(Debug, Serialize)]
pub struct MatchResponse {
    /// COMMITTED, EXISTING or NO_MATCH
    pub outcome: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip: Option<Trip>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NoMatchReason>,
}

impl From<MatchOutcome> for MatchResponse {
    fn from(outcome: MatchOutcome) -> Self {
        match outcome {
            MatchOutcome::Committed(trip) => MatchResponse {
                outcome: "COMMITTED",
                trip: Some(trip),
                reason: None,
            },
            MatchOutcome::Existing(trip) => MatchResponse {
                outcome: "EXISTING",
                trip: Some(trip),
                reason: None,
            },
            MatchOutcome::NoMatch(reason) => MatchResponse {
                outcome: "NO_MATCH",
                trip: None,
                reason: Some(reason),
            },
        }
    }
}

/// Acknowledgement for a queued arrival.
#[derive(Debug, Serialize)]
pub struct ArrivalAccepted {
    pub queued: bool,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
