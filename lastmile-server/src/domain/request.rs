//! Rider request records.

use serde::{Deserialize, Serialize};

use super::{DestArea, RequestId, RiderId, StationId, TripId};

/// Lifecycle status of a rider request.
///
/// The trip id lives inside [`RequestStatus::Assigned`], so a request
/// carries a trip id exactly when it is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Waiting at the station for a driver.
    Pending,
    /// Claimed by a trip (or by a match attempt's provisional trip id).
    Assigned { trip_id: TripId },
    /// Withdrawn by the rider.
    Cancelled,
}

/// A rider waiting at a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiderRequest {
    pub id: RequestId,
    pub rider_id: RiderId,
    pub station_id: StationId,
    pub dest_area: DestArea,
    /// Latest acceptable pickup time, unix seconds.
    pub eta_unix: i64,
    #[serde(flatten)]
    pub status: RequestStatus,
}

impl RiderRequest {
    /// Whether the request is still waiting for a driver.
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// The trip this request is assigned to, if any.
    pub fn trip_id(&self) -> Option<&TripId> {
        match &self.status {
            RequestStatus::Assigned { trip_id } => Some(trip_id),
            _ => None,
        }
    }

    /// Whether the request is assigned to exactly `trip_id`.
    pub fn is_assigned_to(&self, trip_id: &TripId) -> bool {
        self.trip_id() == Some(trip_id)
    }
}

/// A rider request as submitted, before the directory stores it.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRiderRequest {
    /// Caller-chosen id; the directory assigns one when absent.
    #[serde(default)]
    pub id: Option<RequestId>,
    pub rider_id: RiderId,
    pub station_id: StationId,
    pub dest_area: DestArea,
    pub eta_unix: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(status: RequestStatus) -> RiderRequest {
        RiderRequest {
            id: RequestId::parse("req_1").unwrap(),
            rider_id: RiderId::parse("rider_1").unwrap(),
            station_id: StationId::parse("MG_ROAD").unwrap(),
            dest_area: DestArea::parse("WHITEFIELD").unwrap(),
            eta_unix: 1_700_000_000,
            status,
        }
    }

    #[test]
    fn trip_id_only_when_assigned() {
        let trip = TripId::parse("trip_1").unwrap();

        assert!(request(RequestStatus::Pending).trip_id().is_none());
        assert!(request(RequestStatus::Cancelled).trip_id().is_none());

        let assigned = request(RequestStatus::Assigned {
            trip_id: trip.clone(),
        });
        assert!(assigned.is_assigned_to(&trip));
        assert!(!assigned.is_pending());
        assert!(!assigned.is_assigned_to(&TripId::parse("trip_2").unwrap()));
    }

    #[test]
    fn serializes_flat_status() {
        let trip = TripId::parse("trip_1").unwrap();
        let json = serde_json::to_value(request(RequestStatus::Assigned { trip_id: trip })).unwrap();

        assert_eq!(json["status"], "ASSIGNED");
        assert_eq!(json["trip_id"], "trip_1");
        assert_eq!(json["station_id"], "MG_ROAD");

        let json = serde_json::to_value(request(RequestStatus::Pending)).unwrap();
        assert_eq!(json["status"], "PENDING");
        assert!(json.get("trip_id").is_none());
    }

    #[test]
    fn new_request_id_is_optional() {
        let json = r#"{"rider_id":"r1","station_id":"MG_ROAD","dest_area":"WF","eta_unix":10}"#;
        let req: NewRiderRequest = serde_json::from_str(json).unwrap();
        assert!(req.id.is_none());
        assert_eq!(req.eta_unix, 10);
    }
}
