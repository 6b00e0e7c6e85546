//! Domain types for last-mile ride matching.
//!
//! Identifiers are validated at construction time and statuses are closed
//! enums, so code that receives these types can trust their validity.

mod dedupe;
mod error;
mod ids;
mod request;
mod route;
mod trip;

pub use dedupe::DedupeKey;
pub use error::DomainError;
pub use ids::{
    DestArea, DriverId, HoldId, InvalidId, RequestId, RiderId, RouteId, StationId, TripId,
};
pub use request::{NewRiderRequest, RequestStatus, RiderRequest};
pub use route::{DriverRoute, NewDriverRoute, RouteStation};
pub use trip::{NewTrip, Trip, TripStatus};
