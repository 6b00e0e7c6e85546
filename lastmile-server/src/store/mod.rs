//! Rider, route and trip stores.
//!
//! Each store owns one kind of record and is linearizable on its own,
//! through a single lock around its maps. Nothing here knows about the
//! other stores; cross-store consistency is the orchestrator's job.

mod directory;
mod error;
#[cfg(test)]
pub(crate) mod fault;
mod ledger;
mod registry;

pub use directory::{InMemoryDirectory, PendingQuery, RiderDirectory};
pub use error::StoreError;
pub use ledger::{CreateTrip, InMemoryLedger, TripLedger};
pub use registry::{InMemoryRegistry, RouteRegistry};
