//! Last-mile ride matching server.
//!
//! Riders wait at stations with a deadline and a destination area; drivers
//! register routes through those stations with a number of seats. When a
//! driver reaches a station, the orchestrator picks the riders with the
//! earliest deadlines, reserves seats and commits a trip, keeping the three
//! stores consistent without a distributed transaction.

pub mod arrivals;
pub mod config;
pub mod domain;
pub mod notify;
pub mod orchestrator;
pub mod store;
pub mod web;
