//! Driver arrival intake.
//!
//! Telemetry pushes arrival events onto a channel; a worker drains it and
//! runs one match per event, with a cap on how many run at once.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::notify::Notifier;
use crate::orchestrator::{MatchOutcome, MatchRequest, Orchestrator};
use crate::store::{RiderDirectory, RouteRegistry, TripLedger};

/// Spawn a worker that matches every arrival received on `arrivals`.
///
/// The worker finishes once the channel is closed and every match it
/// started has completed.
pub fn spawn_arrival_worker<D, R, L, N>(
    orchestrator: Orchestrator<D, R, L, N>,
    mut arrivals: mpsc::Receiver<MatchRequest>,
    concurrency: usize,
) -> JoinHandle<()>
where
    D: RiderDirectory,
    R: RouteRegistry,
    L: TripLedger,
    N: Notifier,
{
    let concurrency = concurrency.max(1);
    let permits = Arc::new(Semaphore::new(concurrency));

    tokio::spawn(async move {
        while let Some(arrival) = arrivals.recv().await {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let orchestrator = orchestrator.clone();

            tokio::spawn(async move {
                let _permit = permit;
                handle_arrival(&orchestrator, arrival).await;
            });
        }

        // Wait for in-flight matches
        let all = u32::try_from(concurrency).unwrap_or(u32::MAX);
        let _ = permits.acquire_many(all).await;
        debug!("arrival channel closed");
    })
}

async fn handle_arrival<D, R, L, N>(orchestrator: &Orchestrator<D, R, L, N>, arrival: MatchRequest)
where
    D: RiderDirectory,
    R: RouteRegistry,
    L: TripLedger,
    N: Notifier,
{
    let route = arrival.route_id.clone();
    let station = arrival.station_id.clone();

    match orchestrator.try_match(arrival).await {
        Ok(MatchOutcome::Committed(trip)) => {
            info!(%route, %station, trip = %trip.id, riders = trip.rider_ids.len(), "arrival matched");
        }
        Ok(MatchOutcome::Existing(trip)) => {
            debug!(%route, %station, trip = %trip.id, "duplicate arrival");
        }
        Ok(MatchOutcome::NoMatch(reason)) => {
            debug!(%route, %station, ?reason, "arrival without match");
        }
        Err(e) if e.is_transient() => {
            warn!(%route, %station, error = %e, "arrival match failed, telemetry may retry");
        }
        Err(e) => {
            warn!(%route, %station, error = %e, "arrival rejected");
        }
    }
}
