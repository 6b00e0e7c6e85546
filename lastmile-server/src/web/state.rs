//! Application state for the web layer.

use tokio::sync::mpsc;

use crate::notify::LogNotifier;
use crate::orchestrator::{MatchRequest, Orchestrator};
use crate::store::{InMemoryDirectory, InMemoryLedger, InMemoryRegistry};

/// The orchestrator as wired up by the server.
pub type AppOrchestrator =
    Orchestrator<InMemoryDirectory, InMemoryRegistry, InMemoryLedger, LogNotifier>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Matching orchestrator, which also owns the stores
    pub orchestrator: AppOrchestrator,

    /// Intake for driver arrival events
    pub arrivals: mpsc::Sender<MatchRequest>,
}

impl AppState {
    pub fn new(orchestrator: AppOrchestrator, arrivals: mpsc::Sender<MatchRequest>) -> Self {
        Self {
            orchestrator,
            arrivals,
        }
    }
}
