//! Rider and driver notifications.
//!
//! Notifications are fire-and-forget: the orchestrator hands events to a
//! [`Notifier`] on a detached task with its own timeout, and a failure is
//! only ever logged.

use std::future::Future;

use tracing::info;

use crate::domain::Trip;

/// Something riders or the driver should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEvent {
    TripCommitted(Trip),
    TripCancelled(Trip),
    TripCompleted(Trip),
}

impl MatchEvent {
    pub fn trip(&self) -> &Trip {
        match self {
            MatchEvent::TripCommitted(trip)
            | MatchEvent::TripCancelled(trip)
            | MatchEvent::TripCompleted(trip) => trip,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            MatchEvent::TripCommitted(_) => "matched to a driver",
            MatchEvent::TripCancelled(_) => "trip cancelled",
            MatchEvent::TripCompleted(_) => "trip completed",
        }
    }
}

/// Errors from delivering a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),
}

/// Delivers match events.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, event: &MatchEvent) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, event: &MatchEvent) -> Result<(), NotifyError> {
        let trip = event.trip();
        info!(
            target: "lastmile::notify",
            recipient = %trip.driver_id,
            trip = %trip.id,
            "{}",
            event.message()
        );
        for rider in &trip.rider_ids {
            info!(
                target: "lastmile::notify",
                recipient = %rider,
                trip = %trip.id,
                "{}",
                event.message()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// Records every delivered event. Can be told to fail or hang.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        pub events: Mutex<Vec<MatchEvent>>,
        pub fail: bool,
        pub hang: Option<Duration>,
    }

    impl RecordingNotifier {
        pub fn events(&self) -> Vec<MatchEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: &MatchEvent) -> Result<(), NotifyError> {
            if let Some(delay) = self.hang {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(NotifyError::Unavailable("sms gateway down".into()));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }
}
