//! Tuning knobs for the match protocol.

use std::str::FromStr;
use std::time::Duration;

/// Which rider deadlines count as compatible with a driver's arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowMode {
    /// Deadlines within the window on either side of the arrival.
    #[default]
    Symmetric,
    /// Only deadlines at or after the arrival, up to the window.
    BeforeDeadline,
}

impl FromStr for WindowMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "symmetric" => Ok(WindowMode::Symmetric),
            "before-deadline" | "before_deadline" => Ok(WindowMode::BeforeDeadline),
            other => Err(format!("unknown window mode: {other}")),
        }
    }
}

/// Configuration for the matching orchestrator.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// How many times to retry a lost seat reservation race.
    pub max_reserve_attempts: u32,

    /// Wait before the first reservation retry. Doubles on each retry.
    pub reserve_backoff: Duration,

    /// Upper bound on any single store call.
    pub store_timeout: Duration,

    /// How many times each compensation step is tried before giving up.
    pub compensation_attempts: u32,

    /// How long a dedupe key keeps resolving to the same trip.
    pub dedupe_window: Duration,

    /// Maximum number of in-flight attempts tracked for coalescing.
    pub dedupe_capacity: u64,

    /// Match window (minutes) for stations that do not set their own.
    pub default_window_minutes: u32,

    pub window_mode: WindowMode,

    /// Upper bound on delivering one notification.
    pub notify_timeout: Duration,
}

impl MatchConfig {
    pub fn new(store_timeout: Duration, dedupe_window: Duration, window_mode: WindowMode) -> Self {
        Self {
            store_timeout,
            dedupe_window,
            window_mode,
            ..Self::default()
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_reserve_attempts(mut self, attempts: u32, backoff: Duration) -> Self {
        self.max_reserve_attempts = attempts.max(1);
        self.reserve_backoff = backoff;
        self
    }

    pub fn with_compensation_attempts(mut self, attempts: u32) -> Self {
        self.compensation_attempts = attempts.max(1);
        self
    }

    pub fn with_dedupe_window(mut self, window: Duration) -> Self {
        self.dedupe_window = window;
        self
    }

    pub fn with_window_mode(mut self, mode: WindowMode) -> Self {
        self.window_mode = mode;
        self
    }

    pub fn with_default_window_minutes(mut self, minutes: u32) -> Self {
        self.default_window_minutes = minutes;
        self
    }

    /// Window (minutes) for a station, falling back to the default for 0.
    pub fn window_minutes(&self, station_window: u32) -> u32 {
        if station_window == 0 {
            self.default_window_minutes
        } else {
            station_window
        }
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_reserve_attempts: 5,
            reserve_backoff: Duration::from_millis(10),
            store_timeout: Duration::from_secs(2),
            compensation_attempts: 3,
            dedupe_window: Duration::from_secs(600), // 10 minutes
            dedupe_capacity: 10_000,
            default_window_minutes: 5,
            window_mode: WindowMode::Symmetric,
            notify_timeout: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = MatchConfig::default();

        assert_eq!(config.max_reserve_attempts, 5);
        assert_eq!(config.reserve_backoff, Duration::from_millis(10));
        assert_eq!(config.store_timeout, Duration::from_secs(2));
        assert_eq!(config.compensation_attempts, 3);
        assert_eq!(config.dedupe_window, Duration::from_secs(600));
        assert_eq!(config.dedupe_capacity, 10_000);
        assert_eq!(config.default_window_minutes, 5);
        assert_eq!(config.window_mode, WindowMode::Symmetric);
    }

    #[test]
    fn builders_override_defaults() {
        let config = MatchConfig::new(
            Duration::from_millis(50),
            Duration::from_secs(30),
            WindowMode::BeforeDeadline,
        )
        .with_reserve_attempts(0, Duration::from_millis(1))
        .with_compensation_attempts(7);

        assert_eq!(config.store_timeout, Duration::from_millis(50));
        assert_eq!(config.dedupe_window, Duration::from_secs(30));
        assert_eq!(config.window_mode, WindowMode::BeforeDeadline);
        assert_eq!(config.max_reserve_attempts, 1);
        assert_eq!(config.compensation_attempts, 7);
        assert_eq!(config.dedupe_capacity, 10_000);
    }

    #[test]
    fn station_window_falls_back_to_default() {
        let config = MatchConfig::default().with_default_window_minutes(7);
        assert_eq!(config.window_minutes(0), 7);
        assert_eq!(config.window_minutes(3), 3);
    }

    #[test]
    fn parse_window_mode() {
        assert_eq!("symmetric".parse(), Ok(WindowMode::Symmetric));
        assert_eq!("Before-Deadline".parse(), Ok(WindowMode::BeforeDeadline));
        assert!("sideways".parse::<WindowMode>().is_err());
    }
}
