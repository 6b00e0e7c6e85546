//! Server configuration from the environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::orchestrator::{MatchConfig, WindowMode};

/// Everything `main` needs to start the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub addr: SocketAddr,

    /// Maximum number of arrival events matched at once.
    pub arrival_concurrency: usize,

    /// Capacity of the arrival event queue.
    pub arrival_queue: usize,

    pub matching: MatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            arrival_concurrency: 8,
            arrival_queue: 1024,
            matching: MatchConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read `LASTMILE_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable source. Unset variables keep their
    /// defaults; unparseable ones are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = parsed(&lookup, "LASTMILE_ADDR") {
            config.addr = addr;
        }
        if let Some(ms) = parsed::<u64>(&lookup, "LASTMILE_STORE_TIMEOUT_MS") {
            config.matching.store_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parsed::<u64>(&lookup, "LASTMILE_DEDUPE_WINDOW_SECS") {
            config.matching.dedupe_window = Duration::from_secs(secs);
        }
        if let Some(mode) = parsed::<WindowMode>(&lookup, "LASTMILE_WINDOW_MODE") {
            config.matching.window_mode = mode;
        }
        if let Some(n) = parsed::<usize>(&lookup, "LASTMILE_ARRIVAL_CONCURRENCY") {
            config.arrival_concurrency = n.max(1);
        }

        config
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(variable = name, value = %raw, error = %e, "ignoring invalid setting");
            None
        }
    }
}
