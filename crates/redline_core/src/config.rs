//! Dispatcher configuration.
//!
//! One immutable configuration object, constructed at process start and
//! passed explicitly to the components that need it. There is no module-level
//! mutable state; the pure calculators take no configuration at all.

use chrono::Duration as ChronoDuration;
use log::warn;
use std::time::Duration;

const DEFAULT_HORIZON_HOURS: i64 = 24;
const DEFAULT_SEND_WORKERS: usize = 1;
const DEFAULT_SEND_TIMEOUT_SECS: u64 = 10;

/// Immutable settings for one dispatcher instance.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Look-ahead from "now" for due candidates. The window's upper bound is
    /// additionally truncated to the start of its calendar day.
    pub horizon: ChronoDuration,
    /// Concurrent send workers; 1 means strictly sequential delivery.
    pub send_workers: usize,
    /// Per-send deadline; the dispatcher records an overrun as a timeout.
    pub send_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            horizon: ChronoDuration::hours(DEFAULT_HORIZON_HOURS),
            send_workers: DEFAULT_SEND_WORKERS,
            send_timeout: Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
        }
    }
}

impl DispatchConfig {
    /// Builds configuration from `REDLINE_*` environment variables.
    ///
    /// Recognized: `REDLINE_HORIZON_HOURS`, `REDLINE_SEND_WORKERS`,
    /// `REDLINE_SEND_TIMEOUT_SECS`. Unset variables keep their defaults;
    /// unparsable or out-of-range values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(hours) = parse_positive(&lookup, "REDLINE_HORIZON_HOURS") {
            config.horizon = ChronoDuration::hours(hours);
        }
        if let Some(workers) = parse_positive(&lookup, "REDLINE_SEND_WORKERS") {
            config.send_workers = workers;
        }
        if let Some(secs) = parse_positive(&lookup, "REDLINE_SEND_TIMEOUT_SECS") {
            config.send_timeout = Duration::from_secs(secs);
        }

        config
    }
}

fn parse_positive<T>(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Some(value),
        _ => {
            warn!(
                "event=config_ignored module=config status=warn key={key} value={}",
                raw.trim()
            );
            None
        }
    }
}
