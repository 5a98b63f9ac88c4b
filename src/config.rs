//! Runtime configuration for the sync core.
//!
//! Every knob has a default and an environment override. Values that do not
//! parse fall back to the default; only contradictory settings are errors.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use crate::cull::DEFAULT_CULL_PADDING_PX;
use crate::error::ErrorCode;
use crate::lock::DEFAULT_LOCK_TTL_MS;
use crate::viewport::ZoomRange;

const DEFAULT_LOCK_REFRESH_MS: i64 = 5_000;
const DEFAULT_CURSOR_STALE_MS: i64 = 3_000;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;
const DEFAULT_NOTICE_CAPACITY: usize = 64;
const DEFAULT_MIN_ZOOM: f64 = 0.1;
const DEFAULT_MAX_ZOOM: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("zoom bounds inverted or non-positive: min {min}, max {max}")]
    InvalidZoomRange { min: f64, max: f64 },
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidZoomRange { .. } => "E_CONFIG_ZOOM_RANGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Lifetime of an edit lock without refresh.
    pub lock_ttl_ms: i64,
    /// Minimum interval between lock republishes during a gesture.
    pub lock_refresh_ms: i64,
    /// Culling margin in screen pixels.
    pub cull_padding_px: f64,
    /// Remote cursors older than this are dropped.
    pub cursor_stale_ms: i64,
    /// Period of the background lock/cursor sweep.
    pub sweep_interval_ms: u64,
    /// Buffered notices before new ones are dropped.
    pub notice_capacity: usize,
    pub zoom: ZoomRange,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
            lock_refresh_ms: DEFAULT_LOCK_REFRESH_MS,
            cull_padding_px: DEFAULT_CULL_PADDING_PX,
            cursor_stale_ms: DEFAULT_CURSOR_STALE_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            notice_capacity: DEFAULT_NOTICE_CAPACITY,
            zoom: ZoomRange { min: DEFAULT_MIN_ZOOM, max: DEFAULT_MAX_ZOOM },
        }
    }
}

impl SyncConfig {
    /// Read `SYNC_*` environment variables.
    ///
    /// # Errors
    ///
    /// `InvalidZoomRange` when the configured zoom bounds contradict.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| match std::env::var(key) {
            Ok(value) => Some(value),
            Err(std::env::VarError::NotPresent | std::env::VarError::NotUnicode(_)) => None,
        })
    }

    /// Build from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// `InvalidZoomRange` when the configured zoom bounds contradict.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = Self {
            lock_ttl_ms: env_parse(&lookup, "SYNC_LOCK_TTL_MS", DEFAULT_LOCK_TTL_MS),
            lock_refresh_ms: env_parse(&lookup, "SYNC_LOCK_REFRESH_MS", DEFAULT_LOCK_REFRESH_MS),
            cull_padding_px: env_parse(&lookup, "SYNC_CULL_PADDING_PX", DEFAULT_CULL_PADDING_PX),
            cursor_stale_ms: env_parse(&lookup, "SYNC_CURSOR_STALE_MS", DEFAULT_CURSOR_STALE_MS),
            sweep_interval_ms: env_parse(&lookup, "SYNC_SWEEP_INTERVAL_MS", DEFAULT_SWEEP_INTERVAL_MS),
            notice_capacity: env_parse(&lookup, "SYNC_NOTICE_CAPACITY", DEFAULT_NOTICE_CAPACITY),
            zoom: ZoomRange {
                min: env_parse(&lookup, "SYNC_MIN_ZOOM", DEFAULT_MIN_ZOOM),
                max: env_parse(&lookup, "SYNC_MAX_ZOOM", DEFAULT_MAX_ZOOM),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ZoomRange { min, max } = self.zoom;
        if !(min > 0.0 && min <= max && max.is_finite()) {
            return Err(ConfigError::InvalidZoomRange { min, max });
        }
        Ok(())
    }
}

/// Parse `key` from `lookup`, falling back to `default` when absent or
/// unparseable.
pub(crate) fn env_parse<T>(lookup: impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match lookup(key).map(|v| v.trim().parse::<T>()) {
        Some(Ok(value)) => value,
        Some(Err(_)) | None => default,
    }
}
