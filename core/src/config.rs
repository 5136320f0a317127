//! Logging configuration handle.
//!
//! Codec and rectification entry points take a [`CalibConfig`] instead of
//! consulting a process-wide log level. The `calib_*!` macros gate a
//! `tracing` event on the handle's level.

use std::env;
use tracing::level_filters::LevelFilter;
use tracing::Level;

/// Environment variable read by [`CalibConfig::from_env`].
pub const CALIB_LOG_ENV: &str = "CALIB_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibConfig {
    /// Most verbose level emitted by calibration code.
    pub log_level: LevelFilter,
}

impl CalibConfig {
    pub fn new(log_level: LevelFilter) -> Self {
        Self { log_level }
    }

    /// Build a config from `CALIB_LOG`, falling back to INFO when the
    /// variable is unset or unparsable.
    ///
    /// The fallback warning goes to whatever subscriber is installed at
    /// call time. Binaries that install one afterwards should use
    /// [`CalibConfig::from_env_checked`] and report the value themselves.
    pub fn from_env() -> Self {
        let (config, rejected) = Self::from_env_checked();
        if let Some(raw) = rejected {
            tracing::warn!(
                "{} has unrecognised value '{}', using 'info'",
                CALIB_LOG_ENV,
                raw
            );
        }
        config
    }

    /// Like [`CalibConfig::from_env`], but hands back an unparsable
    /// `CALIB_LOG` value instead of logging it.
    pub fn from_env_checked() -> (Self, Option<String>) {
        Self::from_log_setting(env::var(CALIB_LOG_ENV).ok())
    }

    /// Resolve an optional level name. Unparsable names fall back to INFO
    /// and are returned alongside the config.
    pub fn from_log_setting(raw: Option<String>) -> (Self, Option<String>) {
        match raw {
            Some(raw) => match parse_log_level(&raw) {
                Some(log_level) => (Self { log_level }, None),
                None => (Self::default(), Some(raw)),
            },
            None => (Self::default(), None),
        }
    }

    pub fn with_log_level(mut self, log_level: LevelFilter) -> Self {
        self.log_level = log_level;
        self
    }

    /// Whether an event at `level` passes this config's filter.
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.log_level
    }
}

impl Default for CalibConfig {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::INFO,
        }
    }
}

/// Parse `trace|debug|info|warn|error|off` (case-insensitive).
pub fn parse_log_level(raw: &str) -> Option<LevelFilter> {
    raw.trim().parse::<LevelFilter>().ok()
}

#[macro_export]
macro_rules! calib_trace {
    ($cfg:expr, $($arg:tt)+) => {
        if $cfg.enabled($crate::__tracing::Level::TRACE) {
            $crate::__tracing::trace!($($arg)+);
        }
    };
}

#[macro_export]
macro_rules! calib_debug {
    ($cfg:expr, $($arg:tt)+) => {
        if $cfg.enabled($crate::__tracing::Level::DEBUG) {
            $crate::__tracing::debug!($($arg)+);
        }
    };
}

#[macro_export]
macro_rules! calib_info {
    ($cfg:expr, $($arg:tt)+) => {
        if $cfg.enabled($crate::__tracing::Level::INFO) {
            $crate::__tracing::info!($($arg)+);
        }
    };
}

#[macro_export]
macro_rules! calib_warn {
    ($cfg:expr, $($arg:tt)+) => {
        if $cfg.enabled($crate::__tracing::Level::WARN) {
            $crate::__tracing::warn!($($arg)+);
        }
    };
}

#[macro_export]
macro_rules! calib_error {
    ($cfg:expr, $($arg:tt)+) => {
        if $cfg.enabled($crate::__tracing::Level::ERROR) {
            $crate::__tracing::error!($($arg)+);
        }
    };
}
