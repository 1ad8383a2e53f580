//! Configuration for the booking client
//!
//! Settings come from the environment (with `.env` support for local
//! development). Only the Supabase endpoint and key are required; hold
//! timing falls back to defaults matching the backend's own.

use std::time::Duration;
use thiserror::Error;

/// Default hold length requested from the backend
pub const DEFAULT_HOLD_DURATION_MINUTES: u32 = 10;

/// Default interval between expired-hold sweeps
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    /// An environment variable is set but unparseable
    #[error("invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct BookingConfig {
    /// Base URL of the Supabase project
    pub supabase_url: String,
    /// Anonymous API key; also the bearer token for guest sessions
    pub supabase_anon_key: String,
    /// How long the backend is asked to hold a slot
    pub hold_duration_minutes: u32,
    /// How often expired holds are swept
    pub cleanup_interval: Duration,
}

impl BookingConfig {
    /// Load configuration from the process environment
    ///
    /// Reads a `.env` file first when one is present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a
    /// numeric variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a
    /// numeric variable fails to parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let supabase_url =
            lookup("SUPABASE_URL").ok_or(ConfigError::MissingVar("SUPABASE_URL"))?;
        let supabase_anon_key =
            lookup("SUPABASE_ANON_KEY").ok_or(ConfigError::MissingVar("SUPABASE_ANON_KEY"))?;

        let hold_duration_minutes = parse_or(
            &lookup,
            "HOLD_DURATION_MINUTES",
            DEFAULT_HOLD_DURATION_MINUTES,
        )?;
        let cleanup_secs = parse_or(
            &lookup,
            "HOLD_CLEANUP_INTERVAL_SECS",
            DEFAULT_CLEANUP_INTERVAL_SECS,
        )?;

        Ok(Self {
            supabase_url,
            supabase_anon_key,
            hold_duration_minutes,
            cleanup_interval: Duration::from_secs(cleanup_secs),
        })
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidVar { var, value }),
    }
}
