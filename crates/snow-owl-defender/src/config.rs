//! Configuration for the defender
//!
//! NIST 800-53: AC-7 (Unsuccessful Logon Attempts), CM-6 (Configuration Settings)
//! Implementation: Score weights, ban durations and table capacities

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DefenderError, Result};

/// Upper bound for every minute valued setting, roughly one hundred years
pub const MAX_DURATION_MINUTES: i64 = 100 * 365 * 24 * 60;

/// Defender configuration
///
/// Durations are expressed in minutes, `ban_time_increment` in percent of
/// `ban_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefenderConfig {
    /// Turns host reputation tracking on or off
    pub enabled: bool,

    /// Base ban duration in minutes
    pub ban_time: i64,

    /// Percentage of `ban_time` added to an active ban on each further offense
    pub ban_time_increment: i64,

    /// Score at which a host is banned
    pub threshold: i32,

    /// Weight for a login attempt against a missing account, or a
    /// connection closed without any login attempt
    pub score_invalid: i32,

    /// Weight for a failed login against an existing account
    pub score_valid: i32,

    /// Weight for a rate or connection limit violation
    pub score_limit_exceeded: i32,

    /// Sliding window for score decay, in minutes
    pub observation_time: i64,

    /// Table size kept after eviction
    pub entries_soft_limit: usize,

    /// Table size that triggers eviction
    pub entries_hard_limit: usize,

    /// JSON file with addresses and networks that are never banned
    pub safelist_file: Option<PathBuf>,

    /// JSON file with addresses and networks that are always banned
    pub blocklist_file: Option<PathBuf>,
}

impl Default for DefenderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ban_time: default_ban_time(),
            ban_time_increment: default_ban_time_increment(),
            threshold: default_threshold(),
            score_invalid: 2,
            score_valid: 1,
            score_limit_exceeded: 3,
            observation_time: default_observation_time(),
            entries_soft_limit: 100,
            entries_hard_limit: 150,
            safelist_file: None,
            blocklist_file: None,
        }
    }
}

impl DefenderConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `DefenderError::Config` if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DefenderError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&content)
            .map_err(|e| DefenderError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    ///
    /// A disabled configuration is always valid.
    ///
    /// # NIST 800-53: CM-6 (Configuration Settings)
    /// # Implementation: Rejects settings where a single event could ban a
    /// # host or where eviction could never run
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.score_invalid >= self.threshold {
            return Err(DefenderError::Config(format!(
                "score_invalid {} cannot be greater than or equal to threshold {}",
                self.score_invalid, self.threshold
            )));
        }

        if self.score_limit_exceeded >= self.threshold {
            return Err(DefenderError::Config(format!(
                "score_limit_exceeded {} cannot be greater than or equal to threshold {}",
                self.score_limit_exceeded, self.threshold
            )));
        }

        if self.score_valid >= self.threshold {
            return Err(DefenderError::Config(format!(
                "score_valid {} cannot be greater than or equal to threshold {}",
                self.score_valid, self.threshold
            )));
        }

        if self.ban_time <= 0 {
            return Err(DefenderError::Config(format!(
                "invalid ban_time {}",
                self.ban_time
            )));
        }

        if self.ban_time_increment <= 0 {
            return Err(DefenderError::Config(format!(
                "invalid ban_time_increment {}",
                self.ban_time_increment
            )));
        }

        if self.observation_time <= 0 {
            return Err(DefenderError::Config(format!(
                "invalid observation_time {}",
                self.observation_time
            )));
        }

        for (name, minutes) in [
            ("ban_time", self.ban_time),
            ("observation_time", self.observation_time),
        ] {
            if minutes > MAX_DURATION_MINUTES {
                return Err(DefenderError::Config(format!(
                    "{} {} exceeds the maximum of {} minutes",
                    name, minutes, MAX_DURATION_MINUTES
                )));
            }
        }

        match self.ban_time.checked_mul(self.ban_time_increment) {
            Some(product) if product / 100 <= MAX_DURATION_MINUTES => {}
            _ => {
                return Err(DefenderError::Config(format!(
                    "ban_time_increment {} extends a {} minute ban by more than {} minutes",
                    self.ban_time_increment, self.ban_time, MAX_DURATION_MINUTES
                )));
            }
        }

        if self.entries_soft_limit == 0 {
            return Err(DefenderError::Config(
                "entries_soft_limit must be greater than zero".to_string(),
            ));
        }

        if self.entries_hard_limit <= self.entries_soft_limit {
            return Err(DefenderError::Config(format!(
                "entries_hard_limit {} must be greater than entries_soft_limit {}",
                self.entries_hard_limit, self.entries_soft_limit
            )));
        }

        Ok(())
    }

    /// Length of the scoring window
    pub fn observation_window(&self) -> Duration {
        minutes_saturating(self.observation_time)
    }

    /// Duration of a fresh ban
    pub fn ban_duration(&self) -> Duration {
        minutes_saturating(self.ban_time)
    }

    /// Extension applied to an active ban on a repeat offense, at least one minute
    pub fn ban_increment(&self) -> Duration {
        let minutes = self.ban_time.saturating_mul(self.ban_time_increment) / 100;
        minutes_saturating(minutes.max(1))
    }
}

/// Values beyond what `Duration` can hold clamp to `Duration::MAX`
fn minutes_saturating(minutes: i64) -> Duration {
    Duration::try_minutes(minutes).unwrap_or(Duration::MAX)
}

// NIST 800-53: AC-7 (Unsuccessful Logon Attempts)
// Default: 30 minute ban
fn default_ban_time() -> i64 {
    30
}

// Default: extend active bans by half of ban_time
fn default_ban_time_increment() -> i64 {
    50
}

fn default_threshold() -> i32 {
    15
}

// Default: 30 minute observation window
fn default_observation_time() -> i64 {
    30
}
