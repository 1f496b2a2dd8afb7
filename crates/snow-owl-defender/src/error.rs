//! Error types for the defender
//!
//! NIST 800-53: SI-11 (Error Handling)
//! Implementation: Startup failures are fatal, lookups are recoverable, and
//! attacker-controlled input never produces an error on the hot path

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for defender operations
pub type Result<T> = std::result::Result<T, DefenderError>;

/// Defender error types
#[derive(Error, Debug)]
pub enum DefenderError {
    /// Invalid configuration
    ///
    /// NIST 800-53: CM-6 (Configuration Settings)
    /// Implementation: Score, threshold or limit relationships are inconsistent
    #[error("Invalid defender configuration: {0}")]
    Config(String),

    /// Host list file could not be read
    ///
    /// Missing file, permission denied, or a path that is not a regular file.
    #[error("Unable to read host list {}: {source}", path.display())]
    ListLoadIo {
        /// Path of the list file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Host list file is not valid JSON
    #[error("Unable to parse host list {}: {source}", path.display())]
    ListLoadParse {
        /// Path of the list file
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Address is neither tracked nor banned
    #[error("Host not found: {0}")]
    NotFound(String),
}

impl DefenderError {
    /// Check if error is recoverable
    ///
    /// # Returns
    ///
    /// `true` for negative lookups that callers handle as a normal result
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DefenderError::NotFound(_))
    }

    /// Check if error must abort server startup
    ///
    /// # NIST 800-53: SI-11 (Error Handling)
    /// # Implementation: Configuration and list loading failures fail fast
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            DefenderError::Config(_)
                | DefenderError::ListLoadIo { .. }
                | DefenderError::ListLoadParse { .. }
        )
    }
}
