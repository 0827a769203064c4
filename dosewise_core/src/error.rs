//! Error types for the dosewise_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for dosewise_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid dose quantity or dose arithmetic (zero denominator, unit mismatch)
    #[error("Dose error: {0}")]
    Dose(String),

    /// Schedule does not satisfy its structural invariants
    #[error("Schedule error: {0}")]
    Schedule(String),

    /// Malformed "HH:MM" clock time
    #[error("Invalid clock time: {0:?}")]
    InvalidClockTime(String),

    /// Timezone name not found in the IANA database
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    /// Command validation failed in the service layer
    #[error("Validation error: {0}")]
    Validation(String),

    /// No profile with the given id or name
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// No medication with the given id or name
    #[error("Medication not found: {0}")]
    MedicationNotFound(String),

    /// Persisted store could not be migrated or interpreted
    #[error("Store error: {0}")]
    Store(String),
}
