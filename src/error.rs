//! Error types for snowsample.
//!
//! Defines the main error enum used throughout the pipeline. Every variant is
//! terminal for a run; nothing is retried.

use thiserror::Error;

/// Main error type for snowsample operations.
#[derive(Error, Debug)]
pub enum SnowsampleError {
    /// Driver provisioning errors (metadata fetch/parse, download, disk).
    #[error("Provision error: {0}")]
    Provision(String),

    /// Session errors (invalid master, missing jars, session already live).
    #[error("Session error: {0}")]
    Session(String),

    /// One or more requested credentials were absent from the secret store.
    #[error("Missing credential(s): {}", names.join(", "))]
    CredentialMissing { names: Vec<String> },

    /// Secret store transport and protocol errors.
    #[error("Secret store error: {0}")]
    Secrets(String),

    /// Query execution errors surfaced from the connector.
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors (invalid config file, bad CLI values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local filesystem errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SnowsampleError {
    /// Creates a provision error with the given message.
    pub fn provision(msg: impl Into<String>) -> Self {
        Self::Provision(msg.into())
    }

    /// Creates a session error with the given message.
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Creates a missing-credential error for the given names.
    pub fn credential_missing<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::CredentialMissing {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a secret store error with the given message.
    pub fn secrets(msg: impl Into<String>) -> Self {
        Self::Secrets(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Provision(_) => "Provision Error",
            Self::Session(_) => "Session Error",
            Self::CredentialMissing { .. } => "Credential Error",
            Self::Secrets(_) => "Secret Store Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::Io(_) => "I/O Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using SnowsampleError.
pub type Result<T> = std::result::Result<T, SnowsampleError>;
