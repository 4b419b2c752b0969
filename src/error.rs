//! Unified error handling for the activity-tracker library.
//!
//! Every fallible operation returns [`TrackerError`]. Permission and decode
//! failures are surfaced to the caller as-is; network failures carry the
//! collaborator they came from so the session can decide whether to retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// External collaborator a network error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkService {
    Directions,
    Persistence,
}

impl fmt::Display for NetworkService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkService::Directions => write!(f, "directions"),
            NetworkService::Persistence => write!(f, "persistence"),
        }
    }
}

/// Unified error type for tracker operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackerError {
    /// The user refused location access. Terminal for the session.
    #[error("Location permission was denied")]
    PermissionDenied,

    /// The location provider could not deliver positions.
    #[error("Location provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    /// A directions or persistence request failed.
    #[error("{}", format_network(.service, .message, .status_code))]
    Network {
        service: NetworkService,
        message: String,
        status_code: Option<u16>,
    },

    /// Malformed or truncated polyline text.
    #[error("Polyline decode failed at byte {position}: {message}")]
    Decode { position: usize, message: String },

    /// A point that cannot be written as a polyline.
    #[error("Polyline encode failed: {message}")]
    Encode { message: String },

    /// An interval whose end precedes its start.
    #[error("Invalid interval: end {end} is before start {start}")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// The directions overlay could not produce a route.
    #[error("Route unavailable: {cause}")]
    RouteUnavailable { cause: Box<TrackerError> },

    /// An event the session state machine does not accept in its current state.
    #[error("Cannot apply '{event}' while session is {from}")]
    InvalidTransition { from: String, event: String },

    /// An outstanding request was aborted because its session moved on.
    #[error("Request cancelled")]
    Cancelled,
}

fn format_network(service: &NetworkService, message: &str, status_code: &Option<u16>) -> String {
    match status_code {
        Some(code) => format!("{} request failed ({}): {}", service, code, message),
        None => format!("{} request failed: {}", service, message),
    }
}

impl TrackerError {
    /// Shorthand for a network error without an HTTP status.
    pub fn network(service: NetworkService, message: impl Into<String>) -> Self {
        TrackerError::Network {
            service,
            message: message.into(),
            status_code: None,
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TrackerError::Network { status_code, .. } => match status_code {
                // Client errors other than rate limiting will not change on retry
                Some(code) => *code == 429 || *code >= 500,
                None => true,
            },
            TrackerError::ProviderUnavailable { .. } => true,
            TrackerError::RouteUnavailable { cause } => cause.is_retryable(),
            _ => false,
        }
    }
}

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
