//! Unified error handling for the rail-tracks library.
//!
//! Most of these never escape the fleet runner: no-path, provider and snap
//! failures are recovered as empty routes and only logged. They surface from
//! configuration, loading and sink operations.

use thiserror::Error;

/// Unified error type for rail-tracks operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    /// Directions provider found no path in any travel mode
    #[error("No path found between origin and destination")]
    NoPath,
    /// Transport, auth or rate-limit failure from the directions provider
    #[error("{}", provider_message(.message, .status_code))]
    ProviderError {
        message: String,
        status_code: Option<u16>,
    },
    /// Reference network has no candidate for a snap
    #[error("Nothing to snap to: {what}")]
    NotFound { what: String },
    /// Route has fewer than two points
    #[error("Route for '{train_id}' has {point_count} points, minimum 2 required")]
    DegenerateRoute { train_id: String, point_count: usize },
    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },
    /// File system error
    #[error("I/O error: {message}")]
    Io { message: String },
    /// GeoJSON parse or structure error
    #[error("GeoJSON error: {message}")]
    GeoJson { message: String },
    /// Persistence/storage error
    #[error("Persistence error: {message}")]
    PersistenceError { message: String },
    /// Run was cancelled before this train finished
    #[error("Cancelled")]
    Cancelled,
    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn provider_message(message: &str, status_code: &Option<u16>) -> String {
    match status_code {
        Some(code) => format!("Provider error ({}): {}", code, message),
        None => format!("Provider error: {}", message),
    }
}

impl From<std::io::Error> for TrackError {
    fn from(e: std::io::Error) -> Self {
        TrackError::Io {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for TrackError {
    fn from(e: serde_json::Error) -> Self {
        TrackError::ConfigError {
            message: e.to_string(),
        }
    }
}

/// Result type alias for rail-tracks operations.
pub type Result<T> = std::result::Result<T, TrackError>;

/// Extension trait for converting Option to TrackError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a snap-failure error.
    fn ok_or_not_found(self, what: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, what: &str) -> Result<T> {
        self.ok_or_else(|| TrackError::NotFound {
            what: what.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrackError::DegenerateRoute {
            train_id: "train-1".to_string(),
            point_count: 1,
        };
        assert!(err.to_string().contains("train-1"));
        assert!(err.to_string().contains("1 points"));

        let err = TrackError::ProviderError {
            message: "OVER_QUERY_LIMIT".to_string(),
            status_code: Some(429),
        };
        assert_eq!(err.to_string(), "Provider error (429): OVER_QUERY_LIMIT");
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_not_found("origin station");
        assert!(matches!(result, Err(TrackError::NotFound { .. })));
        assert_eq!(Some(3).ok_or_not_found("unused"), Ok(3));
    }
}
