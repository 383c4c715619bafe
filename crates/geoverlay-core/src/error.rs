//! Custom error types for `geoverlay` operations.
//!
//! This module provides structured error handling using `thiserror`. Each
//! concern (configuration, CRS handling, geometry, pipeline, persistence) has
//! its own enum; [`GeoverlayError`] composes them so callers can match on the
//! category while the display text stays specific.

use geoverlay_core_common::{GeometryKind, SchemaError, ValidationError};
use thiserror::Error;

/// Main error type for `geoverlay` operations.
///
/// It uses `#[error(transparent)]` to delegate display formatting to the
/// underlying error variants.
#[derive(Debug, Error)]
pub enum GeoverlayError {
    /// Schema construction or derivation errors
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A feature does not conform to its schema
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Coordinate reference system errors
    #[error(transparent)]
    Crs(#[from] CrsError),

    /// Geometry parameter and computation errors
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Cursor protocol and cancellation errors
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Persistence errors
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic errors from collaborators
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coordinate reference system errors.
#[derive(Debug, Error)]
pub enum CrsError {
    /// No transformation is available between the two systems.
    #[error("No transformation available from {from} to {to}")]
    UnsupportedTransform {
        /// Source CRS identifier
        from: String,
        /// Target CRS identifier
        to: String,
    },

    /// A coordinate fell outside the domain of a transformation.
    #[error("Coordinate ({x}, {y}) is outside the valid domain of {crs}")]
    OutOfDomain {
        /// X / longitude
        x: f64,
        /// Y / latitude
        y: f64,
        /// CRS identifier
        crs: String,
    },
}

/// Geometry parameter and computation errors.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// A numeric parameter is out of range.
    #[error("Invalid {parameter}: {message}")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Why the value is invalid
        message: String,
    },

    /// An input collection has the wrong geometry kind for its role.
    #[error("{role} must be {expected} features, found {found}")]
    WrongGeometryKind {
        /// Role of the input in the operation (e.g. "polygon features")
        role: String,
        /// Description of the accepted kinds
        expected: String,
        /// Declared kind of the input
        found: GeometryKind,
    },
}

/// Cursor protocol and run control errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// `next_feature` was called after `has_next` returned `false`.
    #[error("Iterator exhausted: has_next() returned false")]
    Exhausted,

    /// The progress listener requested cancellation.
    #[error("Operation canceled after {written} feature(s)")]
    Canceled {
        /// Number of features staged before cancellation
        written: u64,
    },

    /// The input variant is not handled by this core.
    #[error("Unsupported input: {kind}")]
    UnsupportedInput {
        /// Description of the input
        kind: String,
    },
}

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused to start a run.
    #[error("Failed to open store for '{type_name}': {source}")]
    Begin {
        /// Output schema type name
        type_name: String,
        /// Underlying error
        #[source]
        source: anyhow::Error,
    },

    /// The store failed while persisting staged features.
    #[error("Failed to commit {count} feature(s): {source}")]
    Commit {
        /// Number of staged features
        count: usize,
        /// Underlying error
        #[source]
        source: anyhow::Error,
    },
}

/// Configuration errors.
///
/// These errors occur when options or configuration are invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid option value
    #[error("Invalid {option} option: {message}")]
    InvalidOption {
        /// The option name
        option: String,
        /// Why it's invalid
        message: String,
    },

    /// Required option is missing
    #[error("Missing required option: {option}")]
    MissingRequired {
        /// The missing option name
        option: String,
    },

    /// Options conflict with each other
    #[error("Conflicting options: {options}")]
    ConflictingOptions {
        /// Description of the conflicting options
        options: String,
    },
}

/// Type alias for Results using `GeoverlayError`.
pub type Result<T> = std::result::Result<T, GeoverlayError>;

impl GeoverlayError {
    /// Get a user-friendly error message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Schema(e) => format!("Schema error: {e}"),
            Self::Validation(e) => format!("Invalid feature: {e}"),
            Self::Crs(e) => format!("Coordinate system error: {e}"),
            Self::Geometry(e) => e.to_string(),
            Self::Pipeline(e) => e.to_string(),
            Self::Store(e) => format!("Write failed, no features were saved: {e}"),
            Self::Config(e) => format!("Configuration error: {e}"),
            Self::Other(e) => format!("Error: {e}"),
        }
    }

    /// Get recovery suggestions if available.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Crs(CrsError::UnsupportedTransform { .. }) => Some(
                "Declare an EPSG code for both inputs, or reproject one of them before running."
                    .to_string(),
            ),
            Self::Geometry(GeometryError::WrongGeometryKind { .. }) => Some(
                "Check that each input has the geometry type the operation expects."
                    .to_string(),
            ),
            Self::Schema(SchemaError::DuplicateField { .. }) => {
                Some("Choose a different name for the output field.".to_string())
            },
            _ => None,
        }
    }

    /// Check if this error is potentially recoverable.
    ///
    /// Recoverable errors might be fixed by retrying with different parameters.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Schema(_)
                | Self::Geometry(GeometryError::InvalidParameter { .. })
        )
    }

    /// Returns `true` if the run was stopped by its progress listener.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Pipeline(PipelineError::Canceled { .. }))
    }
}

/// Helper to create a [`GeometryError::InvalidParameter`].
#[must_use]
pub fn invalid_parameter(parameter: &str, message: impl Into<String>) -> GeoverlayError {
    GeometryError::InvalidParameter {
        parameter: parameter.to_string(),
        message: message.into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_display() {
        let err: GeoverlayError = ConfigError::MissingRequired {
            option: "distance".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Missing required option: distance");
        assert!(err.is_recoverable());
    }

    #[test]
    fn store_errors_mention_rollback() {
        let err: GeoverlayError = StoreError::Commit {
            count: 3,
            source: anyhow::anyhow!("disk full"),
        }
        .into();
        assert!(err.user_message().contains("no features were saved"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn wrong_kind_has_suggestion() {
        let err: GeoverlayError = GeometryError::WrongGeometryKind {
            role: "polygonFeatures".to_string(),
            expected: "polygon".to_string(),
            found: GeometryKind::Point,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "polygonFeatures must be polygon features, found Point"
        );
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn canceled_is_detected() {
        let err: GeoverlayError = PipelineError::Canceled { written: 4 }.into();
        assert!(err.is_canceled());
        assert_eq!(err.to_string(), "Operation canceled after 4 feature(s)");
    }
}
