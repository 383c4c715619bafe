//! Read and write errors for `GeoJSON` sources.

use std::fmt;

use thiserror::Error;

/// A position within a source file.
///
/// All indices are 1-based to align with human expectations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePosition {
    /// Line number in the source
    pub line: Option<u64>,
    /// Feature number within the collection
    pub feature: Option<u64>,
}

impl SourcePosition {
    /// Position of a line in a newline-delimited source.
    #[must_use]
    pub fn line(line: u64) -> Self {
        Self {
            line: Some(line),
            ..Self::default()
        }
    }

    /// Position of a feature in a collection.
    #[must_use]
    pub fn feature(feature: u64) -> Self {
        Self {
            feature: Some(feature),
            ..Self::default()
        }
    }

    /// Returns true when the position does not contain any location metadata.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.line.is_none() && self.feature.is_none()
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(line) = self.line {
            parts.push(format!("line {line}"));
        }
        if let Some(feature) = self.feature {
            parts.push(format!("feature {feature}"));
        }

        if parts.is_empty() {
            write!(f, "unknown position")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

fn at(position: Option<&SourcePosition>) -> String {
    position.map(|pos| format!(" at {pos}")).unwrap_or_default()
}

/// Errors raised while reading or writing `GeoJSON`.
#[derive(Debug, Error)]
pub enum GeoJsonError {
    /// An underlying I/O failure occurred.
    #[error("I/O error while accessing {path}: {source}")]
    Io {
        /// File being accessed
        path: String,
        /// The originating error
        #[source]
        source: std::io::Error,
    },

    /// The source is not valid `GeoJSON`.
    #[error("Failed to parse {context}{}: {message}", at(.position.as_ref()))]
    Parse {
        /// Human readable description of the failure
        message: String,
        /// Where the failure occurred
        position: Option<SourcePosition>,
        /// What was being read
        context: String,
    },

    /// A feature could not be serialized.
    #[error("Failed to write feature '{feature}': {message}")]
    Write {
        /// Feature identity
        feature: String,
        /// Human readable description of the failure
        message: String,
    },
}

/// Result alias for `GeoJSON` operations.
pub type GeoJsonResult<T> = std::result::Result<T, GeoJsonError>;

impl GeoJsonError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(
        message: impl Into<String>,
        position: Option<SourcePosition>,
        context: &str,
    ) -> Self {
        Self::Parse {
            message: message.into(),
            position,
            context: context.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_mentions_position() {
        let err = GeoJsonError::parse("unexpected token", Some(SourcePosition::line(3)), "a.json");
        assert_eq!(err.to_string(), "Failed to parse a.json at line 3: unexpected token");

        let err = GeoJsonError::parse("empty", None, "b.json");
        assert_eq!(err.to_string(), "Failed to parse b.json: empty");
    }

    #[test]
    fn empty_position() {
        assert!(SourcePosition::default().is_empty());
        assert_eq!(SourcePosition::default().to_string(), "unknown position");
        assert_eq!(SourcePosition::feature(2).to_string(), "feature 2");
    }
}
