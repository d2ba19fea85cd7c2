//! Structured error types for the quire engine.
//!
//! Input errors carry a position or selector, resource errors keep their
//! cause, and everything is `Clone` so a cached failure can be handed to every
//! caller that shares the cache slot.

use thiserror::Error;

/// Failures reported by a [`ResourceLoader`](crate::resource::ResourceLoader)
/// or while decoding the bytes it returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("failed to load resource '{name}': {message}")]
    LoadFailed { name: String, message: String },
    #[error("invalid resource format: {0}")]
    InvalidFormat(String),
}

/// The unified error type returned by all public quire API functions.
#[derive(Debug, Clone, Error)]
pub enum QuireError {
    /// A length or edge value could not be converted to points.
    #[error("invalid length {input:?}: {reason}")]
    InvalidLength { input: String, reason: String },

    /// Path data failed to tokenize or parse.
    #[error("invalid path data at position {position}: {message}")]
    InvalidPath { position: usize, message: String },

    /// A font could not be selected, loaded, or parsed. `selector` is
    /// formatted as `'<family>', style=<style>, weight=<weight>`.
    #[error("could not load font for {selector}")]
    Font {
        selector: String,
        #[source]
        source: ResourceError,
    },

    /// An image could not be loaded or decoded.
    #[error("could not load image '{name}'")]
    Image {
        name: String,
        #[source]
        source: ResourceError,
    },

    /// The backend rejected an operation.
    #[error("render error: {0}")]
    Render(String),
}

pub type Result<T, E = QuireError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_font_error_keeps_cause() {
        let err = QuireError::Font {
            selector: "'Roboto', style=italic, weight=700".to_string(),
            source: ResourceError::NotFound("roboto-italic.ttf".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "could not load font for 'Roboto', style=italic, weight=700"
        );
        let cause = err.source().map(|s| s.to_string());
        assert_eq!(cause.as_deref(), Some("resource not found: roboto-italic.ttf"));
    }

    #[test]
    fn test_path_error_mentions_position() {
        let err = QuireError::InvalidPath {
            position: 4,
            message: "unexpected character 'x'".to_string(),
        };
        assert!(err.to_string().contains("position 4"));
    }
}
