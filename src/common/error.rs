//! Error types for active_planner

use thiserror::Error;

/// Main error type for the planning core.
///
/// Recoverable conditions (a failed sample, an empty neighbourhood) never show up
/// here; they are reported as `bool`/`Option` by the component that absorbed them.
#[derive(Debug, Error)]
pub enum PlanningError {
    /// A configuration value failed setup validation
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter key
        name: String,
        /// Why the value was rejected
        reason: String,
    },
    /// No module registered under the requested type name
    #[error("Unknown {kind} module type '{type_name}'")]
    UnknownModule {
        /// Module kind (generator, evaluator, ...)
        kind: &'static str,
        /// Requested type name
        type_name: String,
    },
    /// Malformed module arguments or config file
    #[error("Configuration error: {0}")]
    Config(String),
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Operation referenced a segment that is not part of the tree
    #[error("Invalid segment {0}")]
    InvalidSegment(usize),
    /// The tree failed an invariant check
    #[error("Invariant violated at segment {segment}: {reason}")]
    InvariantViolation {
        /// Offending segment
        segment: usize,
        /// Description of the violation
        reason: String,
    },
}

impl PlanningError {
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        PlanningError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn invariant(segment: usize, reason: impl Into<String>) -> Self {
        PlanningError::InvariantViolation {
            segment,
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for PlanningError {
    fn from(e: toml::de::Error) -> Self {
        PlanningError::Config(e.to_string())
    }
}

/// Result type alias for planning operations
pub type PlanningResult<T> = Result<T, PlanningError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlanningError::invalid_parameter("collision_radius", "must be >= 0");
        assert_eq!(
            format!("{}", err),
            "Invalid parameter 'collision_radius': must be >= 0"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PlanningError = io_err.into();
        assert!(matches!(err, PlanningError::Io(_)));
    }

    #[test]
    fn test_error_from_toml() {
        let err: PlanningError = toml::from_str::<toml::Table>("a = ").unwrap_err().into();
        assert!(matches!(err, PlanningError::Config(_)));
    }
}
