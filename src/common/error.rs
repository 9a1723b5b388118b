//! Error types for motion-planning

use std::fmt;

/// Main error type for planning operations
#[derive(Debug)]
pub enum PlanningError {
    /// Invalid parameter (negative radius, goal bias outside [0, 1], ...)
    InvalidParameter(String),
    /// A nearest-neighbor query was issued against an empty index
    NoElements,
    /// The planner terminated without producing a usable path
    NoSolution(String),
    /// I/O error
    IoError(std::io::Error),
    /// Rendering a plot of the planner output failed
    VisualizationError(String),
}

impl fmt::Display for PlanningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanningError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            PlanningError::NoElements => write!(f, "No elements found"),
            PlanningError::NoSolution(msg) => write!(f, "No solution: {}", msg),
            PlanningError::IoError(e) => write!(f, "I/O error: {}", e),
            PlanningError::VisualizationError(msg) => write!(f, "Visualization error: {}", msg),
        }
    }
}

impl std::error::Error for PlanningError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlanningError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PlanningError {
    fn from(e: std::io::Error) -> Self {
        PlanningError::IoError(e)
    }
}

/// Result type alias for planning operations
pub type PlanningResult<T> = Result<T, PlanningError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlanningError::InvalidParameter("goal_bias must be in [0, 1]".to_string());
        assert_eq!(
            format!("{}", err),
            "Invalid parameter: goal_bias must be in [0, 1]"
        );
    }

    #[test]
    fn test_empty_index_display() {
        assert_eq!(format!("{}", PlanningError::NoElements), "No elements found");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PlanningError = io_err.into();
        assert!(matches!(err, PlanningError::IoError(_)));
    }
}
