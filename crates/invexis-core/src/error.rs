use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvexisError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("Singular matrix in {context}")]
    SingularMatrix { context: String },

    #[error("Simulation infeasible: {0}")]
    SimulationInfeasible(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for InvexisError {
    fn from(e: serde_json::Error) -> Self {
        InvexisError::SerializationError(e.to_string())
    }
}

impl InvexisError {
    /// Build a `DimensionMismatch` from two shapes rendered as `rows x cols`.
    pub fn shape_mismatch(
        context: &str,
        expected: (usize, usize),
        actual: (usize, usize),
    ) -> Self {
        InvexisError::DimensionMismatch {
            context: context.to_string(),
            expected: format!("{}x{}", expected.0, expected.1),
            actual: format!("{}x{}", actual.0, actual.1),
        }
    }

    /// Build a `DimensionMismatch` between two lengths.
    pub fn length_mismatch(context: &str, expected: usize, actual: usize) -> Self {
        InvexisError::DimensionMismatch {
            context: context.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
