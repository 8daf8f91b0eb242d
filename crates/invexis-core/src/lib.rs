pub mod error;
pub mod linalg;
pub mod types;

#[cfg(feature = "market")]
pub mod market;

#[cfg(feature = "views")]
pub mod views;

#[cfg(feature = "black_litterman")]
pub mod black_litterman;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

#[cfg(feature = "pipeline")]
pub mod pipeline;

pub use error::InvexisError;
pub use types::*;

/// Standard result type for all invexis operations
pub type InvexisResult<T> = Result<T, InvexisError>;
