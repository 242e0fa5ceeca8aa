pub mod blend;
pub mod calibration;
pub mod covariance;
pub mod equilibrium;
pub mod error;
pub mod matrix;
pub mod report;
pub mod session;
pub mod settings;
pub mod types;
pub mod universe;
pub mod views;
pub mod weights;

pub use error::BlackLittermanError;
pub use types::*;

/// Standard result type for all Black-Litterman operations
pub type BlackLittermanResult<T> = Result<T, BlackLittermanError>;
