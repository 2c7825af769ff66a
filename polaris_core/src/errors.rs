// polaris_core/src/errors.rs

use thiserror::Error;

/// Construction-time failures. No estimator is produced if any of these fire.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration source contained a key this crate does not know,
    /// or a value of the wrong shape. Produced by the serde layer.
    #[error("failed to parse estimator configuration: {0}")]
    Parse(String),

    /// A variance that must be strictly positive was zero or negative.
    /// A non-positive accelerometer variance would make the innovation
    /// covariance singular (see the Kalman gain computation).
    #[error("option '{option}' must be strictly positive, got {value}")]
    NonPositive { option: &'static str, value: f64 },

    /// A gain that may be zero (disabling its term) was negative.
    #[error("option '{option}' must be non-negative, got {value}")]
    Negative { option: &'static str, value: f64 },

    /// A numeric option was NaN or infinite.
    #[error("option '{option}' is not finite")]
    NotFinite { option: &'static str },

    /// The reference magnetic vector has no direction to correct toward.
    #[error("reference magnetic vector must be non-zero")]
    ZeroReferenceMag,
}

/// Runtime failures of the per-sample estimation cycle.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The sample period must be strictly positive.
    #[error("non-positive sample period: {0}")]
    NonPositiveTimeStep(f64),

    /// The DCM bottom-row estimate collapsed to (numerically) zero length,
    /// so the renormalization step is undefined. This indicates filter
    /// divergence; the estimator state should be considered lost.
    #[error("DCM bottom-row norm degenerated to {norm:e}; cannot renormalize")]
    DegenerateDcmRow { norm: f64 },
}
