// polaris_core/src/types.rs

use nalgebra::{Matrix6, Vector6};

// --- Core Type Aliases ---
// The filter state is always 6-dimensional: the bottom row of the
// body-to-earth rotation matrix followed by the gyro bias.
pub type State6 = Vector6<f64>;
pub type Covariance6 = Matrix6<f64>;

/// Attitude expressed as intrinsic Z-Y-X Tait-Bryan angles, in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerAngles {
    /// Rotation about the earth-frame vertical axis.
    pub yaw: f64,
    /// Rotation about the intermediate lateral axis.
    pub pitch: f64,
    /// Rotation about the body longitudinal axis.
    pub roll: f64,
}
