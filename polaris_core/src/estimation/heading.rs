// polaris_core/src/estimation/heading.rs

use crate::config::MargConfig;
use crate::rotation::rotate_vector;
use nalgebra::{Quaternion, Vector3};

// The correction quaternion's scalar part is sqrt(1 - ‖v‖²), so the vector
// part must stay strictly inside the unit ball. Anything near the bound is
// far outside the small-angle regime anyway.
const MAX_CORRECTION_NORM: f64 = 0.99;

/// Complementary-filter yaw correction from a magnetometer reading.
///
/// Runs after the EKF update on the rebuilt full-attitude quaternion. The
/// magnetometer is the slow, bias-free heading reference; the proportional
/// and integral gains blend it against the gyro-integrated attitude.
#[derive(Debug, Clone)]
pub struct HeadingCorrector {
    /// Expected earth-frame magnetic direction, unit length.
    reference_mag: Vector3<f64>,
    kp: f64,
    ki: f64,
    /// Accumulated integral term of the complementary filter. Reset only
    /// at construction.
    integral: Vector3<f64>,
}

impl HeadingCorrector {
    pub fn new(config: &MargConfig) -> Self {
        Self {
            reference_mag: config.reference_mag_vector(),
            kp: config.heading_kp,
            ki: config.heading_ki,
            integral: Vector3::zeros(),
        }
    }

    pub fn integral(&self) -> &Vector3<f64> {
        &self.integral
    }

    /// Applies one heading-correction step and returns the corrected
    /// attitude quaternion (unit length).
    ///
    /// An all-zero magnetometer reading means "no data this cycle": the
    /// attitude and the integral accumulator pass through untouched.
    pub fn correct(
        &mut self,
        attitude: &Quaternion<f64>,
        mag: &Vector3<f64>,
        dt: f64,
    ) -> Quaternion<f64> {
        if mag.norm_squared() == 0.0 {
            return *attitude;
        }

        // Rotate the reading into the earth frame and keep only its
        // horizontal direction; the vertical component carries inclination,
        // not heading.
        let mut mag_earth = rotate_vector(attitude, mag).normalize();
        mag_earth[2] = 0.0;

        // Small-angle heading error axis, then back into the body frame
        // where the correction is applied.
        let error_earth = mag_earth.cross(&self.reference_mag);
        let error_body = rotate_vector(&attitude.conjugate(), &error_earth);

        self.integral += error_body * (self.ki * dt);
        let mut correction = self.integral + error_body * self.kp;

        let norm = correction.norm();
        if norm > MAX_CORRECTION_NORM {
            correction *= MAX_CORRECTION_NORM / norm;
        }

        // Near-identity correction quaternion, composed in the body frame.
        let scalar = (1.0 - correction.norm_squared()).sqrt();
        let q_corr = Quaternion::new(scalar, correction[0], correction[1], correction[2]);
        (attitude * q_corr).normalize()
    }
}
