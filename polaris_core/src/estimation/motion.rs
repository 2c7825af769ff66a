// polaris_core/src/estimation/motion.rs

use nalgebra::{Matrix3, Vector3};

/// Thin consumer of the corrected attitude: rotates the measured specific
/// force into the earth frame, removes gravity, and integrates.
///
/// Velocity and position are pure integrals of the linear acceleration, so
/// they accumulate unbounded drift. That is a known, accepted limitation of
/// this layer, not a defect; long-term drift mitigation belongs to an
/// absolute position source this crate does not fuse.
#[derive(Debug, Clone, Default)]
pub struct MotionIntegrator {
    linear_acceleration: Vector3<f64>,
    velocity: Vector3<f64>,
    position: Vector3<f64>,
}

impl MotionIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// One integration step. `specific_force` is the accelerometer reading
    /// already scaled to m/s² and `dcm` the corrected body-to-earth
    /// rotation; `gravity` is the configured magnitude.
    pub fn integrate(
        &mut self,
        dcm: &Matrix3<f64>,
        specific_force: &Vector3<f64>,
        gravity: f64,
        dt: f64,
    ) {
        self.linear_acceleration = dcm * specific_force - Vector3::new(0.0, 0.0, gravity);
        self.velocity += self.linear_acceleration * dt;
        self.position += self.velocity * dt + self.linear_acceleration * (0.5 * dt * dt);
    }

    /// Estimated non-gravitational acceleration, earth frame, m/s².
    pub fn linear_acceleration(&self) -> &Vector3<f64> {
        &self.linear_acceleration
    }

    pub fn velocity(&self) -> &Vector3<f64> {
        &self.velocity
    }

    pub fn position(&self) -> &Vector3<f64> {
        &self.position
    }
}
