// polaris_core/src/estimation/mod.rs

use crate::config::MargConfig;
use crate::errors::{ConfigError, FilterError};
use crate::rotation::{dcm_to_quaternion, euler_from_quaternion, quaternion_to_dcm};
use crate::types::{Covariance6, EulerAngles};
use nalgebra::{Matrix3, Quaternion, Vector3};

pub mod bias;
pub mod ekf;
pub mod heading;
pub mod motion;

use bias::{AccelerationBiasEstimator, LowPassBiasEstimator};
use ekf::AttitudeEkf;
use heading::HeadingCorrector;
use motion::MotionIntegrator;

/// The complete MARG (magnetic, angular rate, gravity) attitude estimator.
///
/// Owns the whole per-sample state bundle: the 6-state EKF (DCM bottom row
/// + gyro bias), the carried full-attitude quaternion, the incrementally
/// tracked first rotation-matrix row, the heading-error integral, and the
/// integrated velocity/position. One instance, one rigid body, one sample
/// fully processed per [`update`] call.
///
/// [`update`]: MargFilter::update
pub struct MargFilter {
    ekf: AttitudeEkf,
    bias_filter: Box<dyn AccelerationBiasEstimator>,
    heading: HeadingCorrector,
    motion: MotionIntegrator,

    /// Full body-to-earth attitude, carried across cycles.
    attitude: Quaternion<f64>,
    /// Top row of the full rotation matrix, propagated incrementally and
    /// re-seeded from the corrected attitude each cycle.
    first_row: Vector3<f64>,
    /// Corrected full rotation matrix of the latest cycle.
    dcm: Matrix3<f64>,
    angles: EulerAngles,
}

impl MargFilter {
    /// Builds the estimator with the default acceleration-bias collaborator.
    pub fn new(config: &MargConfig) -> Result<Self, ConfigError> {
        Self::with_bias_estimator(config, Box::new(LowPassBiasEstimator::default()))
    }

    /// Builds the estimator with a caller-supplied acceleration-bias filter.
    pub fn with_bias_estimator(
        config: &MargConfig,
        bias_filter: Box<dyn AccelerationBiasEstimator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let ekf = AttitudeEkf::new(config);
        let (attitude, first_row) = initial_attitude(&ekf.bottom_row());
        let dcm = quaternion_to_dcm(&attitude);
        let angles = euler_from_quaternion(&attitude);

        Ok(Self {
            ekf,
            bias_filter,
            heading: HeadingCorrector::new(config),
            motion: MotionIntegrator::new(),
            attitude,
            first_row,
            dcm,
            angles,
        })
    }

    /// Processes one timed, scaled sensor sample.
    ///
    /// `gyro` in rad/s, `accel` in gravity units (scaled internally by the
    /// configured gravity constant), `mag` in any consistent unit (only the
    /// direction is used; an all-zero reading skips heading correction for
    /// this cycle only), `dt` strictly positive seconds.
    pub fn update(
        &mut self,
        gyro: Vector3<f64>,
        accel: Vector3<f64>,
        mag: Vector3<f64>,
        dt: f64,
    ) -> Result<(), FilterError> {
        if !(dt > 0.0) {
            return Err(FilterError::NonPositiveTimeStep(dt));
        }
        let gravity = self.ekf.gravity();
        let z = accel * gravity;

        // 1. EKF time update.
        self.ekf.predict(&gyro, dt);

        // 2. Adaptive measurement noise from the residual acceleration,
        //    with the collaborator's quasi-static bias removed.
        let residual = self.ekf.specific_force_residual(&z);
        let bias_state = self.bias_filter.update(&residual, dt);
        let acceleration_bias = bias_state.fixed_rows::<3>(3).into_owned();
        let estimated_acceleration = residual - acceleration_bias;
        let r = self.ekf.adaptive_measurement_noise(&estimated_acceleration);

        // 3. EKF measurement update + constrained-manifold renormalization.
        self.ekf.correct_and_normalize(&z, &r)?;

        // 4. Incremental full-rotation tracking: the first row obeys the
        //    same row kinematics ṙ = r × (u − b) as the filtered bottom
        //    row; the middle row is recovered by cross product.
        let rate = gyro - self.ekf.gyro_bias();
        let first = self.first_row + self.first_row.cross(&rate) * dt;
        let norm = first.norm();
        if !(norm > f64::EPSILON) {
            return Err(FilterError::DegenerateDcmRow { norm });
        }
        let first = first / norm;
        let bottom = self.ekf.bottom_row();
        let middle = bottom.cross(&first);
        let tracked = Matrix3::from_rows(&[first.transpose(), middle.transpose(), bottom.transpose()]);

        // 5. Quaternion rebuild and magnetic heading correction.
        let attitude = dcm_to_quaternion(&tracked);
        self.attitude = self.heading.correct(&attitude, &mag, dt);

        // 6. Carry state for the next cycle and derive the outputs.
        self.dcm = quaternion_to_dcm(&self.attitude);
        self.first_row = self.dcm.row(0).transpose();
        self.angles = euler_from_quaternion(&self.attitude);

        // 7. Linear motion integration off the corrected attitude.
        self.motion.integrate(&self.dcm, &z, gravity, dt);
        Ok(())
    }

    // --- Outputs (read after each update) ---

    /// Yaw/pitch/roll in radians.
    pub fn euler_angles(&self) -> EulerAngles {
        self.angles
    }

    /// Corrected full body-to-earth rotation matrix.
    pub fn rotation_matrix(&self) -> &Matrix3<f64> {
        &self.dcm
    }

    /// Corrected attitude quaternion, unit length.
    pub fn attitude_quaternion(&self) -> &Quaternion<f64> {
        &self.attitude
    }

    /// Estimated non-gravitational acceleration, earth frame.
    pub fn linear_acceleration(&self) -> &Vector3<f64> {
        self.motion.linear_acceleration()
    }

    pub fn velocity(&self) -> &Vector3<f64> {
        self.motion.velocity()
    }

    pub fn position(&self) -> &Vector3<f64> {
        self.motion.position()
    }

    /// Current gyro-bias estimate, rad/s.
    pub fn gyro_bias(&self) -> Vector3<f64> {
        self.ekf.gyro_bias()
    }

    /// Full 6×6 state covariance, for diagnostics and uncertainty reporting.
    pub fn covariance(&self) -> &Covariance6 {
        self.ekf.covariance()
    }

    /// Accumulated integral term of the heading corrector.
    pub fn heading_integral(&self) -> &Vector3<f64> {
        self.heading.integral()
    }
}

/// Builds a full initial attitude consistent with a (unit or near-unit)
/// initial bottom row: the first row is the gravity-orthogonal projection
/// of whichever earth axis is least aligned with the bottom row.
fn initial_attitude(bottom_row: &Vector3<f64>) -> (Quaternion<f64>, Vector3<f64>) {
    let c3 = bottom_row.normalize();
    let seed = if c3[0].abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let first = (seed - c3 * seed.dot(&c3)).normalize();
    let middle = c3.cross(&first);
    let dcm = Matrix3::from_rows(&[first.transpose(), middle.transpose(), c3.transpose()]);
    (dcm_to_quaternion(&dcm), first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const DT: f64 = 0.01;

    fn rest_sample() -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
        (
            Vector3::zeros(),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 0.0, 0.0),
        )
    }

    fn assert_state_invariants(filter: &MargFilter) {
        // Unit-norm constraints hold after every cycle.
        let c3 = filter.ekf.bottom_row();
        assert_abs_diff_eq!(c3.norm(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(filter.attitude_quaternion().norm(), 1.0, epsilon = 1e-9);

        // Covariance stays symmetric and positive semi-definite.
        let p = filter.covariance();
        assert!((p - p.transpose()).norm() < 1e-10);
        for ev in p.symmetric_eigen().eigenvalues.iter() {
            assert!(*ev > -1e-12, "negative eigenvalue {ev}");
        }
    }

    #[test]
    fn at_rest_level_is_a_stable_fixed_point() {
        let mut filter = MargFilter::new(&MargConfig::default()).unwrap();
        let (gyro, accel, mag) = rest_sample();
        for _ in 0..2000 {
            filter.update(gyro, accel, mag, DT).unwrap();
            assert_state_invariants(&filter);
        }
        let angles = filter.euler_angles();
        assert_abs_diff_eq!(angles.yaw, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(angles.pitch, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(angles.roll, 0.0, epsilon = 1e-6);
        // Nothing moved.
        assert!(filter.velocity().norm() < 1e-6);
        assert!(filter.position().norm() < 1e-6);
    }

    #[test]
    fn tilted_initial_state_converges_to_level_at_rest() {
        let tilt = 0.25_f64;
        let config = MargConfig {
            initial_state: [tilt.sin(), 0.0, tilt.cos(), 0.0, 0.0, 0.0],
            ..MargConfig::default()
        };
        let mut filter = MargFilter::new(&config).unwrap();
        let (gyro, accel, mag) = rest_sample();
        for _ in 0..3000 {
            filter.update(gyro, accel, mag, DT).unwrap();
        }
        let angles = filter.euler_angles();
        assert!(angles.pitch.abs() < 5e-3, "pitch {}", angles.pitch);
        assert!(angles.roll.abs() < 5e-3, "roll {}", angles.roll);
        assert_state_invariants(&filter);
    }

    #[test]
    fn zero_mag_disables_heading_correction_for_the_cycle() {
        let mut filter = MargFilter::new(&MargConfig::default()).unwrap();
        let (gyro, accel, _) = rest_sample();
        for _ in 0..500 {
            filter.update(gyro, accel, Vector3::zeros(), DT).unwrap();
        }
        // With no magnetometer data the heading step never ran: the
        // integral never accumulated and the yaw never moved.
        assert_eq!(*filter.heading_integral(), Vector3::zeros());
        assert_abs_diff_eq!(filter.euler_angles().yaw, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn pure_yaw_rate_integrates_through_the_first_row() {
        let mut filter = MargFilter::new(&MargConfig::default()).unwrap();
        let rate = 0.5;
        let steps = 200;
        for _ in 0..steps {
            filter
                .update(
                    Vector3::new(0.0, 0.0, rate),
                    Vector3::new(0.0, 0.0, 1.0),
                    Vector3::zeros(),
                    DT,
                )
                .unwrap();
            assert_state_invariants(&filter);
        }
        let expected = rate * steps as f64 * DT;
        assert_abs_diff_eq!(filter.euler_angles().yaw, expected, epsilon = 1e-3);
        // A pure yaw leaves the gravity direction untouched.
        assert_abs_diff_eq!(filter.euler_angles().pitch, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(filter.euler_angles().roll, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn constant_gyro_bias_is_observable() {
        let injected = Vector3::new(0.1, 0.0, 0.0);
        let mut filter = MargFilter::new(&MargConfig::default()).unwrap();
        // The body is at rest; everything the gyro reports is bias.
        for _ in 0..30_000 {
            filter
                .update(injected, Vector3::new(0.0, 0.0, 1.0), Vector3::zeros(), DT)
                .unwrap();
        }
        let bias = filter.gyro_bias();
        assert!(
            bias[0] > 0.05 && bias[0] < 0.15,
            "bias estimate did not converge toward the injected value: {bias}"
        );
        // And the attitude stayed close to level despite the biased input.
        assert!(filter.euler_angles().roll.abs() < 0.05);
        assert!(filter.euler_angles().pitch.abs() < 0.05);
    }

    #[test]
    fn non_positive_dt_is_rejected() {
        let mut filter = MargFilter::new(&MargConfig::default()).unwrap();
        let (gyro, accel, mag) = rest_sample();
        for dt in [0.0, -0.01, f64::NAN] {
            assert!(matches!(
                filter.update(gyro, accel, mag, dt),
                Err(FilterError::NonPositiveTimeStep(_))
            ));
        }
    }

    #[test]
    fn invalid_configuration_produces_no_filter() {
        let config = MargConfig {
            gravity: 0.0,
            ..MargConfig::default()
        };
        assert!(MargFilter::new(&config).is_err());
    }

    #[test]
    fn initial_attitude_is_consistent_with_the_bottom_row() {
        for c3 in [
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.3, -0.4, 0.866),
        ] {
            let (q, first) = initial_attitude(&c3);
            let dcm = quaternion_to_dcm(&q);
            let unit = c3.normalize();
            for i in 0..3 {
                assert_abs_diff_eq!(dcm[(2, i)], unit[i], epsilon = 1e-9);
                assert_abs_diff_eq!(dcm[(0, i)], first[i], epsilon = 1e-9);
            }
            // Proper rotation: orthonormal rows, determinant +1.
            assert_abs_diff_eq!(dcm.determinant(), 1.0, epsilon = 1e-9);
        }
    }
}
