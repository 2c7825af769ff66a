// polaris_core/src/estimation/ekf.rs

use crate::config::MargConfig;
use crate::errors::FilterError;
use crate::types::{Covariance6, State6};
use nalgebra::{Matrix3, Matrix6, Vector3};

// Below this bottom-row norm the renormalization map is undefined and the
// filter is reported as numerically lost rather than dividing by ~0.
const DCM_NORM_FLOOR: f64 = 1e-12;

/// The primary 6-state attitude filter.
///
/// The state is the bottom row of the body-to-earth rotation matrix
/// (`C31..C33`) followed by the gyro bias (`bx..bz`). Gravity observed by
/// the accelerometer is the measurement; the observation model is the fixed
/// linear map `H = [g·I₃, 0₃]`.
#[derive(Debug, Clone)]
pub struct AttitudeEkf {
    state: State6,
    covariance: Covariance6,
    /// dt-independent process noise; scaled by dt² at prediction time.
    process_noise: Covariance6,
    gravity: f64,
    /// Baseline accelerometer variance (r_acc²).
    accel_variance: f64,
    /// Gain of the acceleration-dependent variance inflation (r_a²).
    adaptive_variance: f64,
}

/// Skew-symmetric cross-product operator: `skew(a) * b == a × b`.
fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v[2], v[1], //
        v[2], 0.0, -v[0], //
        -v[1], v[0], 0.0,
    )
}

impl AttitudeEkf {
    /// Builds the filter from an already-validated configuration.
    pub fn new(config: &MargConfig) -> Self {
        Self {
            state: config.initial_state_vector(),
            covariance: config.initial_covariance_matrix(),
            process_noise: config.process_noise_matrix(),
            gravity: config.gravity,
            accel_variance: config.accel_measurement_variance,
            adaptive_variance: config.adaptive_measurement_variance,
        }
    }

    // --- Accessors ---

    pub fn state(&self) -> &State6 {
        &self.state
    }

    pub fn covariance(&self) -> &Covariance6 {
        &self.covariance
    }

    /// Current estimate of the DCM bottom row (the body-frame gravity
    /// direction).
    pub fn bottom_row(&self) -> Vector3<f64> {
        self.state.fixed_rows::<3>(0).into_owned()
    }

    pub fn gyro_bias(&self) -> Vector3<f64> {
        self.state.fixed_rows::<3>(3).into_owned()
    }

    pub fn gravity(&self) -> f64 {
        self.gravity
    }

    // --- Predict ---

    /// Time-propagates state and covariance through one sample period.
    ///
    /// The bottom row follows Ċ₃ = C₃ × (u − b) (explicit Euler); the bias
    /// is a random walk. The covariance uses the first-order transition
    /// matrix F = I₆ + dt·[[−UX, −C3X], [0, 0]], where UX is the skew of
    /// the bias-corrected rate and C3X the skew of the bottom row.
    pub fn predict(&mut self, angular_velocity: &Vector3<f64>, dt: f64) {
        let c3 = self.bottom_row();
        let rate = angular_velocity - self.gyro_bias();

        // State step. The bias rows are untouched.
        let c3_pred = c3 + c3.cross(&rate) * dt;
        self.state.fixed_rows_mut::<3>(0).copy_from(&c3_pred);

        // Covariance step: P⁻ = F P Fᵀ + dt²·Q.
        let mut f = Matrix6::identity();
        f.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(Matrix3::identity() - skew(&rate) * dt));
        f.fixed_view_mut::<3, 3>(0, 3).copy_from(&(-skew(&c3) * dt));
        self.covariance = f * self.covariance * f.transpose() + self.process_noise * (dt * dt);
    }

    // --- Adaptive measurement noise ---

    /// The specific-force residual against the predicted gravity direction:
    /// measurement minus g·C₃. Fed to the acceleration-bias collaborator
    /// and (bias-removed) to the adaptive noise model.
    pub fn specific_force_residual(&self, measurement: &Vector3<f64>) -> Vector3<f64> {
        measurement - self.bottom_row() * self.gravity
    }

    /// Measurement covariance for this cycle. The accelerometer only reads
    /// gravity when the body is not accelerating, so the variance is
    /// inflated in proportion to the estimated non-gravitational
    /// acceleration magnitude: R = (‖a_est‖·r_a² + r_acc²)·I₃.
    pub fn adaptive_measurement_noise(
        &self,
        estimated_acceleration: &Vector3<f64>,
    ) -> Matrix3<f64> {
        Matrix3::identity()
            * (estimated_acceleration.norm() * self.adaptive_variance + self.accel_variance)
    }

    // --- Correct + renormalize ---

    /// Fuses one gravity observation and re-imposes the unit-norm
    /// constraint on the bottom row.
    ///
    /// The covariance update is in Joseph form, which keeps P symmetric
    /// positive semi-definite under roundoff. The renormalization divides
    /// the bottom-row sub-vector by its norm and pushes the covariance
    /// through the analytic first-order Jacobian of that map, so P stays
    /// consistent with the constrained state. The order matters: update
    /// first, then renormalize.
    pub fn correct_and_normalize(
        &mut self,
        measurement: &Vector3<f64>,
        measurement_noise: &Matrix3<f64>,
    ) -> Result<(), FilterError> {
        let g = self.gravity;

        // With H = [g·I₃, 0₃]: P·Hᵀ is g times the first three columns of P,
        // and S = g·(P·Hᵀ)₀..₃ + R.
        let pht = self.covariance.fixed_columns::<3>(0) * g;
        let s = pht.fixed_rows::<3>(0) * g + measurement_noise;

        // R's strictly positive diagonal keeps S invertible under any valid
        // configuration; if it still fails we skip the update and keep the
        // prediction rather than destabilize the filter.
        if let Some(s_inv) = s.try_inverse() {
            let k = pht * s_inv;

            let innovation = measurement - self.bottom_row() * g;
            self.state += k * innovation;

            // Joseph form: P = (I−KH)·P·(I−KH)ᵀ + K·R·Kᵀ.
            let mut kh = Matrix6::zeros();
            kh.fixed_view_mut::<6, 3>(0, 0).copy_from(&(k * g));
            let i_kh = Matrix6::identity() - kh;
            self.covariance = i_kh * self.covariance * i_kh.transpose()
                + k * measurement_noise * k.transpose();
        }

        self.renormalize()
    }

    /// Divides the bottom-row sub-vector by its Euclidean norm and applies
    /// the block-diagonal normalization Jacobian [J₃, I₃] to the
    /// covariance, with J₃ = (I₃ − ûûᵀ)/‖v‖ evaluated pre-normalization.
    fn renormalize(&mut self) -> Result<(), FilterError> {
        let c3 = self.bottom_row();
        let norm = c3.norm();
        if !(norm > DCM_NORM_FLOOR) {
            return Err(FilterError::DegenerateDcmRow { norm });
        }

        let unit = c3 / norm;
        self.state.fixed_rows_mut::<3>(0).copy_from(&unit);

        let j3 = (Matrix3::identity() - unit * unit.transpose()) / norm;
        let mut j = Matrix6::identity();
        j.fixed_view_mut::<3, 3>(0, 0).copy_from(&j3);
        self.covariance = j * self.covariance * j.transpose();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const DT: f64 = 0.01;

    fn rest_measurement(ekf: &AttitudeEkf) -> Vector3<f64> {
        Vector3::new(0.0, 0.0, ekf.gravity())
    }

    fn assert_covariance_well_formed(p: &Covariance6) {
        let asym = (p - p.transpose()).norm();
        assert!(asym < 1e-10, "covariance asymmetry {asym}");
        let eigen = p.symmetric_eigen();
        for ev in eigen.eigenvalues.iter() {
            assert!(*ev > -1e-12, "negative eigenvalue {ev}");
        }
    }

    #[test]
    fn skew_matches_cross_product() {
        let a = Vector3::new(0.3, -1.2, 2.0);
        let b = Vector3::new(-0.7, 0.4, 1.1);
        let by_skew = skew(&a) * b;
        let by_cross = a.cross(&b);
        for i in 0..3 {
            assert_abs_diff_eq!(by_skew[i], by_cross[i], epsilon = 1e-15);
        }
    }

    #[test]
    fn bottom_row_stays_unit_after_every_cycle() {
        let mut ekf = AttitudeEkf::new(&MargConfig::default());
        let gyro = Vector3::new(0.3, -0.1, 0.5);
        for _ in 0..500 {
            ekf.predict(&gyro, DT);
            let r = ekf.adaptive_measurement_noise(&Vector3::zeros());
            ekf.correct_and_normalize(&rest_measurement(&ekf), &r)
                .unwrap();
            assert_abs_diff_eq!(ekf.bottom_row().norm(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn covariance_stays_symmetric_and_psd() {
        let mut ekf = AttitudeEkf::new(&MargConfig::default());
        let gyro = Vector3::new(0.05, 0.02, -0.04);
        for _ in 0..300 {
            ekf.predict(&gyro, DT);
            let r = ekf.adaptive_measurement_noise(&Vector3::new(0.1, 0.0, 0.0));
            ekf.correct_and_normalize(&rest_measurement(&ekf), &r)
                .unwrap();
            assert_covariance_well_formed(ekf.covariance());
        }
    }

    #[test]
    fn adaptive_noise_grows_with_estimated_acceleration() {
        let ekf = AttitudeEkf::new(&MargConfig::default());
        let r_static = ekf.adaptive_measurement_noise(&Vector3::zeros());
        let r_dynamic = ekf.adaptive_measurement_noise(&Vector3::new(4.0, 0.0, -3.0));
        assert_abs_diff_eq!(
            r_static[(0, 0)],
            MargConfig::default().accel_measurement_variance,
            epsilon = 1e-12
        );
        assert!(r_dynamic[(0, 0)] > 100.0 * r_static[(0, 0)]);
    }

    #[test]
    fn larger_measurement_noise_moves_the_state_less() {
        let mut quiet = AttitudeEkf::new(&MargConfig::default());
        let mut noisy = quiet.clone();

        // A measurement pulling the gravity direction off the prior.
        let g = quiet.gravity();
        let z = Vector3::new(0.3, 0.0, 1.0).normalize() * g;

        let r_small = quiet.adaptive_measurement_noise(&Vector3::zeros());
        let r_large = noisy.adaptive_measurement_noise(&Vector3::new(8.0, 0.0, 0.0));
        quiet.correct_and_normalize(&z, &r_small).unwrap();
        noisy.correct_and_normalize(&z, &r_large).unwrap();

        let prior = Vector3::new(0.0, 0.0, 1.0);
        let moved_quiet = (quiet.bottom_row() - prior).norm();
        let moved_noisy = (noisy.bottom_row() - prior).norm();
        assert!(
            moved_noisy < 0.5 * moved_quiet,
            "inflated R must shrink the DCM-block gain ({moved_noisy} vs {moved_quiet})"
        );
    }

    #[test]
    fn residual_is_zero_at_rest_with_perfect_state() {
        let ekf = AttitudeEkf::new(&MargConfig::default());
        let residual = ekf.specific_force_residual(&rest_measurement(&ekf));
        assert_abs_diff_eq!(residual.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_bottom_row_is_reported_not_divided() {
        let mut config = MargConfig::default();
        config.initial_state = [0.0; 6];
        let mut ekf = AttitudeEkf::new(&config);
        // Zero rate keeps the zero row; the renormalization must refuse it.
        ekf.predict(&Vector3::zeros(), DT);
        let r = ekf.adaptive_measurement_noise(&Vector3::zeros());
        let result = ekf.correct_and_normalize(&Vector3::zeros(), &r);
        assert!(matches!(
            result,
            Err(FilterError::DegenerateDcmRow { .. })
        ));
    }
}
