// polaris_core/src/config.rs

use crate::errors::ConfigError;
use crate::types::{Covariance6, State6};
use nalgebra::{Matrix3, Matrix6, Vector3};
use serde::{Deserialize, Serialize};

// --- Default Tuning Constants ---
// Reference values for a consumer-grade MEMS IMU sampled at ~100 Hz.
const DEFAULT_GRAVITY: f64 = 9.81;
const DEFAULT_DCM_PROCESS_VARIANCE: f64 = 0.1 * 0.1;
const DEFAULT_BIAS_PROCESS_VARIANCE: f64 = 0.0001 * 0.0001;
const DEFAULT_INITIAL_DCM_VARIANCE: f64 = 1.0;
const DEFAULT_INITIAL_BIAS_VARIANCE: f64 = 0.1 * 0.1;
const DEFAULT_ACCEL_VARIANCE: f64 = 0.5 * 0.5;
const DEFAULT_ADAPTIVE_VARIANCE: f64 = 10.0 * 10.0;
// Per-cycle blend gains: the proportional term is applied directly to the
// quaternion each sample, so it must stay well below the stability bound
// of the small-angle composition (roughly 0.5 per cycle).
const DEFAULT_HEADING_KP: f64 = 0.02;
const DEFAULT_HEADING_KI: f64 = 0.01;

/// Every construction-time option of the estimator, enumerated and defaulted.
///
/// Unknown keys in a configuration source are rejected by the serde layer
/// (`deny_unknown_fields`), so a typo'd option fails construction instead of
/// being silently ignored. Values are validated eagerly by [`validate`];
/// no estimator is produced from an invalid configuration.
///
/// [`validate`]: MargConfig::validate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)] // Fail if the config source has fields not in our struct
pub struct MargConfig {
    /// Gravity magnitude, m/s². Accelerometer readings are assumed to be in
    /// gravity units and are scaled by this constant at the call boundary.
    #[serde(default = "default_gravity")]
    pub gravity: f64,

    /// Initial filter state: bottom row of the body-to-earth rotation matrix
    /// followed by the gyro bias. Defaults to level and bias-free.
    #[serde(default = "default_initial_state")]
    pub initial_state: [f64; 6],

    /// Full explicit initial covariance. When present, the derived default
    /// built from the two initial-variance options is skipped.
    #[serde(default)]
    pub initial_covariance: Option<[[f64; 6]; 6]>,

    /// Process variance of the DCM bottom-row states.
    #[serde(default = "default_dcm_process_variance")]
    pub dcm_process_variance: f64,

    /// Process variance of the gyro-bias states.
    #[serde(default = "default_bias_process_variance")]
    pub bias_process_variance: f64,

    /// Initial variance of each DCM bottom-row state (derived covariance only).
    #[serde(default = "default_initial_dcm_variance")]
    pub initial_dcm_variance: f64,

    /// Initial variance of each gyro-bias state (derived covariance only).
    #[serde(default = "default_initial_bias_variance")]
    pub initial_bias_variance: f64,

    /// Baseline accelerometer measurement variance (r_acc²). Keeps the
    /// innovation covariance invertible, so it must be strictly positive.
    #[serde(default = "default_accel_variance")]
    pub accel_measurement_variance: f64,

    /// Adaptive measurement variance gain (r_a²): scales how much the
    /// estimated non-gravitational acceleration inflates R each cycle.
    #[serde(default = "default_adaptive_variance")]
    pub adaptive_measurement_variance: f64,

    /// Proportional blend factor of the magnetic heading correction.
    #[serde(default = "default_heading_kp")]
    pub heading_kp: f64,

    /// Integral gain of the magnetic heading correction.
    #[serde(default = "default_heading_ki")]
    pub heading_ki: f64,

    /// Expected earth-frame magnetic direction. Only the direction matters;
    /// the default aligns magnetic north with the +X horizontal axis.
    #[serde(default = "default_reference_mag")]
    pub reference_mag: [f64; 3],
}

fn default_gravity() -> f64 {
    DEFAULT_GRAVITY
}
fn default_initial_state() -> [f64; 6] {
    [0.0, 0.0, 1.0, 0.0, 0.0, 0.0]
}
fn default_dcm_process_variance() -> f64 {
    DEFAULT_DCM_PROCESS_VARIANCE
}
fn default_bias_process_variance() -> f64 {
    DEFAULT_BIAS_PROCESS_VARIANCE
}
fn default_initial_dcm_variance() -> f64 {
    DEFAULT_INITIAL_DCM_VARIANCE
}
fn default_initial_bias_variance() -> f64 {
    DEFAULT_INITIAL_BIAS_VARIANCE
}
fn default_accel_variance() -> f64 {
    DEFAULT_ACCEL_VARIANCE
}
fn default_adaptive_variance() -> f64 {
    DEFAULT_ADAPTIVE_VARIANCE
}
fn default_heading_kp() -> f64 {
    DEFAULT_HEADING_KP
}
fn default_heading_ki() -> f64 {
    DEFAULT_HEADING_KI
}
fn default_reference_mag() -> [f64; 3] {
    [1.0, 0.0, 0.0]
}

impl Default for MargConfig {
    fn default() -> Self {
        Self {
            gravity: default_gravity(),
            initial_state: default_initial_state(),
            initial_covariance: None,
            dcm_process_variance: default_dcm_process_variance(),
            bias_process_variance: default_bias_process_variance(),
            initial_dcm_variance: default_initial_dcm_variance(),
            initial_bias_variance: default_initial_bias_variance(),
            accel_measurement_variance: default_accel_variance(),
            adaptive_measurement_variance: default_adaptive_variance(),
            heading_kp: default_heading_kp(),
            heading_ki: default_heading_ki(),
            reference_mag: default_reference_mag(),
        }
    }
}

impl MargConfig {
    /// Checks every option eagerly. Called by the estimator constructor, so a
    /// bad configuration can never produce a partially working filter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // All variances must be strictly positive: the innovation covariance
        // S = H P Hᵀ + R is inverted every cycle and relies on R's diagonal.
        let strictly_positive = [
            ("gravity", self.gravity),
            ("dcm_process_variance", self.dcm_process_variance),
            ("bias_process_variance", self.bias_process_variance),
            ("initial_dcm_variance", self.initial_dcm_variance),
            ("initial_bias_variance", self.initial_bias_variance),
            (
                "accel_measurement_variance",
                self.accel_measurement_variance,
            ),
            (
                "adaptive_measurement_variance",
                self.adaptive_measurement_variance,
            ),
        ];
        for (option, value) in strictly_positive {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { option });
            }
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { option, value });
            }
        }

        // The heading gains may be zero (a zero gain just disables its
        // term), but never negative.
        for (option, value) in [
            ("heading_kp", self.heading_kp),
            ("heading_ki", self.heading_ki),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { option });
            }
            if value < 0.0 {
                return Err(ConfigError::Negative { option, value });
            }
        }

        if self.initial_state.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::NotFinite {
                option: "initial_state",
            });
        }
        if let Some(p) = &self.initial_covariance {
            if p.iter().flatten().any(|v| !v.is_finite()) {
                return Err(ConfigError::NotFinite {
                    option: "initial_covariance",
                });
            }
        }

        let mag = Vector3::from(self.reference_mag);
        if mag.norm() == 0.0 {
            return Err(ConfigError::ZeroReferenceMag);
        }

        Ok(())
    }

    /// The initial state as a filter vector.
    pub fn initial_state_vector(&self) -> State6 {
        State6::from_row_slice(&self.initial_state)
    }

    /// The initial covariance: the explicit matrix when one was supplied,
    /// otherwise block-diagonal from the two initial-variance options.
    pub fn initial_covariance_matrix(&self) -> Covariance6 {
        match &self.initial_covariance {
            Some(rows) => {
                let mut p = Matrix6::zeros();
                for (i, row) in rows.iter().enumerate() {
                    for (j, v) in row.iter().enumerate() {
                        p[(i, j)] = *v;
                    }
                }
                p
            }
            None => {
                let mut p = Matrix6::zeros();
                p.fixed_view_mut::<3, 3>(0, 0)
                    .copy_from(&(Matrix3::identity() * self.initial_dcm_variance));
                p.fixed_view_mut::<3, 3>(3, 3)
                    .copy_from(&(Matrix3::identity() * self.initial_bias_variance));
                p
            }
        }
    }

    /// The (dt-independent) process noise covariance Q. The filter scales it
    /// by dt² when predicting.
    pub fn process_noise_matrix(&self) -> Covariance6 {
        let mut q = Matrix6::zeros();
        q.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(Matrix3::identity() * self.dcm_process_variance));
        q.fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&(Matrix3::identity() * self.bias_process_variance));
        q
    }

    /// Unit-length reference magnetic direction.
    pub fn reference_mag_vector(&self) -> Vector3<f64> {
        Vector3::from(self.reference_mag).normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MargConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.initial_state_vector()[2], 1.0);

        let p = config.initial_covariance_matrix();
        assert_eq!(p[(0, 0)], DEFAULT_INITIAL_DCM_VARIANCE);
        assert_eq!(p[(4, 4)], DEFAULT_INITIAL_BIAS_VARIANCE);
        assert_eq!(p[(0, 3)], 0.0);
    }

    #[test]
    fn explicit_covariance_overrides_derived_default() {
        let mut rows = [[0.0; 6]; 6];
        for (i, row) in rows.iter_mut().enumerate() {
            row[i] = 2.5;
        }
        let config = MargConfig {
            initial_covariance: Some(rows),
            ..MargConfig::default()
        };
        let p = config.initial_covariance_matrix();
        assert_eq!(p[(0, 0)], 2.5);
        assert_eq!(p[(5, 5)], 2.5);
    }

    #[test]
    fn non_positive_variance_is_rejected() {
        let config = MargConfig {
            accel_measurement_variance: 0.0,
            ..MargConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive {
                option: "accel_measurement_variance",
                ..
            })
        ));

        let config = MargConfig {
            dcm_process_variance: -1e-4,
            ..MargConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn heading_gains_allow_zero_but_not_negative() {
        let config = MargConfig {
            heading_kp: 0.0,
            heading_ki: 0.0,
            ..MargConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = MargConfig {
            heading_ki: -0.01,
            ..MargConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Negative {
                option: "heading_ki",
                ..
            })
        ));
    }

    #[test]
    fn zero_reference_mag_is_rejected() {
        let config = MargConfig {
            reference_mag: [0.0; 3],
            ..MargConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroReferenceMag)
        ));
    }

    #[test]
    fn unknown_option_fails_deserialization() {
        // `deny_unknown_fields` must reject a typo'd key instead of
        // silently ignoring it.
        let result: Result<MargConfig, _> = toml::from_str("gravitty = 9.81\n");
        assert!(result.is_err());

        let config: MargConfig = toml::from_str("gravity = 9.80665\n").unwrap();
        assert_eq!(config.gravity, 9.80665);
        assert!(config.validate().is_ok());
    }
}
