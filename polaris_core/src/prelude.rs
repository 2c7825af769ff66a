// polaris_core/src/prelude.rs

// --- Core Data Structures (The "nouns" of the library) ---
pub use crate::config::MargConfig;
pub use crate::errors::{ConfigError, FilterError};
pub use crate::types::{Covariance6, EulerAngles, State6};

// --- The Estimator and its collaborators ---
pub use crate::estimation::bias::{
    AccelerationBiasEstimator, LowPassBiasEstimator, NullBiasEstimator,
};
pub use crate::estimation::ekf::AttitudeEkf;
pub use crate::estimation::heading::HeadingCorrector;
pub use crate::estimation::motion::MotionIntegrator;
pub use crate::estimation::MargFilter;

// --- Rotation utilities ---
pub use crate::rotation::{
    dcm_to_quaternion, euler_from_quaternion, quaternion_to_dcm, rotate_vector,
};
