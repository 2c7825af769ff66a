// polaris_core/src/estimation/bias.rs

use crate::types::State6;
use nalgebra::Vector3;

/// The contract for the secondary acceleration-bias filter.
///
/// Each cycle the attitude filter hands it the predicted specific-force
/// residual (accelerometer reading minus the current gravity estimate, in
/// measurement units) and the sample period. The filter returns its updated
/// internal 6-state, of which only components 3..6 are consumed here: the
/// current quasi-static acceleration-bias estimate. Everything else about
/// the implementation is opaque to the attitude filter.
pub trait AccelerationBiasEstimator: Send + Sync {
    fn update(&mut self, residual: &Vector3<f64>, dt: f64) -> State6;

    /// The bias components of the last returned state.
    fn bias(&self) -> Vector3<f64>;
}

/// A bias estimator that always reports zero. With this collaborator the
/// adaptive measurement variance is driven by the raw residual magnitude.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBiasEstimator;

impl AccelerationBiasEstimator for NullBiasEstimator {
    fn update(&mut self, _residual: &Vector3<f64>, _dt: f64) -> State6 {
        State6::zeros()
    }

    fn bias(&self) -> Vector3<f64> {
        Vector3::zeros()
    }
}

/// A two-stage first-order low-pass filter: components 0..3 track the
/// residual with a short time constant, components 3..6 track that fast
/// estimate with a long one and serve as the quasi-static bias.
#[derive(Debug, Clone)]
pub struct LowPassBiasEstimator {
    state: State6,
    fast_time_constant: f64,
    slow_time_constant: f64,
}

impl LowPassBiasEstimator {
    pub fn new(fast_time_constant: f64, slow_time_constant: f64) -> Self {
        Self {
            state: State6::zeros(),
            fast_time_constant,
            slow_time_constant,
        }
    }
}

impl Default for LowPassBiasEstimator {
    fn default() -> Self {
        Self::new(0.5, 10.0)
    }
}

impl AccelerationBiasEstimator for LowPassBiasEstimator {
    fn update(&mut self, residual: &Vector3<f64>, dt: f64) -> State6 {
        let alpha_fast = dt / (self.fast_time_constant + dt);
        let alpha_slow = dt / (self.slow_time_constant + dt);

        let fast = self.state.fixed_rows::<3>(0).into_owned();
        let slow = self.state.fixed_rows::<3>(3).into_owned();

        let fast = fast + (residual - fast) * alpha_fast;
        let slow = slow + (fast - slow) * alpha_slow;

        self.state.fixed_rows_mut::<3>(0).copy_from(&fast);
        self.state.fixed_rows_mut::<3>(3).copy_from(&slow);
        self.state
    }

    fn bias(&self) -> Vector3<f64> {
        self.state.fixed_rows::<3>(3).into_owned()
    }
}
