// polaris_sim/src/scenario.rs

use crate::cli::{Cli, Profile};
use nalgebra::Vector3;
use polaris_core::errors::ConfigError;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// One timed, scaled sensor sample, exactly what the estimator consumes.
#[derive(Debug, Clone, Copy)]
pub struct ImuSample {
    /// rad/s, body frame.
    pub gyro: Vector3<f64>,
    /// Gravity units, body frame.
    pub accel: Vector3<f64>,
    /// Unitless direction, body frame; all-zero when the magnetometer is
    /// disabled.
    pub mag: Vector3<f64>,
}

/// Generates noisy samples for a chosen motion profile.
pub struct SampleStream {
    profile: Profile,
    yaw_rate: f64,
    gyro_bias: Vector3<f64>,
    mag_enabled: bool,
    gyro_noise: Normal<f64>,
    accel_noise: Normal<f64>,
    mag_noise: Normal<f64>,
    rng: ChaCha8Rng,
}

impl SampleStream {
    pub fn new(cli: &Cli, rng: ChaCha8Rng) -> Result<Self, ConfigError> {
        let normal = |name: &str, sigma: f64| {
            Normal::new(0.0, sigma).map_err(|e| ConfigError::Parse(format!("{name} noise: {e}")))
        };
        Ok(Self {
            profile: cli.profile,
            yaw_rate: cli.yaw_rate,
            gyro_bias: Vector3::new(cli.gyro_bias, 0.0, 0.0),
            mag_enabled: !cli.no_mag,
            gyro_noise: normal("gyro", cli.gyro_noise)?,
            accel_noise: normal("accel", cli.accel_noise)?,
            mag_noise: normal("mag", cli.mag_noise)?,
            rng,
        })
    }

    /// The sample at simulation time `t`.
    pub fn sample(&mut self, t: f64) -> ImuSample {
        let (true_rate, yaw) = match self.profile {
            Profile::Rest => (Vector3::zeros(), 0.0),
            Profile::Turntable => (Vector3::new(0.0, 0.0, self.yaw_rate), self.yaw_rate * t),
        };

        // At rest or on a level turntable the accelerometer reads exactly
        // one gravity along body z; the magnetometer reads earth north
        // rotated into the (yawed) body frame.
        let gyro = true_rate + self.gyro_bias + self.noise_vector(NoiseChannel::Gyro);
        let accel = Vector3::new(0.0, 0.0, 1.0) + self.noise_vector(NoiseChannel::Accel);
        let mag = if self.mag_enabled {
            Vector3::new(yaw.cos(), -yaw.sin(), 0.0) + self.noise_vector(NoiseChannel::Mag)
        } else {
            Vector3::zeros()
        };

        ImuSample { gyro, accel, mag }
    }

    fn noise_vector(&mut self, channel: NoiseChannel) -> Vector3<f64> {
        let dist = match channel {
            NoiseChannel::Gyro => self.gyro_noise,
            NoiseChannel::Accel => self.accel_noise,
            NoiseChannel::Mag => self.mag_noise,
        };
        Vector3::new(
            dist.sample(&mut self.rng),
            dist.sample(&mut self.rng),
            dist.sample(&mut self.rng),
        )
    }
}

enum NoiseChannel {
    Gyro,
    Accel,
    Mag,
}
