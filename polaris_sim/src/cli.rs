// polaris_sim/src/cli.rs

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Polaris: a synthetic-data runner for the MARG attitude estimator.
///
/// Generates noisy inertial/magnetic samples for a chosen motion profile,
/// drives the estimator at a fixed rate, and prints the estimate trace.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to an estimator configuration TOML file. Defaults apply when
    /// omitted; unknown keys in the file fail the run.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// The synthetic motion profile to simulate.
    #[arg(long, value_enum, default_value = "rest")]
    pub profile: Profile,

    /// Simulated duration, seconds.
    #[arg(long, default_value_t = 30.0)]
    pub duration: f64,

    /// Sample rate, Hz.
    #[arg(long, default_value_t = 100.0)]
    pub rate: f64,

    /// Yaw rate of the turntable profile, rad/s.
    #[arg(long, default_value_t = 0.5)]
    pub yaw_rate: f64,

    /// Constant bias injected into the simulated gyro's x axis, rad/s.
    #[arg(long, default_value_t = 0.0)]
    pub gyro_bias: f64,

    /// Gyro noise standard deviation, rad/s.
    #[arg(long, default_value_t = 0.005)]
    pub gyro_noise: f64,

    /// Accelerometer noise standard deviation, gravity units.
    #[arg(long, default_value_t = 0.01)]
    pub accel_noise: f64,

    /// Magnetometer noise standard deviation (unitless direction noise).
    #[arg(long, default_value_t = 0.02)]
    pub mag_noise: f64,

    /// Disable the magnetometer entirely (all-zero readings).
    #[arg(long, default_value_t = false)]
    pub no_mag: bool,

    /// Seed for the noise generator, for reproducible runs.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// The motion profiles the sample generator knows how to produce.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Body at rest, level, magnetic north along +x.
    Rest,
    /// Body spinning about the vertical axis at a constant yaw rate.
    Turntable,
}
