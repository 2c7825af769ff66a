// polaris_sim/src/main.rs

mod cli;
mod scenario;

use clap::Parser;
use cli::Cli;
use figment::providers::{Format, Toml};
use figment::Figment;
use polaris_core::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use scenario::SampleStream;
use std::error::Error;

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("polaris_sim: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = load_config(&cli)?;
    let mut filter = MargFilter::new(&config)?;
    let mut stream = SampleStream::new(&cli, ChaCha8Rng::seed_from_u64(cli.seed))?;

    if !(cli.rate > 0.0) || !(cli.duration > 0.0) {
        return Err("rate and duration must be positive".into());
    }
    let dt = 1.0 / cli.rate;
    let steps = (cli.duration * cli.rate).round() as u64;
    // One trace line per simulated second.
    let report_every = cli.rate.round().max(1.0) as u64;

    println!(
        "profile {:?}, {} samples at {} Hz, seed {}",
        cli.profile, steps, cli.rate, cli.seed
    );
    println!("{:>8}  {:>9} {:>9} {:>9}  {:>22}", "t [s]", "yaw", "pitch", "roll", "gyro bias [rad/s]");

    for step in 0..steps {
        let t = step as f64 * dt;
        let sample = stream.sample(t);
        filter.update(sample.gyro, sample.accel, sample.mag, dt)?;

        if step % report_every == 0 {
            print_trace(t, &filter);
        }
    }

    print_trace(cli.duration, &filter);
    let p = filter.covariance();
    println!(
        "final position [m]: {:.3} {:.3} {:.3} (unaided integration, drift expected)",
        filter.position()[0],
        filter.position()[1],
        filter.position()[2]
    );
    println!(
        "covariance trace: dcm {:.3e}, bias {:.3e}",
        p[(0, 0)] + p[(1, 1)] + p[(2, 2)],
        p[(3, 3)] + p[(4, 4)] + p[(5, 5)]
    );
    Ok(())
}

/// Loads the estimator configuration, from TOML when a path was given.
/// Unknown keys fail here, before any estimator is constructed.
fn load_config(cli: &Cli) -> Result<MargConfig, ConfigError> {
    match &cli.config {
        Some(path) => Figment::new()
            .merge(Toml::file_exact(path))
            .extract()
            .map_err(|e| ConfigError::Parse(e.to_string())),
        None => Ok(MargConfig::default()),
    }
}

fn print_trace(t: f64, filter: &MargFilter) {
    let angles = filter.euler_angles();
    let bias = filter.gyro_bias();
    println!(
        "{t:8.2}  {:9.5} {:9.5} {:9.5}  {:7.4} {:7.4} {:7.4}",
        angles.yaw, angles.pitch, angles.roll, bias[0], bias[1], bias[2]
    );
}
