//! # Terratile CLI
//!
//! Command-line interface for the Terratile tile engine.
//!
//! ## Commands
//! - `simulate` - Fly a camera toward the globe and stream tiles
//! - `levels` - Print the level table of the pyramid
//! - `locate` - Find the tile covering a position
//! - `config` - Print the effective configuration

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use terratile_core::{
    FetchError, FetchOutcome, FrameReport, LevelPyramid, SphereGlobe, TerratileConfig, TileEngine,
    TileFetcher, TileKey, ViewState,
};

/// Terratile tile engine CLI
#[derive(Parser)]
#[command(name = "terratile")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Fly a camera toward the globe and stream tiles
    Simulate(SimulateArgs),

    /// Print the level table of the pyramid
    Levels,

    /// Find the tile covering a position
    Locate {
        /// Latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Zoom level
        #[arg(short, long, default_value = "0")]
        level: u32,
    },

    /// Print the effective configuration
    Config,
}

/// Camera flight parameters
#[derive(Args, Debug, Clone, PartialEq)]
pub struct SimulateArgs {
    /// Number of frames to render
    #[arg(short, long, default_value = "60")]
    pub frames: u32,

    /// Camera altitude at the first frame, in meters
    #[arg(long, default_value = "20000000")]
    pub start_altitude: f64,

    /// Camera altitude at the last frame, in meters
    #[arg(long, default_value = "1000")]
    pub end_altitude: f64,

    /// Latitude under the camera in degrees
    #[arg(long, default_value = "47.37", allow_hyphen_values = true)]
    pub lat: f64,

    /// Longitude under the camera in degrees
    #[arg(long, default_value = "8.54", allow_hyphen_values = true)]
    pub lon: f64,

    /// Simulated fetch latency in milliseconds
    #[arg(long, default_value = "0")]
    pub latency_ms: u64,

    /// Every Nth tile below level zero has no imagery (0 disables)
    #[arg(long, default_value = "0")]
    pub absent_every: u64,

    /// Pause between frames in milliseconds
    #[arg(long, default_value = "16")]
    pub frame_ms: u64,

    /// Print one JSON object per frame
    #[arg(long)]
    pub json: bool,
}

impl Default for SimulateArgs {
    fn default() -> Self {
        Self {
            frames: 60,
            start_altitude: 2.0e7,
            end_altitude: 1000.0,
            lat: 47.37,
            lon: 8.54,
            latency_ms: 0,
            absent_every: 0,
            frame_ms: 16,
            json: false,
        }
    }
}

/// Fetcher that fabricates tiles after a fixed delay
#[derive(Debug, Clone)]
pub struct SyntheticFetcher {
    latency: Duration,
    absent_every: u64,
}

impl SyntheticFetcher {
    /// Create a fetcher with the given latency and absence rate
    pub fn new(latency: Duration, absent_every: u64) -> Self {
        Self {
            latency,
            absent_every,
        }
    }
}

impl TileFetcher for SyntheticFetcher {
    fn fetch(&self, key: &TileKey) -> Result<FetchOutcome, FetchError> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        if self.absent_every > 0 && key.level > 0 {
            let hash = (key.row as u64)
                .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                .wrapping_add((key.col as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F))
                .wrapping_add(u64::from(key.level));
            if hash % self.absent_every == 0 {
                return Ok(FetchOutcome::NoContent);
            }
        }
        Ok(FetchOutcome::Loaded)
    }
}

/// One line of simulation output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSummary {
    pub frame: u64,
    pub altitude: f64,
    pub drawn: usize,
    pub fallback: usize,
    pub dropped: usize,
    pub deepest_level: Option<u32>,
    pub queued: usize,
    pub submitted: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub at_max_resolution: bool,
}

impl FrameSummary {
    fn from_report(report: &FrameReport, altitude: f64) -> Self {
        Self {
            frame: report.frame_number,
            altitude,
            drawn: report.draw_list.len(),
            fallback: report.selection.drawn_fallback,
            dropped: report.selection.dropped,
            deepest_level: report.deepest_level(),
            queued: report.selection.fetches_queued,
            submitted: report.dispatch.submitted,
            rejected: report.dispatch.rejected,
            skipped: report.dispatch.skipped,
            at_max_resolution: report.at_max_resolution,
        }
    }
}

/// Altitude at `frame` of a geometric descent from `start` to `end`
fn altitude_at(args: &SimulateArgs, frame: u32) -> f64 {
    if args.frames <= 1 {
        return args.end_altitude;
    }
    let t = f64::from(frame) / f64::from(args.frames - 1);
    args.start_altitude * (args.end_altitude / args.start_altitude).powf(t)
}

/// Run a camera flight and return a summary of each frame
pub fn simulate(config: &TerratileConfig, args: &SimulateArgs) -> Result<Vec<FrameSummary>> {
    anyhow::ensure!(
        args.start_altitude > 0.0 && args.end_altitude > 0.0,
        "altitudes must be positive"
    );

    let fetcher = SyntheticFetcher::new(Duration::from_millis(args.latency_ms), args.absent_every);
    let mut engine = TileEngine::new("simulation", config, Arc::new(fetcher))
        .context("Failed to start tile engine")?;
    let globe = Arc::new(SphereGlobe::earth());

    let mut summaries = Vec::with_capacity(args.frames as usize);
    for frame in 0..args.frames {
        let altitude = altitude_at(args, frame);
        let view = ViewState::looking_down(globe.clone(), args.lat, args.lon, altitude, 45.0, 16.0 / 9.0);
        let report = engine.render_frame(&view);
        let summary = FrameSummary::from_report(&report, altitude);

        if args.json {
            println!("{}", serde_json::to_string(&summary)?);
        } else {
            log::info!(
                "Frame {:>4} @ {:>12.0} m: {:>4} drawn ({} fallback), deepest {:?}, {} submitted",
                summary.frame,
                summary.altitude,
                summary.drawn,
                summary.fallback,
                summary.deepest_level,
                summary.submitted
            );
        }
        summaries.push(summary);

        if args.frame_ms > 0 {
            thread::sleep(Duration::from_millis(args.frame_ms));
        }
    }

    engine.wait_idle();
    log::info!(
        "Done: {} tiles resident, {} fetched, {} failed, {} marked absent",
        engine.cache().len(),
        engine.pool().completed(),
        engine.pool().failed(),
        engine.layer().pyramid().absent_count()
    );

    Ok(summaries)
}

fn load_config(path: Option<&PathBuf>) -> Result<TerratileConfig> {
    match path {
        Some(path) => TerratileConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(TerratileConfig::default()),
    }
}

/// Execute the CLI command
pub fn execute(cli: Cli) -> Result<()> {
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    run(cli)
}

/// Run a parsed command with logging already set up
pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Simulate(args) => {
            log::info!(
                "Simulating {} frames over ({}, {}), {} m to {} m",
                args.frames,
                args.lat,
                args.lon,
                args.start_altitude,
                args.end_altitude
            );
            simulate(&config, &args)?;
        }

        Commands::Levels => {
            let pyramid = LevelPyramid::new(&config.pyramid)?;
            println!("{:>5}  {:>14}  {:>14}  {:>12}  {:>5}", "level", "lat delta", "lon delta", "texel (m)", "empty");
            for level in 0..pyramid.level_count() {
                let Some(info) = pyramid.level(level) else {
                    continue;
                };
                println!(
                    "{:>5}  {:>14.8}  {:>14.8}  {:>12.3}  {:>5}",
                    info.number,
                    info.tile_delta.latitude,
                    info.tile_delta.longitude,
                    info.texel_size * terratile_core::globe::EARTH_RADIUS,
                    info.is_empty
                );
            }
        }

        Commands::Locate { lat, lon, level } => {
            let pyramid = LevelPyramid::new(&config.pyramid)?;
            let tile = pyramid.tile_for_position(level, lat, lon)?;
            println!("{} {}", tile.label(), tile.sector);
        }

        Commands::Config => {
            println!("{}", config.to_json_string()?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::parse_from(["terratile", "levels"]);
        assert!(matches!(cli.command, Commands::Levels));
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_simulate_command() {
        let cli = Cli::parse_from([
            "terratile",
            "-v",
            "--config",
            "layer.json",
            "simulate",
            "-f",
            "10",
            "--lat",
            "-33.9",
            "--lon",
            "18.4",
            "--latency-ms",
            "5",
            "--json",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("layer.json")));
        if let Commands::Simulate(args) = cli.command {
            assert_eq!(args.frames, 10);
            assert_eq!(args.lat, -33.9);
            assert_eq!(args.lon, 18.4);
            assert_eq!(args.latency_ms, 5);
            assert!(args.json);
            assert_eq!(args.end_altitude, 1000.0);
        } else {
            panic!("Expected Simulate command");
        }
    }

    #[test]
    fn test_simulate_defaults_match_parser() {
        let cli = Cli::parse_from(["terratile", "simulate"]);
        if let Commands::Simulate(args) = cli.command {
            assert_eq!(args, SimulateArgs::default());
        } else {
            panic!("Expected Simulate command");
        }
    }

    #[test]
    fn test_locate_command() {
        let cli = Cli::parse_from(["terratile", "locate", "--lat", "10", "--lon", "-20", "-l", "3"]);
        if let Commands::Locate { lat, lon, level } = cli.command {
            assert_eq!((lat, lon, level), (10.0, -20.0, 3));
        } else {
            panic!("Expected Locate command");
        }
    }

    #[test]
    fn test_altitude_descent() {
        let args = SimulateArgs {
            frames: 3,
            start_altitude: 1.0e6,
            end_altitude: 1.0e2,
            ..SimulateArgs::default()
        };
        assert!((altitude_at(&args, 0) - 1.0e6).abs() < 1e-6);
        assert!((altitude_at(&args, 1) - 1.0e4).abs() < 1e-6);
        assert!((altitude_at(&args, 2) - 1.0e2).abs() < 1e-6);
    }

    #[test]
    fn test_synthetic_fetcher() {
        let loaded = SyntheticFetcher::new(Duration::ZERO, 0);
        assert_eq!(loaded.fetch(&TileKey::new(3, 1, 1)), Ok(FetchOutcome::Loaded));

        let sparse = SyntheticFetcher::new(Duration::ZERO, 1);
        assert_eq!(sparse.fetch(&TileKey::new(3, 1, 1)), Ok(FetchOutcome::NoContent));
        assert_eq!(sparse.fetch(&TileKey::new(0, 1, 1)), Ok(FetchOutcome::Loaded));
    }

    #[test]
    fn test_simulation_refines() {
        let mut config = TerratileConfig::default();
        config.pyramid.num_levels = 6;
        config.fetch.workers = 2;
        let args = SimulateArgs {
            frames: 8,
            start_altitude: 1.0e7,
            end_altitude: 1.0e4,
            frame_ms: 0,
            ..SimulateArgs::default()
        };

        let summaries = simulate(&config, &args).unwrap();
        assert_eq!(summaries.len(), 8);
        assert_eq!(summaries[0].frame, 1);
        assert!(summaries.iter().any(|s| s.submitted > 0));
    }

    #[test]
    fn test_missing_config_file() {
        let cli = Cli::parse_from(["terratile", "--config", "/nonexistent/terratile.json", "config"]);
        assert!(run(cli).is_err());
    }
}
