use anyhow::Result;
use clap::{Parser, Subcommand};
use markers_core::Point;
use std::path::PathBuf;

mod commands;
mod config;
mod error;
mod input;

use config::Config;
use error::{format_error_with_suggestions, parse_point, CliError};

#[derive(Parser)]
#[command(name = "markers")]
#[command(about = "Render and probe large sets of map markers on a single canvas")]
#[command(version)]
#[command(long_about = "
Draws point markers from a JSON file onto one bitmap, culled to the configured
view, and answers which marker sits under a given container pixel.

Examples:
  markers render --markers points.json --out map.png
  markers render --markers points.json --out map.png --width 1024 --zoom 6
  markers hit --markers points.json --at 120,48 --at 300,200
  markers config --output markers.toml
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render markers to a PNG image
    Render {
        /// Marker file (JSON array of {lat, lng, icon, group})
        #[arg(long, required = true)]
        markers: PathBuf,

        /// Output PNG file
        #[arg(short, long, required = true)]
        out: PathBuf,

        #[command(flatten)]
        view: ViewOverrides,
    },

    /// Print the marker under each container point as JSON lines
    Hit {
        /// Marker file (JSON array of {lat, lng, icon, group})
        #[arg(long, required = true)]
        markers: PathBuf,

        /// Container point as x,y; repeatable
        #[arg(long = "at", required = true, allow_hyphen_values = true, value_parser = parse_point)]
        at: Vec<Point>,

        #[command(flatten)]
        view: ViewOverrides,
    },

    /// Print an example configuration
    Config {
        /// Write the example to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Command line overrides for the `[view]` section
#[derive(clap::Args, Debug, Default)]
pub struct ViewOverrides {
    /// Viewport width in CSS pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Viewport height in CSS pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Center latitude
    #[arg(long, allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Center longitude
    #[arg(long, allow_hyphen_values = true)]
    pub lng: Option<f64>,

    #[arg(long)]
    pub zoom: Option<f64>,

    /// Device pixels per CSS pixel
    #[arg(long)]
    pub pixel_ratio: Option<f64>,
}

impl ViewOverrides {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(width) = self.width {
            config.view.width = width;
        }
        if let Some(height) = self.height {
            config.view.height = height;
        }
        if let Some(lat) = self.lat {
            config.view.center_lat = lat;
        }
        if let Some(lng) = self.lng {
            config.view.center_lng = lng;
        }
        if let Some(zoom) = self.zoom {
            config.view.zoom = zoom;
        }
        if let Some(pixel_ratio) = self.pixel_ratio {
            config.layer.pixel_ratio = pixel_ratio;
        }
        config
            .layer
            .validate()
            .map_err(|err| CliError::config(err.to_string()))?;
        if config.view.width == 0 || config.view.height == 0 {
            return Err(CliError::config("view width and height must be positive").into());
        }
        Ok(())
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Render { markers, out, view } => {
            view.apply(&mut config)?;
            let report = commands::render::execute(&config, markers, out)?;
            println!("{}", serde_json::to_string(&report)?);
        }

        Commands::Hit { markers, at, view } => {
            view.apply(&mut config)?;
            for record in commands::hit::execute(&config, markers, at)? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }

        Commands::Config { output } => {
            let example = Config::example_toml()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, example).map_err(CliError::from)?;
                    log::info!("Wrote example configuration to {}", path.display());
                }
                None => print!("{}", example),
            }
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    if let Err(err) = run(cli) {
        match err.downcast_ref::<CliError>() {
            Some(cli_err) => eprintln!("Error: {}", format_error_with_suggestions(cli_err)),
            None => eprintln!("Error: {:#}", err),
        }
        std::process::exit(1);
    }
}
