// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use image_picker::SessionPreset;
use image_picker::grid::Size;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "image-picker")]
#[command(about = "Drive the image picker capture engine against the virtual camera")]
#[command(version = image_picker::constants::app_info::version())]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available capture devices
    Devices,

    /// Take a photo
    Photo {
        /// Record a live photo companion movie
        #[arg(short, long)]
        live: bool,

        /// Save the photo to the library
        #[arg(short, long)]
        save: bool,
    },

    /// Record a video
    Video {
        /// Recording duration in milliseconds
        #[arg(short, long, default_value = "500")]
        duration_ms: u64,

        /// Cancel instead of finishing the recording
        #[arg(long)]
        cancel: bool,

        /// Save the movie to the library
        #[arg(short, long)]
        save: bool,
    },

    /// Switch to the camera on the other side
    Flip,

    /// Scroll through the asset grid and report thumbnail preheating
    Grid {
        /// Number of library assets
        #[arg(short, long, default_value = "200")]
        assets: usize,

        /// Viewport width in points
        #[arg(long, default_value = "390")]
        width: f64,

        /// Viewport height in points
        #[arg(long, default_value = "844")]
        height: f64,

        /// Display scale for thumbnail pixels
        #[arg(long, default_value = "2")]
        scale: f64,

        /// Rotate the viewport halfway through
        #[arg(long)]
        rotate: bool,
    },

    /// Show the effective configuration
    Config {
        /// Only print the config file location
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=image_picker=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Devices => cli::list_devices(),
        Commands::Photo { live, save } => cli::take_photo(&config, live, save).await,
        Commands::Video {
            duration_ms,
            cancel,
            save,
        } => {
            let mut capture = config.capture.clone();
            capture.preset = SessionPreset::Videos;
            cli::record_video(&capture, duration_ms, cancel, save).await
        }
        Commands::Flip => cli::flip_camera(&config).await,
        Commands::Grid {
            assets,
            width,
            height,
            scale,
            rotate,
        } => cli::scroll_grid(&config, assets, Size::new(width, height), scale, rotate),
        Commands::Config { path } => cli::show_config(&config, cli.config.as_deref(), path),
    }
}
