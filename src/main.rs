// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-manager")]
#[command(about = "Still capture, video recording and RTSP streaming for one camera")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Configuration file (default: <config dir>/camera-manager/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a camera over RTSP until Ctrl+C
    Serve {
        /// Device id (e.g. video0, /dev/video0) or "pattern" for a test pattern
        #[arg(short, long, default_value = "pattern")]
        device: String,

        /// Address to bind (overrides the configuration)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides the configuration)
        #[arg(short, long)]
        port: Option<u16>,

        /// Stream width
        #[arg(long, requires = "height")]
        width: Option<u32>,

        /// Stream height
        #[arg(long, requires = "width")]
        height: Option<u32>,

        /// Run without GStreamer: in-process engine and network layer
        #[arg(long)]
        headless: bool,
    },

    /// List available V4L2 cameras
    List,

    /// Capture still images
    Photo {
        /// Device id or "pattern"
        #[arg(short, long, default_value = "pattern")]
        device: String,

        /// Number of images
        #[arg(short = 'n', long, default_value = "1")]
        count: i32,

        /// Seconds between images
        #[arg(short, long, default_value = "0")]
        interval: i32,

        /// Output directory (default: configured image location)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Record a video
    Record {
        /// Device id or "pattern"
        #[arg(short, long, default_value = "pattern")]
        device: String,

        /// Recording duration in seconds
        #[arg(short = 't', long, default_value = "10")]
        duration: u64,

        /// Output directory (default: configured video location)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use the in-process engine (nothing is written)
        #[arg(long)]
        headless: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_manager=debug, RUST_LOG=info
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
        Commands::Serve {
            device,
            host,
            port,
            width,
            height,
            headless,
        } => cli::serve(
            config,
            cli::ServeOptions {
                device,
                host,
                port,
                size: width.zip(height),
                headless,
            },
        ),
        Commands::List => cli::list_cameras(),
        Commands::Photo {
            device,
            count,
            interval,
            output,
        } => cli::take_photos(config, &device, count, interval, output),
        Commands::Record {
            device,
            duration,
            output,
            headless,
        } => cli::record_video(config, &device, duration, output, headless),
    }
}
