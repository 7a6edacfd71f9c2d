//! CLI argument parsing with clap derive macros.

use std::time::Duration;

use clap::{Parser, Subcommand};

use harvester_core::config::ControllerConfig;
use harvester_core::geometry::{Point, Rect, WindowGeometry};
use harvester_core::selector::DEFAULT_IGNORE_RADIUS;

const INSTANCE_HELP: &str = "Daemon instance to talk to [default: $HARVESTER_INSTANCE or 'default']";

/// Deposit-collecting bot controller.
///
/// `harvester run` starts the controller daemon for one game window.
/// Detection processes then push targets and screenshots to it with the
/// other subcommands (or by speaking the JSON-line protocol directly).
#[derive(Debug, Parser)]
#[command(name = "harvester", version)]
pub struct Cli {
    #[arg(short, long, global = true, help = INSTANCE_HELP)]
    pub instance: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the controller daemon for a game window
    #[command(after_help = "\
Examples:
  harvester run --window-pos 0,31 --window-size 1280,720 --minimap 1100,40,150,150
  harvester run --window-size 800,600 --minimap 650,10,140,140 --paused
  harvester -i alt run --window-pos 1280,31 --window-size 1280,720 --minimap 2380,40,150,150")]
    Run(RunArgs),

    /// Replace the target list with detected positions (screenshot pixels)
    #[command(after_help = "\
Examples:
  harvester targets 512,300 700,410     # Two detected deposits
  harvester targets                     # Nothing detected")]
    Targets(TargetsArgs),

    /// Replace the latest screenshot with an image file
    Screenshot(ScreenshotArgs),

    /// Show controller phase, target count, and click count
    Status,

    /// Show recorded clicks, oldest first
    History(HistoryArgs),

    /// Start the controller loop (begins with the warm-up)
    Start,

    /// Stop the controller loop without stopping the daemon
    Stop,

    /// Stop the controller and the daemon
    Shutdown,
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
    /// Screen position of the game window's top-left corner
    #[arg(long, value_name = "X,Y", default_value = "0,0")]
    pub window_pos: Point,

    /// Game window size in pixels
    #[arg(long, value_name = "WIDTH,HEIGHT")]
    pub window_size: Point,

    /// Minimap area in window pixels, clicked to explore
    #[arg(long, value_name = "X,Y,WIDTH,HEIGHT")]
    pub minimap: Rect,

    /// Coordinate readout area in window pixels, watched for motion
    /// [default: 75x20 at the window's top-right corner]
    #[arg(long, value_name = "X,Y,WIDTH,HEIGHT")]
    pub readout: Option<Rect>,

    /// Ignore targets within this many pixels of the player
    #[arg(long, default_value_t = DEFAULT_IGNORE_RADIUS)]
    pub ignore_radius: f64,

    /// Seconds to wait after start before clicking anything
    #[arg(long, default_value_t = 6.0, value_name = "SECS")]
    pub warmup: f64,

    /// Milliseconds between pointer move and click
    #[arg(long, default_value_t = 1250, value_name = "MS")]
    pub settle: u64,

    /// Bind the socket but wait for 'harvester start' before running
    #[arg(long)]
    pub paused: bool,
}

impl RunArgs {
    pub fn window(&self) -> anyhow::Result<WindowGeometry> {
        let (Ok(width), Ok(height)) = (
            u32::try_from(self.window_size.x),
            u32::try_from(self.window_size.y),
        ) else {
            anyhow::bail!("Window size must be positive, got {}", self.window_size);
        };
        Ok(WindowGeometry {
            offset: self.window_pos,
            width,
            height,
        })
    }

    pub fn controller_config(&self) -> anyhow::Result<ControllerConfig> {
        let mut config = ControllerConfig::new(self.window()?);
        config.ignore_radius = self.ignore_radius;
        config.warmup = Duration::try_from_secs_f64(self.warmup)
            .map_err(|_| anyhow::anyhow!("Invalid warm-up duration: {}", self.warmup))?;
        config.settle_delay = Duration::from_millis(self.settle);
        Ok(config)
    }
}

#[derive(Debug, clap::Args)]
pub struct TargetsArgs {
    /// Target positions as X,Y in screenshot pixels
    #[arg(value_name = "X,Y", allow_hyphen_values = true)]
    pub targets: Vec<Point>,
}

#[derive(Debug, clap::Args)]
pub struct ScreenshotArgs {
    /// Path to a PNG/BMP/JPEG frame of the game window
    pub path: std::path::PathBuf,
}

#[derive(Debug, clap::Args)]
pub struct HistoryArgs {
    /// Only show the most recent N clicks
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}
