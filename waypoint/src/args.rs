use std::path::PathBuf;

use clap::Parser;

/// Waypoint tool router
#[derive(Debug, Parser)]
#[command(name = "waypoint", about = "Chat with an agent that discovers its own tool servers")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "waypoint.toml", env = "WAYPOINT_CONFIG")]
    pub config: PathBuf,

    /// Log filter directive, overridden by `telemetry.log_filter`
    #[arg(long, default_value = "warn", env = "WAYPOINT_LOG")]
    pub log_filter: String,
}
