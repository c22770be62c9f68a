use clap::{Parser, Subcommand};

use crate::config::KeyOverrides;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "airquality-sidecar",
    version,
    about = "Polls PurpleAir sensors and publishes readings to InfluxDB"
)]
pub struct Args {
    /// PurpleAir read key (overrides PURPLEAIR_READ_KEY)
    #[arg(short = 'r', long = "readkey", global = true)]
    pub read_key: Option<String>,
    /// PurpleAir write key (overrides PURPLEAIR_WRITE_KEY)
    #[arg(short = 'w', long = "writekey", global = true)]
    pub write_key: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Poll sensors and publish them to InfluxDB until interrupted
    Influx,
    /// Fetch sensors once and print them as JSON
    Sensors,
    /// Check the read key against the PurpleAir API
    Keys,
}

impl Args {
    pub fn key_overrides(&self) -> KeyOverrides {
        KeyOverrides {
            read_key: self.read_key.clone(),
            write_key: self.write_key.clone(),
        }
    }
}
