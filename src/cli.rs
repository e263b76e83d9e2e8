use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "tabula")]
#[command(version, about = "Distraction-free drafting appliance for e-ink readers")]
pub struct Cli {
    /// Path to the settings file (TOML)
    #[arg(value_name = "SETTINGS")]
    pub settings: PathBuf,
}
