use std::path::PathBuf;

use clap::Parser;

use crate::Command;

#[derive(Parser, Debug)]
#[command(name = "warden", about = "Access control list service", version)]
pub struct Args {
    /// State directory (defaults to ~/.warden)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}
