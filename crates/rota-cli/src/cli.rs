use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Keeps chat channels in step with the service roster.
#[derive(Debug, Parser)]
#[command(name = "rota", version, about, long_about = None)]
pub(crate) struct Cli {
    #[arg(
        short = 'c',
        long = "config",
        env = "ROTA_CONFIG",
        global = true,
        help = "Config file path. Without it ./config.toml, $HOME/.config/rota/config.toml and /etc/rota/config.toml are tried in turn"
    )]
    pub(crate) config: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub(crate) enum Command {
    /// Import roster and directory, then create, update, invite and archive channels.
    Sync,
    /// Print stored channels as JSON lines.
    Channels {
        #[arg(long, help = "Include archived channels")]
        all: bool,
    },
}
