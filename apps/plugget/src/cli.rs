//! Command line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// plugget - plugin downloader and installer for the editor
#[derive(Parser)]
#[command(name = "plugget")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Download and install editor plugins")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output events as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH", env = "PLUGGET_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Install plugins from the manifest
    #[command(alias = "i")]
    Install {
        /// Plugin identifiers to install
        ids: Vec<String>,
    },

    /// Uninstall installed plugins
    #[command(alias = "rm")]
    Uninstall {
        /// Plugin identifiers to uninstall
        ids: Vec<String>,
    },

    /// List plugins offered by the manifest
    #[command(alias = "ls")]
    List,

    /// List installed plugins
    Installed,

    /// Force a manifest refetch
    RefreshManifest,

    /// Sign in against the authentication provider
    Login,
}
