//! Clearsky CLI - command-line interface
//!
//! Thin front-end over the `clearsky` library: every command loads the
//! configuration, applies its flags on top and calls into the library.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::compose::ComposeArgs;
use commands::dispatch::DispatchArgs;
use commands::serve::ServeArgs;

#[derive(Parser)]
#[command(name = "clearsky")]
#[command(version = clearsky::VERSION)]
#[command(about = "Cloud-free composite mosaics from satellite time series", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.clearsky/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition the extent into tiles and publish one job per tile
    Dispatch(DispatchArgs),
    /// Run the worker behind an HTTP push endpoint
    Serve(ServeArgs),
    /// Run a single composite job locally
    Compose(ComposeArgs),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Dispatch(args) => commands::dispatch::run(cli.config, args),
        Commands::Serve(args) => commands::serve::run(cli.config, args),
        Commands::Compose(args) => commands::compose::run(cli.config, args),
    };

    if let Err(e) = result {
        e.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_dispatch_dry_run() {
        let cli = Cli::try_parse_from([
            "clearsky",
            "dispatch",
            "--dataset",
            "a.tif",
            "--dataset",
            "b.tif",
            "--tile-size",
            "256",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Dispatch(args) => {
                assert!(args.dry_run);
                assert_eq!(args.datasets, vec!["a.tif", "b.tif"]);
                assert_eq!(args.tile_size, Some(256));
            }
            _ => panic!("expected dispatch"),
        }
    }

    #[test]
    fn test_parse_compose_window() {
        let cli = Cli::try_parse_from([
            "clearsky",
            "--config",
            "/etc/clearsky.ini",
            "compose",
            "--dataset",
            "a.csky",
            "--window",
            "0,512,512,512",
            "--policy",
            "per-channel",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/clearsky.ini")));
        match cli.command {
            Commands::Compose(args) => {
                assert_eq!(args.window, vec![0, 512, 512, 512]);
                assert_eq!(args.worker.policy, Some(commands::common::PolicyArg::PerChannel));
            }
            _ => panic!("expected compose"),
        }
    }
}
