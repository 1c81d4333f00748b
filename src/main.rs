use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use torrent_vfs::config::CliArgs;
use torrent_vfs::Config;

#[derive(Parser)]
#[command(name = "torrent-vfs")]
#[command(about = "Mounts BitTorrent swarms and nested archives as a read-only FUSE filesystem")]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase verbosity (-v, -vv, -vvv)")]
    verbose: u8,

    #[arg(short, long, help = "Suppress all but error-level logging")]
    quiet: bool,

    #[arg(long, help = "Path to a TOML or JSON config file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mount the virtual filesystem, blocking until unmounted.
    Mount {
        /// Host directory a user drops `.torrent` files into.
        data_dir: PathBuf,
        /// Where to mount the virtual tree.
        mountpoint: PathBuf,
    },
    /// Validate configuration and engine connectivity without mounting.
    ServeCheck,
}

fn load_config(cli: &Cli, torrents_dir: Option<&PathBuf>, mountpoint: Option<&PathBuf>) -> Result<Config> {
    let base = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_default_locations()?,
    };
    let mut config = base.merge_from_env()?;
    let cli_args = CliArgs {
        engine_url: None,
        torrents_dir: torrents_dir.cloned(),
        mount_point: mountpoint.cloned(),
    };
    config = config.merge_from_cli(&cli_args);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    torrent_vfs::mount::setup_logging(cli.verbose, cli.quiet)?;

    match &cli.command {
        Command::Mount { data_dir, mountpoint } => {
            let config = load_config(&cli, Some(data_dir), Some(mountpoint))?;
            torrent_vfs::run(config).await
        }
        Command::ServeCheck => {
            let config = load_config(&cli, None, None)?;
            torrent_vfs::serve_check(&config).await
        }
    }
}
