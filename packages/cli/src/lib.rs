//! # urlfs-cli
//!
//! Command line access to any URL the urlfs registry understands.
//!
//! ## Usage
//!
//! ```bash
//! urlfs cat ssh://deploy@web1/var/log/app.log
//! urlfs ls -l swift://archive/logs/
//! urlfs cp ./report.csv swift://archive/reports/
//! urlfs get swift://archive/logs/2024/ ./logs
//! urlfs -vv put ./site mem://scratch/site/
//! ```
//!
//! Swift profiles and ssh settings come from the config file, located by
//! `--config`, `URLFS_CONFIG` or the platform config directory.

pub mod commands;

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use urlfs::{Config, Urlfs};

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Resource(#[from] urlfs::Error),

    #[error("Output error: {0}")]
    Io(#[from] io::Error),

    #[error("{url} is a directory (use -r to remove it)")]
    IsDirectory { url: String },
}

/// urlfs - read, write and copy files by URL
#[derive(Parser, Debug)]
#[command(name = "urlfs")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file (defaults to $URLFS_CONFIG, then the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log more; repeat for debug and trace output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a file's content
    Cat { url: String },

    /// List a directory, or name a file
    Ls {
        url: String,
        /// Show size and modification time
        #[arg(short, long)]
        long: bool,
    },

    /// Copy a file to a file or into a directory
    Cp {
        src: String,
        dest: String,
        /// Replace an existing target
        #[arg(short, long)]
        force: bool,
    },

    /// Delete a file, or a directory with -r
    Rm {
        url: String,
        #[arg(short, long)]
        recursive: bool,
    },

    /// Show kind, size and times
    Stat { url: String },

    /// Create an empty file or directory if missing
    Touch { url: String },

    /// Download a resource to a local path
    Get {
        url: String,
        local: PathBuf,
        #[arg(short, long)]
        force: bool,
    },

    /// Upload a local file or directory to a resource
    Put {
        local: PathBuf,
        url: String,
        #[arg(short, long)]
        force: bool,
    },
}

/// Level used when `RUST_LOG` is unset.
pub fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

pub fn init_logging(verbose: u8) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level(verbose)))
        .init();
}

/// Load the config, build the registry and run one command against stdout.
pub fn run(args: Args) -> Result<(), CliError> {
    let config = Config::locate(args.config.as_deref())?;
    let fs = Urlfs::from_config(&config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    commands::execute(&fs, args.command, &mut out)
}
