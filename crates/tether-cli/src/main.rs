//! Tether command-line host
//!
//! Serves a web content directory over loopback HTTP and services the main
//! execution context for the invocation bridge.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::serve;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Host web content bridged to native code", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a document root over loopback HTTP
    Serve {
        /// Document root (overrides the config file)
        root: Option<PathBuf>,
        /// Overlay directory; later overlays shadow earlier ones and the root
        #[arg(short, long = "overlay", value_name = "DIR")]
        overlays: Vec<PathBuf>,
        /// Listen port (0 picks an ephemeral port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Listen address
        #[arg(long)]
        host: Option<String>,
        /// Path to tether.toml
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Serve {
            root,
            overlays,
            port,
            host,
            config,
        } => serve::execute(serve::ServeArgs {
            root,
            overlays,
            port,
            host,
            config,
        }),
    }
}
