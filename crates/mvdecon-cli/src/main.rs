mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mvdecon", about = "Block-tiled multi-view convolution toolkit")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition a volume into blocks and show the batch schedule
    Blocks(commands::blocks::BlocksArgs),
    /// Build compound kernels for a set of synthetic views
    Compound(commands::compound::CompoundArgs),
    /// Compare tiled against whole-volume convolution on a bead volume
    Convolve(commands::convolve::ConvolveArgs),
    /// Print or save the default configuration as TOML
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Blocks(args) => commands::blocks::run(args),
        Commands::Compound(args) => commands::compound::run(args),
        Commands::Convolve(args) => commands::convolve::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
