use clap::{Parser, Subcommand};
use std::process;
use tracing::{error, Level};

mod cmd;
mod reports;

#[derive(Parser, Debug)]
#[command(author, version, about = "Counts ZMK key presses for keyboard heatmaps", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(global = true, long, default_value_t = false)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process the keystrokes from your keyboard and save the aggregated result
    Collect(cmd::collect::CollectArgs),
    /// Merge two or more heatmap files
    Merge(cmd::merge::MergeArgs),
    /// Print the busiest keys and combos of a heatmap file
    Stats(cmd::stats::StatsArgs),
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.debug { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Collect(args) => cmd::collect::run(args),
        Commands::Merge(args) => cmd::merge::run(args),
        Commands::Stats(args) => cmd::stats::run(args),
    };

    if let Err(e) = result {
        error!("❌ {}", e);
        process::exit(1);
    }
}
