use crate::reports;
use clap::Args;
use std::path::PathBuf;
use zmk_heatmap_core::error::HmResult;
use zmk_heatmap_core::{Heatmap, Keymap};

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    /// Heatmap file to inspect
    pub input: PathBuf,

    /// Number of keys and combos to list
    #[arg(short, long, default_value_t = 10)]
    pub top: usize,

    /// Keymap description, used to label layers and combos
    #[arg(short = 'm', long)]
    pub keymap: Option<PathBuf>,

    /// Number of sensors (encoders) declared by the keymap
    #[arg(short, long, default_value_t = 0)]
    pub sensors: usize,
}

pub fn run(args: StatsArgs) -> HmResult<()> {
    let heatmap = Heatmap::load(&args.input)?;
    let keymap = match &args.keymap {
        Some(path) => Some(Keymap::load(path, args.sensors)?),
        None => None,
    };

    println!("\n🔥 === HEATMAP: {} === 🔥", args.input.display());
    reports::tables::summary(&heatmap);

    if heatmap.is_empty() {
        println!("No key presses recorded yet.");
        return Ok(());
    }

    reports::tables::top_keys(&heatmap, args.top, keymap.as_ref());
    reports::tables::top_combos(&heatmap, args.top, keymap.as_ref());
    Ok(())
}
