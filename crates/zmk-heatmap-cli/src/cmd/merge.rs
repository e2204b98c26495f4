use clap::Args;
use std::path::PathBuf;
use tracing::info;
use zmk_heatmap_core::error::{HeatmapError, HmResult};
use zmk_heatmap_core::Heatmap;

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    /// Heatmap files, folded in the given order
    #[arg(value_name = "INPUT", num_args = 2.., required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output file for the merged heatmap
    #[arg(short, long, default_value = "merged_heatmap.json")]
    pub output: PathBuf,
}

pub fn run(args: MergeArgs) -> HmResult<()> {
    if let Some(missing) = args.inputs.iter().find(|p| !p.exists()) {
        return Err(HeatmapError::NotFound(missing.clone()));
    }
    Heatmap::ensure_writable(&args.output)?;

    let mut heatmaps = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        let h = Heatmap::load(input)?;
        info!("📂 {}: {} key presses", input.display(), h.press_count());
        heatmaps.push(h);
    }

    let merged = Heatmap::merge_all(&heatmaps);
    merged.save(&args.output)?;

    info!(
        "💾 Merged heatmap saved to {} ({} key presses)",
        args.output.display(),
        merged.press_count()
    );
    Ok(())
}
