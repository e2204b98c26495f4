use clap::Args;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use tokio::sync::oneshot;
use tracing::{info, warn};
use zmk_heatmap_core::collector::{save_snapshot, shared, Collector, SharedHeatmap};
use zmk_heatmap_core::config::CollectorConfig;
use zmk_heatmap_core::device::{candidate_ports, find_keyboard, open_lines, SerialProbe};
use zmk_heatmap_core::error::{HeatmapError, HmResult};
use zmk_heatmap_core::{Heatmap, Keymap, ParserConfig, Position};

#[derive(Args, Debug, Clone)]
pub struct CollectArgs {
    /// Serial device of the keyboard (e.g. /dev/tty.usbmodem144001), or `auto`
    #[arg(short, long, default_value = "auto")]
    pub keyboard: String,

    /// Heatmap file to create or continue (e.g. ~/heatmap.json)
    #[arg(short, long, default_value = "heatmap.json")]
    pub output: PathBuf,

    /// Keymap description (e.g. ~/keymap.yaml)
    #[arg(short = 'm', long)]
    pub keymap: PathBuf,

    /// Number of sensors (encoders) of the keyboard, needed to collect combos
    #[arg(short, long, default_value_t = 0)]
    pub sensors: usize,

    #[command(flatten)]
    pub config: CollectorConfig,
}

type ReaderOutcome = (io::Result<u64>, Vec<Position>);

pub fn run(args: CollectArgs) -> HmResult<()> {
    let keyboard = find_keyboard(&args.keyboard, &candidate_ports(), &SerialProbe::default())?;

    Heatmap::ensure_writable(&args.output)?;
    let heatmap = Heatmap::load_or_new(&args.output)?;
    if heatmap.press_count() > 0 {
        info!(
            "📂 Loaded {} with {} key presses",
            args.output.display(),
            heatmap.press_count()
        );
    }

    let keymap = Keymap::load(&args.keymap, args.sensors).map_err(|e| {
        HeatmapError::Keymap(format!("Cannot load {}: {}", args.keymap.display(), e))
    })?;
    info!("🗺️  Loaded keymap {}", args.keymap.display());

    info!("🔌 Connecting to the keyboard at {}", keyboard.display());
    let lines = open_lines(&keyboard).map_err(|e| {
        HeatmapError::Device(format!("Cannot connect to {}: {}", keyboard.display(), e))
    })?;

    let heatmap = shared(heatmap);
    let collector = Collector::new(keymap, ParserConfig::from(&args.config), heatmap.clone());

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(supervise(collector, lines, heatmap, &args.output, &args.config))
}

/// Runs the line reader on its own thread and saves on a timer until the
/// device goes away or the user interrupts.
async fn supervise<I>(
    mut collector: Collector<Keymap>,
    lines: I,
    heatmap: SharedHeatmap,
    output: &Path,
    config: &CollectorConfig,
) -> HmResult<()>
where
    I: Iterator<Item = io::Result<String>> + Send + 'static,
{
    let (done_tx, mut done_rx) = oneshot::channel::<ReaderOutcome>();
    thread::spawn(move || {
        let result = collector.run(lines);
        let _ = done_tx.send((result, collector.in_flight()));
    });

    let mut ticker = tokio::time::interval(config.save_interval());
    // The first tick completes immediately
    ticker.tick().await;

    // Registered once so a Ctrl-C during a save is still seen
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = ticker.tick() => match save_snapshot(&heatmap, output) {
                Ok(count) => info!("Collected {} key presses", count),
                Err(e) => warn!("⚠️  Cannot save {}: {}", output.display(), e),
            },
            _ = &mut interrupted => {
                info!("🛑 Interrupted, writing final save...");
                break;
            }
            outcome = &mut done_rx => {
                match outcome {
                    Ok((Ok(lines), in_flight)) => {
                        info!("🔌 Keyboard stream ended after {} lines", lines);
                        if !in_flight.is_empty() {
                            warn!("Presses still down at disconnect are not counted: {:?}", in_flight);
                        }
                    }
                    Ok((Err(e), _)) => warn!("⚠️  Keyboard disconnected: {}", e),
                    Err(_) => warn!("⚠️  Line reader stopped unexpectedly"),
                }
                break;
            }
        }
    }

    let count = save_snapshot(&heatmap, output)?;
    info!("💾 Saved {} key presses to {}", count, output.display());
    Ok(())
}
