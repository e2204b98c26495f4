use crate::core_types::Position;
use crate::error::HmResult;
use crate::heatmap::Heatmap;
use crate::keymap::KeymapIndex;
use crate::parser::{EventParser, ParseError, ParserConfig};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// The live aggregate, shared by the line reader and the save task.
pub type SharedHeatmap = Arc<Mutex<Heatmap>>;

pub fn shared(heatmap: Heatmap) -> SharedHeatmap {
    Arc::new(Mutex::new(heatmap))
}

// Each counter update is a single increment, so a poisoned lock still
// guards consistent data.
fn lock(heatmap: &SharedHeatmap) -> MutexGuard<'_, Heatmap> {
    heatmap.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clones the aggregate under the lock so it can be serialized without
/// holding up the reader.
pub fn snapshot(heatmap: &SharedHeatmap) -> Heatmap {
    lock(heatmap).clone()
}

pub fn save_snapshot<P: AsRef<Path>>(heatmap: &SharedHeatmap, path: P) -> HmResult<u64> {
    let snap = snapshot(heatmap);
    snap.save(path)?;
    Ok(snap.press_count())
}

/// Feeds firmware log lines into a shared heatmap.
pub struct Collector<K: KeymapIndex> {
    parser: EventParser<K>,
    heatmap: SharedHeatmap,
}

impl<K: KeymapIndex> Collector<K> {
    pub fn new(keymap: K, config: ParserConfig, heatmap: SharedHeatmap) -> Self {
        Self {
            parser: EventParser::new(keymap, config),
            heatmap,
        }
    }

    pub fn heatmap(&self) -> &SharedHeatmap {
        &self.heatmap
    }

    pub fn in_flight(&self) -> Vec<Position> {
        self.parser.in_flight()
    }

    /// Classifies one line. Returns whether it was a recognized event.
    pub fn feed(&mut self, line: &str) -> bool {
        let mut heatmap = lock(&self.heatmap);
        match self.parser.parse(line, &mut *heatmap) {
            Ok(()) => true,
            Err(e) => {
                if !matches!(e, ParseError::NotAnEvent) {
                    debug!("Skipping line ({}): {}", e, line.trim_end());
                }
                false
            }
        }
    }

    /// Consumes lines until the source ends or fails. Returns the number of
    /// lines read; an I/O error is returned after logging the count.
    pub fn run<I>(&mut self, lines: I) -> io::Result<u64>
    where
        I: IntoIterator<Item = io::Result<String>>,
    {
        let mut count = 0u64;
        for line in lines {
            match line {
                Ok(line) => {
                    self.feed(&line);
                    count += 1;
                }
                Err(e) => {
                    warn!("Device stream failed after {} lines: {}", count, e);
                    return Err(e);
                }
            }
        }
        Ok(count)
    }
}
