use crate::core_types::{ActionKind, Layer, Position, PressSink};
use crate::error::{HeatmapError, HmResult};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use strum::IntoEnumIterator;
use tempfile::NamedTempFile;
use tracing::debug;

/// Tap / hold / shift counters of one key or combo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressCounts {
    pub taps: u64,
    pub holds: u64,
    pub shifts: u64,
}

impl PressCounts {
    pub fn total(&self) -> u64 {
        self.taps + self.holds + self.shifts
    }

    pub fn get(&self, kind: ActionKind) -> u64 {
        match kind {
            ActionKind::Tap => self.taps,
            ActionKind::Hold => self.holds,
            ActionKind::Shifted => self.shifts,
        }
    }

    fn bump(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::Tap => self.taps += 1,
            ActionKind::Hold => self.holds += 1,
            ActionKind::Shifted => self.shifts += 1,
        }
    }

    fn absorb(&mut self, other: PressCounts) {
        self.taps += other.taps;
        self.holds += other.holds;
        self.shifts += other.shifts;
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Canonical form of a combo key set: sorted, without duplicates.
pub fn normalize_keys(positions: &[Position]) -> Vec<Position> {
    positions.iter().copied().sorted_unstable().dedup().collect()
}

/// Press counters per (layer, position) and per (layer, combo key set).
///
/// Counters only grow. Every mutation goes through [`PressSink`], which is
/// also the path used by [`Heatmap::merge`], so combo normalization holds
/// for live collection and merging alike.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Heatmap {
    keys: BTreeMap<(Layer, Position), PressCounts>,
    combos: BTreeMap<(Layer, Vec<Position>), PressCounts>,
}

impl Heatmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a heatmap file.
    ///
    /// A missing file is reported as [`HeatmapError::NotFound`] so callers
    /// can start from [`Heatmap::new`]; unparseable content is
    /// [`HeatmapError::Corrupt`].
    pub fn load<P: AsRef<Path>>(path: P) -> HmResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => HeatmapError::NotFound(path.to_path_buf()),
            _ => HeatmapError::Io(e),
        })?;

        let file: HeatmapFile =
            serde_json::from_str(&content).map_err(|source| HeatmapError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        let heatmap = Self::from(file);
        debug!(
            "Loaded {} with {} keys, {} combos",
            path.display(),
            heatmap.keys.len(),
            heatmap.combos.len()
        );
        Ok(heatmap)
    }

    /// Like [`Heatmap::load`], but a missing file yields an empty heatmap.
    pub fn load_or_new<P: AsRef<Path>>(path: P) -> HmResult<Self> {
        match Self::load(path) {
            Err(HeatmapError::NotFound(_)) => Ok(Self::new()),
            other => other,
        }
    }

    /// Writes the heatmap through a temp file in the target directory and
    /// renames it over `path`, so readers never see a half-written file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> HmResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&HeatmapFile::from(self))?;

        let mut tmp = NamedTempFile::new_in(parent_dir(path))?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        Ok(())
    }

    /// Fails when `path` could not be written by [`Heatmap::save`], without
    /// touching `path` itself.
    pub fn ensure_writable<P: AsRef<Path>>(path: P) -> HmResult<()> {
        let path = path.as_ref();
        if let Ok(meta) = fs::metadata(path) {
            if meta.is_dir() || meta.permissions().readonly() {
                return Err(HeatmapError::Io(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("{} is not a writable file", path.display()),
                )));
            }
        }
        NamedTempFile::new_in(parent_dir(path))?;
        Ok(())
    }

    /// Sum of every counter of every key and combo.
    pub fn press_count(&self) -> u64 {
        self.keys.values().map(PressCounts::total).sum::<u64>()
            + self.combos.values().map(PressCounts::total).sum::<u64>()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.combos.is_empty()
    }

    pub fn key_count(&self, layer: Layer, position: Position) -> PressCounts {
        self.keys
            .get(&(layer, position))
            .copied()
            .unwrap_or_default()
    }

    pub fn combo_count(&self, layer: Layer, positions: &[Position]) -> PressCounts {
        self.combos
            .get(&(layer, normalize_keys(positions)))
            .copied()
            .unwrap_or_default()
    }

    pub fn key_presses(&self) -> impl Iterator<Item = (Layer, Position, PressCounts)> + '_ {
        self.keys.iter().map(|(&(l, p), &c)| (l, p, c))
    }

    pub fn combo_presses(&self) -> impl Iterator<Item = (Layer, &[Position], PressCounts)> + '_ {
        self.combos
            .iter()
            .map(|((l, keys), &c)| (*l, keys.as_slice(), c))
    }

    /// Folds `other` into `self` by replaying every recorded increment.
    pub fn merge(&mut self, other: &Heatmap) {
        for (layer, position, counts) in other.key_presses() {
            for kind in ActionKind::iter() {
                for _ in 0..counts.get(kind) {
                    self.register_key_press(layer, position, kind);
                }
            }
        }
        for (layer, keys, counts) in other.combo_presses() {
            for kind in ActionKind::iter() {
                for _ in 0..counts.get(kind) {
                    self.register_combo_press(layer, keys, kind);
                }
            }
        }
    }

    pub fn merge_all<'a, I>(heatmaps: I) -> Self
    where
        I: IntoIterator<Item = &'a Heatmap>,
    {
        heatmaps.into_iter().fold(Self::new(), |mut acc, h| {
            acc.merge(h);
            acc
        })
    }
}

impl PressSink for Heatmap {
    fn register_key_press(&mut self, layer: Layer, position: Position, kind: ActionKind) {
        self.keys.entry((layer, position)).or_default().bump(kind);
    }

    fn register_combo_press(&mut self, layer: Layer, positions: &[Position], kind: ActionKind) {
        self.combos
            .entry((layer, normalize_keys(positions)))
            .or_default()
            .bump(kind);
    }
}

// --- On-disk representation ---

#[derive(Debug, Serialize, Deserialize)]
struct KeyPressRecord {
    #[serde(alias = "Layer")]
    layer: Layer,
    #[serde(alias = "Position")]
    position: Position,
    #[serde(default, alias = "Taps")]
    taps: u64,
    #[serde(default, alias = "Holds")]
    holds: u64,
    #[serde(default, alias = "Shifts")]
    shifts: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ComboPressRecord {
    #[serde(alias = "Layer")]
    layer: Layer,
    #[serde(alias = "Keys")]
    keys: Vec<Position>,
    #[serde(default, alias = "Taps")]
    taps: u64,
    #[serde(default, alias = "Holds")]
    holds: u64,
    #[serde(default, alias = "Shifts")]
    shifts: u64,
}

// Older files may carry `null` instead of an empty list.
#[derive(Debug, Default, Serialize, Deserialize)]
struct HeatmapFile {
    #[serde(default, alias = "KeyPresses")]
    key_presses: Option<Vec<KeyPressRecord>>,
    #[serde(default, alias = "ComboPresses")]
    combo_presses: Option<Vec<ComboPressRecord>>,
}

impl From<&Heatmap> for HeatmapFile {
    fn from(h: &Heatmap) -> Self {
        let key_presses = h
            .key_presses()
            .map(|(layer, position, c)| KeyPressRecord {
                layer,
                position,
                taps: c.taps,
                holds: c.holds,
                shifts: c.shifts,
            })
            .collect();

        let combo_presses = h
            .combo_presses()
            .map(|(layer, keys, c)| ComboPressRecord {
                layer,
                keys: keys.to_vec(),
                taps: c.taps,
                holds: c.holds,
                shifts: c.shifts,
            })
            .collect();

        Self {
            key_presses: Some(key_presses),
            combo_presses: Some(combo_presses),
        }
    }
}

impl From<HeatmapFile> for Heatmap {
    fn from(file: HeatmapFile) -> Self {
        let mut heatmap = Heatmap::new();

        for r in file.key_presses.unwrap_or_default() {
            heatmap
                .keys
                .entry((r.layer, r.position))
                .or_default()
                .absorb(PressCounts {
                    taps: r.taps,
                    holds: r.holds,
                    shifts: r.shifts,
                });
        }

        for r in file.combo_presses.unwrap_or_default() {
            heatmap
                .combos
                .entry((r.layer, normalize_keys(&r.keys)))
                .or_default()
                .absorb(PressCounts {
                    taps: r.taps,
                    holds: r.holds,
                    shifts: r.shifts,
                });
        }

        heatmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_sorts_and_dedups() {
        assert_eq!(normalize_keys(&[3, 1, 2, 1]), vec![1, 2, 3]);
        assert!(normalize_keys(&[]).is_empty());
    }

    #[test]
    fn test_legacy_field_names_and_null_lists() {
        let json = r#"{
            "KeyPresses": [{"Layer": 1, "Position": 4, "Taps": 2, "Holds": 1, "Shifts": 0}],
            "ComboPresses": null
        }"#;
        let file: HeatmapFile = serde_json::from_str(json).unwrap();
        let h = Heatmap::from(file);

        assert_eq!(h.key_count(1, 4).taps, 2);
        assert_eq!(h.key_count(1, 4).holds, 1);
        assert_eq!(h.press_count(), 3);
    }

    #[test]
    fn test_unnormalized_combo_records_are_folded_together() {
        let json = r#"{
            "key_presses": [],
            "combo_presses": [
                {"layer": 0, "keys": [2, 1], "taps": 1},
                {"layer": 0, "keys": [1, 2], "taps": 2}
            ]
        }"#;
        let file: HeatmapFile = serde_json::from_str(json).unwrap();
        let h = Heatmap::from(file);

        assert_eq!(h.combo_presses().count(), 1);
        assert_eq!(h.combo_count(0, &[1, 2]).taps, 3);
    }
}
