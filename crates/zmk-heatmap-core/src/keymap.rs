use crate::core_types::{Layer, Position};
use crate::error::{HeatmapError, HmResult};
use crate::heatmap::normalize_keys;
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Index of a combo definition inside the keymap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComboId(pub usize);

/// Static keymap lookups the parser needs.
///
/// Positions `0..key_count()` are key switches, the following
/// `sensor_count()` positions are reserved for encoders.
pub trait KeymapIndex {
    fn key_count(&self) -> usize;

    fn sensor_count(&self) -> usize;

    /// Combo bound to exactly this position set on `layer`, if any.
    fn resolve_combo(&self, layer: Layer, positions: &[Position]) -> Option<ComboId>;

    /// True when the binding at `position` switches layers.
    fn is_layer_key(&self, layer: Layer, position: Position) -> bool;

    /// True when at least one combo includes a sensor position.
    fn sensors_in_combos(&self) -> bool;

    fn is_sensor(&self, position: Position) -> bool {
        let p = position as usize;
        p >= self.key_count() && p < self.key_count() + self.sensor_count()
    }

    fn sensor_position(&self, sensor: u16) -> Option<Position> {
        if (sensor as usize) < self.sensor_count() {
            Position::try_from(self.key_count() + sensor as usize).ok()
        } else {
            None
        }
    }

    fn position_count(&self) -> usize {
        self.key_count() + self.sensor_count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboDef {
    pub name: String,
    pub positions: Vec<Position>,
    /// Empty means every layer.
    pub layers: Vec<Layer>,
}

impl ComboDef {
    fn active_on(&self, layer: Layer) -> bool {
        self.layers.is_empty() || self.layers.contains(&layer)
    }
}

/// Keymap loaded from a keymap-drawer style YAML description.
#[derive(Debug, Clone)]
pub struct Keymap {
    layer_names: Vec<String>,
    layer_keys: Vec<Vec<bool>>,
    combos: Vec<ComboDef>,
    key_count: usize,
    sensors: usize,
}

// --- YAML shape ---

#[derive(Debug, Deserialize)]
struct KeymapFile {
    layers: serde_yaml::Mapping,
    #[serde(default)]
    combos: Vec<ComboSpec>,
}

#[derive(Debug, Deserialize)]
struct ComboSpec {
    #[serde(alias = "positions", alias = "key_positions")]
    p: Vec<Position>,
    #[serde(default)]
    k: Option<serde_yaml::Value>,
    #[serde(default, alias = "layers")]
    l: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Binding {
    Plain(String),
    Detailed {
        #[serde(default)]
        t: Option<String>,
        #[serde(default)]
        h: Option<String>,
    },
    Other(IgnoredAny),
}

impl Binding {
    fn names_layer(&self, layer_names: &[String]) -> bool {
        let hit = |s: &Option<String>| {
            s.as_deref()
                .is_some_and(|s| layer_names.iter().any(|n| n == s.trim()))
        };
        match self {
            Binding::Plain(s) => layer_names.iter().any(|n| n == s.trim()),
            Binding::Detailed { t, h } => hit(t) || hit(h),
            Binding::Other(IgnoredAny) => false,
        }
    }
}

fn legend(value: &Option<serde_yaml::Value>) -> Option<String> {
    match value {
        Some(serde_yaml::Value::String(s)) => Some(s.clone()),
        Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
        Some(serde_yaml::Value::Mapping(m)) => m
            .get("t")
            .and_then(|t| t.as_str())
            .map(str::to_string),
        _ => None,
    }
}

impl Keymap {
    pub fn load<P: AsRef<Path>>(path: P, sensors: usize) -> HmResult<Self> {
        let content = fs::read_to_string(&path)?;
        Self::from_yaml_str(&content, sensors)
    }

    pub fn from_yaml_str(content: &str, sensors: usize) -> HmResult<Self> {
        let file: KeymapFile = serde_yaml::from_str(content)?;

        if file.layers.is_empty() {
            return Err(HeatmapError::Keymap("keymap defines no layers".into()));
        }
        if file.layers.len() > Layer::MAX as usize + 1 {
            return Err(HeatmapError::Keymap(format!(
                "keymap defines {} layers, at most {} are supported",
                file.layers.len(),
                Layer::MAX as usize + 1
            )));
        }

        let mut layer_names = Vec::with_capacity(file.layers.len());
        let mut layer_bindings = Vec::with_capacity(file.layers.len());
        for (name, bindings) in file.layers {
            let name = name
                .as_str()
                .ok_or_else(|| HeatmapError::Keymap(format!("invalid layer name {:?}", name)))?
                .to_string();
            let bindings: Vec<Binding> = serde_yaml::from_value(bindings)?;
            layer_names.push(name);
            layer_bindings.push(bindings);
        }

        let positions = layer_bindings[0].len();
        if let Some((i, b)) = layer_bindings
            .iter()
            .enumerate()
            .find(|(_, b)| b.len() != positions)
        {
            return Err(HeatmapError::Keymap(format!(
                "layer '{}' has {} bindings, expected {}",
                layer_names[i],
                b.len(),
                positions
            )));
        }
        if sensors > positions {
            return Err(HeatmapError::Keymap(format!(
                "{} sensors configured but layers only have {} bindings",
                sensors, positions
            )));
        }
        if positions > Position::MAX as usize {
            return Err(HeatmapError::Keymap(format!(
                "{} bindings per layer exceed the supported position range",
                positions
            )));
        }

        let layer_keys = layer_bindings
            .iter()
            .map(|bindings| {
                bindings
                    .iter()
                    .map(|b| b.names_layer(&layer_names))
                    .collect()
            })
            .collect();

        let mut combos = Vec::with_capacity(file.combos.len());
        for (i, def) in file.combos.into_iter().enumerate() {
            let keys = normalize_keys(&def.p);
            if keys.len() < 2 {
                return Err(HeatmapError::Keymap(format!(
                    "combo #{} needs at least two positions",
                    i
                )));
            }
            if let Some(p) = keys.iter().find(|&&p| p as usize >= positions) {
                return Err(HeatmapError::Keymap(format!(
                    "combo #{} uses position {} outside of 0..{}",
                    i, p, positions
                )));
            }

            let mut layers = Vec::with_capacity(def.l.len());
            for name in &def.l {
                let idx = layer_names.iter().position(|n| n == name).ok_or_else(|| {
                    HeatmapError::Keymap(format!("combo #{} names unknown layer '{}'", i, name))
                })?;
                layers.push(idx as Layer);
            }

            combos.push(ComboDef {
                name: legend(&def.k).unwrap_or_else(|| format!("combo_{}", i)),
                positions: keys,
                layers,
            });
        }

        debug!(
            "Keymap: {} layers, {} positions ({} sensors), {} combos",
            layer_names.len(),
            positions,
            sensors,
            combos.len()
        );

        Ok(Self {
            layer_names,
            layer_keys,
            combos,
            key_count: positions - sensors,
            sensors,
        })
    }

    pub fn layer_names(&self) -> &[String] {
        &self.layer_names
    }

    pub fn layer_name(&self, layer: Layer) -> Option<&str> {
        self.layer_names.get(layer as usize).map(String::as_str)
    }

    pub fn combos(&self) -> &[ComboDef] {
        &self.combos
    }

    pub fn combo(&self, id: ComboId) -> Option<&ComboDef> {
        self.combos.get(id.0)
    }
}

impl KeymapIndex for Keymap {
    fn key_count(&self) -> usize {
        self.key_count
    }

    fn sensor_count(&self) -> usize {
        self.sensors
    }

    fn resolve_combo(&self, layer: Layer, positions: &[Position]) -> Option<ComboId> {
        let keys = normalize_keys(positions);
        self.combos
            .iter()
            .position(|c| c.positions == keys && c.active_on(layer))
            .map(ComboId)
    }

    fn is_layer_key(&self, layer: Layer, position: Position) -> bool {
        self.layer_keys
            .get(layer as usize)
            .and_then(|l| l.get(position as usize))
            .copied()
            .unwrap_or(false)
    }

    fn sensors_in_combos(&self) -> bool {
        self.combos
            .iter()
            .any(|c| c.positions.iter().any(|&p| self.is_sensor(p)))
    }
}
