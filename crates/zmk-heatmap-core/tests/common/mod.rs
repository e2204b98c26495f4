#![allow(dead_code)]

use zmk_heatmap_core::heatmap::normalize_keys;
use zmk_heatmap_core::keymap::{ComboId, KeymapIndex};
use zmk_heatmap_core::{ActionKind, Layer, Position, PressSink};

/// Keymap stand-in with a fixed combo table.
pub struct FakeKeymap {
    pub keys: usize,
    pub sensors: usize,
    pub combos: Vec<(Layer, Vec<Position>)>,
    pub layer_keys: Vec<(Layer, Position)>,
}

impl FakeKeymap {
    pub fn new(keys: usize) -> Self {
        Self {
            keys,
            sensors: 0,
            combos: Vec::new(),
            layer_keys: Vec::new(),
        }
    }

    pub fn sensors(mut self, sensors: usize) -> Self {
        self.sensors = sensors;
        self
    }

    pub fn combo(mut self, layer: Layer, positions: &[Position]) -> Self {
        self.combos.push((layer, normalize_keys(positions)));
        self
    }

    pub fn layer_key(mut self, layer: Layer, position: Position) -> Self {
        self.layer_keys.push((layer, position));
        self
    }
}

impl KeymapIndex for FakeKeymap {
    fn key_count(&self) -> usize {
        self.keys
    }

    fn sensor_count(&self) -> usize {
        self.sensors
    }

    fn resolve_combo(&self, layer: Layer, positions: &[Position]) -> Option<ComboId> {
        let keys = normalize_keys(positions);
        self.combos
            .iter()
            .position(|(l, p)| *l == layer && *p == keys)
            .map(ComboId)
    }

    fn is_layer_key(&self, layer: Layer, position: Position) -> bool {
        self.layer_keys.contains(&(layer, position))
    }

    fn sensors_in_combos(&self) -> bool {
        self.combos
            .iter()
            .any(|(_, p)| p.iter().any(|&p| self.is_sensor(p)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Key(Layer, Position, ActionKind),
    Combo(Layer, Vec<Position>, ActionKind),
}

/// Sink that records every register call verbatim.
#[derive(Debug, Default)]
pub struct Recorder {
    pub calls: Vec<Call>,
}

impl PressSink for Recorder {
    fn register_key_press(&mut self, layer: Layer, position: Position, kind: ActionKind) {
        self.calls.push(Call::Key(layer, position, kind));
    }

    fn register_combo_press(&mut self, layer: Layer, positions: &[Position], kind: ActionKind) {
        self.calls
            .push(Call::Combo(layer, normalize_keys(positions), kind));
    }
}

fn stamp(ms: u64) -> String {
    let secs = ms / 1000;
    format!(
        "[{:02}:{:02}:{:02}.{:03},000]",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        ms % 1000
    )
}

pub fn press(ms: u64, position: Position, layer: Layer, mods: u8) -> String {
    format!(
        "{} <dbg> zmk: position_state_changed: position: {}, pressed, layer: {}, mods: 0x{:02x}",
        stamp(ms),
        position,
        layer,
        mods
    )
}

pub fn release(ms: u64, position: Position, layer: Layer) -> String {
    format!(
        "{} <dbg> zmk: position_state_changed: position: {}, released, layer: {}, mods: 0x00",
        stamp(ms),
        position,
        layer
    )
}

pub fn release_held(ms: u64, position: Position, layer: Layer) -> String {
    format!("{}, hold", release(ms, position, layer))
}

pub fn hold_decision(ms: u64, position: Position, decision: &str) -> String {
    format!(
        "{} <dbg> zmk: decide_hold_tap: {} decided {} (balanced decision moment timer)",
        stamp(ms),
        position,
        decision
    )
}

pub fn sensor(ms: u64, sensor: u16, layer: Layer) -> String {
    format!(
        "{} <dbg> zmk: sensor_state_changed: sensor: {}, layer: {}",
        stamp(ms),
        sensor,
        layer
    )
}
