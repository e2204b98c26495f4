//! Turns ZMK USB-logging output into classified key and combo presses.
//!
//! Recognized lines (everything else is a [`ParseError::NotAnEvent`]):
//!
//! ```text
//! [00:00:12.345,678] <dbg> zmk: position_state_changed: position: 5, pressed, layer: 0, mods: 0x00
//! [00:00:12.501,234] <dbg> zmk: position_state_changed: position: 5, released, layer: 0, mods: 0x00, hold
//! [00:00:12.420,001] <dbg> zmk: decide_hold_tap: 5 decided hold-timer (balanced decision moment timer)
//! [00:00:13.000,000] <dbg> zmk: sensor_state_changed: sensor: 0, layer: 1
//! ```
//!
//! The bracketed device uptime is the only clock used, so replaying a log
//! classifies exactly like the live session did.

use crate::config::{CollectorConfig, HoldPrecedence};
use crate::core_types::{ActionKind, Layer, Position, PressSink};
use crate::keymap::{ComboId, KeymapIndex};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use typed_builder::TypedBuilder;

/// HID modifier bits of left and right shift.
const SHIFT_MODS: u8 = 0x02 | 0x20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("not a recognized firmware event")]
    NotAnEvent,

    #[error("invalid {field}: '{value}'")]
    InvalidField { field: &'static str, value: String },
}

#[derive(TypedBuilder, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    #[builder(default = Duration::from_millis(50))]
    pub combo_window: Duration,
    #[builder(default)]
    pub hold_precedence: HoldPrecedence,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<&CollectorConfig> for ParserConfig {
    fn from(cfg: &CollectorConfig) -> Self {
        Self {
            combo_window: cfg.combo_window(),
            hold_precedence: cfg.hold_precedence,
        }
    }
}

/// One decoded log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareEvent {
    Position {
        at: Duration,
        position: Position,
        pressed: bool,
        layer: Layer,
        shift: bool,
        hold: bool,
    },
    HoldDecision {
        position: Position,
        hold: bool,
    },
    Sensor {
        at: Duration,
        sensor: u16,
        layer: Layer,
    },
}

struct Patterns {
    position: Regex,
    hold_tap: Regex,
    sensor: Regex,
}

const TIMESTAMP: &str =
    r"\[(?P<h>\d+):(?P<m>\d{2}):(?P<s>\d{2})\.(?P<ms>\d{3}),(?P<us>\d{3})\]\s+<\w+>\s+zmk:\s+";

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        position: Regex::new(&format!(
            r"{}position_state_changed:\s+position:\s*(?P<pos>\w+),\s*(?P<state>pressed|released),\s*layer:\s*(?P<layer>\w+),\s*mods:\s*0x(?P<mods>\w+)(?P<hold>,\s*hold)?\s*$",
            TIMESTAMP
        ))
        .expect("position pattern"),
        hold_tap: Regex::new(r"<\w+>\s+zmk:\s+decide_hold_tap:\s+(?P<pos>\w+)\s+decided\s+(?P<decision>[\w-]+)")
            .expect("hold-tap pattern"),
        sensor: Regex::new(&format!(
            r"{}sensor_state_changed:\s+sensor:\s*(?P<sensor>\w+),\s*layer:\s*(?P<layer>\w+)",
            TIMESTAMP
        ))
        .expect("sensor pattern"),
    })
}

fn field<T: FromStr>(caps: &Captures, name: &str, field: &'static str) -> Result<T, ParseError> {
    let raw = caps.name(name).map(|m| m.as_str()).unwrap_or_default();
    raw.parse().map_err(|_| ParseError::InvalidField {
        field,
        value: raw.to_string(),
    })
}

fn timestamp(caps: &Captures) -> Result<Duration, ParseError> {
    let h: u64 = field(caps, "h", "timestamp")?;
    let m: u64 = field(caps, "m", "timestamp")?;
    let s: u64 = field(caps, "s", "timestamp")?;
    let ms: u64 = field(caps, "ms", "timestamp")?;
    let us: u64 = field(caps, "us", "timestamp")?;

    h.checked_mul(3600)
        .and_then(|secs| secs.checked_add(m * 60 + s))
        .map(Duration::from_secs)
        .and_then(|d| d.checked_add(Duration::from_millis(ms) + Duration::from_micros(us)))
        .ok_or_else(|| ParseError::InvalidField {
            field: "timestamp",
            value: format!("{}:{:02}:{:02}.{:03},{:03}", h, m, s, ms, us),
        })
}

/// Decodes a single log line without touching any parser state.
pub fn decode_line(line: &str) -> Result<FirmwareEvent, ParseError> {
    let p = patterns();

    if let Some(caps) = p.position.captures(line) {
        let mods = caps.name("mods").map(|m| m.as_str()).unwrap_or_default();
        let mods = u8::from_str_radix(mods, 16).map_err(|_| ParseError::InvalidField {
            field: "mods",
            value: mods.to_string(),
        })?;
        return Ok(FirmwareEvent::Position {
            at: timestamp(&caps)?,
            position: field(&caps, "pos", "position")?,
            pressed: &caps["state"] == "pressed",
            layer: field(&caps, "layer", "layer")?,
            shift: mods & SHIFT_MODS != 0,
            hold: caps.name("hold").is_some(),
        });
    }

    if let Some(caps) = p.hold_tap.captures(line) {
        return Ok(FirmwareEvent::HoldDecision {
            position: field(&caps, "pos", "position")?,
            hold: caps["decision"].starts_with("hold"),
        });
    }

    if let Some(caps) = p.sensor.captures(line) {
        return Ok(FirmwareEvent::Sensor {
            at: timestamp(&caps)?,
            sensor: field(&caps, "sensor", "sensor")?,
            layer: field(&caps, "layer", "layer")?,
        });
    }

    Err(ParseError::NotAnEvent)
}

#[derive(Debug, Clone)]
struct PendingPress {
    layer: Layer,
    pressed_at: Duration,
    shifted: bool,
    held: bool,
}

#[derive(Debug, Clone)]
struct ComboWindow {
    combo: ComboId,
    layer: Layer,
    opened_at: Duration,
    positions: Vec<Position>,
    shifted: bool,
    held: bool,
}

/// Stateful line classifier.
///
/// Presses are held back until their release (or until they join a combo),
/// so each completed cycle produces exactly one register call. Presses
/// still pending when the session ends are dropped; see [`EventParser::in_flight`].
pub struct EventParser<K: KeymapIndex> {
    keymap: K,
    config: ParserConfig,
    down: BTreeMap<Position, PendingPress>,
    combos: Vec<ComboWindow>,
}

impl<K: KeymapIndex> EventParser<K> {
    pub fn new(keymap: K, config: ParserConfig) -> Self {
        Self {
            keymap,
            config,
            down: BTreeMap::new(),
            combos: Vec::new(),
        }
    }

    pub fn keymap(&self) -> &K {
        &self.keymap
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Positions pressed but not yet released, in ascending order.
    pub fn in_flight(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.down.keys().copied().collect();
        for w in &self.combos {
            positions.extend(&w.positions);
        }
        positions.sort_unstable();
        positions
    }

    /// Feeds one log line. Errors only mean the line was not an event
    /// this parser understands; callers are expected to skip them.
    pub fn parse<S: PressSink>(&mut self, line: &str, sink: &mut S) -> Result<(), ParseError> {
        let event = decode_line(line)?;
        self.apply(event, sink)
    }

    pub fn apply<S: PressSink>(
        &mut self,
        event: FirmwareEvent,
        sink: &mut S,
    ) -> Result<(), ParseError> {
        match event {
            FirmwareEvent::Position {
                at,
                position,
                pressed,
                layer,
                shift,
                hold,
            } => {
                self.check_position(position)?;
                if self.keymap.is_sensor(position) {
                    if pressed {
                        self.on_sensor(position, layer, sink);
                    }
                } else if pressed {
                    self.on_press(at, position, layer, shift);
                } else {
                    self.on_release(position, hold, sink);
                }
            }
            FirmwareEvent::HoldDecision { position, hold } => {
                if hold {
                    self.mark_held(position);
                }
            }
            FirmwareEvent::Sensor { sensor, layer, .. } => {
                let position =
                    self.keymap
                        .sensor_position(sensor)
                        .ok_or_else(|| ParseError::InvalidField {
                            field: "sensor",
                            value: sensor.to_string(),
                        })?;
                self.on_sensor(position, layer, sink);
            }
        }
        Ok(())
    }

    fn check_position(&self, position: Position) -> Result<(), ParseError> {
        if (position as usize) < self.keymap.position_count() {
            Ok(())
        } else {
            Err(ParseError::InvalidField {
                field: "position",
                value: position.to_string(),
            })
        }
    }

    fn within_window(&self, start: Duration, now: Duration) -> bool {
        now >= start && now - start <= self.config.combo_window
    }

    fn classify(&self, held: bool, shifted: bool) -> ActionKind {
        match (held, shifted) {
            (true, true) => match self.config.hold_precedence {
                HoldPrecedence::Hold => ActionKind::Hold,
                HoldPrecedence::Shifted => ActionKind::Shifted,
            },
            (true, false) => ActionKind::Hold,
            (false, true) => ActionKind::Shifted,
            (false, false) => ActionKind::Tap,
        }
    }

    fn combo_of(&self, position: Position) -> Option<usize> {
        self.combos
            .iter()
            .position(|w| w.positions.contains(&position))
    }

    fn is_down(&self, position: Position) -> bool {
        self.down.contains_key(&position) || self.combo_of(position).is_some()
    }

    fn on_press(&mut self, at: Duration, position: Position, layer: Layer, shift: bool) {
        if self.is_down(position) {
            debug!("Duplicate press at {} ignored", position);
            return;
        }

        if self.try_extend_combo(at, position, shift) || self.try_open_combo(at, position, shift) {
            return;
        }

        self.down.insert(
            position,
            PendingPress {
                layer,
                pressed_at: at,
                shifted: shift,
                held: false,
            },
        );
    }

    /// Only the newest window can still grow.
    fn try_extend_combo(&mut self, at: Duration, position: Position, shift: bool) -> bool {
        let Some(w) = self.combos.last() else {
            return false;
        };
        if !self.within_window(w.opened_at, at) {
            return false;
        }

        let mut candidate = w.positions.clone();
        candidate.push(position);
        let Some(id) = self.keymap.resolve_combo(w.layer, &candidate) else {
            return false;
        };

        if let Some(w) = self.combos.last_mut() {
            debug!("Combo {:?} extended with {}", id, position);
            w.combo = id;
            w.positions = candidate;
            w.shifted |= shift;
        }
        true
    }

    /// Each candidate is resolved on the layer of its earliest member, so a
    /// momentary layer key pressed just before the combo does not hide it.
    fn try_open_combo(&mut self, at: Duration, position: Position, shift: bool) -> bool {
        // Recent presses, oldest first; layer keys never join a combo
        let mut recent: Vec<(Position, Duration, Layer)> = self
            .down
            .iter()
            .filter(|(_, p)| self.within_window(p.pressed_at, at))
            .filter(|(pos, p)| !self.keymap.is_layer_key(p.layer, **pos))
            .map(|(&pos, p)| (pos, p.pressed_at, p.layer))
            .collect();
        if recent.is_empty() {
            return false;
        }
        recent.sort_by_key(|&(pos, pressed_at, _)| (pressed_at, pos));

        let mut candidates: Vec<(Layer, Vec<Position>)> = Vec::with_capacity(recent.len() + 1);
        candidates.push((
            recent[0].2,
            recent
                .iter()
                .map(|&(pos, _, _)| pos)
                .chain(std::iter::once(position))
                .collect(),
        ));
        if recent.len() > 1 {
            for &(pos, _, layer) in recent.iter().rev() {
                candidates.push((layer, vec![pos, position]));
            }
        }

        let Some((id, layer, members)) = candidates.into_iter().find_map(|(layer, c)| {
            self.keymap
                .resolve_combo(layer, &c)
                .map(|id| (id, layer, c))
        }) else {
            return false;
        };

        let mut window = ComboWindow {
            combo: id,
            layer,
            opened_at: at,
            positions: members.clone(),
            shifted: shift,
            held: false,
        };
        for pos in members.iter().filter(|&&p| p != position) {
            if let Some(p) = self.down.remove(pos) {
                window.opened_at = window.opened_at.min(p.pressed_at);
                window.shifted |= p.shifted;
                window.held |= p.held;
            }
        }

        debug!("Combo {:?} opened with {:?} on layer {}", id, members, layer);
        self.combos.push(window);
        true
    }

    fn on_release<S: PressSink>(&mut self, position: Position, hold: bool, sink: &mut S) {
        if let Some(idx) = self.combo_of(position) {
            let w = self.combos.remove(idx);
            let kind = self.classify(w.held || hold, w.shifted);
            debug!(
                "Combo {:?} {:?} on layer {}: {}",
                w.combo, w.positions, w.layer, kind
            );
            sink.register_combo_press(w.layer, &w.positions, kind);
            return;
        }

        match self.down.remove(&position) {
            Some(p) => {
                let kind = self.classify(p.held || hold, p.shifted);
                debug!("Key {} on layer {}: {}", position, p.layer, kind);
                sink.register_key_press(p.layer, position, kind);
            }
            None => debug!("Release at {} without a press ignored", position),
        }
    }

    fn mark_held(&mut self, position: Position) {
        if let Some(p) = self.down.get_mut(&position) {
            p.held = true;
        } else if let Some(idx) = self.combo_of(position) {
            self.combos[idx].held = true;
        }
    }

    /// Encoder steps have no release: they either complete a combo with the
    /// keys currently down, or are dropped.
    fn on_sensor<S: PressSink>(&mut self, sensor: Position, layer: Layer, sink: &mut S) {
        if !self.keymap.sensors_in_combos() {
            debug!("Sensor step at {} ignored", sensor);
            return;
        }

        let plain: Vec<(&Position, &PendingPress)> = self
            .down
            .iter()
            .filter(|(pos, p)| !self.keymap.is_layer_key(p.layer, **pos))
            .collect();
        let held: Vec<Position> = match self.combos.last() {
            Some(w) => w.positions.clone(),
            None => plain.iter().map(|(pos, _)| **pos).collect(),
        };
        let layer = self
            .combos
            .last()
            .map(|w| w.layer)
            .or_else(|| plain.iter().min_by_key(|(_, p)| p.pressed_at).map(|(_, p)| p.layer))
            .unwrap_or(layer);

        let mut candidates: Vec<Vec<Position>> = Vec::with_capacity(held.len() + 1);
        candidates.push(held.iter().copied().chain(std::iter::once(sensor)).collect());
        for &pos in &held {
            candidates.push(vec![pos, sensor]);
        }

        let found = candidates
            .into_iter()
            .filter(|c| c.len() > 1)
            .find(|c| self.keymap.resolve_combo(layer, c).is_some());

        match found {
            Some(members) => {
                debug!("Sensor combo {:?} on layer {}", members, layer);
                sink.register_combo_press(layer, &members, ActionKind::Tap);
                self.combos
                    .retain(|w| !members.iter().any(|p| w.positions.contains(p)));
                for pos in &members {
                    self.down.remove(pos);
                }
            }
            None => debug!("Sensor step at {} matched no combo", sensor),
        }
    }
}
