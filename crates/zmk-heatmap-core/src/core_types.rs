use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Physical key switch index, identical on every layer.
/// Sensors (encoders) occupy the trailing indices after the last key.
pub type Position = u16;

/// Keymap layer index, in declaration order of the keymap.
pub type Layer = u8;

/// Classification of one completed press/release cycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Tap,
    Hold,
    Shifted,
}

/// Receiver of classified actions.
///
/// The parser only ever talks to this trait, so the live aggregate and
/// test recorders are interchangeable.
pub trait PressSink {
    fn register_key_press(&mut self, layer: Layer, position: Position, kind: ActionKind);
    fn register_combo_press(&mut self, layer: Layer, positions: &[Position], kind: ActionKind);
}
