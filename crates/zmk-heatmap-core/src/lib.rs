pub mod collector;
pub mod config;
pub mod core_types;
pub mod device;
pub mod error;
pub mod heatmap;
pub mod keymap;
pub mod parser;

pub use core_types::{ActionKind, Layer, Position, PressSink};
pub use heatmap::{Heatmap, PressCounts};
pub use keymap::{Keymap, KeymapIndex};
pub use parser::{EventParser, ParseError, ParserConfig};
