pub mod tables;

use zmk_heatmap_core::{Keymap, Layer};

pub fn layer_label(layer: Layer, keymap: Option<&Keymap>) -> String {
    match keymap.and_then(|k| k.layer_name(layer)) {
        Some(name) => format!("{} ({})", layer, name),
        None => layer.to_string(),
    }
}
