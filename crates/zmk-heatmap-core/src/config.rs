use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which classification wins when a release is both firmware-resolved as a
/// hold and pressed while shift was latched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HoldPrecedence {
    #[default]
    Hold,
    Shifted,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Max delay between two presses for them to be resolved as a combo.
    /// 50ms is the firmware's stock combo timeout.
    #[arg(long, default_value_t = 50)]
    pub combo_window_ms: u64,

    /// Classification used when a hold and a shift latch coincide.
    #[arg(long, value_enum, default_value_t = HoldPrecedence::Hold)]
    pub hold_precedence: HoldPrecedence,

    /// Seconds between two periodic saves of the heatmap file.
    #[arg(long, default_value_t = 5)]
    pub save_interval_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            combo_window_ms: 50,
            hold_precedence: HoldPrecedence::Hold,
            save_interval_secs: 5,
        }
    }
}

impl CollectorConfig {
    pub fn combo_window(&self) -> Duration {
        Duration::from_millis(self.combo_window_ms)
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs.max(1))
    }
}
