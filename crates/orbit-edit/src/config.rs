use std::fs;
use std::path::Path;

use anyhow::Result;
use orbit_model::{ChartFormat, POSITION_COUNT, TICKS_PER_MEASURE};
use serde::{Deserialize, Serialize};

/// Editor settings, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    /// Maximum undo depth; 0 keeps everything.
    pub undo_limit: usize,
    /// High 16 bits of every id this peer allocates.
    pub id_namespace: u16,
    /// Tick step between generated hold segments.
    pub bake_hold_interval: i32,
    /// Size of each piece when converting to an instant mask.
    pub instant_mask_chunk: i32,
    pub default_format: ChartFormat,
    pub broadcast_operations: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            undo_limit: 256,
            id_namespace: 0,
            bake_hold_interval: 60,
            instant_mask_chunk: 2,
            default_format: ChartFormat::Sat,
            broadcast_operations: true,
        }
    }
}

impl EditorConfig {
    /// Read and validate a config file. A missing file yields the defaults.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.validate();
        Ok(config)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Clamp out-of-range values into their valid ranges.
    pub fn validate(&mut self) {
        self.bake_hold_interval = self.bake_hold_interval.clamp(1, TICKS_PER_MEASURE);
        self.instant_mask_chunk = self.instant_mask_chunk.clamp(1, POSITION_COUNT);
    }
}
