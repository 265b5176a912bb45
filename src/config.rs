// Looper configuration - pool sizing and runtime policy

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Engine sizing and policy knobs.
///
/// Everything here is read once at startup; the audio path never
/// consults the config again, it works from pre-sized structures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LooperConfig {
    /// Event buffers preallocated in the pool
    pub event_pool_buffers: usize,
    /// Capacity of each pooled event buffer
    pub event_buffer_capacity: usize,
    /// Segment buffers preallocated in the pool
    pub segment_pool_buffers: usize,
    /// Capacity of each pooled segment buffer
    pub segment_buffer_capacity: usize,
    /// Simultaneously held notes the recorder tracks
    pub held_note_capacity: usize,
    /// Simultaneously sounding notes the player tracks
    pub on_note_capacity: usize,
    /// Block size for decay-based prefix harvests
    pub prefix_block_frames: u64,
    /// Committed layers kept reachable for undo
    pub history_limit: usize,
    /// Echo incoming MIDI to the output while recording
    pub midi_thru: bool,
}

impl Default for LooperConfig {
    fn default() -> Self {
        Self {
            event_pool_buffers: 32,
            event_buffer_capacity: 1024,
            segment_pool_buffers: 16,
            segment_buffer_capacity: 64,
            held_note_capacity: 64,
            on_note_capacity: 128,
            prefix_block_frames: 4096,
            history_limit: 16,
            midi_thru: true,
        }
    }
}

impl LooperConfig {
    /// Platform config file location, e.g. `~/.config/midiloop/config.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("midiloop").join("config.ron"))
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist. A malformed file is an error; silently
    /// replacing a config the user edited would be worse than failing.
    pub fn load_or_default() -> crate::Result<Self> {
        let Some(path) = Self::default_path() else {
            warn!("no config directory on this platform, using defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)?;
        let config: Self = ron::from_str(&text)?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Write the config to the default location, creating the directory
    /// if needed.
    pub fn save(&self) -> crate::Result<()> {
        let Some(path) = Self::default_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let pretty = ron::ser::PrettyConfig::default();
        let text = ron::ser::to_string_pretty(self, pretty)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn load_from(path: &std::path::Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(ron::from_str(&text)?)
    }
}
