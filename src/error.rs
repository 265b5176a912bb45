// Error types for host-facing setup paths
//
// The engine core never returns errors from the audio path: structural
// anomalies are logged and repaired conservatively, resource exhaustion
// logs once and degrades. Errors here cover the surrounding plumbing
// (config files, device discovery, port connection).

/// Looper error types
#[derive(Debug, thiserror::Error)]
pub enum LooperError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] ron::de::SpannedError),

    #[error("Config encode error: {0}")]
    ConfigEncode(#[from] ron::Error),

    #[error("No MIDI input port available")]
    NoMidiInput,

    #[error("No MIDI output port available")]
    NoMidiOutput,

    #[error("No audio output device available")]
    NoAudioDevice,

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("Audio error: {0}")]
    Audio(String),
}

pub type Result<T> = std::result::Result<T, LooperError>;
