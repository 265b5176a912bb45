// midiloop - Library exports for tests and benchmarks

pub mod config;
pub mod error;
pub mod looper;
pub mod messaging;
pub mod midi;

// Re-export commonly used types for convenience
pub use config::LooperConfig;
pub use error::{LooperError, Result};
pub use looper::{
    Harvester, Layer, LoopEvent, LoopTrack, LooperPools, Player, Recorder, Segment, Sequence,
};
pub use messaging::channels::{
    create_command_channel, create_midi_in_channel, create_midi_out_channel,
};
pub use messaging::command::Command;
pub use midi::event::{MidiEvent, MidiEventTimed};
pub use midi::output::{ChannelSink, MidiSink};
