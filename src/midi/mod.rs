// MIDI module - messages, ports, and the emission seam

pub mod event;
pub mod input;
pub mod output;

pub use event::{MidiEvent, MidiEventTimed};
pub use input::MidiInput;
pub use output::{ChannelSink, MidiOutput, MidiSink};
