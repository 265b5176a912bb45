// Messaging module - lock-free channels between threads

pub mod channels;
pub mod command;

pub use channels::{
    create_command_channel, create_midi_in_channel, create_midi_out_channel, CommandConsumer,
    CommandProducer, MidiInConsumer, MidiInProducer, MidiOutConsumer, MidiOutProducer,
};
pub use command::Command;
