// Communication channels lock-free

use crate::messaging::command::Command;
use crate::midi::event::MidiEventTimed;
use ringbuf::{HeapRb, traits::Split};

pub type CommandProducer = ringbuf::HeapProd<Command>;
pub type CommandConsumer = ringbuf::HeapCons<Command>;

pub fn create_command_channel(capacity: usize) -> (CommandProducer, CommandConsumer) {
    let rb = HeapRb::<Command>::new(capacity);
    rb.split()
}

pub type MidiInProducer = ringbuf::HeapProd<MidiEventTimed>;
pub type MidiInConsumer = ringbuf::HeapCons<MidiEventTimed>;

/// Channel from the midir callback thread into the audio callback
pub fn create_midi_in_channel(capacity: usize) -> (MidiInProducer, MidiInConsumer) {
    let rb = HeapRb::<MidiEventTimed>::new(capacity);
    rb.split()
}

pub type MidiOutProducer = ringbuf::HeapProd<MidiEventTimed>;
pub type MidiOutConsumer = ringbuf::HeapCons<MidiEventTimed>;

/// Channel from the audio callback to the MIDI output drain thread
pub fn create_midi_out_channel(capacity: usize) -> (MidiOutProducer, MidiOutConsumer) {
    let rb = HeapRb::<MidiEventTimed>::new(capacity);
    rb.split()
}
