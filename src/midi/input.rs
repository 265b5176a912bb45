// MIDI Input - receiving events from a midir port

use crate::messaging::channels::MidiInProducer;
use crate::midi::event::{MidiEvent, MidiEventTimed};
use midir::{MidiInput as MidirInput, MidiInputConnection};
use tracing::{info, warn};

pub struct MidiInput {
    _connection: Option<MidiInputConnection<()>>,
}

impl MidiInput {
    /// Connect to the first available MIDI input port and forward parsed
    /// events into the ring channel. Running without a port is fine; the
    /// looper just has nothing to record.
    pub fn new(mut midi_tx: MidiInProducer) -> crate::Result<Self> {
        let midi_in = MidirInput::new("midiloop input")
            .map_err(|e| crate::LooperError::Midi(e.to_string()))?;

        let ports = midi_in.ports();

        if ports.is_empty() {
            info!("no MIDI input port detected, running without input");
            return Ok(Self { _connection: None });
        }

        for (i, port) in ports.iter().enumerate() {
            if let Ok(name) = midi_in.port_name(port) {
                info!(index = i, port = %name, "MIDI input port");
            }
        }

        // Use the first available port
        let port = &ports[0];
        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let connection = midi_in
            .connect(
                port,
                "midiloop-input",
                move |_timestamp, message, _| {
                    // MIDI callback - runs on the midir thread
                    if let Some(midi_event) = MidiEvent::from_bytes(message) {
                        // Events are stamped for the start of the next block;
                        // the track driver splits blocks on its own clock.
                        let timed_event = MidiEventTimed {
                            event: midi_event,
                            samples_from_now: 0,
                        };

                        // try_push does not block
                        if ringbuf::traits::Producer::try_push(&mut midi_tx, timed_event).is_err()
                        {
                            warn!("MIDI input ring full, event dropped");
                        }
                    }
                },
                (),
            )
            .map_err(|e| crate::LooperError::Midi(e.to_string()))?;

        info!(port = %port_name, "MIDI input connected");

        Ok(Self {
            _connection: Some(connection),
        })
    }
}
