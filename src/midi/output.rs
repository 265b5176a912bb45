// MIDI Output - emission seam and midir port plumbing

use crate::messaging::channels::MidiOutProducer;
use crate::midi::event::MidiEventTimed;
use midir::{MidiOutput as MidirOutput, MidiOutputConnection};
use tracing::{info, warn};

/// Where the player delivers events.
///
/// The engine emits through this trait so playback is testable without
/// hardware: tests collect into a `Vec`, the demo host pushes into the
/// output ring, and the drain thread forwards to a midir connection.
pub trait MidiSink {
    fn send(&mut self, event: MidiEventTimed);
}

impl MidiSink for Vec<MidiEventTimed> {
    fn send(&mut self, event: MidiEventTimed) {
        self.push(event);
    }
}

/// Sink that pushes into the audio-to-output ring channel.
///
/// Lives for one callback; the overflow latch is owned by the callback
/// state so a saturated ring logs once, not once per block.
pub struct ChannelSink<'a> {
    pub producer: &'a mut MidiOutProducer,
    pub overflow_logged: &'a mut bool,
}

impl MidiSink for ChannelSink<'_> {
    fn send(&mut self, event: MidiEventTimed) {
        if ringbuf::traits::Producer::try_push(self.producer, event).is_err()
            && !*self.overflow_logged
        {
            warn!("MIDI output ring full, events dropped");
            *self.overflow_logged = true;
        }
    }
}

/// A midir output port, or a silent stub when none is available.
pub struct MidiOutput {
    connection: Option<MidiOutputConnection>,
}

impl MidiOutput {
    /// Connect to the first available MIDI output port.
    pub fn new() -> crate::Result<Self> {
        let midi_out = MidirOutput::new("midiloop output")
            .map_err(|e| crate::LooperError::Midi(e.to_string()))?;

        let ports = midi_out.ports();

        if ports.is_empty() {
            info!("no MIDI output port detected, playback will be silent");
            return Ok(Self { connection: None });
        }

        for (i, port) in ports.iter().enumerate() {
            if let Ok(name) = midi_out.port_name(port) {
                info!(index = i, port = %name, "MIDI output port");
            }
        }

        let port = &ports[0];
        let port_name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let connection = midi_out
            .connect(port, "midiloop-output")
            .map_err(|e| crate::LooperError::Midi(e.to_string()))?;

        info!(port = %port_name, "MIDI output connected");

        Ok(Self {
            connection: Some(connection),
        })
    }

    /// Encode and send one event immediately. The ring preserves block
    /// order; sub-block offsets are collapsed at this boundary.
    pub fn send(&mut self, event: MidiEventTimed) {
        if let Some(conn) = &mut self.connection {
            let mut buf = [0u8; 3];
            let len = event.event.to_bytes(&mut buf);
            if let Err(e) = conn.send(&buf[..len]) {
                warn!(error = %e, "MIDI send failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::event::MidiEvent;

    #[test]
    fn test_vec_sink_collects_in_order() {
        let mut sink: Vec<MidiEventTimed> = Vec::new();

        sink.send(MidiEventTimed {
            event: MidiEvent::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100,
            },
            samples_from_now: 0,
        });
        sink.send(MidiEventTimed {
            event: MidiEvent::NoteOff {
                channel: 0,
                note: 60,
                velocity: 0,
            },
            samples_from_now: 128,
        });

        assert_eq!(sink.len(), 2);
        assert!(sink[0].event.is_note_on());
        assert!(sink[1].event.is_note_off());
    }
}
