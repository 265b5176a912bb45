// MIDI channel-voice messages - parsing and encoding

/// A decoded MIDI channel-voice message
///
/// The channel nibble is preserved so a loop can carry material for
/// several instruments at once. Note On with velocity 0 is normalized
/// to Note Off at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    PolyAftertouch { channel: u8, note: u8, value: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelAftertouch { channel: u8, value: u8 },
    PitchBend { channel: u8, value: i16 },
}

/// MIDI event with sample-accurate timing
/// `samples_from_now` represents when this event should be processed
/// relative to the current audio callback's first sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEventTimed {
    pub event: MidiEvent,
    pub samples_from_now: u32,
}

impl MidiEvent {
    /// Parse a raw MIDI message
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }

        let status = bytes[0];
        let message_type = status & 0xF0;
        let channel = status & 0x0F;

        match message_type {
            0x90 => {
                // Note On
                if bytes.len() >= 3 {
                    let note = bytes[1];
                    let velocity = bytes[2];
                    // Velocity 0 = Note Off
                    if velocity == 0 {
                        Some(MidiEvent::NoteOff {
                            channel,
                            note,
                            velocity: 0,
                        })
                    } else {
                        Some(MidiEvent::NoteOn {
                            channel,
                            note,
                            velocity,
                        })
                    }
                } else {
                    None
                }
            }
            0x80 => {
                // Note Off
                if bytes.len() >= 3 {
                    Some(MidiEvent::NoteOff {
                        channel,
                        note: bytes[1],
                        velocity: bytes[2],
                    })
                } else {
                    None
                }
            }
            0xA0 => {
                // Polyphonic aftertouch
                if bytes.len() >= 3 {
                    Some(MidiEvent::PolyAftertouch {
                        channel,
                        note: bytes[1],
                        value: bytes[2],
                    })
                } else {
                    None
                }
            }
            0xB0 => {
                // Control Change
                if bytes.len() >= 3 {
                    Some(MidiEvent::ControlChange {
                        channel,
                        controller: bytes[1],
                        value: bytes[2],
                    })
                } else {
                    None
                }
            }
            0xC0 => {
                // Program Change (two-byte message)
                if bytes.len() >= 2 {
                    Some(MidiEvent::ProgramChange {
                        channel,
                        program: bytes[1],
                    })
                } else {
                    None
                }
            }
            0xD0 => {
                // Channel aftertouch (two-byte message)
                if bytes.len() >= 2 {
                    Some(MidiEvent::ChannelAftertouch {
                        channel,
                        value: bytes[1],
                    })
                } else {
                    None
                }
            }
            0xE0 => {
                // Pitch Bend
                if bytes.len() >= 3 {
                    let lsb = bytes[1] as i16;
                    let msb = bytes[2] as i16;
                    let value = (msb << 7) | lsb;
                    Some(MidiEvent::PitchBend { channel, value })
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Encode the message into raw bytes, returning the byte count (2 or 3)
    pub fn to_bytes(&self, out: &mut [u8; 3]) -> usize {
        match *self {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => {
                out[0] = 0x90 | (channel & 0x0F);
                out[1] = note & 0x7F;
                out[2] = velocity & 0x7F;
                3
            }
            MidiEvent::NoteOff {
                channel,
                note,
                velocity,
            } => {
                out[0] = 0x80 | (channel & 0x0F);
                out[1] = note & 0x7F;
                out[2] = velocity & 0x7F;
                3
            }
            MidiEvent::PolyAftertouch {
                channel,
                note,
                value,
            } => {
                out[0] = 0xA0 | (channel & 0x0F);
                out[1] = note & 0x7F;
                out[2] = value & 0x7F;
                3
            }
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => {
                out[0] = 0xB0 | (channel & 0x0F);
                out[1] = controller & 0x7F;
                out[2] = value & 0x7F;
                3
            }
            MidiEvent::ProgramChange { channel, program } => {
                out[0] = 0xC0 | (channel & 0x0F);
                out[1] = program & 0x7F;
                2
            }
            MidiEvent::ChannelAftertouch { channel, value } => {
                out[0] = 0xD0 | (channel & 0x0F);
                out[1] = value & 0x7F;
                2
            }
            MidiEvent::PitchBend { channel, value } => {
                out[0] = 0xE0 | (channel & 0x0F);
                out[1] = (value & 0x7F) as u8;
                out[2] = ((value >> 7) & 0x7F) as u8;
                3
            }
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::PolyAftertouch { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::ProgramChange { channel, .. }
            | MidiEvent::ChannelAftertouch { channel, .. }
            | MidiEvent::PitchBend { channel, .. } => channel,
        }
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self, MidiEvent::NoteOn { .. })
    }

    pub fn is_note_off(&self) -> bool {
        matches!(self, MidiEvent::NoteOff { .. })
    }
}
