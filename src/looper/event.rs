// Loop events - timed MIDI messages inside a layer

use crate::midi::event::MidiEvent;

/// One recorded MIDI message positioned on a loop timeline.
///
/// Notes are stored as a single event: a `NoteOn` message plus a
/// duration in frames. Other channel-voice messages occupy an instant
/// and carry duration 0. `remaining` is a working value for decay-based
/// harvests and is 0 on anything stored in a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopEvent {
    pub frame: u64,
    pub duration: u64,
    pub remaining: u64,
    pub message: MidiEvent,
}

impl LoopEvent {
    /// A note event. Durations are floored at one frame; a zero-length
    /// note would be unplayable.
    pub fn note(frame: u64, channel: u8, note: u8, velocity: u8, duration: u64) -> Self {
        Self {
            frame,
            duration: duration.max(1),
            remaining: 0,
            message: MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            },
        }
    }

    /// A non-note message (CC, pitch bend, aftertouch, program change).
    pub fn from_message(frame: u64, message: MidiEvent) -> Self {
        Self {
            frame,
            duration: 0,
            remaining: 0,
            message,
        }
    }

    pub fn is_note(&self) -> bool {
        self.message.is_note_on()
    }

    /// One past the last sounding frame.
    pub fn end_frame(&self) -> u64 {
        self.frame + self.duration
    }

    /// Last frame the event occupies. Equals `frame` for instant events.
    pub fn last_frame(&self) -> u64 {
        self.frame + self.duration.saturating_sub(1)
    }

    /// True when a note is still sounding after `last`, i.e. it crosses
    /// out of a window whose final frame is `last`.
    pub fn sounds_past(&self, last: u64) -> bool {
        self.is_note() && self.end_frame() > last + 1
    }

    pub fn note_number(&self) -> Option<u8> {
        match self.message {
            MidiEvent::NoteOn { note, .. } => Some(note),
            _ => None,
        }
    }

    pub fn channel(&self) -> u8 {
        self.message.channel()
    }
}
