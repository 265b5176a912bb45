// Player - streams a committed layer to a MIDI sink

use crate::looper::event::LoopEvent;
use crate::looper::harvester::{Harvester, PlayCursor};
use crate::looper::layer::Layer;
use crate::looper::pools::LooperPools;
use crate::midi::event::{MidiEvent, MidiEventTimed};
use crate::midi::output::MidiSink;
use std::sync::Arc;
use tracing::warn;

/// One sounding note the player owes an off for. `remaining` counts
/// frames from the current block start until the off is due; the end
/// sweep of each `play` call re-bases it for the next block.
#[derive(Debug, Clone, Copy)]
struct OnNote {
    channel: u8,
    note: u8,
    remaining: u64,
}

/// Plays back committed layers by harvesting them block by block and
/// turning the note events back into paired on/off messages.
///
/// Swapping the layer is soft: notes already sounding keep their off
/// schedule, so a commit at the loop point never cuts a tail short.
pub struct Player {
    pools: Arc<LooperPools>,
    harvester: Harvester,
    layer: Option<Arc<Layer>>,
    frame: u64,
    cursor: PlayCursor,
    on_notes: Vec<OnNote>,
    overflow_logged: bool,
}

impl Player {
    pub fn new(pools: Arc<LooperPools>, config: &crate::config::LooperConfig) -> Self {
        let harvester = Harvester::new(Arc::clone(&pools), config.prefix_block_frames);
        Self {
            pools,
            harvester,
            layer: None,
            frame: 0,
            cursor: PlayCursor::new(),
            on_notes: Vec::with_capacity(config.on_note_capacity.max(1)),
            overflow_logged: false,
        }
    }

    /// Install a layer without interrupting sounding notes. The cursor
    /// is invalidated; the next harvest re-seeks.
    pub fn set_layer(&mut self, layer: Arc<Layer>, frame: u64) {
        let frames = layer.frames();
        self.frame = if frames > 0 { frame % frames } else { 0 };
        self.layer = Some(layer);
        self.cursor.invalidate();
    }

    pub fn layer(&self) -> Option<&Arc<Layer>> {
        self.layer.as_ref()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn frames(&self) -> u64 {
        self.layer.as_ref().map_or(0, |l| l.frames())
    }

    /// Number of notes currently sounding.
    pub fn sounding(&self) -> usize {
        self.on_notes.len()
    }

    /// Process `span` frames of playback into `sink`. The span is split
    /// at the loop end, so callers may pass whole blocks; wrapping is
    /// handled here.
    pub fn play(&mut self, span: u64, sink: &mut dyn MidiSink) {
        if span == 0 {
            return;
        }
        if let Some(layer) = self.layer.clone() {
            let frames = layer.frames();
            if frames > 0 {
                let mut base = 0u64;
                let mut left = span;
                while left > 0 {
                    let chunk = left.min(frames - self.frame);
                    let start = self.frame;
                    self.harvester
                        .harvest_play(&layer, start, start + chunk, &mut self.cursor);

                    // Merge the note and event lanes back into frame order
                    let mut ni = 0;
                    let mut ei = 0;
                    loop {
                        let note = self.harvester.notes().get(ni).copied();
                        let other = self.harvester.events().get(ei).copied();
                        match (note, other) {
                            (None, None) => break,
                            (Some(n), o) if o.is_none_or(|o| n.frame <= o.frame) => {
                                ni += 1;
                                let at = base + (n.frame - start);
                                self.strike(n, at, span, sink);
                            }
                            (_, Some(o)) => {
                                ei += 1;
                                let at = base + (o.frame - start);
                                sink.send(MidiEventTimed {
                                    event: o.message,
                                    samples_from_now: at as u32,
                                });
                            }
                            (_, None) => break,
                        }
                    }

                    self.frame = (start + chunk) % frames;
                    base += chunk;
                    left -= chunk;
                }
            }
        }

        // Close everything due inside this block, after its note-ons so
        // the sink sees messages in playing order
        let mut i = 0;
        while i < self.on_notes.len() {
            if self.on_notes[i].remaining < span {
                let done = self.on_notes.swap_remove(i);
                sink.send(MidiEventTimed {
                    event: MidiEvent::NoteOff {
                        channel: done.channel,
                        note: done.note,
                        velocity: 0,
                    },
                    samples_from_now: done.remaining as u32,
                });
            } else {
                self.on_notes[i].remaining -= span;
                i += 1;
            }
        }
    }

    /// Emit one harvested note at block offset `at` and register its
    /// off. A note already sounding on the same channel and key is
    /// closed first.
    fn strike(&mut self, event: LoopEvent, at: u64, span: u64, sink: &mut dyn MidiSink) {
        let MidiEvent::NoteOn {
            channel,
            note,
            velocity,
        } = event.message
        else {
            return;
        };
        if let Some(i) = self
            .on_notes
            .iter()
            .position(|n| n.channel == channel && n.note == note)
        {
            sink.send(MidiEventTimed {
                event: MidiEvent::NoteOff {
                    channel,
                    note,
                    velocity: 0,
                },
                samples_from_now: at as u32,
            });
            self.on_notes.swap_remove(i);
        }
        sink.send(MidiEventTimed {
            event: MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            },
            samples_from_now: at as u32,
        });
        let due = at + event.duration;
        if self.on_notes.len() < self.on_notes.capacity() {
            self.on_notes.push(OnNote {
                channel,
                note,
                remaining: due,
            });
        } else {
            if !self.overflow_logged {
                warn!(
                    capacity = self.on_notes.capacity(),
                    "note tracker full, truncating note"
                );
                self.overflow_logged = true;
            }
            sink.send(MidiEventTimed {
                event: MidiEvent::NoteOff {
                    channel,
                    note,
                    velocity: 0,
                },
                samples_from_now: due.min(span.saturating_sub(1)) as u32,
            });
        }
    }

    /// Close every sounding note immediately.
    pub fn all_notes_off(&mut self, sink: &mut dyn MidiSink) {
        for done in self.on_notes.drain(..) {
            sink.send(MidiEventTimed {
                event: MidiEvent::NoteOff {
                    channel: done.channel,
                    note: done.note,
                    velocity: 0,
                },
                samples_from_now: 0,
            });
        }
    }

    /// Jump to `frame`: silence everything, then re-strike whatever the
    /// layer has sounding there so the texture is right before normal
    /// playback resumes.
    pub fn resume_at(&mut self, frame: u64, sink: &mut dyn MidiSink) {
        self.all_notes_off(sink);
        let Some(layer) = self.layer.clone() else {
            self.frame = 0;
            return;
        };
        let frames = layer.frames();
        let frame = if frames > 0 { frame % frames } else { 0 };
        self.frame = frame;
        self.cursor.invalidate();

        let fragment = self.harvester.harvest_checkpoint(&layer, frame);
        for event in fragment.events() {
            if let MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } = event.message
            {
                if self.on_notes.len() < self.on_notes.capacity() {
                    sink.send(MidiEventTimed {
                        event: MidiEvent::NoteOn {
                            channel,
                            note,
                            velocity,
                        },
                        samples_from_now: 0,
                    });
                    self.on_notes.push(OnNote {
                        channel,
                        note,
                        remaining: event.duration,
                    });
                } else if !self.overflow_logged {
                    warn!(
                        capacity = self.on_notes.capacity(),
                        "note tracker full, skipping restrike"
                    );
                    self.overflow_logged = true;
                }
            }
        }
        self.pools.checkin_sequence(fragment.into_sequence());
    }

    /// Drop the layer and silence everything.
    pub fn reset(&mut self, sink: &mut dyn MidiSink) {
        self.all_notes_off(sink);
        self.layer = None;
        self.frame = 0;
        self.cursor.invalidate();
        self.harvester.reset();
        self.overflow_logged = false;
    }
}
