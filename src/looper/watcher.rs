// Note watcher - open notes between Note On and Note Off

use crate::looper::event::LoopEvent;
use crate::looper::sequence::Sequence;
use tracing::warn;

/// A note that has sounded its Note On but not yet its Note Off.
#[derive(Debug, Clone, Copy)]
pub struct HeldNote {
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    /// Loop-relative frame where the note began
    pub frame: u64,
    /// Absolute stream frame at the Note On, for duration math
    pub started: u64,
}

/// Fixed-capacity tracker pairing Note Ons with their eventual Note
/// Offs. Notes can stay pending across overdub commits; the layer only
/// receives the event once the duration is known.
///
/// At capacity the watcher stops tracking new notes and logs once; a
/// note it never tracked simply produces no loop event.
#[derive(Debug)]
pub struct NoteWatcher {
    held: Vec<HeldNote>,
    capacity: usize,
    overflow_logged: bool,
}

impl NoteWatcher {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            held: Vec::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            overflow_logged: false,
        }
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn held(&self) -> &[HeldNote] {
        &self.held
    }

    pub fn clear(&mut self) {
        self.held.clear();
        self.overflow_logged = false;
    }

    /// Track a Note On. A second On for a pitch already held is a
    /// retrigger: the open instance is finalized up to `now` and
    /// returned so the caller can record it, and tracking restarts.
    pub fn on(
        &mut self,
        channel: u8,
        note: u8,
        velocity: u8,
        frame: u64,
        now: u64,
    ) -> Option<LoopEvent> {
        if let Some(at) = self.find(channel, note) {
            let prev = self.held[at];
            self.held[at] = HeldNote {
                channel,
                note,
                velocity,
                frame,
                started: now,
            };
            return Some(LoopEvent::note(
                prev.frame,
                prev.channel,
                prev.note,
                prev.velocity,
                (now - prev.started).max(1),
            ));
        }

        if self.held.len() == self.capacity {
            if !self.overflow_logged {
                warn!(capacity = self.capacity, "note watcher full, note untracked");
                self.overflow_logged = true;
            }
            return None;
        }

        self.held.push(HeldNote {
            channel,
            note,
            velocity,
            frame,
            started: now,
        });
        None
    }

    /// Close a held note, producing the finished loop event. A Note Off
    /// with no matching On (recording started mid-hold) returns None.
    pub fn off(&mut self, channel: u8, note: u8, now: u64) -> Option<LoopEvent> {
        let at = self.find(channel, note)?;
        let held = self.held.swap_remove(at);
        Some(LoopEvent::note(
            held.frame,
            held.channel,
            held.note,
            held.velocity,
            (now - held.started).max(1),
        ))
    }

    /// Force-close everything, e.g. when a non-overdub commit freezes
    /// the layer. Durations are at least the elapsed frames and at
    /// least `min_duration`.
    pub fn finalize_into(&mut self, now: u64, min_duration: u64, out: &mut Sequence) {
        for held in self.held.drain(..) {
            let elapsed = now - held.started;
            out.insert(LoopEvent::note(
                held.frame,
                held.channel,
                held.note,
                held.velocity,
                elapsed.max(min_duration).max(1),
            ));
        }
        self.overflow_logged = false;
    }

    /// Commit-multiply support: keep notes whose start lies inside the
    /// retained region `[cut_start, cut_end)`, re-basing their frames,
    /// and force-close the rest into `out` at their old frames (the
    /// caller cuts the sequence afterwards). With `keep_inside` false
    /// everything is closed.
    pub fn retain_remap(
        &mut self,
        cut_start: u64,
        cut_end: u64,
        keep_inside: bool,
        now: u64,
        min_duration: u64,
        out: &mut Sequence,
    ) {
        let mut index = 0;
        while index < self.held.len() {
            let held = self.held[index];
            let inside = held.frame >= cut_start && held.frame < cut_end;
            if keep_inside && inside {
                self.held[index].frame = held.frame - cut_start;
                index += 1;
            } else {
                let elapsed = now - held.started;
                out.insert(LoopEvent::note(
                    held.frame,
                    held.channel,
                    held.note,
                    held.velocity,
                    elapsed.max(min_duration).max(1),
                ));
                self.held.swap_remove(index);
            }
        }
    }

    fn find(&self, channel: u8, note: u8) -> Option<usize> {
        self.held
            .iter()
            .position(|h| h.channel == channel && h.note == note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_off_builds_note() {
        let mut watcher = NoteWatcher::with_capacity(8);

        assert!(watcher.on(0, 60, 100, 480, 480).is_none());
        let event = watcher.off(0, 60, 920).unwrap();

        assert_eq!(event.frame, 480);
        assert_eq!(event.duration, 440);
        assert_eq!(event.note_number(), Some(60));
        assert!(watcher.is_empty());
    }

    #[test]
    fn test_channels_are_distinct() {
        let mut watcher = NoteWatcher::with_capacity(8);

        watcher.on(0, 60, 100, 0, 0);
        watcher.on(1, 60, 90, 10, 10);

        let event = watcher.off(1, 60, 110).unwrap();
        assert_eq!(event.channel(), 1);
        assert_eq!(watcher.len(), 1);
    }

    #[test]
    fn test_orphan_off_ignored() {
        let mut watcher = NoteWatcher::with_capacity(8);
        assert!(watcher.off(0, 60, 100).is_none());
    }

    #[test]
    fn test_retrigger_finalizes_previous() {
        let mut watcher = NoteWatcher::with_capacity(8);

        watcher.on(0, 60, 100, 0, 0);
        let finished = watcher.on(0, 60, 110, 500, 500).unwrap();

        assert_eq!(finished.frame, 0);
        assert_eq!(finished.duration, 500);
        assert_eq!(watcher.len(), 1);

        // The new instance runs from the retrigger point
        let second = watcher.off(0, 60, 800).unwrap();
        assert_eq!(second.frame, 500);
        assert_eq!(second.duration, 300);
    }

    #[test]
    fn test_capacity_overflow_stops_tracking() {
        let mut watcher = NoteWatcher::with_capacity(2);

        watcher.on(0, 60, 100, 0, 0);
        watcher.on(0, 61, 100, 0, 0);
        assert!(watcher.on(0, 62, 100, 0, 0).is_none());

        assert_eq!(watcher.len(), 2);
        // The untracked note's off finds nothing
        assert!(watcher.off(0, 62, 100).is_none());
    }

    #[test]
    fn test_finalize_applies_minimum() {
        let mut watcher = NoteWatcher::with_capacity(8);
        let mut out = Sequence::new();

        watcher.on(0, 60, 100, 0, 0);
        watcher.on(0, 62, 100, 900, 900);

        // First note has 1000 elapsed frames, second only 100
        watcher.finalize_into(1000, 512, &mut out);

        assert!(watcher.is_empty());
        assert_eq!(out.len(), 2);
        let first = out.events()[0];
        let second = out.events()[1];
        assert_eq!(first.duration, 1000);
        assert_eq!(second.duration, 512); // floored at one block
    }

    #[test]
    fn test_retain_remap_splits_by_region() {
        let mut watcher = NoteWatcher::with_capacity(8);
        let mut out = Sequence::new();

        watcher.on(0, 60, 100, 100, 100); // before the region
        watcher.on(0, 62, 100, 1200, 1200); // inside the region

        watcher.retain_remap(1000, 2000, true, 1500, 256, &mut out);

        assert_eq!(watcher.len(), 1);
        assert_eq!(watcher.held()[0].note, 62);
        assert_eq!(watcher.held()[0].frame, 200); // 1200 - 1000

        assert_eq!(out.len(), 1);
        assert_eq!(out.events()[0].frame, 100); // old coordinates
        assert_eq!(out.events()[0].duration, 1400);
    }
}
