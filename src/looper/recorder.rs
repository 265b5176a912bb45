// Recorder - transactional capture into a working layer

use crate::config::LooperConfig;
use crate::looper::event::LoopEvent;
use crate::looper::harvester::Harvester;
use crate::looper::layer::Layer;
use crate::looper::pools::LooperPools;
use crate::looper::segment::Segment;
use crate::looper::sequence::Sequence;
use crate::looper::watcher::NoteWatcher;
use crate::midi::event::MidiEvent;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Owns the working layer a pass records into.
///
/// After the initial recording every transaction starts as a fresh
/// layer holding one full-width segment over the committed backing, so
/// an empty pass plays back exactly what came before. Edits accumulate
/// in the working layer until `commit` freezes it behind an `Arc` and
/// it becomes the next backing.
///
/// Note-offs are always routed through the watcher, even when capture
/// is off, so a note held across a recording toggle still closes
/// properly. A note held across an overdub commit stays in the watcher
/// and completes into the next transaction; a commit that ends capture
/// closes it into the frozen layer instead.
pub struct Recorder {
    pools: Arc<LooperPools>,
    harvester: Harvester,
    watcher: NoteWatcher,
    record: Layer,
    backing: Option<Arc<Layer>>,
    /// Absolute frames advanced since `begin`, never wraps.
    stream_frame: u64,
    /// Position inside the working layer.
    record_frame: u64,
    last_block: u64,
    recording: bool,
    extending: bool,
    multiply: bool,
    insert: bool,
    replace: bool,
    mode_start: u64,
    has_edits: bool,
}

impl Recorder {
    pub fn new(pools: Arc<LooperPools>, config: &LooperConfig) -> Self {
        let harvester = Harvester::new(Arc::clone(&pools), config.prefix_block_frames);
        let watcher = NoteWatcher::with_capacity(config.held_note_capacity);
        Self {
            pools,
            harvester,
            watcher,
            record: Layer::default(),
            backing: None,
            stream_frame: 0,
            record_frame: 0,
            last_block: 0,
            recording: false,
            extending: false,
            multiply: false,
            insert: false,
            replace: false,
            mode_start: 0,
            has_edits: false,
        }
    }

    /// Start the initial recording. The loop length is open until the
    /// first commit fixes it.
    pub fn begin(&mut self) {
        let events = Sequence::with_buffer(self.pools.checkout_events());
        let segments = self.pools.checkout_segments();
        let fresh = Layer::with_storage(0, 1, events, segments);
        let old = std::mem::replace(&mut self.record, fresh);
        self.reclaim_working(old);
        self.backing = None;
        self.watcher.clear();
        self.stream_frame = 0;
        self.record_frame = 0;
        self.last_block = 0;
        self.recording = true;
        self.extending = true;
        self.multiply = false;
        self.insert = false;
        self.replace = false;
        self.has_edits = false;
        debug!("recording started");
    }

    /// Re-anchor on a committed layer at `frame`, discarding whatever
    /// the working layer held. Used when undo swaps the backing out
    /// from under a pass.
    pub fn resume(&mut self, backing: Arc<Layer>, frame: u64) {
        self.watcher.clear();
        self.multiply = false;
        self.insert = false;
        self.replace = false;
        self.extending = false;
        self.recording = false;
        self.has_edits = false;
        self.record_frame = frame;
        self.install_backing(backing);
        debug!(frame = self.record_frame, "resumed over committed layer");
    }

    /// Advance the position by one processed block. While extending the
    /// working layer grows; otherwise the position wraps at the loop
    /// end.
    pub fn advance(&mut self, block: u64) {
        if block == 0 {
            return;
        }
        self.stream_frame += block;
        self.last_block = block;
        if self.extending {
            self.record_frame += block;
            if self.multiply {
                while self.record_frame > self.record.frames() {
                    if !self.extend_cycle() {
                        break;
                    }
                }
            } else {
                self.record.set_frames(self.record_frame);
            }
        } else {
            let frames = self.record.frames();
            if frames > 0 {
                self.record_frame = (self.record_frame + block) % frames;
            }
        }
    }

    /// Capture one incoming message at `offset` frames into the current
    /// block. Note-ons and other messages are gated by the recording
    /// flag; note-offs always reach the watcher so held notes close.
    pub fn add(&mut self, message: MidiEvent, offset: u64) {
        let frame = self.record_frame + offset;
        let now = self.stream_frame + offset;
        match message {
            MidiEvent::NoteOff { channel, note, .. } => {
                if let Some(finished) = self.watcher.off(channel, note, now) {
                    self.record.events_mut().insert(finished);
                    self.has_edits = true;
                }
            }
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => {
                if self.recording {
                    if let Some(retriggered) = self.watcher.on(channel, note, velocity, frame, now)
                    {
                        self.record.events_mut().insert(retriggered);
                    }
                    self.has_edits = true;
                }
            }
            other => {
                if self.recording {
                    self.record
                        .events_mut()
                        .insert(LoopEvent::from_message(frame, other));
                    self.has_edits = true;
                }
            }
        }
    }

    /// Begin a multiply: the loop extends by whole backing cycles as
    /// the position crosses the end, until the matching commit cuts the
    /// multiplied span out.
    pub fn start_multiply(&mut self) {
        self.start_extension(false);
    }

    /// Insert behaves like multiply on the timeline level: cycles are
    /// appended and the span is cut at the end. The flag only changes
    /// what the mode reports.
    pub fn start_insert(&mut self) {
        self.start_extension(true);
    }

    fn start_extension(&mut self, insert: bool) {
        let mode = if insert { "insert" } else { "multiply" };
        if self.backing.is_none() {
            warn!(mode, "extension requested without a committed loop");
            return;
        }
        if self.extending || self.replace {
            warn!(mode, "extension requested during another edit");
            return;
        }
        self.multiply = true;
        self.insert = insert;
        self.extending = true;
        self.mode_start = self.record_frame;
        self.recording = true;
        self.has_edits = true;
        debug!(mode, at = self.mode_start, "extension started");
    }

    /// Begin overwriting the backing from the current position.
    pub fn start_replace(&mut self) {
        if self.backing.is_none() {
            warn!("replace requested without a committed loop");
            return;
        }
        if self.extending || self.replace {
            warn!("replace requested during another edit");
            return;
        }
        self.replace = true;
        self.mode_start = self.record_frame;
        self.recording = true;
        self.has_edits = true;
        debug!(at = self.mode_start, "replace started");
    }

    /// Close the replace region and carve the hole out of the backing
    /// segment. A region that wrapped the loop point is left as a plain
    /// overdub.
    pub fn end_replace(&mut self) {
        if !self.replace {
            warn!("replace end without a start");
            return;
        }
        self.replace = false;
        let start = self.mode_start;
        let end = self.record_frame;
        if end <= start {
            warn!(start, end, "replace wrapped the loop point, keeping capture as overdub");
            return;
        }
        self.carve_hole(start, end);
        debug!(start, end, "replace region carved");
    }

    /// Freeze the working layer and make it the new backing. `overdub`
    /// decides whether capture stays on for the next pass; when it
    /// does not, notes still held are closed into the layer first.
    pub fn commit(&mut self, overdub: bool) -> Arc<Layer> {
        if self.replace {
            warn!("replace still open at the loop point, ending it");
            self.end_replace();
        }
        if self.multiply {
            return self.commit_multiply(overdub, false);
        }
        if !overdub && !self.watcher.is_empty() {
            // Capture ends with this commit, so open notes cannot
            // complete in a later transaction
            self.watcher.finalize_into(
                self.stream_frame,
                self.last_block.max(1),
                self.record.events_mut(),
            );
        }
        if self.backing.is_none() {
            // Initial recording: this commit fixes the loop length
            if self.record_frame == 0 {
                warn!("committing an empty recording");
            }
            self.record.set_frames(self.record_frame.max(1));
            self.record.set_cycles(1);
        }
        let frozen = Arc::new(std::mem::replace(&mut self.record, Layer::default()));
        debug!(
            layer = frozen.number(),
            frames = frozen.frames(),
            cycles = frozen.cycles(),
            events = frozen.events().len(),
            segments = frozen.segments().len(),
            "layer committed"
        );
        self.install_backing(Arc::clone(&frozen));
        self.recording = overdub;
        self.extending = false;
        self.has_edits = false;
        frozen
    }

    /// End a multiply or insert: cut the multiplied span out of the
    /// working layer, re-base everything onto it and commit the result.
    ///
    /// Rounded commits span whole cycles, from the cycle boundary at or
    /// before the start point to the one at or after the current
    /// position; ending mid-loop truncates to the cycles covered.
    /// Unrounded commits take exactly `[mode_start, position)` and the
    /// result becomes a single-cycle loop.
    pub fn commit_multiply(&mut self, overdub: bool, unrounded: bool) -> Arc<Layer> {
        if !self.multiply {
            warn!("multiply commit without an open multiply");
            return self.commit(overdub);
        }
        let cycle = self.record.cycle_frames().max(1);
        let (cut_start, cut_end) = if unrounded {
            (self.mode_start, self.record_frame.max(self.mode_start + 1))
        } else {
            let start = (self.mode_start / cycle) * cycle;
            let end = self.record_frame.max(self.mode_start + 1);
            (start, start + (end - start).div_ceil(cycle).max(1) * cycle)
        };
        debug!(cut_start, cut_end, unrounded, "committing multiplied span");

        // Held notes that started inside the span are re-based and stay
        // held; the rest are forced closed at their old frames so the
        // event cut below can clip them.
        self.watcher.retain_remap(
            cut_start,
            cut_end,
            true,
            self.stream_frame,
            self.last_block,
            self.record.events_mut(),
        );

        // Maximal continuous spans of the old segment list, clipped to
        // the cut region
        struct Span {
            layer: Arc<Layer>,
            origin: u64,
            reference: u64,
            frames: u64,
        }
        let mut plans: Vec<Span> = Vec::new();
        for seg in self.record.segments() {
            let lo = seg.origin_frame.max(cut_start);
            let hi = seg.end_frame().min(cut_end);
            if lo >= hi {
                continue;
            }
            let reference = seg.reference_frame + (lo - seg.origin_frame);
            let frames = hi - lo;
            if let Some(last) = plans.last_mut() {
                if Arc::ptr_eq(&last.layer, &seg.layer)
                    && last.origin + last.frames == lo
                    && last.reference + last.frames == reference
                {
                    last.frames += frames;
                    continue;
                }
            }
            plans.push(Span {
                layer: Arc::clone(&seg.layer),
                origin: lo,
                reference,
                frames,
            });
        }

        // Prefixes are computed against the old structure, before the
        // cut destroys it
        let mut prefixes: Vec<Sequence> = Vec::with_capacity(plans.len());
        let mut region_start = 0;
        for plan in &plans {
            prefixes.push(
                self.harvester
                    .harvest_prefix_span(&self.record, region_start, plan.origin),
            );
            region_start = plan.origin;
        }

        let mut old_segments = self.record.take_segments();
        for seg in old_segments.drain(..) {
            self.pools.checkin_sequence(seg.prefix);
        }
        self.pools.checkin_segments(old_segments);

        let mut new_segments = self.pools.checkout_segments();
        for (plan, prefix) in plans.into_iter().zip(prefixes) {
            let mut segment =
                Segment::new(plan.layer, plan.origin - cut_start, plan.reference, plan.frames);
            segment.prefix = prefix;
            new_segments.push(segment);
        }
        self.record.put_segments(new_segments);

        self.record.events_mut().cut(cut_start, cut_end - 1, true);

        let frames = cut_end - cut_start;
        let cycles = if unrounded {
            1
        } else {
            if frames % cycle != 0 {
                warn!(frames, cycle, "multiplied span not cycle aligned, rounding cycle count");
            }
            (frames / cycle).max(1) as u32
        };
        self.record.set_frames(frames);
        self.record.set_cycles(cycles);
        self.record_frame = self.record_frame.saturating_sub(cut_start) % frames;

        self.multiply = false;
        self.insert = false;
        self.extending = false;
        self.commit(overdub)
    }

    /// Throw the working layer away and re-anchor on the backing. With
    /// no backing this cancels the initial recording.
    pub fn rollback(&mut self, overdub: bool) {
        self.watcher.clear();
        self.multiply = false;
        self.insert = false;
        self.replace = false;
        self.extending = false;
        self.has_edits = false;
        match self.backing.clone() {
            Some(backing) => {
                self.install_backing(backing);
                self.recording = overdub;
                debug!("rolled back to committed layer");
            }
            None => {
                let old = std::mem::replace(&mut self.record, Layer::default());
                self.reclaim_working(old);
                self.record_frame = 0;
                self.recording = false;
                debug!("rolled back initial recording");
            }
        }
    }

    /// Back to the empty state. The backing reference is dropped here;
    /// reclaiming the committed layer chain is the owner's business.
    pub fn reset(&mut self) {
        let old = std::mem::replace(&mut self.record, Layer::default());
        self.reclaim_working(old);
        self.backing = None;
        self.watcher.clear();
        self.stream_frame = 0;
        self.record_frame = 0;
        self.last_block = 0;
        self.recording = false;
        self.extending = false;
        self.multiply = false;
        self.insert = false;
        self.replace = false;
        self.has_edits = false;
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    /// Reposition the record frame, wrapping into the loop. Extension
    /// math needs a monotonic frame, so mid-extension moves are refused.
    pub fn set_frame(&mut self, frame: u64) {
        if self.extending || self.replace {
            warn!(frame, "reposition refused during an open edit");
            return;
        }
        let frames = self.record.frames();
        self.record_frame = if frames > 0 { frame % frames } else { frame };
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_extending(&self) -> bool {
        self.extending
    }

    pub fn multiply_active(&self) -> bool {
        self.multiply
    }

    pub fn insert_active(&self) -> bool {
        self.multiply && self.insert
    }

    pub fn replace_active(&self) -> bool {
        self.replace
    }

    pub fn has_changes(&self) -> bool {
        self.has_edits
    }

    pub fn frames(&self) -> u64 {
        self.record.frames()
    }

    pub fn frame(&self) -> u64 {
        self.record_frame
    }

    pub fn cycles(&self) -> u32 {
        self.record.cycles()
    }

    pub fn cycle_frames(&self) -> u64 {
        self.record.cycle_frames()
    }

    pub fn backing(&self) -> Option<&Arc<Layer>> {
        self.backing.as_ref()
    }

    pub fn record_layer(&self) -> &Layer {
        &self.record
    }

    pub fn held_count(&self) -> usize {
        self.watcher.len()
    }

    /// Append one backing cycle to the extension. Which cycle gets
    /// referenced walks round-robin over the backing.
    fn extend_cycle(&mut self) -> bool {
        let Some(backing) = self.backing.clone() else {
            return false;
        };
        let cycle = self.record.cycle_frames();
        if cycle == 0 {
            return false;
        }
        let origin = self.record.frames();
        let backing_cycles = u64::from(backing.cycles().max(1));
        let ref_cycle = (origin / cycle) % backing_cycles;
        let reference = ref_cycle * cycle;
        let mut segment = Segment::new(Arc::clone(&backing), origin, reference, cycle);
        let needs_prefix = match self.record.segments().last() {
            Some(prev) => !segment.continuous_with(prev),
            None => true,
        };
        if needs_prefix {
            let region_start = self.record.segments().last().map_or(0, |s| s.origin_frame);
            segment.prefix = self
                .harvester
                .harvest_prefix_span(&self.record, region_start, origin);
        }
        trace!(origin, reference, cycle, "extending with backing cycle");
        self.record.add_segment(segment);
        let cycles = self.record.cycles() + 1;
        self.record.set_frames(origin + cycle);
        self.record.set_cycles(cycles);
        true
    }

    /// Split the segment containing `[start, end)` around the hole. The
    /// right part keeps its original alignment and an empty prefix:
    /// backing notes crossing the hole were replaced, and the
    /// performance's own notes sustain in the event lane.
    fn carve_hole(&mut self, start: u64, end: u64) {
        let mut segments = self.record.take_segments();
        let Some(index) = segments.iter().position(|s| s.contains(start)) else {
            debug!(start, end, "replace region has no backing segment");
            self.record.put_segments(segments);
            return;
        };
        if !segments[index].contains(end - 1) {
            warn!(start, end, "replace region spans segments, keeping capture as overdub");
            self.record.put_segments(segments);
            return;
        }
        let Segment {
            layer,
            origin_frame,
            reference_frame,
            frames,
            prefix,
        } = segments.remove(index);
        let left_frames = start - origin_frame;
        let right_frames = (origin_frame + frames) - end;
        let mut at = index;
        if left_frames > 0 {
            let mut left = Segment::new(
                Arc::clone(&layer),
                origin_frame,
                reference_frame,
                left_frames,
            );
            left.prefix = prefix;
            segments.insert(at, left);
            at += 1;
        } else {
            self.pools.checkin_sequence(prefix);
        }
        if right_frames > 0 {
            let right = Segment::new(
                layer,
                end,
                reference_frame + (end - origin_frame),
                right_frames,
            );
            segments.insert(at, right);
        }
        self.record.put_segments(segments);
    }

    /// Fresh working layer: a single pass-through window over `backing`.
    fn install_backing(&mut self, backing: Arc<Layer>) {
        let frames = backing.frames();
        let cycles = backing.cycles();
        let events = Sequence::with_buffer(self.pools.checkout_events());
        let mut segments = self.pools.checkout_segments();
        segments.push(Segment::full(Arc::clone(&backing)));
        let fresh = Layer::with_storage(frames, cycles, events, segments);
        let old = std::mem::replace(&mut self.record, fresh);
        self.reclaim_working(old);
        if frames > 0 {
            self.record_frame %= frames;
        } else {
            self.record_frame = 0;
        }
        self.backing = Some(backing);
    }

    fn reclaim_working(&self, layer: Layer) {
        let (events, mut segments) = layer.into_parts();
        self.pools.checkin_sequence(events);
        for segment in segments.drain(..) {
            self.pools.checkin_sequence(segment.prefix);
        }
        self.pools.checkin_segments(segments);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::looper::harvester::PlayCursor;

    fn recorder() -> Recorder {
        let config = LooperConfig::default();
        let pools = Arc::new(LooperPools::new(&config));
        Recorder::new(pools, &config)
    }

    fn on(note: u8) -> MidiEvent {
        MidiEvent::NoteOn {
            channel: 0,
            note,
            velocity: 100,
        }
    }

    fn off(note: u8) -> MidiEvent {
        MidiEvent::NoteOff {
            channel: 0,
            note,
            velocity: 0,
        }
    }

    /// Record 1000 frames with one note, commit, expect a playable loop.
    #[test]
    fn test_initial_record_commit() {
        let mut rec = recorder();
        rec.begin();
        assert!(rec.is_recording());

        rec.advance(256);
        rec.add(on(60), 10); // frame 266
        rec.advance(256);
        rec.add(off(60), 0); // closes at stream 512
        rec.advance(256);
        rec.advance(232); // 1000 total

        let layer = rec.commit(false);

        assert_eq!(layer.frames(), 1000);
        assert_eq!(layer.cycles(), 1);
        assert_eq!(layer.events().len(), 1);
        let note = layer.events().events()[0];
        assert_eq!(note.frame, 266);
        assert_eq!(note.duration, 246);

        // Recorder is re-anchored on the committed layer
        assert!(!rec.is_recording());
        assert_eq!(rec.frames(), 1000);
        assert_eq!(rec.frame(), 0);
        assert_eq!(rec.record_layer().segments().len(), 1);
        assert_eq!(rec.record_layer().segments()[0].frames, 1000);
    }

    #[test]
    fn test_advance_wraps_when_not_extending() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(1000);
        rec.commit(false);

        for _ in 0..4 {
            rec.advance(300);
        }
        assert_eq!(rec.frame(), 200); // 1200 % 1000
    }

    #[test]
    fn test_overdub_layers_on_backing() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(1000);
        let first = rec.commit(false);

        rec.set_recording(true);
        rec.add(on(62), 0); // frame 0
        rec.advance(500);
        rec.add(off(62), 0);
        rec.advance(500); // back to the loop point
        assert!(rec.has_changes());

        let second = rec.commit(false);

        assert_eq!(second.frames(), 1000);
        assert_eq!(second.events().len(), 1);
        assert_eq!(second.events().events()[0].duration, 500);
        assert_eq!(second.segments().len(), 1);
        assert_eq!(second.segments()[0].layer.number(), first.number());
    }

    #[test]
    fn test_note_off_lands_even_when_capture_is_off() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(100);
        rec.add(on(60), 0);
        rec.set_recording(false);
        rec.advance(100);
        rec.add(off(60), 0);

        assert_eq!(rec.record_layer().events().len(), 1);
        assert_eq!(rec.record_layer().events().events()[0].duration, 100);

        // With capture off a fresh note-on is ignored entirely
        rec.add(on(64), 0);
        rec.advance(50);
        rec.add(off(64), 0);
        assert_eq!(rec.record_layer().events().len(), 1);
    }

    /// Ending capture closes a note still held into the committed
    /// layer; it must not bridge into the next transaction.
    #[test]
    fn test_non_overdub_commit_closes_held_note() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(512);
        rec.add(on(60), 0); // frame 512, never released
        rec.advance(512);

        let layer = rec.commit(false);

        assert_eq!(rec.held_count(), 0);
        assert_eq!(layer.events().len(), 1);
        let note = layer.events().events()[0];
        assert_eq!(note.frame, 512);
        assert_eq!(note.duration, 512); // runs to the commit point

        // The release arriving later finds nothing to close
        rec.add(off(60), 0);
        assert!(rec.record_layer().events().is_empty());
    }

    #[test]
    fn test_multiply_doubles_one_cycle_backing() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(1000);
        rec.commit(false);

        rec.start_multiply();
        rec.advance(400);
        rec.add(on(62), 0); // frame 400
        rec.advance(400);
        rec.add(off(62), 0); // duration 400
        rec.advance(400); // crosses 1000, extends
        rec.advance(400);
        rec.advance(400); // lands exactly on 2000

        assert_eq!(rec.frames(), 2000);
        let layer = rec.commit_multiply(false, false);

        assert_eq!(layer.frames(), 2000);
        assert_eq!(layer.cycles(), 2);
        assert_eq!(layer.segments().len(), 2);
        assert_eq!(layer.segments()[0].origin_frame, 0);
        assert_eq!(layer.segments()[1].origin_frame, 1000);
        // Both windows replay the single backing cycle
        assert_eq!(layer.segments()[0].reference_frame, 0);
        assert_eq!(layer.segments()[1].reference_frame, 0);
        assert_eq!(layer.events().len(), 1);
        assert_eq!(layer.events().events()[0].frame, 400);
        assert_eq!(rec.frame(), 0);
    }

    #[test]
    fn test_multiply_unrounded_cuts_exact_span() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(1000);
        rec.commit(false);

        rec.advance(250);
        rec.start_multiply();
        rec.add(on(64), 0); // frame 250
        rec.advance(500);
        rec.add(off(64), 0); // duration 500

        let layer = rec.commit_multiply(false, true);

        assert_eq!(layer.frames(), 500);
        assert_eq!(layer.cycles(), 1);
        assert_eq!(layer.segments().len(), 1);
        assert_eq!(layer.segments()[0].origin_frame, 0);
        assert_eq!(layer.segments()[0].reference_frame, 250);
        assert_eq!(layer.segments()[0].frames, 500);
        // The captured note is re-based to the cut start
        assert_eq!(layer.events().len(), 1);
        assert_eq!(layer.events().events()[0].frame, 0);
        assert_eq!(layer.events().events()[0].duration, 500);
        assert_eq!(rec.frame(), 0);
    }

    /// A rounded multiply committed before the grown loop end keeps
    /// only the cycles actually covered.
    #[test]
    fn test_rounded_multiply_truncates_before_loop_end() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(44100);
        rec.commit(false);

        // Grow to four cycles first
        rec.start_multiply();
        rec.advance(4 * 44100);
        rec.commit_multiply(false, false);
        assert_eq!(rec.frames(), 176400);
        assert_eq!(rec.cycles(), 4);

        // Multiply again but stop two cycles in
        rec.start_multiply();
        rec.advance(88200);
        let layer = rec.commit_multiply(false, false);

        assert_eq!(layer.frames(), 88200);
        assert_eq!(layer.cycles(), 2);
        assert_eq!(layer.cycle_frames(), 44100);
        assert_eq!(layer.segments().len(), 1);
        assert_eq!(layer.segments()[0].origin_frame, 0);
        assert_eq!(layer.segments()[0].reference_frame, 0);
        assert_eq!(layer.segments()[0].frames, 88200);
        assert_eq!(rec.frame(), 0);
    }

    /// A note still down when a multiply commits lands in the cut span
    /// with the length it sounded.
    #[test]
    fn test_multiply_commit_closes_in_span_note() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(1000);
        rec.commit(false);

        rec.start_multiply();
        rec.advance(400);
        rec.add(on(62), 0); // frame 400, held through the commit
        rec.advance(1600); // loop doubled to 2000

        let layer = rec.commit_multiply(false, false);

        assert_eq!(rec.held_count(), 0);
        assert_eq!(layer.frames(), 2000);
        assert_eq!(layer.events().len(), 1);
        let note = layer.events().events()[0];
        assert_eq!(note.frame, 400);
        assert_eq!(note.duration, 1600); // rings to the commit point
    }

    #[test]
    fn test_multiply_prefix_restrikes_backing_hold() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(1000);
        rec.commit(false);

        // Overdub a note that rings across the loop end: [900, 1400)
        rec.set_recording(true);
        rec.advance(900);
        rec.add(on(60), 0);
        rec.advance(500);
        rec.add(off(60), 0);
        rec.advance(600); // back to 0
        rec.commit(false);

        rec.start_multiply();
        rec.advance(1000);
        rec.advance(1000); // extension appended one backing cycle

        let layer = rec.commit_multiply(false, false);

        assert_eq!(layer.frames(), 2000);
        assert_eq!(layer.segments().len(), 2);
        // The second window re-reads the backing from 0, so the note
        // still ringing at the join is re-struck with 400 frames left
        let prefix = &layer.segments()[1].prefix;
        assert_eq!(prefix.len(), 1);
        assert_eq!(prefix.events()[0].frame, 0);
        assert_eq!(prefix.events()[0].duration, 400);
        assert_eq!(prefix.events()[0].note_number(), Some(60));
    }

    #[test]
    fn test_replace_carves_hole() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(300);
        rec.add(on(60), 0);
        rec.advance(100);
        rec.add(off(60), 0); // [300, 400)
        rec.advance(300);
        rec.add(on(64), 0);
        rec.advance(100);
        rec.add(off(64), 0); // [700, 800)
        rec.advance(200); // 1000 total
        rec.commit(false);

        rec.advance(350);
        rec.start_replace();
        rec.add(on(72), 0); // frame 350
        rec.advance(250);
        rec.add(off(72), 0); // [350, 600)
        rec.end_replace();

        let segments = rec.record_layer().segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].origin_frame, 0);
        assert_eq!(segments[0].frames, 350);
        assert_eq!(segments[1].origin_frame, 600);
        assert_eq!(segments[1].reference_frame, 600);
        assert_eq!(segments[1].frames, 400);

        rec.advance(400); // back to the loop point
        let layer = rec.commit(false);

        // Flatten and check what survived the replace
        let config = LooperConfig::default();
        let pools = Arc::new(LooperPools::new(&config));
        let mut harvester = Harvester::new(pools, config.prefix_block_frames);
        let mut cursor = PlayCursor::new();
        harvester.harvest_play(&layer, 0, 1000, &mut cursor);

        let collected: Vec<(u64, u64)> = harvester
            .notes()
            .iter()
            .map(|e| (e.frame, e.duration))
            .collect();
        // First backing note clipped at the hole, replacement in full,
        // second backing note untouched
        assert_eq!(collected, vec![(300, 50), (350, 250), (700, 100)]);
    }

    #[test]
    fn test_replace_wrapping_loop_point_degrades_to_overdub() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(1000);
        rec.commit(false);

        rec.advance(800);
        rec.start_replace();
        rec.add(on(70), 0);
        rec.advance(400); // wraps to 200
        rec.add(off(70), 0);
        rec.end_replace();

        // No surgery happened, the pass-through window is intact
        assert_eq!(rec.record_layer().segments().len(), 1);
        assert_eq!(rec.record_layer().segments()[0].frames, 1000);
        // The capture itself is kept
        assert_eq!(rec.record_layer().events().len(), 1);
    }

    #[test]
    fn test_commit_force_ends_open_replace() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(1000);
        rec.commit(false);

        rec.advance(200);
        rec.start_replace();
        rec.advance(300); // frame 500, loop point reached elsewhere
        let layer = rec.commit(false);

        assert!(!rec.replace_active());
        assert_eq!(layer.segments().len(), 2);
        assert_eq!(layer.segments()[0].frames, 200);
        assert_eq!(layer.segments()[1].origin_frame, 500);
    }

    #[test]
    fn test_rollback_discards_pass() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(1000);
        rec.commit(false);

        rec.set_recording(true);
        rec.add(on(61), 0);
        rec.advance(250);
        rec.add(off(61), 0);
        assert!(rec.has_changes());

        rec.rollback(false);

        assert!(!rec.has_changes());
        assert!(!rec.is_recording());
        assert!(rec.record_layer().events().is_empty());
        assert_eq!(rec.record_layer().segments().len(), 1);
        assert_eq!(rec.record_layer().segments()[0].frames, 1000);
        assert_eq!(rec.frame(), 250); // position is preserved
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(500);
        rec.commit(false);
        rec.reset();

        assert_eq!(rec.frames(), 0);
        assert_eq!(rec.frame(), 0);
        assert!(rec.backing().is_none());
        assert!(!rec.is_recording());
        assert!(!rec.has_changes());
    }

    #[test]
    fn test_set_frame_wraps_and_respects_open_edits() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(1000);
        rec.commit(false);

        rec.set_frame(2300);
        assert_eq!(rec.frame(), 300);

        rec.advance(100); // frame 400
        rec.start_multiply();
        rec.set_frame(0); // refused, extension is open
        assert_eq!(rec.frame(), 400);
    }

    #[test]
    fn test_note_held_across_commit_completes_later() {
        let mut rec = recorder();
        rec.begin();
        rec.advance(1000);
        rec.commit(false);

        rec.set_recording(true);
        rec.advance(900);
        rec.add(on(60), 0);
        rec.advance(100); // loop point with the note still down
        let mid = rec.commit(true); // keep capture on
        assert_eq!(mid.events().len(), 0); // nothing closed yet
        assert_eq!(rec.held_count(), 1);

        rec.advance(300);
        rec.add(off(60), 0);
        assert_eq!(rec.held_count(), 0);
        let events = rec.record_layer().events().events();
        assert_eq!(events.len(), 1);
        // Closed at its original frame with the full held duration
        assert_eq!(events[0].frame, 900);
        assert_eq!(events[0].duration, 400);
    }
}
