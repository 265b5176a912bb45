// Harvester - flattening segment trees back into event streams

use crate::looper::event::LoopEvent;
use crate::looper::fragment::Fragment;
use crate::looper::layer::Layer;
use crate::looper::pools::LooperPools;
use crate::looper::segment::Segment;
use crate::looper::sequence::Sequence;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Depth bound for segment recursion. The layer graph is acyclic by
/// construction (segments only reference already-frozen layers), so
/// this only trips on corrupted structures.
const MAX_HARVEST_DEPTH: u32 = 512;

/// Playback position owned by the caller, not the layer.
///
/// Valid only for the layer whose number it carries and only while
/// playback advances monotonically; any mismatch makes the next harvest
/// re-seek by binary search. Layer numbers start at 1, so a default
/// cursor is never valid.
#[derive(Debug, Clone, Default)]
pub struct PlayCursor {
    layer: u64,
    frame: u64,
    next_event: usize,
    next_segment: usize,
}

impl PlayCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.layer = 0;
    }
}

/// Walks a layer's own events and its segment windows, producing the
/// flat event stream for a frame range.
///
/// Ranges are inclusive internally (`[start, last]`); the public play
/// entry takes the half-open block convention. Results come out split
/// into notes and other messages, each time-ordered.
pub struct Harvester {
    pools: Arc<LooperPools>,
    prefix_block_frames: u64,
    notes: Sequence,
    events: Sequence,
    depth_warned: AtomicBool,
    bounds_warned: AtomicBool,
}

impl Harvester {
    pub fn new(pools: Arc<LooperPools>, prefix_block_frames: u64) -> Self {
        let notes = pools.checkout_sequence();
        let events = pools.checkout_sequence();
        Self {
            pools,
            prefix_block_frames: prefix_block_frames.max(1),
            notes,
            events,
            depth_warned: AtomicBool::new(false),
            bounds_warned: AtomicBool::new(false),
        }
    }

    /// Note events collected by the last play harvest.
    pub fn notes(&self) -> &[LoopEvent] {
        self.notes.events()
    }

    /// Non-note events collected by the last play harvest.
    pub fn events(&self) -> &[LoopEvent] {
        self.events.events()
    }

    pub fn reset(&mut self) {
        self.notes.clear();
        self.events.clear();
    }

    /// Collect everything sounding in `[start, end)` of `layer` into the
    /// result lists. The cursor fast-path is taken when `start` follows
    /// the previous harvest on the same layer; otherwise the position is
    /// re-derived.
    pub fn harvest_play(
        &mut self,
        layer: &Layer,
        start: u64,
        end: u64,
        cursor: &mut PlayCursor,
    ) {
        self.notes.clear();
        self.events.clear();
        if end <= start {
            return;
        }
        let last = end - 1;

        let own = layer.events().events();
        let segments = layer.segments();

        if cursor.layer != layer.number() || cursor.frame != start {
            cursor.layer = layer.number();
            cursor.next_event = own.partition_point(|e| e.frame < start);
            cursor.next_segment = segments.partition_point(|s| s.end_frame() <= start);
        }

        let mut notes = std::mem::take(&mut self.notes);
        let mut others = std::mem::take(&mut self.events);

        let mut index = cursor.next_event;
        while index < own.len() && own[index].frame <= last {
            let event = own[index];
            index += 1;
            if event.is_note() {
                notes.insert(event);
            } else {
                others.insert(event);
            }
        }

        let mut merged = self.pools.checkout_sequence();
        let mut seg_index = cursor.next_segment;
        while seg_index < segments.len() && segments[seg_index].origin_frame <= last {
            let segment = &segments[seg_index];
            let prev = seg_index.checked_sub(1).map(|i| &segments[i]);
            let next = segments.get(seg_index + 1);
            let start_off = start.max(segment.origin_frame) - segment.origin_frame;
            let last_off = last.min(segment.last_frame()) - segment.origin_frame;
            self.harvest_segment_range(
                segment, prev, next, start_off, last_off, last, false, false, None,
                &mut merged, 0,
            );
            if segment.last_frame() <= last {
                seg_index += 1;
            } else {
                break;
            }
        }
        for event in merged.drain_all() {
            if event.is_note() {
                notes.insert(event);
            } else {
                others.insert(event);
            }
        }
        self.pools.checkin_sequence(merged);

        cursor.next_event = index;
        cursor.next_segment = seg_index;
        cursor.frame = end;

        self.notes = notes;
        self.events = others;
    }

    /// Held-note prefix for `layer.segments()[index]`: re-harvest from
    /// the previous segment's origin (or the layer start) up to this
    /// segment's origin in decaying blocks, keeping whatever still
    /// sounds at the origin, re-based to frame 0.
    ///
    /// Only segment content goes in. The layer's own events sustain
    /// through a seam on their own (nothing clips them), so re-striking
    /// them here would sound them twice.
    pub fn harvest_prefix(&self, layer: &Layer, index: usize) -> Sequence {
        let segments = layer.segments();
        let Some(segment) = segments.get(index) else {
            warn!(
                layer = layer.number(),
                index, "prefix requested past segment list"
            );
            return self.pools.checkout_sequence();
        };
        let region_start = if index == 0 {
            0
        } else {
            segments[index - 1].origin_frame
        };
        self.harvest_prefix_span(layer, region_start, segment.origin_frame)
    }

    /// Prefix computation for a segment that is not in the layer yet:
    /// `target` is the origin it will occupy, `region_start` the origin
    /// of the segment before it.
    pub(crate) fn harvest_prefix_span(
        &self,
        layer: &Layer,
        region_start: u64,
        target: u64,
    ) -> Sequence {
        self.decay_harvest(
            layer,
            region_start,
            target,
            self.prefix_block_frames,
            false,
            false,
        )
    }

    /// Everything sounding at `frame`, as a fragment whose events start
    /// at 0 with their leftover durations. Single-pass variant of the
    /// prefix computation, used for repositioning.
    ///
    /// Joins are honored: a note a play harvest would clip before
    /// `frame` is not in the fragment, and the prefix of a segment
    /// starting exactly at `frame` is left to the play harvest that
    /// will enter it.
    pub fn harvest_checkpoint(&self, layer: &Layer, frame: u64) -> Fragment {
        if frame == 0 {
            return Fragment::new(0, self.pools.checkout_sequence());
        }
        let sequence = self.decay_harvest(layer, 0, frame, frame, true, true);
        Fragment::new(frame, sequence)
    }

    /// Blockwise decay walk over `[region_start, target)`: each pass
    /// collects notes still sounding at the block end and ages the
    /// working set, bounding it to notes that can still reach the
    /// target. Survivors come out at frame 0 with their remaining
    /// duration.
    ///
    /// `clip_region_end` distinguishes checkpoint semantics (a join at
    /// the target clips, as play would) from prefix semantics (the join
    /// at the target is the one being compensated, so it must not
    /// clip). `include_own` likewise: a checkpoint restrikes the
    /// layer's own held notes, a prefix must not.
    pub(crate) fn decay_harvest(
        &self,
        layer: &Layer,
        region_start: u64,
        target: u64,
        block: u64,
        clip_region_end: bool,
        include_own: bool,
    ) -> Sequence {
        let mut result = self.pools.checkout_sequence();
        if target <= region_start {
            return result;
        }
        let block = block.max(1);
        let no_clip_at = if clip_region_end { None } else { Some(target) };

        let mut hold = self.pools.checkout_sequence();
        let mut scratch = self.pools.checkout_sequence();

        let mut position = region_start;
        while position < target {
            let block_end = (position + block).min(target);
            hold.decay(block_end - position);
            scratch.clear();
            self.harvest_range(
                layer,
                position,
                block_end - 1,
                true,
                !include_own,
                position == region_start,
                no_clip_at,
                &mut scratch,
                0,
            );
            for mut event in scratch.drain_all() {
                let end = event.end_frame();
                if end > block_end {
                    event.remaining = end - block_end;
                    hold.push(event);
                }
            }
            position = block_end;
        }

        for mut event in hold.drain_all() {
            event.frame = 0;
            event.duration = event.remaining;
            event.remaining = 0;
            result.push(event);
        }

        self.pools.checkin_sequence(hold);
        self.pools.checkin_sequence(scratch);
        result
    }

    /// Inclusive-range harvest of one layer level into `out`, events in
    /// this layer's coordinates. With `held_only` only notes sounding
    /// past `last` survive. `skip_own` leaves out this level's own
    /// events (nested levels are all segment content, so it never
    /// propagates). `force_at_start` injects the prefix of a segment
    /// whose origin coincides with `start` even across a continuous
    /// join (the walk cannot see what came before `start`).
    #[allow(clippy::too_many_arguments)]
    fn harvest_range(
        &self,
        layer: &Layer,
        start: u64,
        last: u64,
        held_only: bool,
        skip_own: bool,
        force_at_start: bool,
        no_clip_at: Option<u64>,
        out: &mut Sequence,
        depth: u32,
    ) {
        if depth > MAX_HARVEST_DEPTH {
            if !self.depth_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    layer = layer.number(),
                    depth, "harvest depth limit reached, truncating"
                );
            }
            return;
        }

        if !skip_own {
            let own = layer.events().events();
            let mut index = own.partition_point(|e| e.frame < start);
            while index < own.len() && own[index].frame <= last {
                let event = own[index];
                index += 1;
                if held_only && !event.sounds_past(last) {
                    continue;
                }
                out.insert(event);
            }
        }

        let segments = layer.segments();
        let mut seg_index = segments.partition_point(|s| s.end_frame() <= start);
        while seg_index < segments.len() && segments[seg_index].origin_frame <= last {
            let segment = &segments[seg_index];
            let prev = seg_index.checked_sub(1).map(|i| &segments[i]);
            let next = segments.get(seg_index + 1);
            let start_off = start.max(segment.origin_frame) - segment.origin_frame;
            let last_off = last.min(segment.last_frame()) - segment.origin_frame;
            let force = force_at_start && segment.origin_frame == start;
            self.harvest_segment_range(
                segment, prev, next, start_off, last_off, last, held_only, force, no_clip_at,
                out, depth,
            );
            if segment.last_frame() <= last {
                seg_index += 1;
            } else {
                break;
            }
        }
    }

    /// Harvest `[start_off, last_off]` of one segment window into `out`
    /// in the containing layer's coordinates: inject the prefix when
    /// entering across a seam, recurse into the referenced layer,
    /// re-base, and clip notes that overhang a discontinuous join.
    #[allow(clippy::too_many_arguments)]
    fn harvest_segment_range(
        &self,
        segment: &Segment,
        prev: Option<&Segment>,
        next: Option<&Segment>,
        start_off: u64,
        last_off: u64,
        range_last: u64,
        held_only: bool,
        force_prefix: bool,
        no_clip_at: Option<u64>,
        out: &mut Sequence,
        depth: u32,
    ) {
        let continuous_prev = prev.is_some_and(|p| segment.continuous_with(p));
        let continuous_next = next.is_some_and(|n| n.continuous_with(segment));
        let clip_overhang =
            !continuous_next && no_clip_at != Some(segment.end_frame());

        if start_off == 0 && (force_prefix || !continuous_prev) {
            for prefix_event in segment.prefix.events() {
                let mut event = *prefix_event;
                event.frame += segment.origin_frame;
                if event.is_note() && clip_overhang && event.end_frame() > segment.end_frame() {
                    event.duration = (segment.end_frame() - event.frame).max(1);
                }
                if held_only && !event.sounds_past(range_last) {
                    continue;
                }
                out.insert(event);
            }
        }

        // Referenced window, validated against the referenced layer
        let layer_frames = segment.layer.frames();
        let ref_start = segment.reference_frame + start_off;
        let mut ref_last = segment.reference_frame + last_off;
        if ref_start >= layer_frames {
            if !self.bounds_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    layer = segment.layer.number(),
                    reference = ref_start,
                    frames = layer_frames,
                    "segment references past layer end, skipping"
                );
            }
            return;
        }
        if ref_last >= layer_frames {
            if !self.bounds_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    layer = segment.layer.number(),
                    reference = ref_last,
                    frames = layer_frames,
                    "segment window truncated at layer end"
                );
            }
            ref_last = layer_frames - 1;
        }

        let mut nested = self.pools.checkout_sequence();
        self.harvest_range(
            &segment.layer,
            ref_start,
            ref_last,
            held_only,
            false,
            false,
            None,
            &mut nested,
            depth + 1,
        );
        for mut event in nested.drain_all() {
            debug_assert!(event.frame >= segment.reference_frame);
            event.frame = event.frame - segment.reference_frame + segment.origin_frame;
            if event.is_note() && clip_overhang && event.end_frame() > segment.end_frame() {
                event.duration = (segment.end_frame() - event.frame).max(1);
            }
            if held_only && !event.sounds_past(range_last) {
                continue;
            }
            out.insert(event);
        }
        self.pools.checkin_sequence(nested);
    }
}
