// Layers - one complete pass of loop content

use crate::looper::segment::Segment;
use crate::looper::sequence::Sequence;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{trace, warn};

static NEXT_LAYER_NUMBER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique layer number (thread-safe, for traces and cursor
/// validation)
fn generate_layer_number() -> u64 {
    NEXT_LAYER_NUMBER.fetch_add(1, Ordering::Relaxed)
}

/// One version of a loop: events recorded during this pass plus
/// segments referencing the passes below it.
///
/// A layer is mutable only while it is the recorder's record layer.
/// Commit wraps it in `Arc` and from then on it is frozen; segments in
/// newer layers read it but never change it.
#[derive(Debug)]
pub struct Layer {
    number: u64,
    frames: u64,
    cycles: u32,
    events: Sequence,
    segments: Vec<Segment>,
}

impl Default for Layer {
    fn default() -> Self {
        Self {
            number: generate_layer_number(),
            frames: 0,
            cycles: 1,
            events: Sequence::new(),
            segments: Vec::new(),
        }
    }
}

impl Layer {
    pub fn with_storage(
        frames: u64,
        cycles: u32,
        events: Sequence,
        segments: Vec<Segment>,
    ) -> Self {
        Self {
            number: generate_layer_number(),
            frames,
            cycles,
            events,
            segments,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Frames per cycle. Layers keep `frames` divisible by `cycles`;
    /// when that invariant is broken it is logged at commit and this
    /// still returns a usable value.
    pub fn cycle_frames(&self) -> u64 {
        self.frames / self.cycles.max(1) as u64
    }

    pub fn events(&self) -> &Sequence {
        &self.events
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.segments.is_empty()
    }

    pub(crate) fn set_frames(&mut self, frames: u64) {
        self.frames = frames;
    }

    pub(crate) fn set_cycles(&mut self, cycles: u32) {
        self.cycles = cycles.max(1);
    }

    pub(crate) fn events_mut(&mut self) -> &mut Sequence {
        &mut self.events
    }

    /// Insert a segment keeping origin order. Overlap with a neighbor
    /// means the caller's bookkeeping went wrong; the segment is clamped
    /// to the free space and the anomaly logged.
    pub(crate) fn add_segment(&mut self, mut segment: Segment) {
        if segment.frames == 0 {
            trace!(layer = self.number, "dropping zero-length segment");
            return;
        }

        let at = self
            .segments
            .partition_point(|s| s.origin_frame <= segment.origin_frame);

        if at > 0 {
            let prev_end = self.segments[at - 1].end_frame();
            if prev_end > segment.origin_frame {
                let cut = prev_end - segment.origin_frame;
                warn!(
                    layer = self.number,
                    origin = segment.origin_frame,
                    overlap = cut,
                    "segment overlaps predecessor, clamping"
                );
                if cut >= segment.frames {
                    return;
                }
                segment.origin_frame += cut;
                segment.reference_frame += cut;
                segment.frames -= cut;
            }
        }

        if let Some(next) = self.segments.get(at) {
            if segment.end_frame() > next.origin_frame {
                let overhang = segment.end_frame() - next.origin_frame;
                warn!(
                    layer = self.number,
                    origin = segment.origin_frame,
                    overlap = overhang,
                    "segment overlaps successor, clamping"
                );
                if overhang >= segment.frames {
                    return;
                }
                segment.frames -= overhang;
            }
        }

        self.segments.insert(at, segment);
    }

    /// Hand the segment list to the recorder for commit-time surgery.
    pub(crate) fn take_segments(&mut self) -> Vec<Segment> {
        std::mem::take(&mut self.segments)
    }

    pub(crate) fn put_segments(&mut self, segments: Vec<Segment>) {
        debug_assert!(self.segments.is_empty());
        self.segments = segments;
    }

    /// Break the layer into its storage for pool reclamation.
    pub(crate) fn into_parts(self) -> (Sequence, Vec<Segment>) {
        (self.events, self.segments)
    }
}
