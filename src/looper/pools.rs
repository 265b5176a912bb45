// Buffer pools - recycled storage for the audio path

use crate::config::LooperConfig;
use crate::looper::event::LoopEvent;
use crate::looper::layer::Layer;
use crate::looper::segment::Segment;
use crate::looper::sequence::Sequence;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Pool counters, readable from any thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub event_checkouts: u64,
    pub event_misses: u64,
    pub segment_checkouts: u64,
    pub segment_misses: u64,
    pub events_available: usize,
    pub segments_available: usize,
}

struct Shelf {
    events: Vec<Vec<LoopEvent>>,
    segments: Vec<Vec<Segment>>,
    stats: PoolStats,
}

/// Free lists of pre-sized buffer storage.
///
/// The audio path checks buffers out and in; a maintenance thread calls
/// `fluff()` to restore the target counts. The mutex is held only to
/// pop or push a buffer, never while one is filled. A miss falls back
/// to a fresh allocation and logs once per exhaustion episode.
pub struct LooperPools {
    shelf: Mutex<Shelf>,
    event_capacity: usize,
    segment_capacity: usize,
    event_target: usize,
    segment_target: usize,
    event_miss_logged: AtomicBool,
    segment_miss_logged: AtomicBool,
}

impl LooperPools {
    pub fn new(config: &LooperConfig) -> Self {
        let events = (0..config.event_pool_buffers)
            .map(|_| Vec::with_capacity(config.event_buffer_capacity))
            .collect();
        let segments = (0..config.segment_pool_buffers)
            .map(|_| Vec::with_capacity(config.segment_buffer_capacity))
            .collect();

        Self {
            shelf: Mutex::new(Shelf {
                events,
                segments,
                stats: PoolStats::default(),
            }),
            event_capacity: config.event_buffer_capacity,
            segment_capacity: config.segment_buffer_capacity,
            event_target: config.event_pool_buffers,
            segment_target: config.segment_pool_buffers,
            event_miss_logged: AtomicBool::new(false),
            segment_miss_logged: AtomicBool::new(false),
        }
    }

    fn shelf(&self) -> MutexGuard<'_, Shelf> {
        self.shelf
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn checkout_events(&self) -> Vec<LoopEvent> {
        let buffer = {
            let mut shelf = self.shelf();
            shelf.stats.event_checkouts += 1;
            let buffer = shelf.events.pop();
            if buffer.is_none() {
                shelf.stats.event_misses += 1;
            }
            buffer
        };

        buffer.unwrap_or_else(|| {
            if !self.event_miss_logged.swap(true, Ordering::Relaxed) {
                warn!("event pool exhausted, allocating");
            }
            Vec::with_capacity(self.event_capacity)
        })
    }

    pub fn checkin_events(&self, mut buffer: Vec<LoopEvent>) {
        if buffer.capacity() == 0 {
            return;
        }
        buffer.clear();
        let mut shelf = self.shelf();
        // Bound growth from reclaimed layer graphs
        if shelf.events.len() < self.event_target * 2 {
            shelf.events.push(buffer);
        }
    }

    pub fn checkout_segments(&self) -> Vec<Segment> {
        let buffer = {
            let mut shelf = self.shelf();
            shelf.stats.segment_checkouts += 1;
            let buffer = shelf.segments.pop();
            if buffer.is_none() {
                shelf.stats.segment_misses += 1;
            }
            buffer
        };

        buffer.unwrap_or_else(|| {
            if !self.segment_miss_logged.swap(true, Ordering::Relaxed) {
                warn!("segment pool exhausted, allocating");
            }
            Vec::with_capacity(self.segment_capacity)
        })
    }

    pub fn checkin_segments(&self, mut buffer: Vec<Segment>) {
        if buffer.capacity() == 0 {
            return;
        }
        buffer.clear();
        let mut shelf = self.shelf();
        if shelf.segments.len() < self.segment_target * 2 {
            shelf.segments.push(buffer);
        }
    }

    pub fn checkout_sequence(&self) -> Sequence {
        Sequence::with_buffer(self.checkout_events())
    }

    pub fn checkin_sequence(&self, sequence: Sequence) {
        self.checkin_events(sequence.into_buffer());
    }

    /// Restore the target buffer counts. Allocation happens outside the
    /// lock; call from a maintenance thread, never the audio callback.
    pub fn fluff(&self) -> usize {
        let (need_events, need_segments) = {
            let shelf = self.shelf();
            (
                self.event_target.saturating_sub(shelf.events.len()),
                self.segment_target.saturating_sub(shelf.segments.len()),
            )
        };

        if need_events == 0 && need_segments == 0 {
            return 0;
        }

        let mut events: Vec<Vec<LoopEvent>> = (0..need_events)
            .map(|_| Vec::with_capacity(self.event_capacity))
            .collect();
        let mut segments: Vec<Vec<Segment>> = (0..need_segments)
            .map(|_| Vec::with_capacity(self.segment_capacity))
            .collect();

        {
            let mut shelf = self.shelf();
            shelf.events.append(&mut events);
            shelf.segments.append(&mut segments);
        }

        // Replenished: let the next exhaustion log again
        self.event_miss_logged.store(false, Ordering::Relaxed);
        self.segment_miss_logged.store(false, Ordering::Relaxed);

        debug!(
            events = need_events,
            segments = need_segments,
            "pools fluffed"
        );
        need_events + need_segments
    }

    pub fn stats(&self) -> PoolStats {
        let shelf = self.shelf();
        let mut stats = shelf.stats;
        stats.events_available = shelf.events.len();
        stats.segments_available = shelf.segments.len();
        stats
    }

    /// Recycle a layer graph once nothing references it anymore. Walks
    /// segments depth-first; any layer still shared (undo history,
    /// player) is left alone and keeps its subtree alive.
    pub fn reclaim_layer(&self, layer: Arc<Layer>) {
        let mut pending = vec![layer];
        while let Some(arc) = pending.pop() {
            if let Ok(layer) = Arc::try_unwrap(arc) {
                let (events, mut segments) = layer.into_parts();
                self.checkin_events(events.into_buffer());
                for segment in segments.drain(..) {
                    self.checkin_events(segment.prefix.into_buffer());
                    pending.push(segment.layer);
                }
                self.checkin_segments(segments);
            }
        }
    }
}
