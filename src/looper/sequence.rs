// Sequence - time-ordered event list backing layers and harvests

use crate::looper::event::LoopEvent;
use tracing::trace;

/// Events ordered by frame. Storage is a plain `Vec` so buffers can be
/// recycled through the pool; the invariant is that `events` is always
/// sorted by `frame`, with same-frame events in arrival order.
#[derive(Debug, Default, Clone)]
pub struct Sequence {
    events: Vec<LoopEvent>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a pooled buffer as storage.
    pub fn with_buffer(mut buffer: Vec<LoopEvent>) -> Self {
        buffer.clear();
        Self { events: buffer }
    }

    /// Give the storage back for pool check-in.
    pub fn into_buffer(self) -> Vec<LoopEvent> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[LoopEvent] {
        &self.events
    }

    pub fn first(&self) -> Option<&LoopEvent> {
        self.events.first()
    }

    pub fn last(&self) -> Option<&LoopEvent> {
        self.events.last()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Append an event expected to arrive in time order. Out-of-order
    /// input is repaired by insertion and noted on the trace channel.
    pub fn push(&mut self, event: LoopEvent) {
        if let Some(last) = self.events.last() {
            if last.frame > event.frame {
                trace!(
                    frame = event.frame,
                    tail = last.frame,
                    "out-of-order append, inserting"
                );
                self.insert(event);
                return;
            }
        }
        self.events.push(event);
    }

    /// Insert at the position given by binary search. Same-frame events
    /// keep arrival order: the new event lands after existing ones.
    pub fn insert(&mut self, event: LoopEvent) {
        let at = self.events.partition_point(|e| e.frame <= event.frame);
        self.events.insert(at, event);
    }

    pub fn remove(&mut self, index: usize) -> Option<LoopEvent> {
        if index < self.events.len() {
            Some(self.events.remove(index))
        } else {
            None
        }
    }

    /// Destructively clip to the inclusive frame range `[start, end]`,
    /// re-basing surviving events to start at 0.
    ///
    /// With `include_holds`, notes that begin before `start` but are
    /// still sounding there survive as frame-0 notes with the duration
    /// they had left. Without it they are dropped with the rest.
    pub fn cut(&mut self, start: u64, end: u64, include_holds: bool) {
        self.events.retain_mut(|e| {
            if e.frame > end {
                return false;
            }
            if e.frame >= start {
                e.frame -= start;
                return true;
            }
            if include_holds && e.is_note() && e.end_frame() > start {
                e.duration = e.end_frame() - start;
                e.frame = 0;
                return true;
            }
            false
        });
    }

    /// Move all events from `source` onto the end of this sequence.
    /// `source` keeps its storage (and capacity) but ends up empty.
    ///
    /// Callers pass material that follows this sequence in time; if the
    /// ranges turn out to interleave the events are merged one by one
    /// instead, which keeps the ordering invariant at O(n^2) cost.
    pub fn transfer_from(&mut self, source: &mut Sequence) {
        if let (Some(tail), Some(head)) = (self.events.last(), source.events.first()) {
            if tail.frame > head.frame {
                trace!(
                    tail = tail.frame,
                    head = head.frame,
                    "interleaved transfer, merging"
                );
                for event in source.events.drain(..) {
                    self.insert(event);
                }
                return;
            }
        }
        self.events.append(&mut source.events);
    }

    pub fn drain_all(&mut self) -> std::vec::Drain<'_, LoopEvent> {
        self.events.drain(..)
    }

    /// Decay pass for held-note harvests: subtract `delta` from each
    /// event's remaining duration and drop the ones that reach zero.
    pub(crate) fn decay(&mut self, delta: u64) {
        self.events.retain_mut(|e| {
            e.remaining = e.remaining.saturating_sub(delta);
            e.remaining > 0
        });
    }

    #[cfg(test)]
    pub(crate) fn is_ordered(&self) -> bool {
        self.events.windows(2).all(|w| w[0].frame <= w[1].frame)
    }
}
