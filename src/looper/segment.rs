// Segments - windows into frozen layers

use crate::looper::layer::Layer;
use crate::looper::sequence::Sequence;
use std::sync::Arc;

/// A reference to `frames` frames of an older layer's content.
///
/// The window occupies `[origin_frame, origin_frame + frames)` of the
/// containing layer and reads `[reference_frame, reference_frame +
/// frames)` of the referenced layer. `prefix` holds re-struck notes
/// that started before the window but are still sounding at its origin;
/// its events are relative to the origin.
#[derive(Debug, Clone)]
pub struct Segment {
    pub layer: Arc<Layer>,
    pub origin_frame: u64,
    pub reference_frame: u64,
    pub frames: u64,
    pub prefix: Sequence,
}

impl Segment {
    pub fn new(layer: Arc<Layer>, origin_frame: u64, reference_frame: u64, frames: u64) -> Self {
        Self {
            layer,
            origin_frame,
            reference_frame,
            frames,
            prefix: Sequence::new(),
        }
    }

    /// Pass-through window covering the whole referenced layer.
    pub fn full(layer: Arc<Layer>) -> Self {
        let frames = layer.frames();
        Self::new(layer, 0, 0, frames)
    }

    /// One past the last containing-layer frame of the window.
    pub fn end_frame(&self) -> u64 {
        self.origin_frame + self.frames
    }

    /// Last containing-layer frame of the window.
    pub fn last_frame(&self) -> u64 {
        self.origin_frame + self.frames.saturating_sub(1)
    }

    pub fn contains(&self, frame: u64) -> bool {
        frame >= self.origin_frame && frame < self.end_frame()
    }

    /// True when this segment continues `prev` without a seam: both the
    /// containing position and the referenced position advance by
    /// exactly `prev.frames`, within the same referenced layer. Held
    /// notes may sustain across a continuous join; any other join clips
    /// them.
    pub fn continuous_with(&self, prev: &Segment) -> bool {
        Arc::ptr_eq(&self.layer, &prev.layer)
            && prev.origin_frame + prev.frames == self.origin_frame
            && prev.reference_frame + prev.frames == self.reference_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer_of(frames: u64) -> Arc<Layer> {
        Arc::new(Layer::with_storage(
            frames,
            1,
            Sequence::new(),
            Vec::new(),
        ))
    }

    #[test]
    fn test_full_window() {
        let layer = layer_of(1000);
        let seg = Segment::full(layer);

        assert_eq!(seg.origin_frame, 0);
        assert_eq!(seg.reference_frame, 0);
        assert_eq!(seg.frames, 1000);
        assert_eq!(seg.end_frame(), 1000);
        assert_eq!(seg.last_frame(), 999);
        assert!(seg.contains(0));
        assert!(seg.contains(999));
        assert!(!seg.contains(1000));
    }

    #[test]
    fn test_continuity() {
        let layer = layer_of(2000);
        let a = Segment::new(layer.clone(), 0, 0, 500);
        let b = Segment::new(layer.clone(), 500, 500, 500);

        assert!(b.continuous_with(&a));
    }

    #[test]
    fn test_origin_gap_breaks_continuity() {
        let layer = layer_of(2000);
        let a = Segment::new(layer.clone(), 0, 0, 500);
        let b = Segment::new(layer.clone(), 600, 500, 500);

        assert!(!b.continuous_with(&a));
    }

    #[test]
    fn test_reference_jump_breaks_continuity() {
        let layer = layer_of(2000);
        let a = Segment::new(layer.clone(), 0, 1500, 500);
        // Containing position is adjacent but the reference wraps to 0
        let b = Segment::new(layer.clone(), 500, 0, 500);

        assert!(!b.continuous_with(&a));
    }

    #[test]
    fn test_different_layers_break_continuity() {
        let first = layer_of(1000);
        let second = layer_of(1000);
        let a = Segment::new(first, 0, 0, 500);
        // Numerically adjacent but reads different material
        let b = Segment::new(second, 500, 500, 500);

        assert!(!b.continuous_with(&a));
    }
}
