// Fragments - captured held-note state at a frame

use crate::looper::event::LoopEvent;
use crate::looper::sequence::Sequence;

/// The notes sounding at one frame of a layer, re-based so each event
/// starts at 0 with the duration it has left. Used to re-strike held
/// notes when playback jumps into the middle of material.
#[derive(Debug)]
pub struct Fragment {
    pub frame: u64,
    sequence: Sequence,
}

impl Fragment {
    pub fn new(frame: u64, sequence: Sequence) -> Self {
        Self { frame, sequence }
    }

    pub fn events(&self) -> &[LoopEvent] {
        self.sequence.events()
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Release the storage so it can go back to the pool.
    pub fn into_sequence(self) -> Sequence {
        self.sequence
    }
}
