// Track - one loop wired from recorder, player and undo history

use crate::config::LooperConfig;
use crate::looper::layer::Layer;
use crate::looper::player::Player;
use crate::looper::pools::LooperPools;
use crate::looper::recorder::Recorder;
use crate::messaging::command::Command;
use crate::midi::event::MidiEventTimed;
use crate::midi::output::MidiSink;
use std::sync::Arc;
use tracing::{info, trace, warn};

/// Re-bases sink timestamps for a sub-span of a block.
struct OffsetSink<'a> {
    base: u32,
    inner: &'a mut dyn MidiSink,
}

impl MidiSink for OffsetSink<'_> {
    fn send(&mut self, event: MidiEventTimed) {
        self.inner.send(MidiEventTimed {
            event: event.event,
            samples_from_now: self.base + event.samples_from_now,
        });
    }
}

/// One looping track: feeds incoming MIDI to the recorder, streams the
/// committed layer through the player and commits pending edits every
/// time the position crosses the loop point.
///
/// Blocks are split at the loop boundary so recording and playback
/// never straddle a wrap, and commits happen exactly on the seam.
pub struct LoopTrack {
    pools: Arc<LooperPools>,
    recorder: Recorder,
    player: Player,
    overdub: bool,
    history: Vec<Arc<Layer>>,
    history_limit: usize,
}

impl LoopTrack {
    pub fn new(pools: Arc<LooperPools>, config: &LooperConfig) -> Self {
        Self {
            recorder: Recorder::new(Arc::clone(&pools), config),
            player: Player::new(Arc::clone(&pools), config),
            pools,
            overdub: false,
            history: Vec::new(),
            history_limit: config.history_limit.max(1),
        }
    }

    /// Process one audio block: `events` carries this block's incoming
    /// MIDI with offsets in `samples_from_now`, `block` is its length
    /// in frames, and playback lands in `sink` with block-relative
    /// offsets.
    pub fn process_block(
        &mut self,
        events: &[MidiEventTimed],
        block: u64,
        sink: &mut dyn MidiSink,
    ) {
        let mut done = 0u64;
        let mut fed = 0usize;
        while done < block {
            let left = block - done;
            let span = self.span_until_boundary(left);

            while fed < events.len() && u64::from(events[fed].samples_from_now) < done + span {
                let timed = events[fed];
                fed += 1;
                self.recorder
                    .add(timed.event, u64::from(timed.samples_from_now) - done);
            }

            let mut offset_sink = OffsetSink {
                base: done as u32,
                inner: sink,
            };
            self.player.play(span, &mut offset_sink);
            self.recorder.advance(span);
            done += span;

            if self.at_boundary() {
                self.on_loop_boundary();
            }
        }

        // Stray offsets past the block end still reach the recorder
        while fed < events.len() {
            let timed = events[fed];
            fed += 1;
            trace!(
                offset = timed.samples_from_now,
                block, "event offset past block end, clamping"
            );
            self.recorder.add(timed.event, 0);
        }
    }

    pub fn handle(&mut self, command: Command, sink: &mut dyn MidiSink) {
        match command {
            Command::BeginRecord => self.begin_record(sink),
            Command::EndRecord => self.end_record(),
            Command::ToggleOverdub => self.toggle_overdub(),
            Command::StartMultiply => self.recorder.start_multiply(),
            Command::EndMultiply { unrounded } => self.end_extension(unrounded),
            Command::StartInsert => self.recorder.start_insert(),
            Command::EndInsert { unrounded } => self.end_extension(unrounded),
            Command::StartReplace => self.recorder.start_replace(),
            Command::EndReplace => self.end_replace(),
            Command::Undo => self.undo(sink),
            Command::Reset => self.reset(sink),
        }
    }

    /// Start a fresh initial recording, discarding the current loop and
    /// its history.
    pub fn begin_record(&mut self, sink: &mut dyn MidiSink) {
        self.player.reset(sink);
        self.history.clear();
        let prev = self.recorder.backing().cloned();
        self.recorder.begin();
        if let Some(prev) = prev {
            self.pools.reclaim_layer(prev);
        }
        self.overdub = false;
        info!("record started");
    }

    /// Close the initial recording; the loop starts playing from its
    /// top.
    pub fn end_record(&mut self) {
        if self.recorder.backing().is_none() && self.recorder.is_extending() {
            let layer = self.recorder.commit(self.overdub);
            info!(frames = layer.frames(), "loop closed");
            self.player.set_layer(layer, 0);
        } else {
            warn!("end record without an open recording");
        }
    }

    pub fn toggle_overdub(&mut self) {
        self.overdub = !self.overdub;
        if !self.recorder.multiply_active() && !self.recorder.replace_active() {
            if self.recorder.backing().is_some() {
                self.recorder.set_recording(self.overdub);
            }
        }
        info!(overdub = self.overdub, "overdub toggled");
    }

    /// End a multiply or insert right away; the cut span becomes the
    /// new loop.
    pub fn end_extension(&mut self, unrounded: bool) {
        if !self.recorder.multiply_active() {
            warn!("extension end without an open multiply or insert");
            return;
        }
        let prev = self.recorder.backing().cloned();
        let layer = self.recorder.commit_multiply(self.overdub, unrounded);
        if let Some(prev) = prev {
            self.push_history(prev);
        }
        info!(
            frames = layer.frames(),
            cycles = layer.cycles(),
            "extension committed"
        );
        self.player.set_layer(layer, self.recorder.frame());
    }

    pub fn end_replace(&mut self) {
        self.recorder.end_replace();
        self.recorder.set_recording(self.overdub);
    }

    /// Swap the previous committed layer back in and keep playing from
    /// the same position.
    pub fn undo(&mut self, sink: &mut dyn MidiSink) {
        let Some(previous) = self.history.pop() else {
            warn!("nothing to undo");
            return;
        };
        let current = self.recorder.backing().cloned();
        let frames = previous.frames();
        let frame = if frames > 0 {
            self.player.frame() % frames
        } else {
            0
        };
        self.recorder.resume(Arc::clone(&previous), frame);
        self.recorder.set_recording(self.overdub);
        self.player.set_layer(Arc::clone(&previous), frame);
        self.player.resume_at(frame, sink);
        if let Some(current) = current {
            self.pools.reclaim_layer(current);
        }
        info!(layer = previous.number(), frame, "undo");
    }

    /// Back to the empty state.
    pub fn reset(&mut self, sink: &mut dyn MidiSink) {
        self.player.reset(sink);
        self.history.clear();
        let prev = self.recorder.backing().cloned();
        self.recorder.reset();
        if let Some(prev) = prev {
            self.pools.reclaim_layer(prev);
        }
        self.overdub = false;
        info!("track reset");
    }

    pub fn frames(&self) -> u64 {
        self.recorder.frames()
    }

    pub fn position(&self) -> u64 {
        self.recorder.frame()
    }

    pub fn cycles(&self) -> u32 {
        self.recorder.cycles()
    }

    pub fn overdub_active(&self) -> bool {
        self.overdub
    }

    pub fn recording_initial(&self) -> bool {
        self.recorder.backing().is_none() && self.recorder.is_extending()
    }

    pub fn multiply_active(&self) -> bool {
        self.recorder.multiply_active()
    }

    pub fn insert_active(&self) -> bool {
        self.recorder.insert_active()
    }

    pub fn replace_active(&self) -> bool {
        self.recorder.replace_active()
    }

    pub fn history_depth(&self) -> usize {
        self.history.len()
    }

    pub fn has_loop(&self) -> bool {
        self.recorder.backing().is_some()
    }

    fn span_until_boundary(&self, left: u64) -> u64 {
        if self.recorder.is_extending() {
            return left;
        }
        let frames = self.recorder.frames();
        if frames == 0 {
            return left;
        }
        left.min(frames - self.recorder.frame())
    }

    fn at_boundary(&self) -> bool {
        !self.recorder.is_extending() && self.recorder.frames() > 0 && self.recorder.frame() == 0
    }

    /// The loop point: commit pending edits unless an edit mode is
    /// still open, and hand the fresh layer to the player without
    /// cutting sounding notes short.
    fn on_loop_boundary(&mut self) {
        if self.recorder.has_changes()
            && !self.recorder.multiply_active()
            && !self.recorder.replace_active()
        {
            let prev = self.recorder.backing().cloned();
            let layer = self.recorder.commit(self.overdub);
            if let Some(prev) = prev {
                self.push_history(prev);
            }
            trace!(layer = layer.number(), "boundary commit");
            self.player.set_layer(layer, 0);
        }
    }

    fn push_history(&mut self, layer: Arc<Layer>) {
        self.history.push(layer);
        if self.history.len() > self.history_limit {
            let evicted = self.history.remove(0);
            self.pools.reclaim_layer(evicted);
        }
    }
}
