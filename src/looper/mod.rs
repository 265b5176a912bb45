// Looper module - layered loop recording and playback
//
// A committed loop is an immutable Layer; a Layer plays back other
// layers through Segment windows, so overdubs stack without copying
// event data. The Recorder captures into a working layer, the
// Harvester flattens layer chains into playable event runs and the
// Player turns those runs into timed MIDI. LoopTrack ties one of each
// together behind the command set.

pub mod event;
pub mod fragment;
pub mod harvester;
pub mod layer;
pub mod player;
pub mod pools;
pub mod recorder;
pub mod segment;
pub mod sequence;
pub mod track;
pub mod watcher;

pub use event::LoopEvent;
pub use fragment::Fragment;
pub use harvester::{Harvester, PlayCursor};
pub use layer::Layer;
pub use player::Player;
pub use pools::LooperPools;
pub use recorder::Recorder;
pub use segment::Segment;
pub use sequence::Sequence;
pub use track::LoopTrack;
pub use watcher::NoteWatcher;
