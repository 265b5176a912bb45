// Command types - Control surface to audio thread

/// Track control commands pushed from the control thread (stdin, OSC,
/// footswitch...) into the audio callback command ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    BeginRecord,
    EndRecord,
    ToggleOverdub,
    StartMultiply,
    EndMultiply { unrounded: bool },
    StartInsert,
    EndInsert { unrounded: bool },
    StartReplace,
    EndReplace,
    Undo,
    Reset,
}
