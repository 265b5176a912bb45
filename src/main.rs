// midiloop - MIDI loop recorder demo host
//
// The cpal output stream is the clock, not a sound source: every
// callback drives one block of the looper so loop timing follows the
// device clock even though the stream itself stays silent. Incoming
// MIDI arrives from the midir thread through a ring channel, playback
// leaves through another ring into the output drain thread, and stdin
// steers the track.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use midiloop::messaging::channels::{
    CommandConsumer, MidiInConsumer, MidiOutProducer, create_command_channel,
    create_midi_in_channel, create_midi_out_channel,
};
use midiloop::midi::input::MidiInput;
use midiloop::midi::output::{ChannelSink, MidiOutput, MidiSink};
use midiloop::{Command, LoopTrack, LooperConfig, LooperError, LooperPools, MidiEventTimed};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, trace, warn};
use tracing_subscriber::EnvFilter;

// Ringbuffer capacity constants
// - live input bursts stay far below 1024 events per block
// - playback can emit a dense block per callback, 4096 gives slack
// - commands arrive at typing speed
const MIDI_IN_CAPACITY: usize = 1024;
const MIDI_OUT_CAPACITY: usize = 4096;
const COMMAND_CAPACITY: usize = 64;

/// Everything the audio callback works on, behind one lock the
/// callback only ever try_locks.
struct Engine {
    track: LoopTrack,
    pending: Vec<MidiEventTimed>,
    midi_out: MidiOutProducer,
    thru: bool,
    overflow_logged: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("midiloop=info")),
        )
        .init();

    if let Err(e) = run() {
        error!(error = %e, "fatal");
        std::process::exit(1);
    }
}

fn run() -> midiloop::Result<()> {
    println!("=== midiloop ===");
    println!("MIDI loop recorder\n");

    let config = LooperConfig::load_or_default()?;

    let pools = Arc::new(LooperPools::new(&config));
    pools.fluff();

    let (mut command_tx, command_rx) = create_command_channel(COMMAND_CAPACITY);
    let (midi_in_tx, midi_in_rx) = create_midi_in_channel(MIDI_IN_CAPACITY);
    let (midi_out_tx, mut midi_out_rx) = create_midi_out_channel(MIDI_OUT_CAPACITY);

    let _midi_input = MidiInput::new(midi_in_tx)?;
    let mut midi_output = MidiOutput::new()?;

    // The default output device is only used as a block clock
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(LooperError::NoAudioDevice)?;
    info!(
        device = %device.name().unwrap_or_else(|_| "Unknown".to_string()),
        "audio clock device"
    );

    let supported = device
        .default_output_config()
        .map_err(|e| LooperError::Audio(e.to_string()))?;
    let sample_format = supported.sample_format();
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let stream_config: StreamConfig = supported.into();
    info!(sample_rate, channels, ?sample_format, "audio clock configured");

    let engine = Arc::new(Mutex::new(Engine {
        track: LoopTrack::new(Arc::clone(&pools), &config),
        pending: Vec::with_capacity(MIDI_IN_CAPACITY),
        midi_out: midi_out_tx,
        thru: config.midi_thru,
        overflow_logged: false,
    }));
    let command_rx = Arc::new(Mutex::new(command_rx));
    let midi_rx = Arc::new(Mutex::new(midi_in_rx));

    // Build the stream for whatever sample format the device prefers
    let stream = match sample_format {
        SampleFormat::F32 => build_clock_stream::<f32>(
            &device,
            &stream_config,
            channels,
            Arc::clone(&command_rx),
            Arc::clone(&midi_rx),
            Arc::clone(&engine),
        ),
        SampleFormat::I16 => build_clock_stream::<i16>(
            &device,
            &stream_config,
            channels,
            Arc::clone(&command_rx),
            Arc::clone(&midi_rx),
            Arc::clone(&engine),
        ),
        SampleFormat::U16 => build_clock_stream::<u16>(
            &device,
            &stream_config,
            channels,
            Arc::clone(&command_rx),
            Arc::clone(&midi_rx),
            Arc::clone(&engine),
        ),
        other => Err(LooperError::Audio(format!(
            "unsupported sample format: {other:?}"
        ))),
    }?;

    stream
        .play()
        .map_err(|e| LooperError::Audio(e.to_string()))?;

    let running = Arc::new(AtomicBool::new(true));

    // Playback drain: forward the output ring to the midir port.
    // Sub-block offsets are collapsed; timing granularity is one block.
    let drain_running = Arc::clone(&running);
    let drain = std::thread::spawn(move || {
        while drain_running.load(Ordering::Relaxed) {
            while let Some(timed) = ringbuf::traits::Consumer::try_pop(&mut midi_out_rx) {
                midi_output.send(timed);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    });

    // Pool maintenance: refill free lists off the audio thread
    let fluff_pools = Arc::clone(&pools);
    let fluff_running = Arc::clone(&running);
    let fluff = std::thread::spawn(move || {
        while fluff_running.load(Ordering::Relaxed) {
            let refilled = fluff_pools.fluff();
            if refilled > 0 {
                let stats = fluff_pools.stats();
                trace!(
                    refilled,
                    event_misses = stats.event_misses,
                    segment_misses = stats.segment_misses,
                    "pool refill"
                );
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    });

    println!("commands:");
    println!("  record    start / end the initial recording");
    println!("  overdub   toggle overdub capture");
    println!("  multiply  start / end a rounded multiply");
    println!("  insert    start / end a rounded insert");
    println!("  unrounded end an open multiply or insert at the exact spot");
    println!("  replace   start / end a replace");
    println!("  undo      back to the previous layer");
    println!("  reset     clear the track");
    println!("  status    show position and layer info");
    println!("  quit      exit\n");

    let mut recording = false;
    let mut multiplying = false;
    let mut inserting = false;
    let mut replacing = false;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let command = match line.trim() {
            "record" | "r" => {
                recording = !recording;
                Some(if recording {
                    Command::BeginRecord
                } else {
                    Command::EndRecord
                })
            }
            "overdub" | "o" => Some(Command::ToggleOverdub),
            "multiply" | "m" => {
                multiplying = !multiplying;
                Some(if multiplying {
                    Command::StartMultiply
                } else {
                    Command::EndMultiply { unrounded: false }
                })
            }
            "insert" | "i" => {
                inserting = !inserting;
                Some(if inserting {
                    Command::StartInsert
                } else {
                    Command::EndInsert { unrounded: false }
                })
            }
            "unrounded" => {
                if multiplying {
                    multiplying = false;
                    Some(Command::EndMultiply { unrounded: true })
                } else if inserting {
                    inserting = false;
                    Some(Command::EndInsert { unrounded: true })
                } else {
                    println!("no multiply or insert open");
                    None
                }
            }
            "replace" | "p" => {
                replacing = !replacing;
                Some(if replacing {
                    Command::StartReplace
                } else {
                    Command::EndReplace
                })
            }
            "undo" | "u" => Some(Command::Undo),
            "reset" => {
                recording = false;
                multiplying = false;
                inserting = false;
                replacing = false;
                Some(Command::Reset)
            }
            "status" | "s" => {
                if let Ok(engine) = engine.lock() {
                    let track = &engine.track;
                    println!(
                        "frame {}/{} cycles {} overdub {} history {}",
                        track.position(),
                        track.frames(),
                        track.cycles(),
                        track.overdub_active(),
                        track.history_depth()
                    );
                }
                None
            }
            "quit" | "q" => {
                // Silence held notes before tearing the stream down
                let _ = ringbuf::traits::Producer::try_push(&mut command_tx, Command::Reset);
                std::thread::sleep(Duration::from_millis(50));
                break;
            }
            "" => None,
            other => {
                println!("unknown command: {other}");
                None
            }
        };
        if let Some(command) = command {
            if ringbuf::traits::Producer::try_push(&mut command_tx, command).is_err() {
                warn!("command ring full, command dropped");
            }
        }
    }

    running.store(false, Ordering::Relaxed);
    let _ = drain.join();
    let _ = fluff.join();
    drop(stream);
    info!("goodbye");
    Ok(())
}

/// Build the clock stream for one sample type. The callback drains
/// pending commands and MIDI, runs the track for one block and writes
/// silence to the device.
fn build_clock_stream<T>(
    device: &Device,
    config: &StreamConfig,
    channels: usize,
    command_rx: Arc<Mutex<CommandConsumer>>,
    midi_rx: Arc<Mutex<MidiInConsumer>>,
    engine: Arc<Mutex<Engine>>,
) -> midiloop::Result<Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // No allocations, no I/O, no blocking locks in here
                let block = (data.len() / channels.max(1)) as u64;

                if let Ok(mut engine) = engine.try_lock() {
                    let engine = &mut *engine;
                    engine.pending.clear();

                    if let Ok(mut rx) = midi_rx.try_lock() {
                        while let Some(timed) = ringbuf::traits::Consumer::try_pop(&mut *rx) {
                            // The midir thread can keep pushing while we
                            // drain; never grow past the preallocation
                            if engine.pending.len() < MIDI_IN_CAPACITY {
                                engine.pending.push(timed);
                            }
                        }
                    }

                    let mut sink = ChannelSink {
                        producer: &mut engine.midi_out,
                        overflow_logged: &mut engine.overflow_logged,
                    };

                    if engine.thru {
                        for timed in &engine.pending {
                            sink.send(*timed);
                        }
                    }

                    if let Ok(mut rx) = command_rx.try_lock() {
                        while let Some(command) = ringbuf::traits::Consumer::try_pop(&mut *rx) {
                            engine.track.handle(command, &mut sink);
                        }
                    }

                    engine.track.process_block(&engine.pending, block, &mut sink);
                }

                // The looper makes no sound of its own
                for sample in data.iter_mut() {
                    *sample = Sample::from_sample::<f32>(0.0);
                }
            },
            move |err| {
                // Runs outside the audio callback, I/O is fine here
                error!(error = %err, "audio stream error");
            },
            None,
        )
        .map_err(|e| LooperError::Audio(e.to_string()))?;

    Ok(stream)
}
