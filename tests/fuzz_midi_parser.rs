//! Wire-level robustness tests for the MIDI decoder.
//!
//! Drives `MidiEvent::from_bytes` with well-formed, truncated, and outright
//! random byte strings. The decoder must never panic, must reject anything
//! that is not a complete channel voice message, and every message it
//! accepts must survive a re-encode.

use midiloop::midi::event::MidiEvent;
use rand::Rng;

const VOICE_KINDS: [u8; 7] = [0x80, 0x90, 0xA0, 0xB0, 0xC0, 0xD0, 0xE0];

/// Well-formed channel voice message of a random kind, on a random channel.
fn random_voice_message(rng: &mut impl Rng) -> Vec<u8> {
    let status = VOICE_KINDS[rng.gen_range(0..VOICE_KINDS.len())] | rng.gen_range(0..16u8);
    let data_bytes = match status & 0xF0 {
        0xC0 | 0xD0 => 1,
        _ => 2,
    };
    let mut message = vec![status];
    for _ in 0..data_bytes {
        message.push(rng.gen_range(0..=0x7Fu8));
    }
    message
}

#[test]
fn random_byte_strings_never_panic() {
    let mut rng = rand::thread_rng();
    for _ in 0..1000 {
        let length = rng.gen_range(1..=64);
        let noise: Vec<u8> = (0..length).map(|_| rng.gen_range(0x00..=0xFFu8)).collect();
        let outcome = std::panic::catch_unwind(|| {
            let _ = MidiEvent::from_bytes(&noise);
        });
        assert!(outcome.is_ok());
    }
}

#[test]
fn truncated_voice_messages_decode_to_none() {
    let mut rng = rand::thread_rng();
    for _ in 0..500 {
        let mut message = random_voice_message(&mut rng);
        let keep = rng.gen_range(1..message.len());
        message.truncate(keep);
        assert_eq!(MidiEvent::from_bytes(&message), None);
    }
}

#[test]
fn short_inputs_decode_to_none() {
    assert!(MidiEvent::from_bytes(&[]).is_none());
    assert!(MidiEvent::from_bytes(&[0x3C]).is_none());
    assert!(MidiEvent::from_bytes(&[0x90]).is_none());
    assert!(MidiEvent::from_bytes(&[0x90, 0x3C]).is_none());
    assert!(MidiEvent::from_bytes(&[0xB2, 0x07]).is_none());
    assert!(MidiEvent::from_bytes(&[0xC4]).is_none());
    assert!(MidiEvent::from_bytes(&[0xE1, 0x12]).is_none());
}

#[test]
fn non_voice_status_bytes_decode_to_none() {
    // Data bytes sitting in the status position
    for status in 0x00..=0x7Fu8 {
        assert!(MidiEvent::from_bytes(&[status, 0x40, 0x40]).is_none());
    }
    // System common and real-time, with and without trailing data
    for status in 0xF0..=0xFFu8 {
        assert!(MidiEvent::from_bytes(&[status]).is_none());
        assert!(MidiEvent::from_bytes(&[status, 0x00, 0x00]).is_none());
    }
}

#[test]
fn decodes_every_voice_message_kind() {
    let cases: [(&[u8], MidiEvent); 7] = [
        (
            &[0x83, 0x3C, 0x40],
            MidiEvent::NoteOff {
                channel: 3,
                note: 0x3C,
                velocity: 0x40,
            },
        ),
        (
            &[0x91, 0x45, 0x64],
            MidiEvent::NoteOn {
                channel: 1,
                note: 0x45,
                velocity: 0x64,
            },
        ),
        (
            &[0xA2, 0x30, 0x22],
            MidiEvent::PolyAftertouch {
                channel: 2,
                note: 0x30,
                value: 0x22,
            },
        ),
        (
            &[0xB0, 0x07, 0x7F],
            MidiEvent::ControlChange {
                channel: 0,
                controller: 0x07,
                value: 0x7F,
            },
        ),
        (
            &[0xC5, 0x0C],
            MidiEvent::ProgramChange {
                channel: 5,
                program: 0x0C,
            },
        ),
        (
            &[0xD9, 0x33],
            MidiEvent::ChannelAftertouch {
                channel: 9,
                value: 0x33,
            },
        ),
        (
            &[0xEF, 0x01, 0x40],
            MidiEvent::PitchBend {
                channel: 15,
                value: 0x2001,
            },
        ),
    ];

    for (wire, want) in cases {
        assert_eq!(MidiEvent::from_bytes(wire), Some(want));
    }
}

#[test]
fn zero_velocity_note_on_decodes_as_note_off() {
    for channel in 0..16u8 {
        assert_eq!(
            MidiEvent::from_bytes(&[0x90 | channel, 60, 0]),
            Some(MidiEvent::NoteOff {
                channel,
                note: 60,
                velocity: 0,
            })
        );
    }
}

#[test]
fn note_sweep_preserves_note_and_velocity() {
    for note in (0..=127u8).step_by(7) {
        for velocity in (1..=127u8).step_by(9) {
            assert_eq!(
                MidiEvent::from_bytes(&[0x94, note, velocity]),
                Some(MidiEvent::NoteOn {
                    channel: 4,
                    note,
                    velocity,
                })
            );
        }
    }
}

#[test]
fn channel_nibble_survives_decoding() {
    let mut rng = rand::thread_rng();
    for _ in 0..500 {
        let message = random_voice_message(&mut rng);
        let event = MidiEvent::from_bytes(&message).unwrap();
        assert_eq!(event.channel(), message[0] & 0x0F);
    }
}

#[test]
fn data_byte_extremes_decode() {
    assert_eq!(
        MidiEvent::from_bytes(&[0x90, 0x7F, 0x7F]),
        Some(MidiEvent::NoteOn {
            channel: 0,
            note: 0x7F,
            velocity: 0x7F,
        })
    );
    assert_eq!(
        MidiEvent::from_bytes(&[0x80, 0x00, 0x00]),
        Some(MidiEvent::NoteOff {
            channel: 0,
            note: 0x00,
            velocity: 0x00,
        })
    );
    assert_eq!(
        MidiEvent::from_bytes(&[0xE7, 0x7F, 0x7F]),
        Some(MidiEvent::PitchBend {
            channel: 7,
            value: 0x3FFF,
        })
    );
    assert_eq!(
        MidiEvent::from_bytes(&[0xE7, 0x00, 0x00]),
        Some(MidiEvent::PitchBend {
            channel: 7,
            value: 0,
        })
    );
}

#[test]
fn accepted_messages_survive_a_reencode() {
    let mut rng = rand::thread_rng();
    for _ in 0..2000 {
        let wire = [
            rng.gen_range(0x00..=0xFFu8),
            rng.gen_range(0..=0x7Fu8),
            rng.gen_range(0..=0x7Fu8),
        ];
        if let Some(event) = MidiEvent::from_bytes(&wire) {
            let mut out = [0u8; 3];
            let written = event.to_bytes(&mut out);
            assert!(written == 2 || written == 3);
            assert_eq!(MidiEvent::from_bytes(&out[..written]), Some(event));
        }
    }
}
