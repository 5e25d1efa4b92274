//! Assembles a driver-ready [`Event`] stream into an ESF byte stream.
//!
//! This is a straight line-for-line port of the original `write_esf`
//! dispatch: a sorted event list in, a compact opcode stream out, with
//! per-channel state (instrument/volume/panning/note) cached so only
//! actual changes get written.

use super::tables::{FM_FREQ, PSG_FREQ, VOLUME_FM, VOLUME_PSG};
use crate::event::{Channel, Event, EventKind, FmChannel, PsgChannel};

const ECHO_FM1: u8 = 0x00;
const ECHO_FM2: u8 = 0x01;
const ECHO_FM3: u8 = 0x02;
const ECHO_FM4: u8 = 0x04;
const ECHO_FM5: u8 = 0x05;
const ECHO_FM6: u8 = 0x06;
const ECHO_PSG1: u8 = 0x08;
const ECHO_PSG2: u8 = 0x09;
const ECHO_PSG3: u8 = 0x0A;
const ECHO_PSG4: u8 = 0x0B;
const ECHO_PCM: u8 = 0x0C;

const ECHO_NOTEON: u8 = 0x00;
const ECHO_NOTEOFF: u8 = 0x10;
const ECHO_VOLUME: u8 = 0x20;
const ECHO_FREQ: u8 = 0x30;
const ECHO_INSTR: u8 = 0x40;
const ECHO_PAN: u8 = 0xF0;

const ECHO_LOOPEND: u8 = 0xFC;
const ECHO_LOOPSTART: u8 = 0xFD;
const ECHO_DELAY: u8 = 0xFE;
const ECHO_STOP: u8 = 0xFF;

const ECHO_LOCK: u8 = 0xE0;
const ECHO_REG_BANK0: u8 = 0xF8;
const ECHO_REG_BANK1: u8 = 0xF9;
const ECHO_FLAG_SET: u8 = 0xFA;
const ECHO_FLAG_CLEAR: u8 = 0xFB;

pub(crate) fn hw_channel(channel: Channel) -> Option<u8> {
    match channel {
        Channel::Fm(FmChannel::Fm1) => Some(ECHO_FM1),
        Channel::Fm(FmChannel::Fm2) => Some(ECHO_FM2),
        Channel::Fm(FmChannel::Fm3) => Some(ECHO_FM3),
        Channel::Fm(FmChannel::Fm4) => Some(ECHO_FM4),
        Channel::Fm(FmChannel::Fm5) => Some(ECHO_FM5),
        Channel::Fm(FmChannel::Fm6) => Some(ECHO_FM6),
        Channel::Psg(PsgChannel::Psg1) => Some(ECHO_PSG1),
        Channel::Psg(PsgChannel::Psg2) => Some(ECHO_PSG2),
        Channel::Psg(PsgChannel::Psg3) => Some(ECHO_PSG3),
        Channel::PsgNoise => Some(ECHO_PSG4),
        Channel::PsgNoiseExtended => Some(ECHO_PSG4),
        Channel::Pcm => Some(ECHO_PCM),
        Channel::Control => None,
    }
}

/// Logical channel index into the per-channel status tables below, one
/// slot per driver-level channel (distinct from the hardware channel
/// numbers above - PSG3 and PSG3+PSG4-extended need independent status).
fn logical_index(channel: Channel) -> Option<usize> {
    match channel {
        Channel::Fm(FmChannel::Fm1) => Some(0),
        Channel::Fm(FmChannel::Fm2) => Some(1),
        Channel::Fm(FmChannel::Fm3) => Some(2),
        Channel::Fm(FmChannel::Fm4) => Some(3),
        Channel::Fm(FmChannel::Fm5) => Some(4),
        Channel::Fm(FmChannel::Fm6) => Some(5),
        Channel::Psg(PsgChannel::Psg1) => Some(6),
        Channel::Psg(PsgChannel::Psg2) => Some(7),
        Channel::Psg(PsgChannel::Psg3) => Some(8),
        Channel::PsgNoise => Some(9),
        Channel::PsgNoiseExtended => Some(10),
        Channel::Pcm => Some(11),
        Channel::Control => None,
    }
}

const NUM_LOGICAL: usize = 12;
const PSG3_INDEX: usize = 8;

#[derive(Clone, Copy, Default)]
struct Status {
    instrument: Option<u8>,
    volume: Option<u8>,
    panning: Option<u8>,
    note: Option<i32>,
}

/// Panning bucket boundaries straight from `write_esf`: anything under
/// `0x20` is hard left, `0x60` and up is hard right, everything between
/// is centered.
fn panning_bucket(pan: u8) -> u8 {
    if pan < 0x20 {
        0x80
    } else if pan >= 0x60 {
        0x40
    } else {
        0xC0
    }
}

/// Assembles `events` (already time-sorted) into an ESF byte stream.
///
/// `looped` selects the terminator (`FC` vs `FF`). If the event list
/// carries an explicit [`EventKind::LoopPoint`] (from an MML `L`
/// command), the `FD` marker is emitted inline at that event's
/// position; otherwise, when `looped` is set, it is emitted at the top
/// of the stream, matching the source tool's whole-track-loop behavior.
pub fn assemble(events: &[Event], looped: bool) -> Vec<u8> {
    let mut out = Vec::new();
    let mut status = [Status::default(); NUM_LOGICAL];
    let mut current_pan = [0x40u8; NUM_LOGICAL]; // centered, matches MIDI CC10 default of 64

    let has_loop_point = events.iter().any(|e| matches!(e.kind, EventKind::LoopPoint));
    if looped && !has_loop_point {
        out.push(ECHO_LOOPSTART);
    }

    let mut last_time: u32 = 0;

    for (i, event) in events.iter().enumerate() {
        if event.timestamp > last_time {
            write_delay(&mut out, (event.timestamp - last_time) as u64);
            last_time = event.timestamp;
        }

        match event.kind {
            EventKind::LoopPoint => {
                out.push(ECHO_LOOPSTART);
                continue;
            }
            EventKind::SetRegister { bank, reg, value } => {
                out.push(if bank { ECHO_REG_BANK1 } else { ECHO_REG_BANK0 });
                out.push(reg);
                out.push(value);
                continue;
            }
            EventKind::SetFlags { set, mask } => {
                out.push(if set { ECHO_FLAG_SET } else { ECHO_FLAG_CLEAR });
                out.push(mask);
                continue;
            }
            EventKind::Lock => {
                if let Some(index) = logical_index(event.channel) {
                    out.push(ECHO_LOCK | (index as u8 & 0x0F));
                }
                continue;
            }
            EventKind::SetTempo(_) | EventKind::Nop | EventKind::SetRawFreq(_) => continue,
            _ => {}
        }

        let index = match logical_index(event.channel) {
            Some(i) => i,
            None => continue,
        };

        let panning = panning_bucket(current_pan[index]);

        match event.kind {
            EventKind::SetInstrument(instrument) => {
                if Some(instrument) != status[index].instrument {
                    status[index].instrument = Some(instrument);
                    status[index].volume = None;
                    write_instrument(&mut out, event.channel, instrument);
                }
            }
            EventKind::SetVolume(volume) => {
                let volume = volume.get();
                if Some(volume) != status[index].volume {
                    status[index].volume = Some(volume);
                    write_volume(&mut out, event.channel, volume);
                }
            }
            EventKind::SetPan(pan) => {
                current_pan[index] = pan.get();
                let bucket = panning_bucket(pan.get());
                if Some(bucket) != status[index].panning {
                    status[index].panning = Some(bucket);
                    write_panning(&mut out, event.channel, bucket);
                }
            }
            EventKind::NoteOn(note) => {
                if status[index].instrument.is_none() {
                    continue;
                }

                if event.channel == Channel::PsgNoiseExtended && status[PSG3_INDEX].volume != Some(0) {
                    status[PSG3_INDEX].volume = Some(0);
                    write_volume(&mut out, Channel::Psg(PsgChannel::Psg3), 0);
                }
                if event.channel == Channel::PsgNoiseExtended {
                    status[PSG3_INDEX].instrument = status[index].instrument;
                }

                if status[index].panning != Some(panning) {
                    status[index].panning = Some(panning);
                    write_panning(&mut out, event.channel, panning);
                }

                status[index].note = Some(note as i32);
                write_noteon(&mut out, event.channel, note as i32);
            }
            EventKind::NoteOff => {
                // Peeks at the immediate next event in the sorted list, not
                // the next event on this same channel - carried forward
                // from the original tool's behavior.
                if let Some(next) = events.get(i + 1) {
                    if matches!(next.kind, EventKind::NoteOn(_)) {
                        continue;
                    }
                }
                status[index].note = None;
                write_noteoff(&mut out, event.channel);
            }
            EventKind::Slide(note) => {
                let current = match status[index].note {
                    Some(n) => n,
                    None => continue,
                };
                let note = note as i32;
                if current == note {
                    continue;
                }
                status[index].note = Some(note);
                write_slide(&mut out, event.channel, note);
            }
            _ => {}
        }
    }

    if looped {
        out.push(ECHO_LOOPEND);
    } else {
        out.push(ECHO_STOP);
    }
    out
}

fn write_noteon(out: &mut Vec<u8>, channel: Channel, note: i32) {
    match channel {
        Channel::Fm(_) => {
            let note = (note - 12).clamp(0, 95);
            let octave = note / 12;
            let semitone = note % 12;
            let param = (octave * 0x20 + semitone * 2 + 1) as u8;
            out.push(ECHO_NOTEON | hw_channel(channel).unwrap());
            out.push(param);
        }
        Channel::Psg(_) => {
            let note = (note - 48).clamp(0, 59);
            let octave = note / 12;
            let semitone = note % 12;
            let param = (octave * 24 + semitone * 2) as u8;
            out.push(ECHO_NOTEON | hw_channel(channel).unwrap());
            out.push(param);
        }
        Channel::PsgNoise => {
            let mut note = (note - 48) / 12;
            note = note.clamp(0, 2);
            note = 2 - note;
            out.push(ECHO_NOTEON | ECHO_PSG4);
            out.push((note + 4) as u8);
        }
        Channel::PsgNoiseExtended => {
            write_noteon(out, Channel::Psg(PsgChannel::Psg3), note);
            out.push(ECHO_NOTEON | ECHO_PSG4);
            out.push(0x07);
        }
        Channel::Pcm => {
            out.push(ECHO_NOTEON | ECHO_PCM);
            out.push(note as u8);
        }
        Channel::Control => {}
    }
}

fn write_noteoff(out: &mut Vec<u8>, channel: Channel) {
    let hw = match channel {
        Channel::PsgNoiseExtended => ECHO_PSG4,
        other => match hw_channel(other) {
            Some(h) => h,
            None => return,
        },
    };
    out.push(ECHO_NOTEOFF | hw);
}

fn write_slide(out: &mut Vec<u8>, channel: Channel, note_16ths: i32) {
    match channel {
        Channel::Fm(_) => {
            let note = (note_16ths - (12 << 4)).clamp(0, 95 << 4);
            let octave = (note >> 4) / 12;
            let index = (note % (12 << 4)) as usize;
            let freq = FM_FREQ[index] as u32 | ((octave as u32) << 11);
            out.push(ECHO_FREQ | hw_channel(channel).unwrap());
            out.push((freq >> 8) as u8);
            out.push((freq & 0xFF) as u8);
        }
        Channel::Psg(_) | Channel::PsgNoiseExtended => {
            let note = (note_16ths - (48 << 4)).clamp(0, 59 << 4);
            let octave = (note >> 4) / 12;
            let index = (note % (12 << 4)) as usize;
            let freq = PSG_FREQ[index] >> octave;
            let hw = if channel == Channel::PsgNoiseExtended {
                ECHO_PSG3
            } else {
                hw_channel(channel).unwrap()
            };
            out.push(ECHO_FREQ | hw);
            out.push((freq & 0x0F) as u8);
            out.push((freq >> 4) as u8);
        }
        Channel::PsgNoise => {
            let mut note = (note_16ths - (48 << 4)) / (12 << 4);
            note = note.clamp(0, 2);
            note = 2 - note;
            out.push(ECHO_FREQ | ECHO_PSG4);
            out.push(note as u8);
        }
        Channel::Pcm | Channel::Control => {}
    }
}

fn write_instrument(out: &mut Vec<u8>, channel: Channel, instrument: u8) {
    if channel == Channel::PsgNoiseExtended {
        out.push(ECHO_INSTR | ECHO_PSG3);
        out.push(instrument);
    }
    if channel == Channel::Pcm {
        return;
    }
    let hw = match channel {
        Channel::PsgNoiseExtended => ECHO_PSG4,
        other => match hw_channel(other) {
            Some(h) => h,
            None => return,
        },
    };
    out.push(ECHO_INSTR | hw);
    out.push(instrument);
}

fn write_volume(out: &mut Vec<u8>, channel: Channel, volume: u8) {
    match channel {
        Channel::Fm(_) => {
            out.push(ECHO_VOLUME | hw_channel(channel).unwrap());
            out.push(VOLUME_FM[volume as usize & 0x7F]);
        }
        Channel::Psg(_) | Channel::PsgNoise | Channel::PsgNoiseExtended => {
            let hw = if channel == Channel::PsgNoiseExtended {
                ECHO_PSG4
            } else {
                hw_channel(channel).unwrap()
            };
            out.push(ECHO_VOLUME | hw);
            out.push(VOLUME_PSG[volume as usize & 0x7F]);
        }
        Channel::Pcm | Channel::Control => {}
    }
}

fn write_panning(out: &mut Vec<u8>, channel: Channel, panning: u8) {
    let hw = match channel {
        Channel::Fm(_) => hw_channel(channel).unwrap(),
        Channel::Pcm => ECHO_FM6,
        _ => return,
    };
    out.push(ECHO_PAN | hw);
    out.push(panning);
}

/// Emits a delay of `amount` ticks, preferring the short 4-bit `Dk` form
/// (1..16 ticks) over the long `FE nn` form (1..256, `nn=0` meaning 256)
/// whenever the whole remaining delay fits in it.
fn write_delay(out: &mut Vec<u8>, mut amount: u64) {
    while amount > 0 {
        if amount <= 16 {
            out.push(0xD0 | (amount - 1) as u8);
            return;
        }
        let chunk = amount.min(0x100);
        amount -= chunk;
        out.push(ECHO_DELAY);
        out.push(if chunk == 0x100 { 0x00 } else { chunk as u8 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Pan;

    #[test]
    fn note_off_elided_when_immediately_followed_by_same_channel_note_on() {
        let events = vec![
            Event::new(0, Channel::Fm(FmChannel::Fm1), EventKind::SetInstrument(0)),
            Event::new(0, Channel::Fm(FmChannel::Fm1), EventKind::SetVolume(crate::event::Volume::new(100))),
            Event::new(0, Channel::Fm(FmChannel::Fm1), EventKind::NoteOn(60)),
            Event::new(10, Channel::Fm(FmChannel::Fm1), EventKind::NoteOff),
            Event::new(10, Channel::Fm(FmChannel::Fm1), EventKind::NoteOn(64)),
        ];
        let bytes = assemble(&events, false);
        // No standalone note-off opcode (0x10 | 0x00) should appear between the two note-ons.
        let noteoff_count = bytes.windows(1).filter(|w| w[0] == (ECHO_NOTEOFF | ECHO_FM1)).count();
        assert_eq!(noteoff_count, 0);
    }

    #[test]
    fn note_off_kept_when_a_different_channel_event_intervenes() {
        let events = vec![
            Event::new(0, Channel::Fm(FmChannel::Fm1), EventKind::SetInstrument(0)),
            Event::new(0, Channel::Fm(FmChannel::Fm1), EventKind::NoteOn(60)),
            Event::new(10, Channel::Fm(FmChannel::Fm1), EventKind::NoteOff),
            Event::new(10, Channel::Fm(FmChannel::Fm2), EventKind::SetInstrument(1)),
            Event::new(10, Channel::Fm(FmChannel::Fm1), EventKind::NoteOn(64)),
        ];
        let bytes = assemble(&events, false);
        let noteoff_count = bytes.iter().filter(|&&b| b == (ECHO_NOTEOFF | ECHO_FM1)).count();
        assert_eq!(noteoff_count, 1);
    }

    #[test]
    fn note_off_elided_when_next_event_is_a_note_on_of_a_different_channel() {
        // Carried-forward quirk: elision peeks at the literal next event in
        // the sorted list, not the next event of the same channel.
        let events = vec![
            Event::new(0, Channel::Fm(FmChannel::Fm1), EventKind::SetInstrument(0)),
            Event::new(0, Channel::Fm(FmChannel::Fm1), EventKind::NoteOn(60)),
            Event::new(10, Channel::Fm(FmChannel::Fm1), EventKind::NoteOff),
            Event::new(10, Channel::Fm(FmChannel::Fm2), EventKind::SetInstrument(1)),
            Event::new(10, Channel::Fm(FmChannel::Fm2), EventKind::NoteOn(64)),
        ];
        let bytes = assemble(&events, false);
        let noteoff_count = bytes.iter().filter(|&&b| b == (ECHO_NOTEOFF | ECHO_FM1)).count();
        assert_eq!(noteoff_count, 0);
    }

    #[test]
    fn delay_splits_into_0x100_chunks_plus_remainder() {
        let events = vec![
            Event::new(0, Channel::Fm(FmChannel::Fm1), EventKind::SetInstrument(0)),
            Event::new(276, Channel::Fm(FmChannel::Fm1), EventKind::SetInstrument(1)),
        ];
        let bytes = assemble(&events, false);
        // 276 = 0x100 + 0x14: one full-size delay chunk, then a 0x14 remainder.
        let delay_positions: Vec<usize> = bytes
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b == ECHO_DELAY)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(delay_positions.len(), 2);
        assert_eq!(bytes[delay_positions[0] + 1], 0x00);
        assert_eq!(bytes[delay_positions[1] + 1], 0x14);
    }

    #[test]
    fn short_delay_uses_the_4bit_form() {
        let events = vec![
            Event::new(0, Channel::Fm(FmChannel::Fm1), EventKind::SetInstrument(0)),
            Event::new(9, Channel::Fm(FmChannel::Fm1), EventKind::SetInstrument(1)),
        ];
        let bytes = assemble(&events, false);
        assert!(bytes.contains(&(0xD0 | 8)));
        assert!(!bytes.contains(&ECHO_DELAY));
    }

    #[test]
    fn centered_pan_never_emits_a_panning_event() {
        let events = vec![
            Event::new(0, Channel::Fm(FmChannel::Fm1), EventKind::SetPan(Pan::new(64))),
        ];
        let bytes = assemble(&events, false);
        assert!(!bytes.iter().any(|&b| b & 0xF0 == ECHO_PAN && b != ECHO_STOP));
    }

    #[test]
    fn loop_point_is_emitted_inline_rather_than_only_at_the_top() {
        let events = vec![
            Event::new(0, Channel::Fm(FmChannel::Fm1), EventKind::SetInstrument(0)),
            Event::new(20, Channel::Control, EventKind::LoopPoint),
            Event::new(20, Channel::Fm(FmChannel::Fm1), EventKind::NoteOn(60)),
        ];
        let bytes = assemble(&events, true);
        assert_eq!(bytes[0], ECHO_INSTR | ECHO_FM1);
        assert!(bytes.contains(&ECHO_LOOPSTART));
        // exactly one FD: inline, not also duplicated at the top.
        assert_eq!(bytes.iter().filter(|&&b| b == ECHO_LOOPSTART).count(), 1);
        assert_eq!(*bytes.last().unwrap(), ECHO_LOOPEND);
    }

    #[test]
    fn raw_register_write_picks_bank_opcode() {
        let events = vec![Event::new(
            0,
            Channel::Control,
            EventKind::SetRegister {
                bank: true,
                reg: 0xB4,
                value: 0xC0,
            },
        )];
        let bytes = assemble(&events, false);
        assert_eq!(&bytes[0..3], &[ECHO_REG_BANK1, 0xB4, 0xC0]);
    }

    #[test]
    fn channel_lock_encodes_logical_index_in_low_nibble() {
        let events = vec![Event::new(0, Channel::Fm(FmChannel::Fm3), EventKind::Lock)];
        let bytes = assemble(&events, false);
        assert_eq!(bytes[0], ECHO_LOCK | 2);
    }
}
