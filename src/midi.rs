//! Standard MIDI File ingestion: the front end that turns a Type 0/1 SMF
//! into the driver-level [`Event`](crate::event::Event) stream every back
//! end consumes.
//!
//! Only the subset of General MIDI this driver can actually play is
//! interpreted: note on/off, program change (mapped through an
//! instrument table), control change 7/10 (volume/pan), pitch bend, and
//! the tempo and SMPTE-offset meta events needed to resolve delta-times
//! to 60 Hz ticks. Everything else is skipped byte-for-byte.

use crate::byte_iter::ByteIter;
use crate::event::{Channel, Event, EventKind, FmChannel, Pan, Volume};
use std::io::Read;
use std::path::Path;

const NUM_CHANNELS: usize = 16;

/// MIDI channel 10 (index 9), the General MIDI percussion channel, always
/// routes to the PCM channel and cannot be remapped.
const PERCUSSION_CHANNEL: usize = 9;

/// A caller-supplied mapping from a MIDI channel (0-15) to a driver
/// channel. Channel 9 (the GM percussion channel) is fixed to `Pcm` and
/// cannot be overridden, per the channel mapping invariant.
#[derive(Clone, Debug)]
pub struct ChannelMap {
    slots: [Option<Channel>; NUM_CHANNELS],
}

impl Default for ChannelMap {
    /// The conventional mapping: MIDI channels 0-5 to FM1-6, 6-8 to
    /// PSG1-3, channel 9 fixed to PCM.
    fn default() -> Self {
        let mut slots = [None; NUM_CHANNELS];
        slots[0] = Some(Channel::Fm(FmChannel::Fm1));
        slots[1] = Some(Channel::Fm(FmChannel::Fm2));
        slots[2] = Some(Channel::Fm(FmChannel::Fm3));
        slots[3] = Some(Channel::Fm(FmChannel::Fm4));
        slots[4] = Some(Channel::Fm(FmChannel::Fm5));
        slots[5] = Some(Channel::Fm(FmChannel::Fm6));
        slots[6] = Some(Channel::Psg(crate::event::PsgChannel::Psg1));
        slots[7] = Some(Channel::Psg(crate::event::PsgChannel::Psg2));
        slots[8] = Some(Channel::Psg(crate::event::PsgChannel::Psg3));
        slots[PERCUSSION_CHANNEL] = Some(Channel::Pcm);
        Self { slots }
    }
}

impl ChannelMap {
    /// Assigns `midi_channel` to `channel`. A request to touch the
    /// percussion channel is silently ignored; it is always `Pcm`.
    pub fn set(&mut self, midi_channel: u8, channel: Option<Channel>) {
        let index = midi_channel as usize & 0x0F;
        if index == PERCUSSION_CHANNEL {
            return;
        }
        self.slots[index] = channel;
    }

    pub fn get(&self, midi_channel: u8) -> Option<Channel> {
        self.slots[midi_channel as usize & 0x0F]
    }
}

/// One instrument kind's worth of MIDI program/note -> Echo instrument
/// mapping, see the instrument mapping invariant in the data model: for
/// each kind in `{FM, PSG, PCM}` a record of `{echo_id, transpose, gain}`
/// keyed by program (or, for PCM, by MIDI note).
#[derive(Clone, Copy, Debug)]
pub struct InstrumentMapEntry {
    /// The Echo-side instrument id this program maps to, or `None` if the
    /// program has no mapping (`-1` in the spec's record).
    pub echo_id: Option<u8>,
    pub transpose: i32,
    /// Percent gain applied on top of the composed MIDI volume.
    pub gain: u32,
}

impl Default for InstrumentMapEntry {
    fn default() -> Self {
        Self {
            echo_id: Some(0),
            transpose: 0,
            gain: 100,
        }
    }
}

/// Program/note -> instrument mapping for one driver channel kind.
#[derive(Clone, Debug)]
pub struct InstrumentMap {
    entries: [InstrumentMapEntry; 128],
}

impl Default for InstrumentMap {
    fn default() -> Self {
        Self {
            entries: [InstrumentMapEntry::default(); 128],
        }
    }
}

impl InstrumentMap {
    pub fn set(&mut self, program_or_note: u8, entry: InstrumentMapEntry) {
        self.entries[program_or_note as usize & 0x7F] = entry;
    }

    pub fn get(&self, program_or_note: u8) -> InstrumentMapEntry {
        self.entries[program_or_note as usize & 0x7F]
    }
}

/// The three instrument maps, one per Echo channel kind.
#[derive(Clone, Debug, Default)]
pub struct InstrumentMaps {
    pub fm: InstrumentMap,
    pub psg: InstrumentMap,
    /// Keyed by MIDI note rather than program, since percussion has no
    /// program changes.
    pub pcm: InstrumentMap,
}

impl InstrumentMaps {
    fn for_channel(&self, channel: Channel) -> &InstrumentMap {
        match channel {
            Channel::Fm(_) => &self.fm,
            Channel::Psg(_) | Channel::PsgNoise | Channel::PsgNoiseExtended => &self.psg,
            Channel::Pcm | Channel::Control => &self.pcm,
        }
    }
}

/// How far a MIDI pitch bend of full range (`0x2000` either direction)
/// moves a note, in driver pitch units (semitone * 16). The source tool's
/// default is a whole tone (2 semitones = 32 units).
#[derive(Clone, Copy, Debug)]
pub struct PitchRange {
    units_at_max_bend: u16,
}

impl Default for PitchRange {
    fn default() -> Self {
        Self {
            units_at_max_bend: 32,
        }
    }
}

impl PitchRange {
    pub fn new(semitones: u8) -> Self {
        Self {
            units_at_max_bend: semitones as u16 * 16,
        }
    }

    /// Converts a 14-bit MIDI pitch wheel value to a pitch offset in
    /// driver units. Division truncates toward zero, matching the
    /// originating tool exactly rather than rounding to nearest.
    fn offset_for(&self, wheel: u16) -> i32 {
        let centered = wheel as i32 - 0x2000;
        let factor = 0x2000 / self.units_at_max_bend.max(1) as i32;
        if factor == 0 {
            0
        } else {
            centered / factor
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Options {
    pub channel_map: ChannelMap,
    pub pitch_range: PitchRange,
    pub instrument_maps: InstrumentMaps,
}

/// Composes the final note-on volume: channel volume scaled by velocity
/// and by the mapped instrument's percent gain, saturating to `0..127`.
fn compose_volume(channel_volume: u8, velocity: u8, gain_percent: u32) -> u8 {
    let v = channel_volume as u32 * velocity as u32 / 127 * gain_percent / 100;
    v.min(127) as u8
}

/// Per-MIDI-channel running state needed to compose volume and resolve
/// pitch-wheel slides.
#[derive(Clone, Copy, Debug)]
struct ChannelState {
    program: u8,
    channel_volume: u8,
    note_velocity: u8,
    current_note: Option<u8>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            program: 0,
            channel_volume: 127,
            note_velocity: 127,
            current_note: None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Timing {
    Metrical { ppqn: u16 },
    Smpte { frames_per_second: u16, ticks_per_frame: u8 },
}

/// Running accumulator that resolves MIDI delta-times into 60 Hz ticks,
/// reproducing the originating tool's 48.16 fixed-point arithmetic
/// exactly (including its integer truncation).
struct TickClock {
    timing: Timing,
    tempo_us_per_quarter: u32,
    fixed_point_remainder: u64,
    ticks: u32,
}

impl TickClock {
    fn new(timing: Timing) -> Self {
        Self {
            timing,
            tempo_us_per_quarter: 500_000,
            fixed_point_remainder: 0,
            ticks: 0,
        }
    }

    fn set_tempo(&mut self, us_per_quarter: u32) {
        self.tempo_us_per_quarter = us_per_quarter.max(1);
    }

    fn set_smpte(&mut self, frames_per_second: u16, ticks_per_frame: u8) {
        self.timing = Timing::Smpte {
            frames_per_second,
            ticks_per_frame,
        };
    }

    /// Advances the clock by `delta` MIDI ticks and returns the new
    /// absolute tick count at 60 Hz.
    fn advance(&mut self, delta: u32) -> u32 {
        let value: u64 = match self.timing {
            Timing::Metrical { ppqn } => {
                let mut value = delta as u64;
                value *= 60 * 60 << 16;
                value /= self.tempo_us_per_quarter as u64;
                value /= ppqn.max(1) as u64;
                value
            }
            Timing::Smpte {
                frames_per_second,
                ticks_per_frame,
            } => {
                let rate_x100 = smpte_rate_x100(frames_per_second);
                let mut value = delta as u64;
                value *= 60 * 100 << 16;
                value /= rate_x100.max(1) as u64;
                value /= ticks_per_frame.max(1) as u64;
                value
            }
        };
        let total = self.fixed_point_remainder + value;
        let whole_ticks = (total >> 16) as u32;
        self.fixed_point_remainder = total & 0xFFFF;
        self.ticks += whole_ticks;
        self.ticks
    }
}

fn smpte_rate_x100(frames_per_second: u16) -> u32 {
    match frames_per_second {
        29 => 2997, // drop-frame 29.97
        other => other as u32 * 100,
    }
}

/// Parses a Standard MIDI File from `reader` and flattens every track into
/// one driver-ready, fully sorted event stream.
pub fn parse<R: Read>(reader: R, options: &Options) -> crate::error::LibResult<Vec<Event>> {
    let mut iter = ByteIter::new(reader.bytes()).map_err(wrap_io)?;
    iter.expect_tag("MThd").map_err(wrap_io)?;
    let header_len = iter.read_u32().map_err(wrap_io)?;
    if header_len != 6 {
        malformed!("MThd header length {} is not 6", header_len);
    }
    let format = iter.read_u16().map_err(wrap_io)?;
    let num_tracks = iter.read_u16().map_err(wrap_io)?;
    let division = iter.read_u16().map_err(wrap_io)?;
    if format > 2 {
        malformed!("unsupported SMF format {}", format);
    }

    let timing = if division & 0x8000 == 0 {
        Timing::Metrical { ppqn: division & 0x7FFF }
    } else {
        let frames_per_second = (-((division >> 8) as i8) as u8) as u16;
        let ticks_per_frame = (division & 0xFF) as u8;
        Timing::Smpte {
            frames_per_second,
            ticks_per_frame,
        }
    };

    let mut events = Vec::new();
    let mut clock = TickClock::new(timing);
    for _ in 0..num_tracks {
        parse_track(&mut iter, options, &mut clock, &mut events)?;
    }
    crate::event::sort_events(&mut events);
    Ok(events)
}

pub fn parse_file<P: AsRef<Path>>(path: P, options: &Options) -> crate::error::LibResult<Vec<Event>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| crate::error::LibError::IoOpen {
        path: path.to_path_buf(),
        source,
    })?;
    parse(std::io::BufReader::new(file), options)
}

fn wrap_io(source: crate::byte_iter::ByteError) -> crate::error::LibError {
    crate::error::LibError::IoRead {
        site: site!(),
        source,
    }
}

fn parse_track<R: Read>(
    iter: &mut ByteIter<R>,
    options: &Options,
    clock: &mut TickClock,
    events: &mut Vec<Event>,
) -> crate::error::LibResult<()> {
    iter.expect_tag("MTrk").map_err(wrap_io)?;
    let track_len = iter.read_u32().map_err(wrap_io)?;
    iter.set_size_limit(track_len as u64);

    let mut running_status: Option<u8> = None;
    let mut channel_state: [ChannelState; NUM_CHANNELS] = [ChannelState::default(); NUM_CHANNELS];

    while !iter.is_end() {
        let delta = iter.read_vlq_u32().map_err(wrap_io)?;
        let ticks = clock.advance(delta);

        let peeked = iter.peek().ok_or_else(|| malformed_e!("unexpected end of track"))?;
        let status = if peeked & 0x80 != 0 {
            iter.read_or_die().map_err(wrap_io)?
        } else {
            running_status.ok_or_else(|| malformed_e!("running status used before any status byte"))?
        };

        if status == 0xFF {
            let meta_type = iter.read_or_die().map_err(wrap_io)?;
            let len = iter.read_vlq_u32().map_err(wrap_io)?;
            let data = iter.read_n(len as usize).map_err(wrap_io)?;
            match meta_type {
                0x51 if data.len() == 3 => {
                    let us = ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | data[2] as u32;
                    clock.set_tempo(us);
                    events.push(Event::new(
                        ticks,
                        Channel::Control,
                        EventKind::SetTempo(us),
                    ));
                }
                0x54 if data.len() == 5 => {
                    let hour_byte = data[0] & 0x1F;
                    let frames_per_second = match data[0] >> 5 {
                        0 => 24,
                        1 => 25,
                        2 => 29,
                        _ => 30,
                    };
                    let _ = hour_byte;
                    clock.set_smpte(frames_per_second, 100);
                }
                _ => {}
            }
            running_status = None;
            continue;
        }

        if status == 0xF0 || status == 0xF7 {
            let len = iter.read_vlq_u32().map_err(wrap_io)?;
            iter.read_n(len as usize).map_err(wrap_io)?;
            running_status = None;
            continue;
        }

        running_status = Some(status);
        let kind_bits = status & 0xF0;
        let midi_channel = status & 0x0F;
        let mapped = options.channel_map.get(midi_channel);

        let state = &mut channel_state[midi_channel as usize];

        match kind_bits {
            0x80 => {
                let _note = iter.read_or_die().map_err(wrap_io)?;
                let _velocity = iter.read_or_die().map_err(wrap_io)?;
                state.current_note = None;
                if let Some(channel) = mapped {
                    events.push(Event::new(ticks, channel, EventKind::NoteOff));
                }
            }
            0x90 => {
                let note = (iter.read_or_die().map_err(wrap_io)?) & 0x7F;
                let velocity = (iter.read_or_die().map_err(wrap_io)?) & 0x7F;
                if velocity == 0 {
                    state.current_note = None;
                    if let Some(channel) = mapped {
                        events.push(Event::new(ticks, channel, EventKind::NoteOff));
                    }
                } else {
                    state.note_velocity = velocity;
                    state.current_note = Some(note);
                    if let Some(channel) = mapped {
                        let is_pcm = matches!(channel, Channel::Pcm);
                        let entry = if is_pcm {
                            options.instrument_maps.pcm.get(note)
                        } else {
                            options
                                .instrument_maps
                                .for_channel(channel)
                                .get(state.program)
                        };
                        if is_pcm {
                            if let Some(echo_id) = entry.echo_id {
                                events.push(Event::new(
                                    ticks,
                                    channel,
                                    EventKind::SetInstrument(echo_id),
                                ));
                            }
                        }
                        let volume = compose_volume(state.channel_volume, velocity, entry.gain);
                        events.push(Event::new(
                            ticks,
                            channel,
                            EventKind::SetVolume(Volume::new(volume)),
                        ));
                        let transposed = (note as i32 + entry.transpose).clamp(0, 127) as u8;
                        events.push(Event::new(ticks, channel, EventKind::NoteOn(transposed)));
                    }
                }
            }
            0xA0 => {
                iter.read_or_die().map_err(wrap_io)?;
                iter.read_or_die().map_err(wrap_io)?;
            }
            0xB0 => {
                let controller = iter.read_or_die().map_err(wrap_io)?;
                let value = iter.read_or_die().map_err(wrap_io)? & 0x7F;
                match controller {
                    7 => {
                        state.channel_volume = value;
                        if let Some(channel) = mapped {
                            let is_pcm = matches!(channel, Channel::Pcm);
                            let gain = if is_pcm {
                                match state.current_note {
                                    Some(note) => options.instrument_maps.pcm.get(note).gain,
                                    None => 100,
                                }
                            } else {
                                options
                                    .instrument_maps
                                    .for_channel(channel)
                                    .get(state.program)
                                    .gain
                            };
                            let volume = compose_volume(value, state.note_velocity, gain);
                            events.push(Event::new(
                                ticks,
                                channel,
                                EventKind::SetVolume(Volume::new(volume)),
                            ));
                        }
                    }
                    10 => {
                        if let Some(channel) = mapped {
                            events.push(Event::new(
                                ticks,
                                channel,
                                EventKind::SetPan(Pan::new(value)),
                            ));
                        }
                    }
                    _ => {}
                }
            }
            0xC0 => {
                let program = iter.read_or_die().map_err(wrap_io)?;
                state.program = program;
                if let Some(channel) = mapped {
                    if !matches!(channel, Channel::Pcm) {
                        let entry = options.instrument_maps.for_channel(channel).get(program);
                        if let Some(echo_id) = entry.echo_id {
                            events.push(Event::new(
                                ticks,
                                channel,
                                EventKind::SetInstrument(echo_id),
                            ));
                        }
                    }
                }
            }
            0xD0 => {
                iter.read_or_die().map_err(wrap_io)?;
            }
            0xE0 => {
                let lsb = iter.read_or_die().map_err(wrap_io)?;
                let msb = iter.read_or_die().map_err(wrap_io)?;
                let wheel = ((msb as u16) << 7) | lsb as u16;
                if let (Some(channel), Some(note)) = (mapped, state.current_note) {
                    let offset = options.pitch_range.offset_for(wheel);
                    let base = note as i32 * 16;
                    let pitch = (base + offset).clamp(0, 0x7FF) as u16;
                    events.push(Event::new(ticks, channel, EventKind::Slide(pitch)));
                }
            }
            _ => {
                // Other System Common/Realtime messages (F1-F6, F8-FE)
                // carry no data bytes relevant to this driver; nothing to skip.
            }
        }
    }
    iter.clear_size_limit();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_chunk(out: &mut Vec<u8>, tag: &[u8; 4], body: &[u8]) {
        out.extend_from_slice(tag);
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
    }

    #[test]
    fn parses_single_note_on_off() {
        let mut track = Vec::new();
        track.extend_from_slice(&[0x00, 0x90, 60, 100]); // note on, ch0
        track.extend_from_slice(&[0x60, 0x80, 60, 0]); // note off after 96 ticks
        track.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]); // end of track

        let mut file = Vec::new();
        write_chunk(&mut file, b"MThd", &[0, 0, 0, 1, 0, 1, 0, 96]);
        write_chunk(&mut file, b"MTrk", &track);

        let options = Options::default();
        let events = parse(std::io::Cursor::new(file), &options).unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::NoteOn(note) if note == 60)));
        assert!(events.iter().any(|e| matches!(e.kind, EventKind::NoteOff)));
    }

    #[test]
    fn tempo_doubling_halves_tick_distance() {
        let mut track_slow = Vec::new();
        track_slow.extend_from_slice(&[0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20]); // 500000us
        track_slow.extend_from_slice(&[0x60, 0x90, 60, 100]);
        track_slow.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

        let mut track_fast = Vec::new();
        track_fast.extend_from_slice(&[0x00, 0xFF, 0x51, 0x03, 0x03, 0xD0, 0x90]); // 250000us
        track_fast.extend_from_slice(&[0x60, 0x90, 60, 100]);
        track_fast.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

        let mut file_slow = Vec::new();
        write_chunk(&mut file_slow, b"MThd", &[0, 0, 0, 1, 0, 1, 0, 96]);
        write_chunk(&mut file_slow, b"MTrk", &track_slow);

        let mut file_fast = Vec::new();
        write_chunk(&mut file_fast, b"MThd", &[0, 0, 0, 1, 0, 1, 0, 96]);
        write_chunk(&mut file_fast, b"MTrk", &track_fast);

        let options = Options::default();
        let slow = parse(std::io::Cursor::new(file_slow), &options).unwrap();
        let fast = parse(std::io::Cursor::new(file_fast), &options).unwrap();

        let slow_tick = slow
            .iter()
            .find(|e| matches!(e.kind, EventKind::NoteOn(_)))
            .unwrap()
            .timestamp;
        let fast_tick = fast
            .iter()
            .find(|e| matches!(e.kind, EventKind::NoteOn(_)))
            .unwrap()
            .timestamp;
        assert_eq!(slow_tick, fast_tick * 2);
    }

    #[test]
    fn pitch_wheel_truncates_toward_zero() {
        let range = PitchRange::default();
        // 0x2000 / 32 = 256; an offset of 300 divided by 256 truncates to 1, not 2.
        assert_eq!(range.offset_for(0x2000 + 300), 1);
    }

    #[test]
    fn percussion_channel_defaults_to_pcm() {
        let map = ChannelMap::default();
        assert_eq!(map.get(9), Some(Channel::Pcm));
    }

    #[test]
    fn percussion_channel_cannot_be_remapped() {
        let mut map = ChannelMap::default();
        map.set(9, Some(Channel::Fm(FmChannel::Fm1)));
        assert_eq!(map.get(9), Some(Channel::Pcm));
        map.set(9, None);
        assert_eq!(map.get(9), Some(Channel::Pcm));
    }

    #[test]
    fn compose_volume_applies_velocity_and_gain() {
        // 127 channel volume * 64 velocity / 127 * 50 gain / 100 = 32.
        assert_eq!(compose_volume(127, 64, 50), 32);
    }

    #[test]
    fn compose_volume_saturates_at_127() {
        assert_eq!(compose_volume(127, 127, 200), 127);
    }

    #[test]
    fn note_on_composes_volume_from_channel_volume_velocity_and_gain() {
        let mut track = Vec::new();
        track.extend_from_slice(&[0x00, 0xB0, 7, 100]); // channel volume 100
        track.extend_from_slice(&[0x00, 0xC0, 5]); // program 5
        track.extend_from_slice(&[0x00, 0x90, 60, 64]); // note on, velocity 64
        track.extend_from_slice(&[0x60, 0x80, 60, 0]);
        track.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

        let mut file = Vec::new();
        write_chunk(&mut file, b"MThd", &[0, 0, 0, 1, 0, 1, 0, 96]);
        write_chunk(&mut file, b"MTrk", &track);

        let mut options = Options::default();
        let mut fm_entry = InstrumentMapEntry::default();
        fm_entry.gain = 50;
        options.instrument_maps.fm.set(5, fm_entry);

        let events = parse(std::io::Cursor::new(file), &options).unwrap();
        // 100 * 64 / 127 * 50 / 100 = 25
        let volume = events
            .iter()
            .find_map(|e| match e.kind {
                EventKind::SetVolume(v) => Some(v),
                _ => None,
            })
            .unwrap();
        assert_eq!(volume.get(), 25);
    }

    #[test]
    fn note_on_applies_instrument_transpose() {
        let mut track = Vec::new();
        track.extend_from_slice(&[0x00, 0xC0, 5]);
        track.extend_from_slice(&[0x00, 0x90, 60, 100]);
        track.extend_from_slice(&[0x60, 0x80, 60, 0]);
        track.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

        let mut file = Vec::new();
        write_chunk(&mut file, b"MThd", &[0, 0, 0, 1, 0, 1, 0, 96]);
        write_chunk(&mut file, b"MTrk", &track);

        let mut options = Options::default();
        let mut fm_entry = InstrumentMapEntry::default();
        fm_entry.transpose = 12;
        options.instrument_maps.fm.set(5, fm_entry);

        let events = parse(std::io::Cursor::new(file), &options).unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::NoteOn(note) if note == 72)));
    }
}
