//! Assembles an ESF opcode stream into a standalone VGM file, the format
//! most trackers and emulators can already play back. Needs the FM/PSG
//! instrument banks and PCM sample bank the original ESF stream's
//! `SetInstrument`/key-on opcodes reference by index, since ESF itself
//! only ever carries an instrument *id*, never the instrument payload.

use crate::esf::tables::{FM_FREQ, PSG_FREQ};
use crate::instruments::eif;
use crate::error::LibResult;

const SAMPLES_PER_TICK: u32 = 735;
const HEADER_SIZE: usize = 0x100;

const ECHO_PCM_STOP: u8 = 0x1C;
const ECHO_PITCH_NOISE: u8 = 0x3B;
const ECHO_REG_BANK0: u8 = 0xF8;
const ECHO_REG_BANK1: u8 = 0xF9;
const ECHO_FLAG: u8 = 0xFA; // and 0xFB; both no-ops here
const ECHO_DELAY_SHORT: u8 = 0xD0;
const ECHO_DELAY_LONG: u8 = 0xFE;
const ECHO_LOCK: u8 = 0xE0;
const ECHO_LOOPSTART: u8 = 0xFD;
const ECHO_LOOPEND: u8 = 0xFC;
const ECHO_STOP: u8 = 0xFF;

/// Offsets into the driver's "offset table" for PSG envelope bytecode
/// pitch bytes, indexed by the byte's high nibble (`0..14`; `15` unused).
const PSG_PITCH_OFFSETS: [i8; 15] = [0, 1, 2, 3, 4, 6, 8, 12, -1, -2, -3, -4, -6, -8, -12];

/// GD3 tags for one assembled VGM file. `title`/`game`/`composer` are
/// caller-supplied; `system` defaults to the originating tool's fixed
/// string rather than a CLI argument, since the source converter never
/// exposed it as one.
#[derive(Clone, Debug)]
pub struct Gd3Tags {
    pub title: String,
    pub game: String,
    pub system: String,
    pub composer: String,
    pub release: String,
    pub ripped_by: String,
    pub notes: String,
}

impl Default for Gd3Tags {
    fn default() -> Self {
        Self {
            title: String::new(),
            game: String::new(),
            system: "Sega Mega Drive / Genesis".to_string(),
            composer: String::new(),
            release: String::new(),
            ripped_by: String::new(),
            notes: String::new(),
        }
    }
}

fn utf16_nul(s: &str) -> Vec<u8> {
    let mut out: Vec<u8> = s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    out.push(0);
    out.push(0);
    out
}

/// Builds a `"Gd3 "` metadata block. The source tool writes the
/// title/game/system/composer strings into both the English and
/// Japanese slots of each pair rather than leaving the Japanese slot
/// independently settable - preserved here rather than "fixed".
fn gd3_block(tags: &Gd3Tags) -> Vec<u8> {
    let mut payload = Vec::new();
    for doubled in [&tags.title, &tags.game, &tags.system, &tags.composer] {
        let bytes = utf16_nul(doubled);
        payload.extend_from_slice(&bytes);
        payload.extend_from_slice(&bytes);
    }
    payload.extend(utf16_nul(&tags.release));
    payload.extend(utf16_nul(&tags.ripped_by));
    payload.extend(utf16_nul(&tags.notes));

    let mut out = Vec::with_capacity(12 + payload.len());
    out.extend_from_slice(b"Gd3 ");
    out.extend_from_slice(&0x0100u32.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend(payload);
    out
}

fn psg_pitch_table() -> [u16; 84] {
    let mut table = [0u16; 84];
    for n in 0..72usize {
        let octave = n / 12;
        let within = n % 12;
        table[n] = PSG_FREQ[within * 16] >> octave;
    }
    table
}

fn fm_pitch_table() -> [u16; 96] {
    let mut table = [0u16; 96];
    for n in 0..96usize {
        let octave = (n / 12) as u32;
        let within = n % 12;
        table[n] = FM_FREQ[within * 16] | ((octave as u16) << 11);
    }
    table
}

#[derive(Clone, Copy, Default)]
struct FmState {
    tl_cache: [u8; 4],
    algorithm: u8,
    volume: u8,
}

#[derive(Clone, Default)]
struct PsgState {
    program: Vec<u8>,
    pos: usize,
    loop_pos: usize,
    playing: bool,
    channel_vol: u8,
    semitone: Option<u8>,
    raw_freq: u16,
}

struct Builder {
    commands: Vec<u8>,
    pcm_blob: Vec<u8>,
    sample_pos: u64,
    loop_byte_offset: Option<usize>,
    loop_sample_pos: Option<u64>,
    fm: [FmState; 6],
    psg: [PsgState; 4],
    pcm_registered: Vec<Option<(u32, u32)>>, // (offset, len) into pcm_blob, by instrument id
}

fn fm_part(chan: u8) -> (u8, u8) {
    (((chan >> 2) & 1), chan & 3)
}

fn algorithm_attenuated_ops(algorithm: u8) -> &'static [usize] {
    match algorithm {
        7 => &[0, 1, 2, 3],
        5 | 6 => &[1, 2, 3],
        4 => &[1, 3],
        _ => &[3],
    }
}

impl Builder {
    fn new() -> Self {
        Self {
            commands: Vec::new(),
            pcm_blob: Vec::new(),
            sample_pos: 0,
            loop_byte_offset: None,
            loop_sample_pos: None,
            fm: [FmState::default(); 6],
            psg: [PsgState::default(); 4],
            pcm_registered: Vec::new(),
        }
    }

    fn setup_preamble(&mut self) {
        // setup_ym2612_pcm: enable the DAC before anything else plays.
        self.ym_write(0, 0x2B, 0x80);
    }

    fn ym_write(&mut self, bank: u8, reg: u8, value: u8) {
        self.commands.push(if bank == 0 { 0x52 } else { 0x53 });
        self.commands.push(reg);
        self.commands.push(value);
    }

    fn psg_write(&mut self, value: u8) {
        self.commands.push(0x50);
        self.commands.push(value);
    }

    fn wait_samples(&mut self, mut samples: u64) {
        while samples > 0 {
            let chunk = samples.min(0xFFFF);
            self.commands.push(0x61);
            self.commands.extend_from_slice(&(chunk as u16).to_le_bytes());
            samples -= chunk;
        }
    }

    /// Advances `ticks` ticks, stepping every PSG channel's envelope
    /// bytecode program once per tick as the driver itself does, with a
    /// sample-accurate wait emitted between ticks.
    fn advance_ticks(&mut self, ticks: u64, pitch_table: &[u16; 84]) {
        for _ in 0..ticks {
            for index in 0..4 {
                self.step_psg_envelope(index, pitch_table);
            }
            self.wait_samples(SAMPLES_PER_TICK as u64);
            self.sample_pos += SAMPLES_PER_TICK as u64;
        }
    }

    fn load_fm_instrument(&mut self, chan_index: usize, chan: u8, instrument: &crate::instruments::FmInstrument) {
        let (bank, part) = fm_part(chan);
        self.ym_write(bank, 0xB0 + part, instrument.feedback << 3 | instrument.algorithm);
        for (op, operator) in instrument.operators.iter().enumerate() {
            let o = op as u8;
            self.ym_write(bank, 0x30 + o * 4 + part, operator.mul | eif_detune(operator.dt) << 4);
            self.ym_write(bank, 0x40 + o * 4 + part, operator.tl);
            self.ym_write(bank, 0x50 + o * 4 + part, operator.ar | operator.rs << 6);
            self.ym_write(bank, 0x60 + o * 4 + part, operator.dr);
            self.ym_write(bank, 0x70 + o * 4 + part, operator.sr);
            self.ym_write(bank, 0x80 + o * 4 + part, operator.rr | operator.sl << 4);
            self.ym_write(bank, 0x90 + o * 4 + part, operator.ssg_eg);
        }
        self.fm[chan_index].algorithm = instrument.algorithm;
        self.fm[chan_index].tl_cache = [
            instrument.operators[0].tl,
            instrument.operators[1].tl,
            instrument.operators[2].tl,
            instrument.operators[3].tl,
        ];
    }

    fn apply_fm_volume(&mut self, chan_index: usize, chan: u8, volume: u8) {
        self.fm[chan_index].volume = volume;
        let (bank, part) = fm_part(chan);
        let algorithm = self.fm[chan_index].algorithm;
        for &op in algorithm_attenuated_ops(algorithm) {
            let tl = self.fm[chan_index].tl_cache[op];
            let value = (tl as u16 + volume as u16).min(127) as u8;
            self.ym_write(bank, 0x40 + op as u8 * 4 + part, value);
        }
    }

    fn register_pcm(&mut self, instrument: usize, samples: &[Vec<u8>]) -> LibResult<(u32, u32)> {
        if self.pcm_registered.len() <= instrument {
            self.pcm_registered.resize(instrument + 1, None);
        }
        if let Some(entry) = self.pcm_registered[instrument] {
            return Ok(entry);
        }
        let data = samples
            .get(instrument)
            .ok_or_else(|| malformed_e!("PCM key-on referenced unknown instrument {}", instrument))?;
        let payload: &[u8] = match data.last() {
            Some(0xFF) => &data[..data.len() - 1],
            _ => &data[..],
        };
        let offset = self.pcm_blob.len() as u32;
        self.pcm_blob.extend_from_slice(b"\x67\x66\x00");
        self.pcm_blob.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        let data_offset = self.pcm_blob.len() as u32;
        self.pcm_blob.extend_from_slice(payload);
        let entry = (data_offset, payload.len() as u32);
        self.pcm_registered[instrument] = Some(entry);
        Ok(entry)
    }

    fn play_pcm(&mut self, offset: u32, len: u32) {
        self.commands.push(0xE0);
        self.commands.extend_from_slice(&offset.to_le_bytes());
        let mut remaining = len;
        while remaining > 0 {
            self.commands.push(0x80);
            remaining -= 1;
        }
    }

    fn step_psg_envelope(&mut self, index: usize, pitch_table: &[u16; 84]) {
        let hw_chan = index as u8; // 0..3, matching ECHO_PSG1..4 numbering
        if !self.psg[index].playing {
            self.psg_write(0x9F | hw_chan << 5);
            return;
        }
        let (instr_vol, instr_offset) = loop {
            let pos = self.psg[index].pos;
            let byte = match self.psg[index].program.get(pos) {
                Some(&b) => b,
                None => {
                    self.psg[index].playing = false;
                    break (0x0F, 0i8);
                }
            };
            match byte {
                0xFE => {
                    self.psg[index].loop_pos = pos;
                    self.psg[index].pos += 1;
                }
                0xFF => {
                    self.psg[index].pos = self.psg[index].loop_pos;
                }
                0xF0..=0xFD => {
                    self.psg[index].playing = false;
                    break (0x0F, 0i8);
                }
                b => {
                    self.psg[index].pos += 1;
                    let offset = PSG_PITCH_OFFSETS.get((b >> 4) as usize).copied().unwrap_or(0);
                    break (b & 0x0F, offset);
                }
            }
        };

        let volume = (self.psg[index].channel_vol as u16 + instr_vol as u16).min(15) as u8;

        if hw_chan == 3 {
            let base = self.psg[index].semitone.unwrap_or(0) as i32 + instr_offset as i32;
            let noise_code = base.clamp(0, 7) as u8;
            self.psg_write(0xE0 | noise_code);
            self.psg_write(0x80 | (3 << 5) | 0x10 | (15 - volume));
            return;
        }

        let freq = if let Some(semitone) = self.psg[index].semitone {
            let base = semitone as i32 + instr_offset as i32;
            if base < 0 || base as usize >= 72 {
                0
            } else {
                pitch_table[base as usize]
            }
        } else {
            self.psg[index].raw_freq
        };

        self.psg_write(0x80 | (hw_chan << 5) | (freq & 0x0F) as u8);
        self.psg_write((freq >> 4) as u8);
        self.psg_write(0x80 | (hw_chan << 5) | 0x10 | (15 - volume));
    }
}

fn eif_detune(linear_dt: u8) -> u8 {
    const TABLE: [u8; 7] = [0x07, 0x06, 0x05, 0x00, 0x01, 0x02, 0x03];
    TABLE[linear_dt.min(6) as usize]
}

/// Assembles `esf` into a complete VGM file. `fm_instruments` and
/// `psg_instruments` are banks of raw instrument payloads (29-byte EIF
/// blobs, and PSG envelope bytecode programs respectively) that
/// `SetInstrument`-equivalent opcodes reference by index; `pcm_samples`
/// is the bank `PCM key-on` opcodes reference the same way.
pub fn assemble(
    esf: &[u8],
    fm_instruments: &[Vec<u8>],
    psg_instruments: &[Vec<u8>],
    pcm_samples: &[Vec<u8>],
    looped: bool,
    gd3: Option<&Gd3Tags>,
) -> LibResult<Vec<u8>> {
    let mut b = Builder::new();
    b.setup_preamble();

    let pitch_table = psg_pitch_table();
    let fm_pitch = fm_pitch_table();

    let mut pos = 0usize;
    'outer: while pos < esf.len() {
        let op = esf[pos];
        pos += 1;

        match op {
            0x00..=0x06 if op != 0x03 && op != 0x07 => {
                let nn = take(esf, &mut pos, 1, op)?[0];
                let chan = op;
                let (bank, part) = fm_part(chan);
                let raw = (nn >> 1) as usize;
                let n = (raw / 16) * 12 + raw % 16;
                let freq = fm_pitch.get(n).copied().unwrap_or(0);
                b.ym_write(bank, 0xA4 + part, (freq >> 8) as u8);
                b.ym_write(bank, 0xA0 + part, (freq & 0xFF) as u8);
                b.ym_write(0, 0x28, 0xF0 | fm_key_code(chan));
            }
            0x08..=0x0A => {
                let nn = take(esf, &mut pos, 1, op)?[0];
                let index = (op - 0x08) as usize;
                b.psg[index].playing = true;
                b.psg[index].semitone = Some(nn / 2);
                b.psg[index].pos = 0;
            }
            0x0B => {
                let nn = take(esf, &mut pos, 1, op)?[0];
                b.psg[3].playing = true;
                b.psg[3].semitone = Some(nn.saturating_sub(4));
                b.psg[3].pos = 0;
            }
            0x0C => {
                let instrument = take(esf, &mut pos, 1, op)?[0] as usize;
                let (offset, len) = b.register_pcm(instrument, pcm_samples)?;
                b.play_pcm(offset, len);
            }
            0x10..=0x16 if op != 0x13 && op != 0x17 => {
                b.ym_write(0, 0x28, fm_key_code(op - 0x10));
            }
            0x18..=0x1B => {
                let index = (op - 0x18) as usize;
                b.psg[index].playing = false;
            }
            ECHO_PCM_STOP => {}
            0x20..=0x26 if op != 0x23 && op != 0x27 => {
                let nn = take(esf, &mut pos, 1, op)?[0];
                let chan = op - 0x20;
                let chan_index = fm_channel_index(chan)?;
                b.apply_fm_volume(chan_index, chan, nn);
            }
            0x28..=0x2B => {
                let nn = take(esf, &mut pos, 1, op)?[0];
                let index = (op - 0x28) as usize;
                b.psg[index].channel_vol = nn;
            }
            0x30..=0x36 if op != 0x33 && op != 0x37 => {
                let chan = op - 0x30;
                let nn = take(esf, &mut pos, 1, op)?[0];
                let (bank, part) = fm_part(chan);
                if nn & 0x80 != 0 {
                    let semitone = (nn & 0x7F) as usize;
                    let freq = *fm_pitch.get(semitone).unwrap_or(&0);
                    b.ym_write(bank, 0xA4 + part, (freq >> 8) as u8);
                    b.ym_write(bank, 0xA0 + part, (freq & 0xFF) as u8);
                } else {
                    let ll = take(esf, &mut pos, 1, op)?[0];
                    let freq = ((nn as u16) << 8) | ll as u16;
                    b.ym_write(bank, 0xA4 + part, (freq >> 8) as u8);
                    b.ym_write(bank, 0xA0 + part, (freq & 0xFF) as u8);
                }
            }
            0x38..=0x3A => {
                let index = (op - 0x38) as usize;
                let nn = take(esf, &mut pos, 1, op)?[0];
                if nn & 0x80 != 0 {
                    b.psg[index].semitone = Some(nn & 0x7F);
                } else {
                    let ll = take(esf, &mut pos, 1, op)?[0];
                    let freq = (nn as u16) | ((ll as u16) << 4);
                    b.psg[index].semitone = None;
                    b.psg[index].raw_freq = freq;
                }
            }
            ECHO_PITCH_NOISE => {
                let _nn = take(esf, &mut pos, 1, op)?[0];
            }
            0xF0..=0xF6 => {
                let nn = take(esf, &mut pos, 1, op)?[0];
                let chan = op - 0xF0;
                let (bank, part) = fm_part(chan);
                b.ym_write(bank, 0xB4 + part, nn);
            }
            0x40..=0x46 if op != 0x43 && op != 0x47 => {
                let instrument = take(esf, &mut pos, 1, op)?[0] as usize;
                let chan = op - 0x40;
                let chan_index = fm_channel_index(chan)?;
                let bytes = fm_instruments
                    .get(instrument)
                    .ok_or_else(|| malformed_e!("unknown FM instrument {}", instrument))?;
                let instr = eif::parse(bytes)?;
                b.load_fm_instrument(chan_index, chan, &instr);
            }
            0x48..=0x4B => {
                let instrument = take(esf, &mut pos, 1, op)?[0] as usize;
                let index = (op - 0x48) as usize;
                let program = psg_instruments
                    .get(instrument)
                    .ok_or_else(|| malformed_e!("unknown PSG instrument {}", instrument))?
                    .clone();
                b.psg[index].program = program;
                b.psg[index].pos = 0;
                b.psg[index].loop_pos = 0;
            }
            ECHO_REG_BANK0 | ECHO_REG_BANK1 => {
                let args = take(esf, &mut pos, 2, op)?;
                b.ym_write(if op == ECHO_REG_BANK1 { 1 } else { 0 }, args[0], args[1]);
            }
            ECHO_FLAG | 0xFB => {
                let _mask = take(esf, &mut pos, 1, op)?[0];
            }
            ECHO_DELAY_SHORT..=0xDF => {
                let ticks = (op & 0x0F) as u64 + 1;
                b.advance_ticks(ticks, &pitch_table);
            }
            ECHO_DELAY_LONG => {
                let nn = take(esf, &mut pos, 1, op)?[0];
                let ticks = if nn == 0 { 256 } else { nn as u64 };
                b.advance_ticks(ticks, &pitch_table);
            }
            ECHO_LOCK..=0xEF => {}
            ECHO_LOOPSTART => {
                b.loop_byte_offset = Some(b.commands.len());
                b.loop_sample_pos = Some(b.sample_pos);
            }
            ECHO_LOOPEND | ECHO_STOP => {
                break 'outer;
            }
            other => {
                let start = pos.saturating_sub(1);
                let end = (start + 16).min(esf.len());
                malformed!(
                    "unknown ESF opcode 0x{:02X} at offset {}, context: {:02X?}",
                    other,
                    start,
                    &esf[start..end]
                );
            }
        }
    }

    b.commands.push(0x66);

    build_file(b, looped, gd3)
}

fn take<'a>(esf: &'a [u8], pos: &mut usize, n: usize, op: u8) -> LibResult<&'a [u8]> {
    if *pos + n > esf.len() {
        malformed!("truncated ESF stream after opcode 0x{:02X}", op);
    }
    let slice = &esf[*pos..*pos + n];
    *pos += n;
    Ok(slice)
}

fn fm_channel_index(chan: u8) -> LibResult<usize> {
    match chan {
        0 => Ok(0),
        1 => Ok(1),
        2 => Ok(2),
        4 => Ok(3),
        5 => Ok(4),
        6 => Ok(5),
        other => Err(malformed_e!("invalid FM channel {}", other)),
    }
}

fn fm_key_code(chan: u8) -> u8 {
    // YM2612 key on/off register (0x28) slot packing: 0,1,2 map directly,
    // 4,5,6 (part II) map to 4,5,6 as well - this register's channel field
    // matches the Echo channel numbering already.
    chan
}

fn build_file(b: Builder, looped: bool, gd3: Option<&Gd3Tags>) -> LibResult<Vec<u8>> {
    let mut header = vec![0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(b"Vgm ");

    let total_samples = b.sample_pos;
    let loop_byte_offset = b.loop_byte_offset.unwrap_or(0);
    let loop_sample_pos = b.loop_sample_pos.unwrap_or(0);

    header[0x08..0x0C].copy_from_slice(&0x0000_0160u32.to_le_bytes());
    header[0x0C..0x10].copy_from_slice(&3_579_545u32.to_le_bytes());
    header[0x18..0x1C].copy_from_slice(&(total_samples as u32).to_le_bytes());
    if looped {
        let loop_offset_field = (HEADER_SIZE + b.pcm_blob.len() + loop_byte_offset) as u32 - 0x1C;
        header[0x1C..0x20].copy_from_slice(&loop_offset_field.to_le_bytes());
        header[0x20..0x24].copy_from_slice(&((total_samples - loop_sample_pos) as u32).to_le_bytes());
    }
    header[0x28..0x2A].copy_from_slice(&9u16.to_le_bytes());
    header[0x2A..0x2C].copy_from_slice(&16u16.to_le_bytes());
    header[0x2C..0x30].copy_from_slice(&7_670_454u32.to_le_bytes());
    header[0x34..0x38].copy_from_slice(&((HEADER_SIZE - 0x34) as u32).to_le_bytes());

    let mut out = header;
    out.extend(b.pcm_blob);
    out.extend(b.commands);

    if let Some(tags) = gd3 {
        let gd3_offset = out.len() as u32;
        out[0x14..0x18].copy_from_slice(&(gd3_offset - 0x14).to_le_bytes());
        out.extend(gd3_block(tags));
    }

    let eof_offset = out.len() as u32 - 4;
    out[0x04..0x08].copy_from_slice(&eof_offset.to_le_bytes());

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stream_header_matches_version_and_clocks() {
        let esf = [ECHO_STOP];
        let bytes = assemble(&esf, &[], &[], &[], false, None).unwrap();
        assert_eq!(&bytes[8..12], &[0x60, 0x01, 0x00, 0x00]);
        assert_eq!(&bytes[0x0C..0x10], &[0x79, 0xA6, 0x36, 0x00]);
        assert_eq!(&bytes[0x2C..0x30], &[0x76, 0x12, 0x75, 0x00]);
        let file_size = bytes.len() as u32;
        let eof = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(eof, file_size - 4);
    }

    #[test]
    fn one_tick_delay_advances_735_samples() {
        let esf = [ECHO_DELAY_SHORT, ECHO_STOP]; // D0 = 1 tick
        let bytes = assemble(&esf, &[], &[], &[], false, None).unwrap();
        let total_samples = u32::from_le_bytes(bytes[0x18..0x1C].try_into().unwrap());
        assert_eq!(total_samples, SAMPLES_PER_TICK);
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let esf = [0x4C]; // unassigned opcode, between the PSG instrument-load and FM param ranges
        let result = assemble(&esf, &[], &[], &[], false, None);
        assert!(result.is_err());
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let esf = [0x00]; // FM1 note-on with no following pitch-nibble byte
        let result = assemble(&esf, &[], &[], &[], false, None);
        assert!(result.is_err());
    }

    #[test]
    fn gd3_block_duplicates_the_title_string() {
        let tags = Gd3Tags {
            title: "Test Song".into(),
            ..Default::default()
        };
        let block = gd3_block(&tags);
        let title_bytes = utf16_nul(&tags.title);
        assert_eq!(&block[12..12 + title_bytes.len()], &title_bytes[..]);
        assert_eq!(
            &block[12 + title_bytes.len()..12 + 2 * title_bytes.len()],
            &title_bytes[..]
        );
    }

    #[test]
    fn loop_point_is_captured_when_present() {
        let esf = [ECHO_LOOPSTART, ECHO_DELAY_SHORT, ECHO_LOOPEND];
        let bytes = assemble(&esf, &[], &[], &[], true, None).unwrap();
        let loop_samples = u32::from_le_bytes(bytes[0x20..0x24].try_into().unwrap());
        assert_eq!(loop_samples, SAMPLES_PER_TICK);
    }
}
