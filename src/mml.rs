//! MML (Music Macro Language) compilation to the driver event stream.
//!
//! Source is line-oriented. Each line is a comment, a macro definition
//! (`!X <body>`), or a channel command: a run of uppercase channel
//! letters (all from one group) followed by whitespace and a command
//! body. `!X` references are expanded textually before a line's body is
//! parsed.

use crate::error::LibResult;
use crate::event::{
    Channel, Event, EventKind, FmChannel, Pan, PsgChannel, Volume,
};

/// One whole note is this many internal ticks; `t<n>` overrides how many
/// *driver* ticks that represents (default 1:1, i.e. `t128`).
const TICKS_PER_WHOLE_DEFAULT: u32 = 128;

#[derive(Clone, Copy, Debug)]
struct ChannelState {
    timestamp: u32,
    octave: u8,
    transpose: i32,
    volume: u8,
    default_len: u8,
    instrument: u8,
    nullify_next: bool,
    slide_next: bool,
    ticks_per_whole: u32,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            timestamp: 0,
            octave: 3,
            transpose: 0,
            volume: 15,
            default_len: 4,
            instrument: 0,
            nullify_next: false,
            slide_next: false,
            ticks_per_whole: TICKS_PER_WHOLE_DEFAULT,
        }
    }
}

/// 52 macro slots, `A-Z` then `a-z`.
#[derive(Default)]
struct MacroTable {
    slots: [Option<String>; 52],
}

fn macro_slot(c: char) -> Option<usize> {
    if c.is_ascii_uppercase() {
        Some((c as u8 - b'A') as usize)
    } else if c.is_ascii_lowercase() {
        Some(26 + (c as u8 - b'a') as usize)
    } else {
        None
    }
}

impl MacroTable {
    fn define(&mut self, name: char, body: &str) -> LibResult<()> {
        let slot = macro_slot(name).ok_or_else(|| malformed_e!("invalid macro name '{}'", name))?;
        self.slots[slot] = Some(body.to_owned());
        Ok(())
    }

    /// Textually replaces every `!X` reference in `line` with its stored
    /// body. Single-pass: a macro body containing another `!X` is not
    /// itself re-expanded.
    fn expand(&self, line: &str) -> LibResult<String> {
        let mut out = String::with_capacity(line.len());
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '!' {
                out.push(c);
                continue;
            }
            let name = chars
                .next()
                .ok_or_else(|| malformed_e!("'!' at end of line with no macro name"))?;
            let slot = macro_slot(name).ok_or_else(|| malformed_e!("invalid macro name '{}'", name))?;
            let body = self.slots[slot]
                .as_ref()
                .ok_or_else(|| malformed_e!("undefined macro '!{}'", name))?;
            out.push_str(body);
        }
        Ok(out)
    }
}

fn channel_group(channel: Channel) -> u8 {
    match channel {
        Channel::Fm(_) => 0,
        Channel::Psg(_) | Channel::PsgNoise | Channel::PsgNoiseExtended => 1,
        Channel::Pcm => 2,
        Channel::Control => 3,
    }
}

fn channel_for_letter(c: char) -> Option<Channel> {
    match c {
        'A' => Some(Channel::Fm(FmChannel::Fm1)),
        'B' => Some(Channel::Fm(FmChannel::Fm2)),
        'C' => Some(Channel::Fm(FmChannel::Fm3)),
        'D' => Some(Channel::Fm(FmChannel::Fm4)),
        'E' => Some(Channel::Fm(FmChannel::Fm5)),
        'F' => Some(Channel::Fm(FmChannel::Fm6)),
        'G' => Some(Channel::Psg(PsgChannel::Psg1)),
        'H' => Some(Channel::Psg(PsgChannel::Psg2)),
        'I' => Some(Channel::Psg(PsgChannel::Psg3)),
        'J' => Some(Channel::PsgNoise),
        'K' => Some(Channel::Pcm),
        'Z' => Some(Channel::Control),
        _ => None,
    }
}

/// Valid note-value range for `n<val>`, by channel group.
fn note_value_range(channel: Channel) -> u8 {
    match channel {
        Channel::Fm(_) => 95,
        Channel::Psg(_) => 71,
        Channel::PsgNoise | Channel::PsgNoiseExtended => 7,
        Channel::Pcm | Channel::Control => 127,
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            bytes: s.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Reads an unsigned decimal integer.
    fn number(&mut self) -> LibResult<u32> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.pos == start {
            malformed!("expected a number");
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .unwrap()
            .parse()
            .map_err(|_| malformed_e!("number out of range"))
    }

    /// Reads an optional `+`/`-` sign followed by a decimal integer.
    fn signed_number(&mut self) -> LibResult<i32> {
        let negative = if self.eat(b'-') {
            true
        } else {
            self.eat(b'+');
            false
        };
        let value = self.number()? as i32;
        Ok(if negative { -value } else { value })
    }

    /// Parses one length token: a power-of-two denominator `1..128`,
    /// optional dot, optional `^<len>` tie. Returns the internal-tick
    /// count, scaled by `ticks_per_whole`.
    fn length_token(&mut self, default_len: u8, ticks_per_whole: u32) -> LibResult<u32> {
        let denom = if matches!(self.peek(), Some(b'0'..=b'9')) {
            let n = self.number()?;
            if !n.is_power_of_two() || n == 0 || n > 128 {
                malformed!("invalid length denominator {}", n);
            }
            n as u8
        } else {
            default_len
        };
        let mut ticks = ticks_per_whole / denom as u32;
        if self.eat(b'.') {
            ticks += ticks / 2;
        }
        // A tie accepts `^<len>`, but not a dot after that caret - a
        // limitation of the original tool's length parser, preserved here.
        if self.eat(b'^') {
            let tied_denom = self.number()? as u8;
            if !tied_denom.is_power_of_two() || tied_denom == 0 || tied_denom > 128 {
                malformed!("invalid tied length denominator {}", tied_denom);
            }
            ticks += ticks_per_whole / tied_denom as u32;
        }
        Ok(ticks)
    }
}

fn note_letter_semitone(c: u8) -> Option<i32> {
    match c {
        b'c' => Some(0),
        b'd' => Some(2),
        b'e' => Some(4),
        b'f' => Some(5),
        b'g' => Some(7),
        b'a' => Some(9),
        b'b' => Some(11),
        _ => None,
    }
}

fn push_note(events: &mut Vec<Event>, channel: Channel, state: &mut ChannelState, semitone: i32, len: u32) {
    let value = (semitone + state.transpose).clamp(0, 127) as u8;
    if state.nullify_next {
        state.nullify_next = false;
    } else if state.slide_next {
        state.slide_next = false;
        events.push(Event::new(state.timestamp, channel, EventKind::Slide((value as u16) * 16)));
    } else {
        events.push(Event::new(state.timestamp, channel, EventKind::NoteOn(value)));
    }
    state.timestamp += len;
}

fn push_rest(events: &mut Vec<Event>, channel: Channel, state: &mut ChannelState, len: u32, key_off: bool) {
    if key_off {
        events.push(Event::new(state.timestamp, channel, EventKind::NoteOff));
    }
    state.timestamp += len;
}

/// Volume attenuation (0..15, MML scale) converted to the event model's
/// linear 0..127 volume scale.
fn scaled_volume(atten_0_15: u8) -> u8 {
    (atten_0_15.min(15) as u32 * 127 / 15) as u8
}

fn named_ym_register(name: &str) -> Option<u8> {
    match name {
        "DM" => Some(0x30),
        "TL" => Some(0x40),
        "KA" => Some(0x50),
        "DR" => Some(0x60),
        "SR" => Some(0x70),
        "SL" => Some(0x80),
        "SE" => Some(0x90),
        _ => None,
    }
}

fn compile_body(
    body: &str,
    channel: Channel,
    state: &mut ChannelState,
    events: &mut Vec<Event>,
) -> LibResult<()> {
    let mut cur = Cursor::new(body);
    while !cur.at_end() {
        cur.skip_spaces();
        if cur.at_end() {
            break;
        }
        let c = cur.bump().unwrap();
        match c {
            b'c' | b'd' | b'e' | b'f' | b'g' | b'a' | b'b' => {
                let base = note_letter_semitone(c).unwrap();
                let mut semitone = base;
                loop {
                    if cur.eat(b'+') || cur.eat(b'#') {
                        semitone += 1;
                    } else if cur.eat(b'-') {
                        semitone -= 1;
                    } else {
                        break;
                    }
                }
                let len = cur.length_token(state.default_len, state.ticks_per_whole)?;
                let note = state.octave as i32 * 12 + semitone;
                push_note(events, channel, state, note, len);
            }
            b'n' => {
                let value = cur.number()?;
                let max = note_value_range(channel) as u32;
                if value > max {
                    range_violation!("note value", format!("0..={}", max), value);
                }
                let len = if cur.eat(b',') {
                    cur.length_token(state.default_len, state.ticks_per_whole)?
                } else {
                    state.ticks_per_whole / state.default_len as u32
                };
                push_note(events, channel, state, value as i32 - state.transpose, len);
            }
            b'r' => {
                let len = cur.length_token(state.default_len, state.ticks_per_whole)?;
                push_rest(events, channel, state, len, true);
            }
            b's' => {
                let len = cur.length_token(state.default_len, state.ticks_per_whole)?;
                push_rest(events, channel, state, len, false);
            }
            b'&' => state.nullify_next = true,
            b'_' => state.slide_next = true,
            b'>' => state.octave = (state.octave + 1).min(7),
            b'<' => state.octave = state.octave.saturating_sub(1),
            b'o' => {
                let n = cur.number()?;
                if n > 7 {
                    range_violation!("octave", "0..=7", n);
                }
                state.octave = n as u8;
            }
            b'K' => {
                state.transpose = cur.signed_number()?;
            }
            b'k' => {
                state.transpose += cur.signed_number()?;
            }
            b'l' => {
                let n = cur.number()?;
                if !n.is_power_of_two() || n == 0 || n > 128 {
                    malformed!("invalid default length {}", n);
                }
                state.default_len = n as u8;
            }
            b'(' => state.volume = state.volume.saturating_sub(1),
            b')' => state.volume = (state.volume + 1).min(15),
            b'v' => {
                if cur.eat(b'+') {
                    state.volume = (state.volume + cur.number()? as u8).min(15);
                } else if cur.eat(b'-') {
                    state.volume = state.volume.saturating_sub(cur.number()? as u8);
                } else {
                    let n = cur.number()?;
                    if n > 15 {
                        range_violation!("volume", "0..=15", n);
                    }
                    state.volume = n as u8;
                }
                events.push(Event::new(
                    state.timestamp,
                    channel,
                    EventKind::SetVolume(Volume::new(scaled_volume(state.volume))),
                ));
            }
            b'p' => {
                let n = cur.number()?;
                if n > 3 {
                    range_violation!("pan", "0..=3", n);
                }
                if matches!(channel, Channel::Fm(_)) {
                    let pan = match n {
                        0 => 0,
                        1 => 32,
                        2 => 96,
                        _ => 127,
                    };
                    events.push(Event::new(state.timestamp, channel, EventKind::SetPan(Pan::new(pan))));
                }
                // PSG silently ignores panning.
            }
            b'@' => {
                if cur.eat(b'#') {
                    let set = if cur.eat(b'-') {
                        false
                    } else {
                        cur.eat(b'+');
                        true
                    };
                    let mask = cur.number()? as u8;
                    events.push(Event::new(state.timestamp, channel, EventKind::SetFlags { set, mask }));
                } else if cur.eat(b'$') {
                    events.push(Event::new(state.timestamp, channel, EventKind::Lock));
                } else {
                    let n = cur.number()?;
                    state.instrument = n as u8;
                    events.push(Event::new(state.timestamp, channel, EventKind::SetInstrument(state.instrument)));
                }
            }
            b'y' => {
                if cur.peek().map(|b| b.is_ascii_alphabetic()) == Some(true) {
                    let name_start = cur.pos;
                    while cur.peek().map(|b| b.is_ascii_alphabetic()) == Some(true) {
                        cur.pos += 1;
                    }
                    let name = std::str::from_utf8(&cur.bytes[name_start..cur.pos]).unwrap().to_owned();
                    let op = cur.number()?;
                    if op > 3 {
                        range_violation!("operator", "0..=3", op);
                    }
                    if !cur.eat(b',') {
                        malformed!("expected ',' after y<NAME><op>");
                    }
                    let val = cur.number()?;
                    let base = named_ym_register(&name)
                        .ok_or_else(|| malformed_e!("unknown register name '{}'", name))?;
                    let hw = crate::esf::hw_channel_index(channel)
                        .ok_or_else(|| malformed_e!("raw register write on a channel with no hardware index"))?;
                    let bank = hw & 4 != 0;
                    let reg = base + op as u8 * 4 + (hw & 3);
                    events.push(Event::new(
                        state.timestamp,
                        channel,
                        EventKind::SetRegister {
                            bank,
                            reg,
                            value: val as u8,
                        },
                    ));
                } else {
                    let reg = cur.number()? as u8;
                    if !cur.eat(b',') {
                        malformed!("expected ',' after y<reg>");
                    }
                    let val = cur.number()? as u8;
                    events.push(Event::new(
                        state.timestamp,
                        channel,
                        EventKind::SetRegister {
                            bank: false,
                            reg,
                            value: val,
                        },
                    ));
                }
            }
            b'L' => {
                events.push(Event::new(state.timestamp, channel, EventKind::LoopPoint));
            }
            b't' => {
                let n = cur.number()?;
                if n == 0 {
                    malformed!("tempo must be at least 1 tick per whole note");
                }
                state.ticks_per_whole = n;
                events.push(Event::new(state.timestamp, channel, EventKind::SetTempo(n)));
            }
            other => malformed!("unrecognized command '{}'", other as char),
        }
    }
    Ok(())
}

/// Compiles MML source into a sorted, driver-ready event stream.
pub fn compile(source: &str) -> LibResult<Vec<Event>> {
    let mut macros = MacroTable::default();
    let mut states: [ChannelState; 12] = [ChannelState::default(); 12];
    let mut events = Vec::new();

    for raw_line in source.lines() {
        let line = raw_line.split(';').next().unwrap_or("").trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(rest) = line.strip_prefix('!') {
            let mut chars = rest.chars();
            let name = chars.next().ok_or_else(|| malformed_e!("empty macro definition"))?;
            let body = chars.as_str().trim_start();
            macros.define(name, body)?;
            continue;
        }

        let expanded = macros.expand(line)?;
        let mut chars = expanded.char_indices();
        let mut letters_end = 0;
        for (i, c) in chars.by_ref() {
            if c.is_ascii_uppercase() && channel_for_letter(c).is_some() {
                letters_end = i + 1;
            } else {
                break;
            }
        }
        if letters_end == 0 {
            malformed!("line does not start with a channel letter: '{}'", expanded);
        }
        let (prefix, body) = expanded.split_at(letters_end);
        let body = body.trim_start();

        let channels: Vec<Channel> = prefix.chars().map(|c| channel_for_letter(c).unwrap()).collect();
        let group = channel_group(channels[0]);
        if channels.iter().any(|&ch| channel_group(ch) != group) {
            malformed!("line '{}' mixes channels from more than one group", expanded);
        }

        for channel in channels {
            let index = logical_state_index(channel);
            compile_body(body, channel, &mut states[index], &mut events)?;
        }
    }

    crate::event::sort_events(&mut events);
    Ok(events)
}

fn logical_state_index(channel: Channel) -> usize {
    match channel {
        Channel::Fm(FmChannel::Fm1) => 0,
        Channel::Fm(FmChannel::Fm2) => 1,
        Channel::Fm(FmChannel::Fm3) => 2,
        Channel::Fm(FmChannel::Fm4) => 3,
        Channel::Fm(FmChannel::Fm5) => 4,
        Channel::Fm(FmChannel::Fm6) => 5,
        Channel::Psg(PsgChannel::Psg1) => 6,
        Channel::Psg(PsgChannel::Psg2) => 7,
        Channel::Psg(PsgChannel::Psg3) => 8,
        Channel::PsgNoise => 9,
        Channel::PsgNoiseExtended => 9,
        Channel::Pcm => 10,
        Channel::Control => 11,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_scale_compiles_with_defaults() {
        // S6: "A cdefgab" with default o3 l4 v15 places NoteOn events
        // 32 ticks apart, preceded by SetVolume/SetInstrument at tick 0.
        let events = compile("A v15\nA @0\nA cdefgab\n").unwrap();
        let note_ons: Vec<&Event> = events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::NoteOn(_)))
            .collect();
        let expected = [36, 38, 40, 41, 43, 45, 47];
        assert_eq!(note_ons.len(), expected.len());
        for (i, &value) in expected.iter().enumerate() {
            assert!(matches!(note_ons[i].kind, EventKind::NoteOn(n) if n == value));
            assert_eq!(note_ons[i].timestamp, i as u32 * 32);
        }
        assert!(events
            .iter()
            .any(|e| e.timestamp == 0 && matches!(e.kind, EventKind::SetVolume(_))));
        assert!(events
            .iter()
            .any(|e| e.timestamp == 0 && matches!(e.kind, EventKind::SetInstrument(0))));
    }

    #[test]
    fn macro_expands_textually_before_parsing() {
        let events = compile("!X cdefgab\nA l4 o3\nA !X\n").unwrap();
        let note_ons = events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::NoteOn(_)))
            .count();
        assert_eq!(note_ons, 7);
    }

    #[test]
    fn rest_without_key_off_only_advances_time() {
        let events = compile("A s4 c4\n").unwrap();
        assert!(!events.iter().any(|e| matches!(e.kind, EventKind::NoteOff)));
        let note_on = events.iter().find(|e| matches!(e.kind, EventKind::NoteOn(_))).unwrap();
        assert_eq!(note_on.timestamp, 32);
    }

    #[test]
    fn mismatched_channel_group_is_rejected() {
        assert!(compile("AG c4\n").is_err());
    }

    #[test]
    fn loop_command_emits_loop_point_event() {
        let events = compile("A c4 L c4\n").unwrap();
        assert!(events.iter().any(|e| matches!(e.kind, EventKind::LoopPoint)));
    }

    #[test]
    fn tied_length_without_trailing_dot_adds_durations() {
        let events = compile("A c4^8\nA c4\n").unwrap();
        let timestamps: Vec<u32> = events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::NoteOn(_)))
            .map(|e| e.timestamp)
            .collect();
        // First note (len 4 tied to len 8: 32 + 16 = 48 ticks) then a
        // second note starting where the first left off.
        assert_eq!(timestamps, vec![0, 48]);
    }
}
