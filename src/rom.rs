//! Mega Drive ROM header field layout and the maintenance operations
//! the `romfix` tool performs on an existing cartridge image: checksum
//! recomputation, padding to the next header-valid size, and editing
//! the title/copyright/serial/revision/date fields in place.
//!
//! Out of scope here: the full header *generation* tool (`headgen`)
//! emits the static assembly boilerplate around these same field
//! offsets, but never edits an existing binary, so it has no use for
//! this module.

use crate::error::LibResult;

pub const MIN_ROM_SIZE: usize = 0x200;
pub const MAX_ROM_SIZE: usize = 0x400000;

const HEADER_COPYRIGHT: usize = 0x113;
const HEADER_DATE: usize = 0x118;
const HEADER_TITLE1: usize = 0x120;
const HEADER_TITLE2: usize = 0x150;
const HEADER_REVISION: usize = 0x18C;
const HEADER_SERIALNO: usize = 0x183;
const HEADER_CHECKSUM: usize = 0x18E;
const PROGRAM_START: usize = 0x200;

const DATE_LEN: usize = 8;
const TITLE_LEN: usize = 48;
const COPYRIGHT_LEN: usize = 4;
const SERIALNO_LEN: usize = 8;

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Rounds `old_size` up to the next size the header's checksum region
/// (1x/1.25x/1.5x/2x doubling) considers valid, per the source tool's
/// padding table.
pub fn pad_size(old_size: usize) -> usize {
    let mut x = MIN_ROM_SIZE;
    loop {
        if old_size <= x {
            return x;
        }
        if old_size <= x + (x >> 2) {
            return x + (x >> 2);
        }
        if old_size <= x + (x >> 1) {
            return x + (x >> 1);
        }
        x <<= 1;
    }
}

/// Pads `rom` up to [`pad_size`] of its current length with zero bytes.
pub fn pad(rom: &mut Vec<u8>) {
    let new_size = pad_size(rom.len());
    rom.resize(new_size, 0x00);
}

/// Recomputes and writes the big-endian 16-bit checksum: the wrapping
/// sum of every big-endian word from [`PROGRAM_START`] to the end of
/// the image.
pub fn compute_checksum(rom: &mut [u8]) {
    let mut sum: u16 = 0;
    for word in rom[PROGRAM_START..].chunks_exact(2) {
        sum = sum.wrapping_add(u16::from_be_bytes([word[0], word[1]]));
    }
    rom[HEADER_CHECKSUM..HEADER_CHECKSUM + 2].copy_from_slice(&sum.to_be_bytes());
}

fn write_padded_field(rom: &mut [u8], offset: usize, len: usize, text: &str) -> LibResult<()> {
    if text.len() > len {
        range_violation!("field length", format!("<= {}", len), text.len());
    }
    rom[offset..offset + len].iter_mut().for_each(|b| *b = b' ');
    rom[offset..offset + text.len()].copy_from_slice(text.as_bytes());
    Ok(())
}

/// Sets the domestic and overseas title fields to the same text.
pub fn set_title(rom: &mut [u8], title: &str) -> LibResult<()> {
    write_padded_field(rom, HEADER_TITLE1, TITLE_LEN, title)?;
    let (src, dst) = rom.split_at_mut(HEADER_TITLE2);
    dst[..TITLE_LEN].copy_from_slice(&src[HEADER_TITLE1..HEADER_TITLE1 + TITLE_LEN]);
    Ok(())
}

pub fn set_copyright(rom: &mut [u8], copyright: &str) -> LibResult<()> {
    write_padded_field(rom, HEADER_COPYRIGHT, COPYRIGHT_LEN, copyright)
}

pub fn set_serial(rom: &mut [u8], serial: &str) -> LibResult<()> {
    write_padded_field(rom, HEADER_SERIALNO, SERIALNO_LEN, serial)
}

/// Sets the two-digit revision number. Must be exactly two ASCII
/// digits, matching the header field's fixed width.
pub fn set_revision(rom: &mut [u8], revision: &str) -> LibResult<()> {
    let bytes = revision.as_bytes();
    if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_digit) {
        malformed!("revision \"{}\" is not exactly two digits", revision);
    }
    rom[HEADER_REVISION] = bytes[0];
    rom[HEADER_REVISION + 1] = bytes[1];
    Ok(())
}

/// Stamps the build-date field with `year.month`, `month` being a
/// `0..=11` index into the same three-letter table `headgen` uses.
pub fn set_build_date(rom: &mut [u8], year: u32, month: u8) -> LibResult<()> {
    let name = MONTHS
        .get(month as usize)
        .ok_or_else(|| malformed_e!("month index {} is out of range", month))?;
    let text = format!("{:04}.{}", year, name);
    if text.len() != DATE_LEN {
        malformed!(
            "formatted build date \"{}\" is not {} bytes",
            text,
            DATE_LEN
        );
    }
    rom[HEADER_DATE..HEADER_DATE + DATE_LEN].copy_from_slice(text.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_size_follows_the_1_1point25_1point5_2x_ladder() {
        assert_eq!(pad_size(0x100), MIN_ROM_SIZE);
        assert_eq!(
            pad_size(MIN_ROM_SIZE + 1),
            MIN_ROM_SIZE + (MIN_ROM_SIZE >> 2)
        );
        assert_eq!(
            pad_size(MIN_ROM_SIZE * 2 - 1),
            MIN_ROM_SIZE * 2 - (MIN_ROM_SIZE >> 1)
        );
    }

    #[test]
    fn checksum_sums_big_endian_words_after_the_header() {
        let mut rom = vec![0u8; PROGRAM_START + 4];
        rom[PROGRAM_START] = 0x00;
        rom[PROGRAM_START + 1] = 0x01;
        rom[PROGRAM_START + 2] = 0x00;
        rom[PROGRAM_START + 3] = 0x02;
        compute_checksum(&mut rom);
        assert_eq!(&rom[HEADER_CHECKSUM..HEADER_CHECKSUM + 2], &[0x00, 0x03]);
    }

    #[test]
    fn title_is_copied_into_both_domestic_and_overseas_slots() {
        let mut rom = vec![0u8; PROGRAM_START];
        set_title(&mut rom, "SONIC").unwrap();
        assert_eq!(&rom[HEADER_TITLE1..HEADER_TITLE1 + 5], b"SONIC");
        assert_eq!(&rom[HEADER_TITLE2..HEADER_TITLE2 + 5], b"SONIC");
        assert_eq!(rom[HEADER_TITLE1 + 5], b' ');
    }

    #[test]
    fn oversized_title_is_rejected() {
        let mut rom = vec![0u8; PROGRAM_START];
        let title = "X".repeat(TITLE_LEN + 1);
        assert!(set_title(&mut rom, &title).is_err());
    }

    #[test]
    fn revision_requires_exactly_two_digits() {
        let mut rom = vec![0u8; PROGRAM_START];
        assert!(set_revision(&mut rom, "01").is_ok());
        assert!(set_revision(&mut rom, "1").is_err());
        assert!(set_revision(&mut rom, "ab").is_err());
    }
}
