//! UFTC: a dictionary coder for 8x8 Mega Drive tiles that exploits
//! symmetry within a tileset by deduplicating 4x4 quadrants instead of
//! whole tiles. A tile is 32 bytes (16 big-endian words, 4 pixels per
//! word at 4bpp); each quadrant is a 4-word slice of that tile.
//!
//! The on-disk shape: a `u16` dictionary size in words, that many words
//! of deduplicated quadrant data, then four `u16` dictionary word-offsets
//! per tile (top-left, top-right, bottom-left, bottom-right).
//!
//! UFTC15, the format's original name on an earlier target, is the same
//! byte layout under a different tag; there is nothing here to special-
//! case for it.

use crate::error::LibResult;
use std::collections::HashMap;

const TILE_BYTES: usize = 32;
const QUADRANT_WORDS: usize = 4;

type Quadrant = [u16; QUADRANT_WORDS];

fn read_tile_words(tile: &[u8]) -> [u16; 16] {
    let mut words = [0u16; 16];
    for (i, w) in words.iter_mut().enumerate() {
        *w = u16::from_be_bytes([tile[i * 2], tile[i * 2 + 1]]);
    }
    words
}

fn quadrants_of(words: &[u16; 16]) -> [Quadrant; 4] {
    [
        [words[0], words[2], words[4], words[6]],
        [words[1], words[3], words[5], words[7]],
        [words[8], words[10], words[12], words[14]],
        [words[9], words[11], words[13], words[15]],
    ]
}

/// Builds a UFTC stream from raw tile data (a multiple of 32 bytes).
pub fn compress(tiles: &[u8]) -> LibResult<Vec<u8>> {
    if tiles.len() % TILE_BYTES != 0 {
        malformed!(
            "tile data length {} is not a multiple of {} bytes",
            tiles.len(),
            TILE_BYTES
        );
    }
    let tile_count = tiles.len() / TILE_BYTES;

    let mut dict: Vec<Quadrant> = Vec::new();
    let mut dict_index: HashMap<Quadrant, u16> = HashMap::new();
    let mut offsets: Vec<u16> = Vec::with_capacity(tile_count * 4);

    for t in 0..tile_count {
        let tile = &tiles[t * TILE_BYTES..(t + 1) * TILE_BYTES];
        let words = read_tile_words(tile);
        for quad in quadrants_of(&words) {
            let offset = *dict_index.entry(quad).or_insert_with(|| {
                let byte_offset = dict.len() * QUADRANT_WORDS * 2;
                dict.push(quad);
                byte_offset as u16
            });
            offsets.push(offset);
        }
    }

    let dict_size_words = dict.len() * QUADRANT_WORDS;
    if dict_size_words > 0xFFFF {
        range_violation!("dictionary size (words)", "<= 65535", dict_size_words);
    }

    let mut out = Vec::with_capacity(2 + dict_size_words * 2 + offsets.len() * 2);
    out.extend_from_slice(&(dict_size_words as u16).to_be_bytes());
    for quad in &dict {
        for word in quad {
            out.extend_from_slice(&word.to_be_bytes());
        }
    }
    for offset in &offsets {
        out.extend_from_slice(&offset.to_be_bytes());
    }

    Ok(out)
}

/// Decodes `count` tiles starting at tile index `start` from a UFTC
/// stream, returning raw 32-byte-per-tile pixel data.
pub fn decompress(data: &[u8], start: usize, count: usize) -> LibResult<Vec<u8>> {
    if data.len() < 2 {
        malformed!("UFTC stream is missing its dictionary size header");
    }
    let dict_size_words = u16::from_be_bytes([data[0], data[1]]) as usize;
    let dict_bytes = dict_size_words * 2;
    let dict_start = 2;
    let dict_end = dict_start + dict_bytes;
    if data.len() < dict_end {
        malformed!("UFTC stream is shorter than its declared dictionary size");
    }
    let dict = &data[dict_start..dict_end];

    let index_start = dict_end + start * 4 * 2;
    let index_needed = count * 4 * 2;
    if data.len() < index_start + index_needed {
        malformed!("UFTC stream is missing tile index entries for the requested range");
    }
    let indices = &data[index_start..index_start + index_needed];

    let mut out = Vec::with_capacity(count * TILE_BYTES);
    for t in 0..count {
        let rec = &indices[t * 8..t * 8 + 8];
        let quad_offsets = [
            u16::from_be_bytes([rec[0], rec[1]]) as usize,
            u16::from_be_bytes([rec[2], rec[3]]) as usize,
            u16::from_be_bytes([rec[4], rec[5]]) as usize,
            u16::from_be_bytes([rec[6], rec[7]]) as usize,
        ];

        let mut quads = [[0u16; QUADRANT_WORDS]; 4];
        for (q, &byte_offset) in quad_offsets.iter().enumerate() {
            if byte_offset + QUADRANT_WORDS * 2 > dict.len() {
                malformed!(
                    "UFTC dictionary offset {} exceeds dictionary size {} bytes",
                    byte_offset,
                    dict_size_words * 2
                );
            }
            for w in 0..QUADRANT_WORDS {
                let lo = byte_offset + w * 2;
                quads[q][w] = u16::from_be_bytes([dict[lo], dict[lo + 1]]);
            }
        }

        // First pair (top-left, top-right) interleaves into rows 0-3,
        // second pair (bottom-left, bottom-right) into rows 4-7.
        for pair in [[0usize, 1usize], [2, 3]] {
            for row in 0..QUADRANT_WORDS {
                out.extend_from_slice(&quads[pair[0]][row].to_be_bytes());
                out.extend_from_slice(&quads[pair[1]][row].to_be_bytes());
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_tile(fill: u16) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(32);
        for _ in 0..16 {
            bytes.extend_from_slice(&fill.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn single_tile_round_trips() {
        let mut tile = Vec::new();
        for i in 0..16u16 {
            tile.extend_from_slice(&i.to_be_bytes());
        }
        let packed = compress(&tile).unwrap();
        let unpacked = decompress(&packed, 0, 1).unwrap();
        assert_eq!(unpacked, tile);
    }

    #[test]
    fn identical_tiles_share_one_dictionary_entry() {
        let tile = solid_tile(0xABCD);
        let mut tiles = tile.clone();
        tiles.extend_from_slice(&tile);
        let packed = compress(&tiles).unwrap();
        // One unique quadrant repeated -> dictionary holds exactly 4 words.
        let dict_size_words = u16::from_be_bytes([packed[0], packed[1]]);
        assert_eq!(dict_size_words, 4);
        let unpacked = decompress(&packed, 0, 2).unwrap();
        assert_eq!(&unpacked[0..32], tile.as_slice());
        assert_eq!(&unpacked[32..64], tile.as_slice());
    }

    #[test]
    fn decoding_from_a_nonzero_start_skips_leading_tiles() {
        let tile_a = solid_tile(0x1111);
        let tile_b = solid_tile(0x2222);
        let mut tiles = tile_a.clone();
        tiles.extend_from_slice(&tile_b);
        let packed = compress(&tiles).unwrap();
        let second = decompress(&packed, 1, 1).unwrap();
        assert_eq!(second, tile_b);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let tile = solid_tile(0x4242);
        assert!(compress(&tile[..31]).is_err());
    }

    #[test]
    fn corrupt_dictionary_offset_is_rejected() {
        // Claims a 0-word dictionary but a tile index pointing at word 4.
        let corrupt = vec![0x00, 0x00, 0x00, 0x04, 0x00, 0x04, 0x00, 0x04, 0x00, 0x04];
        assert!(decompress(&corrupt, 0, 1).is_err());
    }
}
