//! Bitmap-to-tile reordering for the Mega Drive's 8x8 tile formats: an
//! indexed-pixel source image cut into `8x8` cells, each packed into
//! either 4bpp (two pixels per byte) or 1bpp (eight pixels per byte)
//! planar tile data, then the cells reordered into either tilemap
//! order (left-to-right, top-to-bottom) or sprite order (top-to-bottom
//! strips of at most four tiles, left-to-right).

/// Tile bit depth, selecting how many source pixels pack into a byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    Bpp4,
    Bpp1,
}

/// A source bitmap as palette indices, one byte per pixel, row-major.
pub struct IndexedBitmap<'a> {
    pub pixels: &'a [u8],
    pub width: usize,
    pub height: usize,
}

impl<'a> IndexedBitmap<'a> {
    fn pixel(&self, x: usize, y: usize) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.pixels[y * self.width + x]
    }
}

fn tile_4bpp(bitmap: &IndexedBitmap, bx: usize, by: usize) -> [u8; 32] {
    let mut data = [0u8; 32];
    let mut i = 0;
    for y in 0..8 {
        for x in (0..8).step_by(2) {
            let hi = bitmap.pixel(bx + x, by + y) & 0x0F;
            let lo = bitmap.pixel(bx + x + 1, by + y) & 0x0F;
            data[i] = (hi << 4) | lo;
            i += 1;
        }
    }
    data
}

fn tile_1bpp(bitmap: &IndexedBitmap, bx: usize, by: usize) -> [u8; 8] {
    let mut data = [0u8; 8];
    for (y, row) in data.iter_mut().enumerate() {
        let mut byte = 0u8;
        for x in 0..8 {
            byte <<= 1;
            byte |= bitmap.pixel(bx + x, by + y) & 0x01;
        }
        *row = byte;
    }
    data
}

fn push_tile(out: &mut Vec<u8>, bitmap: &IndexedBitmap, bx: usize, by: usize, format: Format) {
    match format {
        Format::Bpp4 => out.extend_from_slice(&tile_4bpp(bitmap, bx, by)),
        Format::Bpp1 => out.extend_from_slice(&tile_1bpp(bitmap, bx, by)),
    }
}

/// Encodes a `width`x`height`-tile block starting at pixel `(bx, by)`
/// in tilemap order (row-major, left-to-right then top-to-bottom).
pub fn write_tilemap(
    bitmap: &IndexedBitmap,
    bx: usize,
    by: usize,
    width: usize,
    height: usize,
    format: Format,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(width * height * tile_size(format));
    for y in 0..height {
        for x in 0..width {
            push_tile(&mut out, bitmap, bx + x * 8, by + y * 8, format);
        }
    }
    out
}

/// Encodes a `width`x`height`-tile block in sprite order: tiles run
/// top-to-bottom within a column before advancing to the next column,
/// and any column taller than 4 tiles is split into 4-tile strips
/// first, matching hardware sprite mapping limits.
pub fn write_sprite(
    bitmap: &IndexedBitmap,
    bx: usize,
    mut by: usize,
    width: usize,
    mut height: usize,
    format: Format,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(width * height * tile_size(format));
    while height > 0 {
        let strip_height = height.min(4);
        for x in 0..width {
            for y in 0..strip_height {
                push_tile(&mut out, bitmap, bx + x * 8, by + y * 8, format);
            }
        }
        height -= strip_height;
        by += strip_height * 8;
    }
    out
}

fn tile_size(format: Format) -> usize {
    match format {
        Format::Bpp4 => 32,
        Format::Bpp1 => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard() -> Vec<u8> {
        let mut pixels = vec![0u8; 16 * 16];
        for y in 0..16 {
            for x in 0..16 {
                pixels[y * 16 + x] = ((x / 8 + y / 8) % 2) as u8;
            }
        }
        pixels
    }

    #[test]
    fn tile_4bpp_packs_two_pixels_per_byte() {
        let pixels = checkerboard();
        let bitmap = IndexedBitmap {
            pixels: &pixels,
            width: 16,
            height: 16,
        };
        let tile = tile_4bpp(&bitmap, 0, 0);
        assert_eq!(tile, [0u8; 32]);
        let tile = tile_4bpp(&bitmap, 8, 0);
        assert_eq!(tile, [0x11u8; 32]);
    }

    #[test]
    fn tilemap_order_is_row_major() {
        let pixels = checkerboard();
        let bitmap = IndexedBitmap {
            pixels: &pixels,
            width: 16,
            height: 16,
        };
        let out = write_tilemap(&bitmap, 0, 0, 2, 2, Format::Bpp4);
        assert_eq!(out.len(), 4 * 32);
        assert_eq!(&out[0..32], &[0u8; 32][..]);
        assert_eq!(&out[32..64], &[0x11u8; 32][..]);
    }

    #[test]
    fn sprite_order_splits_tall_columns_into_4_tile_strips() {
        let pixels = vec![0u8; 8 * 8 * 5 * 1];
        let bitmap = IndexedBitmap {
            pixels: &pixels,
            width: 8,
            height: 40,
        };
        let out = write_sprite(&bitmap, 0, 0, 1, 5, Format::Bpp1);
        assert_eq!(out.len(), 5 * 8);
    }
}
