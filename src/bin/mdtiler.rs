//! Cuts a PNG bitmap into Mega Drive 8x8 tiles, either in tilemap order
//! (row-major) or sprite order (column-major, split into 4-tile-tall
//! strips). Pixel values are taken from the decoded image's luma
//! channel and quantized down to a palette index; full palette-aware
//! indexed PNG decoding is left to whatever upstream tool produced the
//! source image.

use clap::{Parser, ValueEnum};
use echotools::tiles::{self, Format, IndexedBitmap};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Bpp4,
    Bpp1,
}

impl From<FormatArg> for Format {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Bpp4 => Format::Bpp4,
            FormatArg::Bpp1 => Format::Bpp1,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderArg {
    Tilemap,
    Sprite,
}

#[derive(Parser)]
#[command(
    name = "mdtiler",
    about = "Convert a PNG bitmap into Mega Drive tile data",
    disable_version_flag = true
)]
struct Args {
    /// Print version information and exit
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    input: PathBuf,
    output: PathBuf,
    #[arg(long, value_enum, default_value = "bpp4")]
    format: FormatArg,
    #[arg(long, value_enum, default_value = "tilemap")]
    order: OrderArg,
}

fn quantize(pixel: u8, format: Format) -> u8 {
    match format {
        Format::Bpp4 => pixel >> 4,
        Format::Bpp1 => pixel >> 7,
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    echotools::cli::run(|| {
        let image = image::open(&args.input)?;
        let format: Format = args.format.into();
        let luma = image.to_luma8();
        let (width, height) = (luma.width() as usize, luma.height() as usize);
        let indices: Vec<u8> = luma.pixels().map(|p| quantize(p.0[0], format)).collect();
        let bitmap = IndexedBitmap {
            pixels: &indices,
            width,
            height,
        };

        let tiles_w = width / 8;
        let tiles_h = height / 8;
        let data = match args.order {
            OrderArg::Tilemap => tiles::write_tilemap(&bitmap, 0, 0, tiles_w, tiles_h, format),
            OrderArg::Sprite => tiles::write_sprite(&bitmap, 0, 0, tiles_w, tiles_h, format),
        };

        echotools::Blob::save(&args.output, &data)?;
        Ok(())
    })
}
