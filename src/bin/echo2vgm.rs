//! Replays an ESF stream against simulated YM2612/PSG state and writes
//! the result as a VGM 1.60 log, tagged with GD3 metadata.
//!
//! All instrument kinds (FM, PSG, PCM) share one id space: the
//! instrument list file names one raw instrument payload per line,
//! and which bank an id is looked up in depends only on which opcode
//! in the ESF stream references it.

use clap::Parser;
use echotools::vgm::{self, Gd3Tags};
use echotools::Blob;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "echo2vgm",
    about = "Assemble an ESF stream into a VGM log",
    disable_version_flag = true
)]
struct Args {
    /// Print version information and exit
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Text file listing one instrument payload path per line
    instruments: PathBuf,
    /// Source .esf file
    input: PathBuf,
    /// Destination .vgm file
    output: PathBuf,
    /// GD3 track title
    title: Option<String>,
    /// GD3 game/album title
    game: Option<String>,
    /// GD3 composer
    composer: Option<String>,
    /// GD3 release date
    release: Option<String>,
    /// GD3 ripper credit
    ripped_by: Option<String>,
    /// Mark the stream as looping at its start
    #[arg(short, long)]
    looped: bool,
}

fn load_instrument_list(list_path: &std::path::Path) -> echotools::Result<Vec<Vec<u8>>> {
    let listing = Blob::load(list_path)?;
    let text = String::from_utf8_lossy(listing.as_slice());
    let mut instruments = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        instruments.push(Blob::load(line)?.into_vec());
    }
    Ok(instruments)
}

fn main() -> ExitCode {
    let args = Args::parse();
    echotools::cli::run(|| {
        let instruments = load_instrument_list(&args.instruments)?;
        let esf = Blob::load(&args.input)?;

        let gd3 = Gd3Tags {
            title: args.title.unwrap_or_default(),
            game: args.game.unwrap_or_default(),
            composer: args.composer.unwrap_or_default(),
            release: args.release.unwrap_or_default(),
            ripped_by: args.ripped_by.unwrap_or_default(),
            ..Gd3Tags::default()
        };

        let data = vgm::assemble(
            esf.as_slice(),
            &instruments,
            &instruments,
            &instruments,
            args.looped,
            Some(&gd3),
        )?;
        Blob::save(&args.output, &data)?;
        Ok(())
    })
}
