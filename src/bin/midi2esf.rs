//! Transcodes a Standard MIDI File into an ESF event stream using the
//! default channel and instrument mapping.

use clap::Parser;
use echotools::{esf, midi, Blob};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "midi2esf",
    about = "Convert a Standard MIDI File to ESF",
    disable_version_flag = true
)]
struct Args {
    /// Print version information and exit
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Source .mid file
    input: PathBuf,
    /// Destination .esf file
    output: PathBuf,
    /// Mark the stream as looping at its start
    #[arg(short, long)]
    looped: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    echotools::cli::run(|| {
        let options = midi::Options::default();
        let events = midi::parse_file(&args.input, &options)?;
        let data = esf::assemble(&events, args.looped);
        Blob::save(&args.output, &data)?;
        Ok(())
    })
}
