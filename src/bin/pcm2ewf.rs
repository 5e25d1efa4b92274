//! Wraps a raw 8-bit PCM sample into Echo's EWF waveform container.

use clap::Parser;
use echotools::{ewf, Blob};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "pcm2ewf",
    about = "Convert raw PCM to EWF",
    disable_version_flag = true
)]
struct Args {
    /// Print version information and exit
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    input: PathBuf,
    output: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();
    echotools::cli::run(|| {
        let data = Blob::load(&args.input)?;
        let encoded = ewf::write(data.as_slice());
        Blob::save(&args.output, &encoded)?;
        Ok(())
    })
}
