//! Converts a VGM Maker VGI instrument into Echo's packed EIF format.
//! VGI carries extra LFO fields this crate has no use for; they're
//! dropped on import, same as the source converter.

use clap::Parser;
use echotools::instruments::{eif, vgi};
use echotools::Blob;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "vgi2eif",
    about = "Convert a VGI instrument to EIF",
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
        let instrument = vgi::parse(data.as_slice())?;
        let eif_data = eif::write(&instrument)?;
        Blob::save(&args.output, &eif_data)?;
        Ok(())
    })
}
