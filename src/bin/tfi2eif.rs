//! Converts a TFM Maker TFI instrument into Echo's packed EIF format.

use clap::Parser;
use echotools::instruments::{eif, tfi};
use echotools::Blob;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "tfi2eif",
    about = "Convert a TFI instrument to EIF",
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
        let instrument = tfi::parse(data.as_slice())?;
        let eif_data = eif::write(&instrument)?;
        Blob::save(&args.output, &eif_data)?;
        Ok(())
    })
}
