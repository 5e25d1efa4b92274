//! Converts an Echo EIF instrument back into TFM Maker's unpacked TFI
//! format.

use clap::Parser;
use echotools::instruments::{eif, tfi};
use echotools::Blob;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "eif2tfi",
    about = "Convert an EIF instrument to TFI",
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
        let instrument = eif::parse(data.as_slice())?;
        let tfi_data = tfi::write(&instrument);
        Blob::save(&args.output, &tfi_data)?;
        Ok(())
    })
}
