//! Compiles an MML source file into an ESF event stream.

use clap::Parser;
use echotools::{esf, mml, Blob};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "mml2esf",
    about = "Compile MML source to ESF",
    disable_version_flag = true
)]
struct Args {
    /// Print version information and exit
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Source .mml file
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
        let source = Blob::load(&args.input)?;
        let text = String::from_utf8_lossy(source.as_slice());
        let events = mml::compile(&text)?;
        let data = esf::assemble(&events, args.looped);
        Blob::save(&args.output, &data)?;
        Ok(())
    })
}
