//! Compresses or decompresses an 8x8 tile set with the UFTC codec.

use clap::{Parser, Subcommand};
use echotools::uftc;
use echotools::Blob;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "uftc",
    about = "UFTC tile dictionary codec",
    disable_version_flag = true
)]
struct Args {
    /// Print version information and exit
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compress raw 32-byte-per-tile data into UFTC
    Compress { input: PathBuf, output: PathBuf },
    /// Decompress a range of tiles out of a UFTC stream
    Decompress {
        input: PathBuf,
        output: PathBuf,
        /// First tile index to decode
        #[arg(long, default_value_t = 0)]
        start: usize,
        /// Number of tiles to decode
        #[arg(long)]
        count: usize,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    echotools::cli::run(|| match args.command {
        Command::Compress { input, output } => {
            let data = Blob::load(&input)?;
            let compressed = uftc::compress(data.as_slice())?;
            Blob::save(&output, &compressed)?;
            Ok(())
        }
        Command::Decompress {
            input,
            output,
            start,
            count,
        } => {
            let data = Blob::load(&input)?;
            let tiles = uftc::decompress(data.as_slice(), start, count)?;
            Blob::save(&output, &tiles)?;
            Ok(())
        }
    })
}
