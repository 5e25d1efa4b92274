//! Compresses or decompresses a raw blob with the SLZ codec.

use clap::{Parser, Subcommand, ValueEnum};
use echotools::slz;
use echotools::Blob;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Slz16,
    Slz24,
}

impl From<FormatArg> for slz::Format {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Slz16 => slz::Format::Slz16,
            FormatArg::Slz24 => slz::Format::Slz24,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "slz",
    about = "SLZ compression tool",
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
    /// Compress a raw blob into SLZ
    Compress {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, value_enum, default_value = "slz16")]
        format: FormatArg,
    },
    /// Decompress an SLZ blob
    Decompress {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, value_enum, default_value = "slz16")]
        format: FormatArg,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    echotools::cli::run(|| match args.command {
        Command::Compress {
            input,
            output,
            format,
        } => {
            let data = Blob::load(&input)?;
            let compressed = slz::compress(data.as_slice(), format.into())?;
            Blob::save(&output, &compressed)?;
            Ok(())
        }
        Command::Decompress {
            input,
            output,
            format,
        } => {
            let data = Blob::load(&input)?;
            let decompressed = slz::decompress(data.as_slice(), format.into())?;
            Blob::save(&output, &decompressed)?;
            Ok(())
        }
    })
}
