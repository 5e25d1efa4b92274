//! Pads a Mega Drive ROM image to a header-valid size, recomputes its
//! checksum, and optionally edits the title/copyright/serial/revision
//! header fields and stamps today's build date. Edits the file in
//! place.

use clap::Parser;
use echotools::{rom, Blob};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "romfix",
    about = "Pad and fix up a Mega Drive ROM header",
    disable_version_flag = true
)]
struct Args {
    /// Print version information and exit
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// ROM image to edit in place
    rom: PathBuf,
    /// Set the ROM title (written to both the domestic and overseas slots)
    #[arg(short, long)]
    title: Option<String>,
    /// Set the copyright code
    #[arg(short, long)]
    copyright: Option<String>,
    /// Set the serial number
    #[arg(short, long)]
    serial: Option<String>,
    /// Set the revision (two digits, 00 to 99)
    #[arg(short, long)]
    revision: Option<String>,
    /// Stamp the build date field with today's date
    #[arg(short, long)]
    date: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    echotools::cli::run(|| {
        let mut image = Blob::load(&args.rom)?.into_vec();

        rom::pad(&mut image);
        rom::compute_checksum(&mut image);

        if let Some(title) = &args.title {
            rom::set_title(&mut image, title)?;
        }
        if let Some(copyright) = &args.copyright {
            rom::set_copyright(&mut image, copyright)?;
        }
        if let Some(serial) = &args.serial {
            rom::set_serial(&mut image, serial)?;
        }
        if let Some(revision) = &args.revision {
            rom::set_revision(&mut image, revision)?;
        }
        if args.date {
            let today = chrono::Local::now().date_naive();
            use chrono::Datelike;
            rom::set_build_date(&mut image, today.year() as u32, today.month0() as u8)?;
        }

        rom::compute_checksum(&mut image);
        Blob::save(&args.rom, &image)?;
        Ok(())
    })
}
