//! Emits the Mega Drive cartridge header as 68000 assembly `dc.b`/`dc.w`
//! directives, ready to splice into a ROM's source. Unlike `romfix`,
//! this never touches an existing binary.

use chrono::Datelike;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

const MAX_TITLE: usize = 48;
const MAX_COPYRIGHT: usize = 4;

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

#[derive(Parser)]
#[command(
    name = "headgen",
    about = "Generate a Mega Drive ROM header as assembly",
    disable_version_flag = true
)]
struct Args {
    /// Print version information and exit
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Game title, upper-cased and capped at 48 characters
    #[arg(short, long)]
    title: Option<String>,
    /// Copyright code, upper-cased and capped at 4 characters
    #[arg(short, long)]
    copyright: Option<String>,
    /// Advertise 6-button pad support
    #[arg(short = '6', long = "6pad")]
    six_pad: bool,
    /// Advertise mouse support
    #[arg(short, long)]
    mouse: bool,
    /// Advertise Mega CD support
    #[arg(long)]
    megacd: bool,
    /// Advertise SRAM support
    #[arg(short, long)]
    sram: bool,
    /// Output file (stdout if omitted)
    output: Option<PathBuf>,
}

fn truncated_upper(value: &Option<String>, max_len: usize) -> String {
    let mut s: String = value
        .as_deref()
        .unwrap_or("")
        .chars()
        .take(max_len)
        .collect();
    s.make_ascii_uppercase();
    s
}

fn generate_asm(args: &Args) -> String {
    let title = truncated_upper(&args.title, MAX_TITLE);
    let copyright = truncated_upper(&args.copyright, MAX_COPYRIGHT);
    let today = chrono::Local::now().date_naive();

    let mut devices = String::from("J");
    if args.six_pad {
        devices.push('6');
    }
    if args.mouse {
        devices.push('M');
    }
    if args.megacd {
        devices.push('C');
    }

    let mut out = String::new();
    out.push_str("    dc.b    \"SEGA MEGA DRIVE \"\n");
    out.push_str(&format!(
        "    dc.b    \"(C){:<4} {:04}.{}\"\n",
        copyright,
        today.year(),
        MONTHS[today.month0() as usize],
    ));
    out.push_str(&format!("    dc.b    \"{:<48}\"\n", title));
    out.push_str(&format!("    dc.b    \"{:<48}\"\n", title));
    out.push_str("    dc.b    \"GM ????????-00\"\n");
    out.push_str("    dc.w    $0000\n");
    out.push_str(&format!("    dc.b    \"{:<16}\"\n", devices));
    out.push_str("    dc.l    $000000, $3FFFFF\n");
    out.push_str("    dc.l    $FF0000, $FFFFFF\n");
    if args.sram {
        out.push_str("    dc.b    \"RA\", $F8, $20\n");
        out.push_str("    dc.l    $200001, $20FFFF\n");
    } else {
        out.push_str("    dcb.b   12, $20\n");
    }
    out.push_str("    dcb.b   12, $20\n");
    out.push_str("    dcb.b   40, $20\n");
    out.push_str("    dc.b    \"JUE\"\n");
    out.push_str("    dcb.b   13, $20\n");
    out
}

fn main() -> ExitCode {
    let args = Args::parse();
    echotools::cli::run(|| {
        let asm = generate_asm(&args);
        match &args.output {
            Some(path) => echotools::Blob::save(path, asm.as_bytes())?,
            None => {
                print!("{}", asm);
                std::io::stdout().flush().ok();
            }
        }
        Ok(())
    })
}
