//! The `dnsfmt` zone file formatter.

use std::io::{self, Read, Write};
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;

use zonewright::fmt::reformat;
use zonewright::util;

/// DNS zone file formatter.
#[derive(Clone, Debug, Parser)]
#[command(name = "dnsfmt", version, about = "DNS zone file formatter")]
struct Args {
    /// Set the origin, otherwise taken from $ORIGIN or the owner name of the
    /// SOA record
    #[arg(short = 'o', long, value_name = "NAME", env = "DNSFMT_ORIGIN")]
    origin: Option<String>,

    /// Increase the serial (the default)
    #[arg(short = 'i', long = "inc", overrides_with = "no_inc")]
    inc: bool,

    /// Do not increase the serial
    #[arg(long = "no-inc", overrides_with = "inc")]
    no_inc: bool,

    /// Replace each file with its formatted output
    #[arg(short = 'r', long, env = "DNSFMT_REPLACE")]
    replace: bool,

    /// Zone files; stdin if empty or `-`
    #[arg(value_name = "FILE")]
    files: Vec<Utf8PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("dnsfmt: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let increment = args.inc || !args.no_inc;
    let origin = args.origin.as_deref();

    if args.files.is_empty() || (args.files.len() == 1 && args.files[0] == "-") {
        let mut data = Vec::new();
        io::stdin().read_to_end(&mut data)?;

        let stdout = io::stdout();
        reformat(&data, origin, &mut stdout.lock(), increment)?;
        return Ok(());
    }

    for file in &args.files {
        let data = std::fs::read(file)?;

        let mut formatted = Vec::new();
        reformat(&data, origin, &mut formatted, increment)?;

        if args.replace {
            util::write_file(file, &formatted)?;
        } else {
            io::stdout().write_all(&formatted)?;
        }
    }
    Ok(())
}
