use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

/// Unwrap mails bundled by SpamAssassin.
///
/// Reads an RFC 2822 mail and writes the original message(s) embedded in a
/// SpamAssassin report. Nothing is written for a mail that isn't a report.
#[derive(Parser, Debug)]
#[command(name = "spamsweep-unwrap", version)]
struct Args {
    /// Read the mail from this file (default: stdin)
    #[arg(long, value_name = "FILE")]
    from: Option<PathBuf>,

    /// Write the unwrapped mails to this file (default: stdout)
    #[arg(long, value_name = "FILE")]
    to: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let input: Box<dyn Read> = match &args.from {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };
    let Some(mails) = spamsweep::unwrap::unwrap_reader(input)? else {
        eprintln!("No spam into the mail detected.");
        return Ok(());
    };

    let mut output: Box<dyn Write> = match &args.to {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    for mail in mails {
        output.write_all(&mail)?;
    }
    output.flush()?;
    Ok(())
}
