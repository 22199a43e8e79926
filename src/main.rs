use std::io::IsTerminal;
use std::process;

use clap::Parser;
use clap::error::ErrorKind;
use tracing_subscriber::EnvFilter;

use spamsweep::cli::Cli;
use spamsweep::config::Settings;
use spamsweep::error::ExitCode;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Ok,
                _ => ExitCode::Flags,
            };
            let _ = e.print();
            process::exit(code.code());
        }
    };

    init_tracing(cli.verbose);
    process::exit(real_main(&cli).code());
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("spamsweep=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run to completion; the lock is released before this returns.
fn real_main(cli: &Cli) -> ExitCode {
    let interactive = std::io::stdin().is_terminal();
    let result = Settings::from_cli(cli, interactive).and_then(|settings| {
        let summary = spamsweep::run::run(&settings)?;
        Ok(summary.exit_code(settings.exit_codes))
    });
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help to see valid options and arguments");
            e.exit_code()
        }
    }
}
