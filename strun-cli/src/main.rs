use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod cli;
mod commands;

use std::{io, process::ExitCode};

use tracing::info;

use self::commands::{Context, Outcome, RunError, run};

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let code = match cli::parse(std::env::args_os()) {
        Ok(cli) => match run(cli, &mut Context::from_process()) {
            Ok(Outcome::Completed) => 0,
            Ok(Outcome::Planned(command)) => {
                println!("{command}");
                0
            }
            Err(e) => report(e),
        },
        Err(e) => {
            // Help is printed to stdout, everything else to stderr with usage.
            let _ = e.print();
            cli::parse_error_exit_code(&e)
        }
    };

    info!(code, "exiting");

    ExitCode::from(code)
}

fn report(error: RunError) -> u8 {
    let code = error.exit_code();
    let prints_usage = error.prints_usage();

    eprintln!("strun: {:#}", anyhow::Error::from(error));

    if prints_usage {
        eprintln!();
        eprintln!("{}", cli::usage());
    }

    code
}
