use std::ffi::OsString;

use clap::{CommandFactory, Parser, error::ErrorKind};
use strun_core::config::Options;

/// Run StringTie on a BAM file in a container.
///
/// Each of --bam, --gtf, --output, --exec_method, and --exec_init can also be set by an
/// environment variable of the same name. The environment takes precedence.
#[derive(Debug, Parser)]
#[command(name = "strun")]
pub struct Cli {
    /// Input alignments (BAM).
    #[arg(long, value_name = "PATH")]
    pub bam: Option<String>,

    /// Input annotations (GTF).
    #[arg(long, value_name = "PATH")]
    pub gtf: Option<String>,

    /// Output path.
    ///
    /// Artifacts are written to this directory. Logs are written to `_log` in its parent.
    #[arg(long, value_name = "PATH")]
    pub output: Option<String>,

    /// Execution method [possible values: docker, auto] [default: auto].
    #[arg(long = "exec_method", value_name = "METHOD")]
    pub exec_method: Option<String>,

    /// Shell command to run before detecting the execution method [default: :].
    #[arg(long = "exec_init", value_name = "COMMAND")]
    pub exec_init: Option<String>,

    /// Print the container command instead of running it.
    #[arg(long = "dry_run")]
    pub dry_run: bool,
}

impl Cli {
    pub fn options(&self) -> Options {
        Options {
            bam: self.bam.clone(),
            gtf: self.gtf.clone(),
            output: self.output.clone(),
            exec_method: self.exec_method.clone(),
            exec_init: self.exec_init.clone(),
        }
    }
}

pub fn parse<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Returns the exit code for a parse error.
///
/// Help requests succeed. An unrecognized option exits with 3 and any other parse error
/// with 2.
pub fn parse_error_exit_code(error: &clap::Error) -> u8 {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        ErrorKind::UnknownArgument => 3,
        _ => 2,
    }
}

pub fn usage() -> String {
    Cli::command().render_help().to_string()
}
