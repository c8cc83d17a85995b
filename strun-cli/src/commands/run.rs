use std::{fs, path::Path};

use anyhow::Context as _;
use strun_core::{
    Environment, InvocationConfig, ProcessEnvironment, ResolvedPath, RetryPolicy,
    command::{ExternalCommand, Inputs},
    config::{BAM, GTF, OUTPUT},
    exec_method::{self, Detect, ExecMethod, ExecMethodError, PathDetector},
    path::{OutputLayout, ResolvePathError},
    retry::{Sleep, ThreadSleep},
    runner::{self, RunStageError},
    staging::{self, StageError},
};
use thiserror::Error;
use tracing::info;

use crate::cli::Cli;

/// The collaborators of a run.
pub struct Context<E, S, D> {
    pub env: E,
    pub sleeper: S,
    pub detector: D,
    pub retry_policy: RetryPolicy,
}

impl Context<ProcessEnvironment, ThreadSleep, PathDetector> {
    pub fn from_process() -> Self {
        Self {
            env: ProcessEnvironment,
            sleeper: ThreadSleep,
            detector: PathDetector::new(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    /// The container ran and exited successfully.
    Completed,
    /// A dry run stopped before preparing directories or executing.
    Planned(ExternalCommand),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error("invalid path")]
    ResolvePath(#[from] ResolvePathError),
    #[error(transparent)]
    ExecMethod(#[from] ExecMethodError),
    #[error("failed to prepare output directories")]
    PrepareDirectories(#[source] anyhow::Error),
    #[error("external command failed")]
    External(#[from] RunStageError),
}

impl RunError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::External(e) => u8::try_from(e.exit_code()).unwrap_or(1),
            _ => 1,
        }
    }

    /// Returns whether usage should be printed with the error.
    ///
    /// External failures are not usage problems.
    pub fn prints_usage(&self) -> bool {
        !matches!(self, Self::External(_))
    }
}

pub fn run<E, S, D>(cli: Cli, ctx: &mut Context<E, S, D>) -> Result<Outcome, RunError>
where
    E: Environment,
    S: Sleep,
    D: Detect,
{
    let config = InvocationConfig::resolve(cli.options(), &ctx.env);

    info!(
        bam = %config.bam,
        gtf = %config.gtf,
        output = %config.output,
        exec_method = %config.exec_method,
        exec_init = %config.exec_init,
        dry_run = cli.dry_run,
        "resolved configuration"
    );

    staging::stage(BAM, &config.bam, &ctx.retry_policy, &mut ctx.sleeper)?;
    staging::stage(GTF, &config.gtf, &ctx.retry_policy, &mut ctx.sleeper)?;

    info!("staged inputs");

    let bam = ResolvedPath::resolve(BAM, &config.bam)?;
    let gtf = ResolvedPath::resolve(GTF, &config.gtf)?;
    let output = ResolvedPath::resolve(OUTPUT, &config.output)?;

    info!(
        bam = ?bam.full_path(),
        gtf = ?gtf.full_path(),
        output = ?output.full_path(),
        "resolved paths"
    );

    let exec_method: ExecMethod = config.exec_method.parse()?;

    // The environment exported by init applies to detection and to the container.
    let vars = config.init_command().map(runner::run_init).transpose()?;
    let search_path = vars.as_ref().and_then(|vars| vars.get("PATH"));

    let backend = exec_method::resolve(exec_method, &ctx.detector, search_path)?;

    info!(%exec_method, %backend, "resolved execution method");

    let inputs = Inputs {
        bam: &bam,
        gtf: &gtf,
        output: &output,
    };

    let layout = OutputLayout::new(output.clone());
    let command = ExternalCommand::build(backend, inputs, &layout);

    info!(command = %command, "built command");

    if cli.dry_run {
        return Ok(Outcome::Planned(command));
    }

    prepare_directories(&layout).map_err(RunError::PrepareDirectories)?;

    runner::run_container(&command, vars.as_ref())?;

    Ok(Outcome::Completed)
}

fn prepare_directories(layout: &OutputLayout) -> anyhow::Result<()> {
    for dir in layout.directories() {
        create_dir(&dir)?;
    }

    Ok(())
}

fn create_dir(dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    info!(dir = ?dir, "created directory");
    Ok(())
}
