use std::{
    ffi::{OsStr, OsString},
    fs::File,
    io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
};

use thiserror::Error;
use tracing::info;

use crate::command::ExternalCommand;

const SHELL: &str = "sh";

const INIT_STAGE: &str = "exec_init";
const CONTAINER_STAGE: &str = "container";

// The script's stdout is moved to stderr so that fd 3 (the original stdout) only carries the
// exported environment. `pipefail` is enabled when the shell supports it. `env` is located
// before the script runs in case the script replaces `PATH`.
const INIT_PRELUDE: &str = "\
exec 3>&1 1>&2
(set -o pipefail) 2>/dev/null && set -o pipefail
__strun_env=$(command -v env)
";

const INIT_EPILOGUE: &str = "
__strun_status=$?
[ \"$__strun_status\" -eq 0 ] || exit \"$__strun_status\"
\"$__strun_env\" -0 >&3
";

/// The exported environment of a finished init script.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Vars(Vec<(OsString, OsString)>);

impl Vars {
    pub fn get<K>(&self, key: K) -> Option<&OsStr>
    where
        K: AsRef<OsStr>,
    {
        let key = key.as_ref();

        self.0
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_os_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_os_str(), value.as_os_str()))
    }

    /// Parses the output of `env -0`.
    fn parse(buf: &[u8]) -> Self {
        const NUL: u8 = 0x00;
        const EQUALS_SIGN: u8 = b'=';

        let vars = buf
            .split(|&b| b == NUL)
            .filter_map(|entry| {
                let i = entry.iter().position(|&b| b == EQUALS_SIGN)?;
                let (name, value) = (&entry[..i], &entry[i + 1..]);
                (!name.is_empty()).then(|| (os_string(name), os_string(value)))
            })
            .collect();

        Self(vars)
    }
}

#[cfg(unix)]
fn os_string(buf: &[u8]) -> OsString {
    use std::os::unix::ffi::OsStringExt;
    OsString::from_vec(buf.to_vec())
}

#[cfg(not(unix))]
fn os_string(buf: &[u8]) -> OsString {
    OsString::from(String::from_utf8_lossy(buf).into_owned())
}

#[derive(Debug, Error)]
pub enum RunStageError {
    #[error("failed to start {stage} stage")]
    Spawn {
        stage: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("failed to create log file: {path}")]
    CreateLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{stage} stage failed with exit code {code}")]
    Failed { stage: &'static str, code: i32 },
}

impl RunStageError {
    /// Returns the code the process should exit with.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound => 127,
            Self::Spawn { .. } => 126,
            Self::CreateLog { .. } => 1,
            Self::Failed { code, .. } => *code,
        }
    }
}

/// Runs the init script and returns the environment it exports.
///
/// The script's stdout and stderr both go to this process's stderr.
pub fn run_init(script: &str) -> Result<Vars, RunStageError> {
    let spawn_error = |source| RunStageError::Spawn {
        stage: INIT_STAGE,
        source,
    };

    let mut command = Command::new(SHELL);
    command
        .arg("-c")
        .arg(format!("{INIT_PRELUDE}{script}{INIT_EPILOGUE}"))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    info!(stage = INIT_STAGE, "running stage");

    let output = command.output().map_err(spawn_error)?;
    check(INIT_STAGE, output.status)?;

    let vars = Vars::parse(&output.stdout);

    info!(var_count = vars.0.len(), "captured init environment");

    Ok(vars)
}

/// Runs the container command, writing its stdout and stderr to its log files.
///
/// If `vars` is given, it replaces the environment of the process, including the `PATH` used
/// to find the program.
pub fn run_container(
    external_command: &ExternalCommand,
    vars: Option<&Vars>,
) -> Result<(), RunStageError> {
    let stdout = create_log(external_command.stdout_log())?;
    let stderr = create_log(external_command.stderr_log())?;

    let mut command = Command::new(external_command.program());
    command
        .args(external_command.backend_args())
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);

    if let Some(vars) = vars {
        command.env_clear().envs(vars.iter());
    }

    info!(stage = CONTAINER_STAGE, "running stage");

    let status = command.status().map_err(|source| RunStageError::Spawn {
        stage: CONTAINER_STAGE,
        source,
    })?;

    check(CONTAINER_STAGE, status)
}

fn create_log(path: &Path) -> Result<File, RunStageError> {
    File::create(path).map_err(|source| RunStageError::CreateLog {
        path: path.into(),
        source,
    })
}

fn check(stage: &'static str, status: ExitStatus) -> Result<(), RunStageError> {
    let code = exit_code(status);

    info!(stage, code, "finished stage");

    if code == 0 {
        Ok(())
    } else {
        Err(RunStageError::Failed { stage, code })
    }
}

/// Converts an exit status to a shell-style exit code.
///
/// A process killed by signal `n` yields `128 + n`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
