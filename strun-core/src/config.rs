use std::{collections::HashMap, env};

/// A source of ambient values, e.g., the variables a job scheduler exports before launching
/// the wrapper.
pub trait Environment {
    fn var(&self, key: &str) -> Option<String>;
}

/// The environment of the current process.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

pub const BAM: &str = "bam";
pub const GTF: &str = "gtf";
pub const OUTPUT: &str = "output";
pub const EXEC_METHOD: &str = "exec_method";
pub const EXEC_INIT: &str = "exec_init";

pub const DEFAULT_EXEC_METHOD: &str = "auto";
pub const DEFAULT_EXEC_INIT: &str = ":";

/// Values given on the command line. Unset options are `None`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Options {
    pub bam: Option<String>,
    pub gtf: Option<String>,
    pub output: Option<String>,
    pub exec_method: Option<String>,
    pub exec_init: Option<String>,
}

/// The resolved invocation.
///
/// Missing required values resolve to an empty string and are rejected by the stages that
/// need them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvocationConfig {
    pub bam: String,
    pub gtf: String,
    pub output: String,
    pub exec_method: String,
    pub exec_init: String,
}

impl InvocationConfig {
    /// Resolves each value with the precedence environment > flag > default.
    ///
    /// Empty environment values are treated as unset.
    pub fn resolve<E>(options: Options, env: &E) -> Self
    where
        E: Environment + ?Sized,
    {
        let pick = |key: &str, flag: Option<String>, default: &str| -> String {
            env.var(key)
                .filter(|value| !value.is_empty())
                .or(flag)
                .unwrap_or_else(|| default.into())
        };

        Self {
            bam: pick(BAM, options.bam, ""),
            gtf: pick(GTF, options.gtf, ""),
            output: pick(OUTPUT, options.output, ""),
            exec_method: pick(EXEC_METHOD, options.exec_method, DEFAULT_EXEC_METHOD),
            exec_init: pick(EXEC_INIT, options.exec_init, DEFAULT_EXEC_INIT),
        }
    }

    /// Returns the init command, unless it is a no-op.
    pub fn init_command(&self) -> Option<&str> {
        match self.exec_init.trim() {
            "" | DEFAULT_EXEC_INIT => None,
            command => Some(command),
        }
    }
}
