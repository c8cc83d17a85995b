use std::{
    env,
    ffi::{OsStr, OsString},
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use thiserror::Error;
use tracing::debug;

/// A requested execution method.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecMethod {
    /// Run in Docker without probing.
    Docker,
    /// Use the highest ranked backend detected in the environment.
    Auto,
}

impl ExecMethod {
    pub const VARIANTS: [Self; 2] = [Self::Docker, Self::Auto];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for ExecMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecMethod {
    type Err = ExecMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::VARIANTS
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| ExecMethodError::Invalid(s.into()))
    }
}

/// A runtime that can execute the wrapped tool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Backend {
    Docker,
}

impl Backend {
    /// All backends, from most to least preferred.
    pub const RANKED: [Self; 1] = [Self::Docker];

    /// The executable that must be on `PATH` for the backend to be usable.
    pub fn program(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ExecMethodError {
    #[error("invalid execution method: {0}")]
    Invalid(String),
    #[error("valid execution method not detected")]
    NotDetected,
}

/// Detects the backends available to this process.
pub trait Detect {
    /// Returns the available backends, from most to least preferred.
    ///
    /// `search_path` is a `PATH`-style list that takes precedence over the detector's own.
    fn detect(&self, search_path: Option<&OsStr>) -> Vec<Backend>;
}

/// Detects backends by searching the directories in a `PATH`-style list.
#[derive(Clone, Debug, Default)]
pub struct PathDetector {
    path: Option<OsString>,
}

impl PathDetector {
    /// Searches the `PATH` of the current process at detection time.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path<S>(path: S) -> Self
    where
        S: Into<OsString>,
    {
        Self {
            path: Some(path.into()),
        }
    }
}

impl Detect for PathDetector {
    fn detect(&self, search_path: Option<&OsStr>) -> Vec<Backend> {
        let Some(path) = search_path
            .map(OsString::from)
            .or_else(|| self.path.clone())
            .or_else(|| env::var_os("PATH"))
        else {
            return Vec::new();
        };

        let dirs: Vec<_> = env::split_paths(&path).collect();

        Backend::RANKED
            .into_iter()
            .filter(|backend| {
                let found = find_program(&dirs, backend.program());
                debug!(%backend, found = ?found, "searched for backend");
                found.is_some()
            })
            .collect()
    }
}

fn find_program(dirs: &[PathBuf], name: &str) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Resolves the requested method to a backend.
///
/// Only `auto` consults the detector. `search_path` is passed through to it, e.g., the `PATH`
/// exported by an init script.
pub fn resolve<D>(
    method: ExecMethod,
    detector: &D,
    search_path: Option<&OsStr>,
) -> Result<Backend, ExecMethodError>
where
    D: Detect + ?Sized,
{
    match method {
        ExecMethod::Docker => Ok(Backend::Docker),
        ExecMethod::Auto => detector
            .detect(search_path)
            .into_iter()
            .next()
            .ok_or(ExecMethodError::NotDetected),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    struct FixedDetector {
        backends: Vec<Backend>,
        calls: Cell<usize>,
        search_path: RefCell<Option<OsString>>,
    }

    impl FixedDetector {
        fn new(backends: Vec<Backend>) -> Self {
            Self {
                backends,
                calls: Cell::new(0),
                search_path: RefCell::new(None),
            }
        }
    }

    impl Detect for FixedDetector {
        fn detect(&self, search_path: Option<&OsStr>) -> Vec<Backend> {
            self.calls.set(self.calls.get() + 1);
            *self.search_path.borrow_mut() = search_path.map(OsString::from);
            self.backends.clone()
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!("docker".parse::<ExecMethod>(), Ok(ExecMethod::Docker));
        assert_eq!("auto".parse::<ExecMethod>(), Ok(ExecMethod::Auto));

        assert_eq!(
            "singularity".parse::<ExecMethod>(),
            Err(ExecMethodError::Invalid(String::from("singularity")))
        );
        assert_eq!(
            "Docker".parse::<ExecMethod>(),
            Err(ExecMethodError::Invalid(String::from("Docker")))
        );
    }

    #[test]
    fn test_resolve() {
        let detector = FixedDetector::new(Vec::new());
        assert_eq!(
            resolve(ExecMethod::Docker, &detector, None),
            Ok(Backend::Docker)
        );
        assert_eq!(detector.calls.get(), 0);

        assert_eq!(
            resolve(ExecMethod::Auto, &detector, None),
            Err(ExecMethodError::NotDetected)
        );
        assert_eq!(detector.calls.get(), 1);

        let detector = FixedDetector::new(vec![Backend::Docker]);
        let search_path = OsStr::new("/opt/docker/bin");
        assert_eq!(
            resolve(ExecMethod::Auto, &detector, Some(search_path)),
            Ok(Backend::Docker)
        );
        assert_eq!(detector.search_path.borrow().as_deref(), Some(search_path));
    }

    #[cfg(unix)]
    #[test]
    fn test_path_detector() -> std::io::Result<()> {
        use std::{fs, os::unix::fs::PermissionsExt};

        let empty = tempfile::tempdir()?;
        let bin = tempfile::tempdir()?;

        let detector = PathDetector::with_path(env::join_paths([empty.path()]).unwrap());
        assert!(detector.detect(None).is_empty());

        let docker = bin.path().join("docker");
        fs::write(&docker, b"#!/bin/sh\n")?;

        let detector =
            PathDetector::with_path(env::join_paths([empty.path(), bin.path()]).unwrap());
        assert!(detector.detect(None).is_empty());

        fs::set_permissions(&docker, fs::Permissions::from_mode(0o755))?;
        assert_eq!(detector.detect(None), [Backend::Docker]);

        // A search path given at detection time replaces the detector's own.
        let detector = PathDetector::with_path(env::join_paths([empty.path()]).unwrap());
        let search_path = env::join_paths([bin.path()]).unwrap();
        assert_eq!(detector.detect(Some(&search_path)), [Backend::Docker]);
        assert!(detector.detect(Some(OsStr::new(""))).is_empty());

        Ok(())
    }
}
