use std::{
    io,
    path::{self, Component, Path, PathBuf},
};

use thiserror::Error;

const LOG_DIRECTORY_NAME: &str = "_log";
const TMP_DIRECTORY_NAME: &str = "_tmp";

#[derive(Debug, Error)]
pub enum ResolvePathError {
    #[error("missing required path: --{0}")]
    Missing(&'static str),
    #[error("I/O error")]
    Io(#[from] io::Error),
    #[error("path has no base name: {0}")]
    MissingBaseName(PathBuf),
}

/// An absolute, symlink-resolved path split into its directory and base name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedPath {
    directory: PathBuf,
    base_name: String,
}

impl ResolvedPath {
    /// Resolves the path `src` named `name`.
    ///
    /// `src` does not have to exist. Its longest existing prefix is canonicalized, and the
    /// remaining components are appended lexically.
    pub fn resolve(name: &'static str, src: &str) -> Result<Self, ResolvePathError> {
        if src.is_empty() {
            return Err(ResolvePathError::Missing(name));
        }

        let full_path = canonicalize(src)?;
        Self::try_from(full_path)
    }

    pub fn full_path(&self) -> PathBuf {
        self.directory.join(&self.base_name)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }
}

impl TryFrom<PathBuf> for ResolvedPath {
    type Error = ResolvePathError;

    fn try_from(full_path: PathBuf) -> Result<Self, Self::Error> {
        let (Some(directory), Some(base_name)) = (full_path.parent(), full_path.file_name())
        else {
            return Err(ResolvePathError::MissingBaseName(full_path));
        };

        Ok(Self {
            directory: directory.into(),
            base_name: base_name.to_string_lossy().into_owned(),
        })
    }
}

fn canonicalize<P>(src: P) -> io::Result<PathBuf>
where
    P: AsRef<Path>,
{
    let src = path::absolute(src)?;

    let mut dst = PathBuf::new();

    for component in src.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => dst.push(component),
            Component::CurDir => {}
            Component::ParentDir => {
                dst.pop();
            }
            Component::Normal(name) => {
                dst.push(name);

                if let Ok(path) = dst.canonicalize() {
                    dst = path;
                }
            }
        }
    }

    Ok(dst)
}

/// The directories a run writes to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputLayout {
    output: ResolvedPath,
    log_directory: PathBuf,
    tmp_directory: PathBuf,
}

impl OutputLayout {
    pub fn new(output: ResolvedPath) -> Self {
        let log_directory = output.directory().join(LOG_DIRECTORY_NAME);
        let tmp_directory = output.directory().join(TMP_DIRECTORY_NAME);

        Self {
            output,
            log_directory,
            tmp_directory,
        }
    }

    pub fn output(&self) -> &ResolvedPath {
        &self.output
    }

    pub fn log_directory(&self) -> &Path {
        &self.log_directory
    }

    pub fn tmp_directory(&self) -> &Path {
        &self.tmp_directory
    }

    /// Returns the directories to create before execution.
    pub fn directories(&self) -> [PathBuf; 3] {
        [
            self.output.full_path(),
            self.log_directory.clone(),
            self.tmp_directory.clone(),
        ]
    }
}
