use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::retry::{RetryPolicy, Sleep};

#[derive(Debug, Error, Eq, PartialEq)]
pub enum StageError {
    #[error("missing required input: --{name}")]
    Missing { name: &'static str },
    #[error("{name} file not found: {path}")]
    NotFound { name: &'static str, path: PathBuf },
}

/// Waits for the input `name` at `src` to become a regular file.
pub fn stage<S>(
    name: &'static str,
    src: &str,
    policy: &RetryPolicy,
    sleeper: &mut S,
) -> Result<PathBuf, StageError>
where
    S: Sleep + ?Sized,
{
    if src.is_empty() {
        return Err(StageError::Missing { name });
    }

    let path = PathBuf::from(src);

    info!(name, src = ?path, "staging input");

    let found = policy.run(sleeper, |attempt| {
        let exists = is_file(&path);
        debug!(name, attempt, exists, "checked input");
        exists
    });

    if found {
        Ok(path)
    } else {
        Err(StageError::NotFound { name, path })
    }
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}
