//! The local workspace directory and the artifacts written into it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::options::Confirm;
use crate::{Error, Result};

/// Sentinel whose presence tells init containers that setup is done.
pub const MAGIC_FILE: &str = "finished.txt";

pub const ZOMBIE_WRAPPER: &str = "zombie-wrapper.sh";

/// Placeholder in the wrapper template replaced by the client's remote directory.
pub const REMOTE_DIR_PLACEHOLDER: &str = "{{REMOTE_DIR}}";

const ZOMBIE_WRAPPER_TEMPLATE: &str = include_str!("../templates/zombie-wrapper.sh");

/// Resolve the workspace directory for a launch.
///
/// Without `dir`, a fresh directory named after the namespace is created under the system
/// temporary directory. An existing `dir` is reused only with `force` or the prompt's consent;
/// `in_ci` never prompts. A refusal returns [`Error::DirectoryConflict`] before anything is
/// written.
pub async fn prepare_workspace(
    dir: Option<&Path>,
    namespace: &str,
    force: bool,
    in_ci: bool,
    prompt: Arc<dyn Confirm>,
) -> Result<PathBuf> {
    let Some(dir) = dir else {
        let dir = std::env::temp_dir().join(namespace);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(Error::workspace(&dir))?;
        debug!(?dir, "created ephemeral workspace");
        return Ok(dir);
    };

    let exists = tokio::fs::try_exists(dir)
        .await
        .map_err(Error::workspace(dir))?;

    if !exists {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(Error::workspace(dir))?;
        return Ok(dir.to_path_buf());
    }

    if force {
        debug!(?dir, "reusing existing workspace");
        return Ok(dir.to_path_buf());
    }

    if in_ci {
        warn!(?dir, "workspace already exists and prompting is disabled");
        return Err(Error::DirectoryConflict(dir.to_path_buf()));
    }

    let question = format!(
        "Directory {} already exists; do you want to continue?",
        dir.display()
    );
    let confirmed = tokio::task::spawn_blocking(move || prompt.confirm(&question))
        .await
        .unwrap_or(false);

    if confirmed {
        Ok(dir.to_path_buf())
    } else {
        Err(Error::DirectoryConflict(dir.to_path_buf()))
    }
}

/// Create (or truncate) the zero-byte magic file.
pub async fn write_magic_file(workspace: &Path) -> Result<PathBuf> {
    let path = workspace.join(MAGIC_FILE);
    tokio::fs::File::create(&path)
        .await
        .map_err(Error::workspace(&path))?;
    Ok(path)
}

/// Render the wrapper script for `remote_dir` and write it as an executable.
pub async fn write_wrapper_script(workspace: &Path, remote_dir: &Path) -> Result<PathBuf> {
    let path = workspace.join(ZOMBIE_WRAPPER);
    let content =
        ZOMBIE_WRAPPER_TEMPLATE.replace(REMOTE_DIR_PLACEHOLDER, &remote_dir.to_string_lossy());

    tokio::fs::write(&path, content)
        .await
        .map_err(Error::workspace(&path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(Error::workspace(&path))?;
    }

    Ok(path)
}

/// Locations of the relay chain spec files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSpecPaths {
    /// `<workspace>/<chain>-plain.json`
    pub plain: PathBuf,
    /// `<workspace>/<chain>.json`
    pub raw: PathBuf,
}

impl ChainSpecPaths {
    pub fn new(workspace: &Path, chain: &str) -> Self {
        Self {
            plain: workspace.join(format!("{chain}-plain.json")),
            raw: workspace.join(format!("{chain}.json")),
        }
    }
}
