// Ephemeral per-execution workspace holding the submitted source file.
// Exactly one workspace exists per in-flight execution; release happens in
// Drop so every exit path of the enclosing execution cleans up.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::registry::LanguageConfig;

pub const WORKSPACE_PREFIX: &str = "crucible-ws-";

/// Exclusively-owned directory backing one execution. Never shared across
/// concurrent executions and never outliving the call that created it.
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create a fresh uniquely-named directory and materialize the submitted
    /// source under the language's filename convention.
    pub fn create(config: &LanguageConfig, code: &str) -> Result<Self> {
        let root = std::env::temp_dir().join(format!("{}{}", WORKSPACE_PREFIX, Uuid::new_v4()));
        fs::create_dir_all(&root).context("Failed to create workspace directory")?;

        // From here on the Drop impl owns cleanup, including the error paths
        // below.
        let workspace = Workspace { root };

        let source_path = workspace.root.join(&config.source_filename);
        fs::write(&source_path, code).context("Failed to write source file into workspace")?;

        debug!(path = %workspace.root.display(), "Workspace created");
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!(path = %self.root.display(), "Workspace released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.root.display(), error = %e, "Failed to release workspace");
            }
        }
    }
}
