// Workspace layout: where descriptors, publishing keys and run logs live.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// On-disk layout the publisher works in: descriptors, keys and run logs.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Workspace { root: root.into() }
    }

    /// Create `packages/`, `keys/` and `logs/` if they are missing.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [self.packages_dir(), self.keys_dir(), self.logs_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn descriptor_path(&self, name: &str) -> PathBuf {
        self.packages_dir().join(format!("{name}.json"))
    }

    /// Names of every descriptor in `packages/`, sorted.
    pub fn descriptor_names(&self) -> Result<Vec<String>> {
        let dir = self.packages_dir();
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
