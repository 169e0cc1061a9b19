// src/workspace.rs

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::error::Result;

/// Local data directory with `raw/`, `processed/` and `external/` subfolders.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create the directory tree under `root` if it is missing.
    pub fn bootstrap(root: impl Into<PathBuf>) -> Result<Self> {
        let ws = Self { root: root.into() };
        for d in [ws.raw(), ws.processed(), ws.external()] {
            fs::create_dir_all(&d)?;
            debug!(dir = %d.display(), "ensured");
        }
        Ok(ws)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn processed(&self) -> PathBuf {
        self.root.join("processed")
    }

    /// Where downloaded geography archives are cached.
    pub fn external(&self) -> PathBuf {
        self.root.join("external")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn bootstrap_is_idempotent() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("data");
        let ws = Workspace::bootstrap(&root).unwrap();
        assert!(ws.raw().is_dir());
        assert!(ws.processed().is_dir());
        assert!(ws.external().is_dir());

        fs::write(ws.raw().join("keep.txt"), "x").unwrap();
        let again = Workspace::bootstrap(&root).unwrap();
        assert!(again.raw().join("keep.txt").is_file());
        assert_eq!(again.root(), root.as_path());
    }
}
