//! Temporary artifact tracking for one run
//!
//! Every intermediate file a stage produces is registered here and removed
//! exactly once, either by the orchestrator's explicit cleanup or, if the run
//! unwinds before reaching it, when the set is dropped.

use log::{debug, error, info, warn};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::file_utils::{ensure_directory, remove_file_if_exists};

/// Outcome of a purge
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    /// Paths that were removed (or were already gone)
    pub removed: Vec<PathBuf>,
    /// Human-readable description of each removal that failed
    pub failures: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The set of intermediate files owned by a single run
#[derive(Debug)]
pub struct TempArtifactSet {
    work_dir: PathBuf,
    created_work_dir: bool,
    artifacts: Vec<PathBuf>,
    purged: bool,
}

impl TempArtifactSet {
    /// Describe the run's working area without touching the filesystem
    pub fn new(temp_root: &Path, run_id: &str) -> Self {
        Self {
            work_dir: temp_root.join(run_id),
            created_work_dir: false,
            artifacts: Vec::new(),
            purged: false,
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Create the working directory if needed
    ///
    /// Idempotent. A directory that already existed is left in place on purge;
    /// only the files tracked in it are removed.
    pub fn prepare(&mut self) -> io::Result<&Path> {
        if ensure_directory(&self.work_dir)? {
            self.created_work_dir = true;
        }
        Ok(&self.work_dir)
    }

    /// Register a path the run now owns
    ///
    /// Only direct children of the working directory are accepted.
    pub fn track(&mut self, path: impl Into<PathBuf>) -> io::Result<()> {
        let path = path.into();
        let owned = path.parent() == Some(self.work_dir.as_path())
            && path.file_name().is_some_and(|name| name != "." && name != "..");
        if !owned {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} is not inside {}",
                    path.display(),
                    self.work_dir.display()
                ),
            ));
        }
        if !self.artifacts.contains(&path) {
            debug!("Tracking artifact {}", path.display());
            self.artifacts.push(path);
        }
        Ok(())
    }

    /// Remove an artifact early and stop tracking it
    ///
    /// On failure the path stays tracked so the final purge retries it.
    pub fn release(&mut self, path: &Path) -> io::Result<()> {
        remove_file_if_exists(path)?;
        self.artifacts.retain(|tracked| tracked != path);
        debug!("Released artifact {}", path.display());
        Ok(())
    }

    pub fn tracked(&self) -> &[PathBuf] {
        &self.artifacts
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty() && !self.created_work_dir
    }

    /// Delete everything still tracked, plus the working directory if this set
    /// created it
    ///
    /// Runs at most once; later calls return an empty report. Errors are
    /// logged and collected, never returned.
    pub fn purge(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        if self.purged {
            return report;
        }
        self.purged = true;

        for path in self.artifacts.drain(..) {
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                remove_file_if_exists(&path)
            };
            match result {
                Ok(()) => report.removed.push(path),
                Err(e) => {
                    error!("Failed to remove artifact {}: {}", path.display(), e);
                    report
                        .failures
                        .push(format!("{}: {}", path.display(), e));
                }
            }
        }

        if self.created_work_dir {
            match fs::remove_dir_all(&self.work_dir) {
                Ok(()) => report.removed.push(self.work_dir.clone()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    error!(
                        "Failed to remove working directory {}: {}",
                        self.work_dir.display(),
                        e
                    );
                    report
                        .failures
                        .push(format!("{}: {}", self.work_dir.display(), e));
                }
            }
        }

        info!(
            "Cleanup of {} removed {} path(s), {} failure(s)",
            self.work_dir.display(),
            report.removed.len(),
            report.failures.len()
        );
        report
    }
}

impl Drop for TempArtifactSet {
    fn drop(&mut self) {
        if !self.purged {
            warn!(
                "Artifact set for {} dropped before cleanup, purging now",
                self.work_dir.display()
            );
            self.purge();
        }
    }
}
