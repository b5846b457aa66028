//! Per-run filesystem workspace.
//!
//! A [`Workspace`] owns the temporary download and the final clip path of one
//! pipeline run. Releasing it removes the download (and any partial files the
//! fetcher left next to it) and, unless told to keep it, the final clip.

use std::io;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::utils;

const OUTPUT_PREFIX: &str = "nugget";
const OUTPUT_EXTENSION: &str = "mp3";
const TEMP_PREFIX: &str = "temp_audio";

/// Allocates workspaces under the configured output and temp directories
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    output_dir: PathBuf,
    temp_dir: PathBuf,
}

/// Paths owned by a single pipeline run
#[derive(Debug)]
pub struct Workspace {
    temp_input_path: PathBuf,
    final_output_path: PathBuf,
    public_output_name: String,
    fetched_input: Option<PathBuf>,
    released: bool,
}

impl WorkspaceManager {
    pub fn new(output_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            temp_dir: temp_dir.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.output_dir.clone(), config.resolved_temp_dir())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Create the directories if needed and allocate fresh, unique paths
    pub async fn acquire(&self) -> io::Result<Workspace> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::create_dir_all(&self.temp_dir).await?;

        let temp_stem = format!("{}_{}", TEMP_PREFIX, uuid::Uuid::new_v4().simple());
        let public_output_name = utils::generate_unique_filename(OUTPUT_PREFIX, OUTPUT_EXTENSION);

        let workspace = Workspace {
            temp_input_path: self.temp_dir.join(temp_stem),
            final_output_path: self.output_dir.join(&public_output_name),
            public_output_name,
            fetched_input: None,
            released: false,
        };

        tracing::debug!(
            "Acquired workspace: temp={} output={}",
            workspace.temp_input_path.display(),
            workspace.final_output_path.display()
        );

        Ok(workspace)
    }

    /// Remove the run's temporary files, and the final clip unless `keep_final_output`.
    ///
    /// Safe to call more than once; only the first call does any work. Deletion
    /// failures are logged and never returned.
    pub async fn release(&self, workspace: &mut Workspace, keep_final_output: bool) -> usize {
        let Some(cleanup) = workspace.take_cleanup(keep_final_output) else {
            return 0;
        };

        match tokio::task::spawn_blocking(move || cleanup.run()).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("Workspace cleanup task failed: {}", e);
                0
            }
        }
    }
}

impl Workspace {
    /// Prefix handed to the fetcher; it may append its own extension
    pub fn temp_input_path(&self) -> &Path {
        &self.temp_input_path
    }

    pub fn final_output_path(&self) -> &Path {
        &self.final_output_path
    }

    /// File name the clip is published under
    pub fn public_output_name(&self) -> &str {
        &self.public_output_name
    }

    /// Remember where the fetcher actually put the download
    pub fn record_fetched_input(&mut self, path: impl Into<PathBuf>) {
        self.fetched_input = Some(path.into());
    }

    pub fn fetched_input(&self) -> Option<&Path> {
        self.fetched_input.as_deref()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Mark released and hand back the files to delete; `None` if already released
    fn take_cleanup(&mut self, keep_final_output: bool) -> Option<Cleanup> {
        if self.released {
            return None;
        }
        self.released = true;

        Some(Cleanup {
            fetched_input: self.fetched_input.clone(),
            temp_input_path: self.temp_input_path.clone(),
            final_output_path: (!keep_final_output).then(|| self.final_output_path.clone()),
        })
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(cleanup) = self.take_cleanup(false) {
            tracing::warn!(
                "Workspace for {} dropped without release, removing its files",
                self.public_output_name
            );
            cleanup.run();
        }
    }
}

/// Blocking file removal for one released workspace
#[derive(Debug)]
struct Cleanup {
    fetched_input: Option<PathBuf>,
    temp_input_path: PathBuf,
    final_output_path: Option<PathBuf>,
}

impl Cleanup {
    fn run(self) -> usize {
        let mut targets: Vec<PathBuf> = self.fetched_input.iter().cloned().collect();
        for leftover in self.temp_leftovers() {
            if !targets.contains(&leftover) {
                targets.push(leftover);
            }
        }
        targets.extend(self.final_output_path.iter().cloned());

        let mut removed = 0;
        for target in &targets {
            match fs_err::remove_file(target) {
                Ok(()) => {
                    tracing::debug!("Removed {}", target.display());
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Workspace cleanup failed: {}", e),
            }
        }

        removed
    }

    /// Files in the temp dir sharing this run's temp prefix (`.part`, pre-conversion downloads, ...)
    fn temp_leftovers(&self) -> Vec<PathBuf> {
        let (Some(dir), Some(stem)) = (
            self.temp_input_path.parent(),
            self.temp_input_path.file_name().and_then(|s| s.to_str()),
        ) else {
            return Vec::new();
        };

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Could not scan temp dir {}: {}", dir.display(), e);
                }
                return Vec::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with(stem))
            })
            .map(|entry| entry.path())
            .collect()
    }
}
