// File utilities for the dubbing service
//
// This module contains the filesystem helpers shared by the pipeline: working
// directory creation, output naming, and logged removal of leftovers.

use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Container used for the dubbed file when the input has no extension
const DEFAULT_OUTPUT_EXTENSION: &str = "mp4";

/// Create a directory (and its parents) if it does not exist yet
///
/// # Returns
///
/// * `Ok(true)` if the directory was created by this call
/// * `Ok(false)` if it already existed; nothing is touched in that case
///
/// # Errors
///
/// Returns an IO error if creation fails or the path exists but is not a directory
pub fn ensure_directory(path: &Path) -> io::Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    if path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a directory", path.display()),
        ));
    }
    fs::create_dir_all(path)?;
    debug!("Created directory: {}", path.display());
    Ok(true)
}

/// Deterministic location of the dubbed video
///
/// `<output_dir>/<video stem>_<target_language>.<video extension>`
pub fn dubbed_output_path(video_path: &Path, output_dir: &Path, target_language: &str) -> PathBuf {
    let stem = video_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video");
    let extension = video_path
        .extension()
        .and_then(|s| s.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or(DEFAULT_OUTPUT_EXTENSION);
    output_dir.join(format!("{}_{}.{}", stem, target_language, extension))
}

/// Remove a single file, treating "already gone" as success
pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Reads a text file into a string
pub fn read_text_file(path: &Path) -> io::Result<String> {
    fs::read_to_string(path)
}
