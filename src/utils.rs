//! Filesystem and naming helpers shared by the reader, writer and CLI

use anyhow::Context;
use globset::{GlobBuilder, GlobMatcher};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::Result;

const SIZE_UNITS: [&str; 3] = ["KB", "MB", "GB"];

/// Byte count in binary units, two decimals above 1 KB
pub fn format_size(size: u64) -> String {
    if size < 1024 {
        return format!("{} B", size);
    }

    let mut value = size as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < SIZE_UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", value, SIZE_UNITS[unit])
}

/// Compile an entry name filter
///
/// Matching ignores case. A pattern without `/` matches at any depth, and a
/// pattern without wildcards matches as a substring of the entry name.
pub fn entry_filter(pattern: &str) -> anyhow::Result<GlobMatcher> {
    let has_wildcard = pattern.contains(['*', '?', '[']);
    let glob = match (has_wildcard, pattern.contains('/')) {
        (false, _) => format!("**/*{}*", pattern),
        (true, false) => format!("**/{}", pattern),
        (true, true) => pattern.to_string(),
    };

    let matcher = GlobBuilder::new(&glob)
        .case_insensitive(true)
        .literal_separator(true)
        .build()
        .with_context(|| format!("Invalid filter: {}", pattern))?
        .compile_matcher();
    Ok(matcher)
}

/// Whether `name` passes the filter; no filter passes everything
pub fn matches_filter(name: &str, filter: Option<&GlobMatcher>) -> bool {
    filter.map_or(true, |m| m.is_match(name))
}

/// Recursively collect all files in a directory, sorted by path
pub fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Copy every file below `src` into `dst`, keeping the relative layout
///
/// Returns the copied destination paths.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dst)?;

    let mut copied = Vec::new();
    for file in collect_files(src)? {
        let relative = file.strip_prefix(src).map_err(io::Error::other)?;
        let destination = dst.join(relative);

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&file, &destination)?;
        copied.push(destination);
    }

    Ok(copied)
}

/// Archive entry name for `path` relative to `root`
///
/// Separators are normalized to `/` and leading separators are stripped.
pub fn archive_entry_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .to_string_lossy()
        .replace('\\', "/")
        .trim_start_matches('/')
        .to_string()
}

/// Directory a path lives in, `.` for bare relative names
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
