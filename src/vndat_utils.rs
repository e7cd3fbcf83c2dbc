//! .vndat unpack/repack round trip
//!
//! This module drives the archive layer and the XOR transform: it decides
//! whether entries need the XOR at all, keeps a pristine backup of the
//! archive before it is first overwritten, and never modifies the folder a
//! user is editing.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::crypto::{transform_file, FileTransform, KeyMaterial};
use crate::error::{Error, Result};
use crate::utils::{
    archive_entry_name, collect_files, copy_dir, entry_filter, format_size, matches_filter,
    parent_dir,
};
use crate::vndat::{classify_path, has_container_signature, Variant, VndatArchive};
use crate::vndat_writer::{VndatWriteOptions, VndatWriter, WriteSummary, DEFAULT_CHUNK_SIZE};

/// Extension given to repacked archives
pub const DEFAULT_EXTENSION: &str = "vndat";

/// Suffix appended to the archive name for the one-time backup
pub const BACKUP_SUFFIX: &str = ".bak";

/// What to do with an input that is neither an archive, a folder nor a raw XOR file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsupportedPolicy {
    /// Report it and continue with the next input
    #[default]
    Skip,
    /// Report it and stop processing the remaining inputs
    Abort,
}

/// Options for the unpack/repack round trip
#[derive(Debug, Clone)]
pub struct RoundTripOptions {
    /// Extension of repacked archives, without the dot
    pub extension: String,
    /// Batch behavior for unsupported inputs
    pub unsupported: UnsupportedPolicy,
    /// Copy buffer size used when writing archives
    pub chunk_size: usize,
    /// Deflate level for repacked entries
    pub compression_level: Option<i64>,
    /// Show progress bars
    pub progress: bool,
}

impl Default for RoundTripOptions {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            unsupported: UnsupportedPolicy::Skip,
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression_level: None,
            progress: true,
        }
    }
}

/// Result of unpacking one archive
#[derive(Debug)]
pub struct UnpackReport {
    /// Detected protection variant
    pub variant: Variant,
    /// Folder the entries were written to
    pub output: PathBuf,
    /// Files written during this run
    pub extracted: Vec<PathBuf>,
    /// Entries that could not be written or decoded
    pub failed: Vec<Error>,
    /// Files the XOR was applied to
    pub decoded: usize,
    /// Empty files left untouched by the XOR pass
    pub skipped_empty: usize,
}

/// What happened to the backup during a repack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStatus {
    /// The current archive was copied to the backup path
    Created,
    /// A backup from an earlier repack was kept as is
    AlreadyPresent,
    /// Neither the archive nor a backup exists
    NoTarget,
}

/// Result of repacking one folder
#[derive(Debug)]
pub struct RepackReport {
    /// Protection variant the new archive was written with
    pub variant: Variant,
    /// Archive that was written
    pub target: PathBuf,
    /// Backup path next to the archive
    pub backup: PathBuf,
    /// What happened to the backup
    pub backup_status: BackupStatus,
    /// Entry and byte totals of the new archive
    pub summary: WriteSummary,
}

/// Outcome of a single command line input
#[derive(Debug)]
pub enum InputOutcome {
    Unpacked(UnpackReport),
    Repacked(RepackReport),
    /// A raw file was XORed to the given path
    Transformed(PathBuf),
    Unsupported(PathBuf),
    Failed(PathBuf, Error),
}

/// Outcomes of a batch run, in input order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<InputOutcome>,
    /// Whether an unsupported input stopped the batch early
    pub aborted: bool,
}

impl BatchReport {
    /// Whether every processed input succeeded
    pub fn is_success(&self) -> bool {
        !self.aborted
            && self
                .outcomes
                .iter()
                .all(|o| !matches!(o, InputOutcome::Failed(..) | InputOutcome::Unsupported(_)))
    }
}

/// Bar layout; `{wide_msg}` shows the entry or file being processed
const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}";

fn progress_bar(len: u64, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Folder an archive is unpacked into: `<archive stem>/` next to the archive
pub fn default_unpack_dir(container: &Path) -> PathBuf {
    let stem = container
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| container.as_os_str().to_os_string());
    parent_dir(container).join(stem)
}

/// Archive a folder is repacked into: `<folder name>.<extension>` next to the folder
pub fn repack_target(source: &Path, extension: &str) -> Result<PathBuf> {
    let name = source
        .file_name()
        .ok_or_else(|| Error::UnsupportedInput(source.to_path_buf()))?;

    let mut file_name = name.to_os_string();
    file_name.push(".");
    file_name.push(extension);

    Ok(parent_dir(source).join(file_name))
}

/// Backup path for an archive: `<archive>.bak`
pub fn backup_path(target: &Path) -> PathBuf {
    let mut path = target.as_os_str().to_os_string();
    path.push(BACKUP_SUFFIX);
    PathBuf::from(path)
}

/// Copy `target` to `backup` unless a backup already exists
///
/// The backup is opened with `create_new`, so the existence check and the
/// creation are a single filesystem operation.
pub fn ensure_backup(target: &Path, backup: &Path) -> Result<BackupStatus> {
    let mut original = match File::open(target) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(if backup.exists() {
                BackupStatus::AlreadyPresent
            } else {
                BackupStatus::NoTarget
            });
        }
        Err(e) => return Err(e.into()),
    };

    let mut copy = match OpenOptions::new().write(true).create_new(true).open(backup) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Ok(BackupStatus::AlreadyPresent)
        }
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = io::copy(&mut original, &mut copy).and_then(|_| copy.sync_all()) {
        drop(copy);
        // a partial backup would be mistaken for a finished one next time
        let _ = fs::remove_file(backup);
        return Err(e.into());
    }

    Ok(BackupStatus::Created)
}

/// Extract a .vndat archive and undo the XOR on plain archives
///
/// `output` defaults to [`default_unpack_dir`]. Failures confined to a single
/// entry are logged and collected in [`UnpackReport::failed`]; anything that
/// affects the whole archive is returned as an error.
pub fn unpack(
    container: &Path,
    output: Option<&Path>,
    keys: &KeyMaterial,
    options: &RoundTripOptions,
) -> Result<UnpackReport> {
    if !has_container_signature(container)? {
        return Err(Error::NotAContainer(container.to_path_buf()));
    }

    let name = display_name(container);
    let mut archive = VndatArchive::open(container)?;
    let variant = archive.classify()?;
    let entries = archive.entries()?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_unpack_dir(container));
    fs::create_dir_all(&output)?;

    let password = if variant.is_encrypted() {
        info!(
            "{} is password protected. Using `{}` as the password.",
            name,
            keys.password_text()
        );
        Some(keys.password())
    } else {
        None
    };

    let mut report = UnpackReport {
        variant,
        output: output.clone(),
        extracted: Vec::new(),
        failed: Vec::new(),
        decoded: 0,
        skipped_empty: 0,
    };

    info!("Extracting {} to {}...", name, output.display());
    let pb = progress_bar(entries.len() as u64, options.progress);
    let mut written = HashSet::new();

    for entry in &entries {
        pb.set_message(entry.name.clone());

        match archive.extract_entry_to(entry.index, password, &output) {
            Ok(Some(path)) => {
                pb.suspend(|| debug!("Writing {}...", path.display()));
                // aliased names overwrite one file; it must be decoded once
                if written.insert(path.clone()) {
                    report.extracted.push(path);
                }
            }
            Ok(None) => {}
            Err(e) if e.is_recoverable() => {
                pb.suspend(|| warn!("{}", e));
                report.failed.push(e);
            }
            Err(e) => {
                pb.abandon();
                return Err(e);
            }
        }

        pb.inc(1);
    }
    pb.finish_and_clear();

    if !variant.is_encrypted() {
        decode_extracted(keys, &mut report, options);
    }

    info!(
        "Extracted {} files from {} ({})",
        report.extracted.len(),
        name,
        variant
    );
    if !report.failed.is_empty() {
        warn!("Failed: {} entries", report.failed.len());
    }

    Ok(report)
}

/// XOR every file extracted in this run, in place
fn decode_extracted(keys: &KeyMaterial, report: &mut UnpackReport, options: &RoundTripOptions) {
    let pb = progress_bar(report.extracted.len() as u64, options.progress);

    for path in &report.extracted {
        pb.set_message(display_name(path));

        match transform_file(keys, path, path) {
            Ok(FileTransform::Transformed(_)) => report.decoded += 1,
            Ok(FileTransform::SkippedEmpty) => report.skipped_empty += 1,
            Err(e) => {
                let e = Error::entry(path.display().to_string(), e);
                pb.suspend(|| warn!("{}", e));
                report.failed.push(e);
            }
        }

        pb.inc(1);
    }

    pb.finish_and_clear();
}

/// Archive a folder back into `<folder>.<extension>`
///
/// The existing archive is backed up once, and the backup decides whether the
/// new archive is password protected or XOR obfuscated. `source` itself is
/// never modified: plain archives are built from a temporary copy.
pub fn repack(source: &Path, keys: &KeyMaterial, options: &RoundTripOptions) -> Result<RepackReport> {
    if !source.is_dir() {
        return Err(Error::NotADirectory(source.to_path_buf()));
    }

    // "." and ".." have no file name to derive the archive name from
    let source = if source.file_name().is_none() {
        source.canonicalize()?
    } else {
        source.to_path_buf()
    };
    let name = display_name(&source);

    let target = repack_target(&source, &options.extension)?;
    let backup = backup_path(&target);

    let backup_status = ensure_backup(&target, &backup)?;
    match backup_status {
        BackupStatus::Created => info!(
            "Backup the original file as {}...",
            display_name(&backup)
        ),
        BackupStatus::AlreadyPresent => debug!("Keeping existing backup {}", backup.display()),
        BackupStatus::NoTarget => warn!(
            "{} does not exist, nothing to back up",
            target.display()
        ),
    }

    // the live target is about to be truncated, so classify from the backup
    let variant = if backup.is_file() {
        classify_path(&backup)?
    } else {
        Variant::Plain
    };

    let summary = match variant {
        Variant::NativelyEncrypted => {
            info!(
                "Encrypting {} using `{}` as the password...",
                display_name(&target),
                keys.password_text()
            );
            let files = collect_files(&source)?;
            write_container(
                &target,
                &source,
                &files,
                Some(keys.password().to_vec()),
                options,
            )?
        }
        Variant::Plain => {
            info!(
                "Creating a temporary copy of {} to perform XOR encryption...",
                name
            );
            let scratch = tempfile::Builder::new()
                .prefix(&format!("{}_temp", name))
                .tempdir_in(parent_dir(&source))?;

            let files = copy_dir(&source, scratch.path())?;
            for file in &files {
                transform_file(keys, file, file)?;
            }

            let summary = write_container(&target, scratch.path(), &files, None, options)?;

            info!("Cleaning up temporary files...");
            let scratch_path = scratch.path().to_path_buf();
            scratch.close().map_err(|e| Error::TempCleanup {
                path: scratch_path,
                source: e,
            })?;

            summary
        }
    };

    info!(
        "Created {} ({} files, {})",
        target.display(),
        summary.entries,
        format_size(summary.bytes)
    );

    Ok(RepackReport {
        variant,
        target,
        backup,
        backup_status,
        summary,
    })
}

/// Stream `files` into a fresh archive, naming entries relative to `root`
fn write_container(
    target: &Path,
    root: &Path,
    files: &[PathBuf],
    password: Option<Vec<u8>>,
    options: &RoundTripOptions,
) -> Result<WriteSummary> {
    info!("Creating {} archive...", display_name(target));

    let write_options = VndatWriteOptions {
        password,
        compression_level: options.compression_level,
        chunk_size: options.chunk_size,
    };
    let mut writer = VndatWriter::create_with_options(target, write_options)?;

    let pb = progress_bar(files.len() as u64, options.progress);
    for file in files {
        let entry_name = archive_entry_name(root, file);
        pb.set_message(entry_name.clone());
        writer.add_file(&entry_name, file)?;
        pb.inc(1);
    }

    let summary = writer.finish()?;
    pb.finish_and_clear();

    Ok(summary)
}

/// Where a raw XOR of `path` is written, if its extension is routed at all
///
/// `.mcdat` files are decoded to `<file>.mcdat.dec`; `.dec` files are encoded
/// to the same name with an `.enc` extension.
pub fn raw_xor_destination(path: &Path) -> Option<PathBuf> {
    let extension = path.extension()?.to_string_lossy().to_ascii_lowercase();

    if extension.contains("mcdat") {
        let mut destination = path.as_os_str().to_os_string();
        destination.push(".dec");
        Some(PathBuf::from(destination))
    } else if extension.contains("dec") {
        Some(path.with_extension("enc"))
    } else {
        None
    }
}

/// XOR a standalone file next to itself, leaving the input untouched
pub fn xor_file(keys: &KeyMaterial, path: &Path) -> Result<PathBuf> {
    let destination =
        raw_xor_destination(path).ok_or_else(|| Error::UnsupportedInput(path.to_path_buf()))?;
    xor_file_to(keys, path, &destination)?;
    Ok(destination)
}

/// XOR `src` into `dst`; empty inputs produce an empty output
pub fn xor_file_to(keys: &KeyMaterial, src: &Path, dst: &Path) -> Result<()> {
    info!("XORing {} to {}...", src.display(), dst.display());

    if transform_file(keys, src, dst)? == FileTransform::SkippedEmpty {
        fs::write(dst, b"")?;
    }

    Ok(())
}

/// Handle one command line input according to what it points at
pub fn process_input(path: &Path, keys: &KeyMaterial, options: &RoundTripOptions) -> InputOutcome {
    let result = if path.is_dir() {
        repack(path, keys, options).map(InputOutcome::Repacked)
    } else if path.is_file() {
        match has_container_signature(path) {
            Ok(true) => unpack(path, None, keys, options).map(InputOutcome::Unpacked),
            Ok(false) if raw_xor_destination(path).is_some() => {
                xor_file(keys, path).map(InputOutcome::Transformed)
            }
            Ok(false) => Ok(InputOutcome::Unsupported(path.to_path_buf())),
            Err(e) => Err(e),
        }
    } else {
        Ok(InputOutcome::Unsupported(path.to_path_buf()))
    };

    result.unwrap_or_else(|e| {
        error!("{}: {}", path.display(), e);
        InputOutcome::Failed(path.to_path_buf(), e)
    })
}

/// Process inputs one after another
///
/// A failing input never stops the batch. An unsupported input stops it only
/// under [`UnsupportedPolicy::Abort`].
pub fn process_inputs(
    paths: &[PathBuf],
    keys: &KeyMaterial,
    options: &RoundTripOptions,
) -> BatchReport {
    let mut report = BatchReport::default();

    for path in paths {
        let outcome = process_input(path, keys, options);
        let unsupported = matches!(outcome, InputOutcome::Unsupported(_));
        report.outcomes.push(outcome);

        if unsupported {
            warn!("Unsupported file! {}", path.display());
            if options.unsupported == UnsupportedPolicy::Abort {
                report.aborted = true;
                break;
            }
        }
    }

    report
}

/// List entries of a .vndat archive with optional filtering
pub fn list_entries(path: &Path, filter: Option<&str>) -> anyhow::Result<()> {
    println!("Opening {}...", path.display());

    let mut archive = VndatArchive::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let matcher = filter.map(entry_filter).transpose()?;

    let mut count = 0u64;
    let mut total_size = 0u64;
    let mut compressed_size = 0u64;

    for entry in archive.entries()? {
        if entry.is_dir || !matches_filter(&entry.name, matcher.as_ref()) {
            continue;
        }

        let encrypted = if entry.is_encrypted {
            "Encrypted"
        } else {
            "Plain"
        };

        println!(
            "{:>10} {:>10} {:>9} {}",
            format_size(entry.size),
            format_size(entry.compressed_size),
            encrypted,
            entry.name
        );

        count += 1;
        total_size += entry.size;
        compressed_size += entry.compressed_size;
    }

    println!();
    println!(
        "Total: {} files, {} ({} compressed)",
        count,
        format_size(total_size),
        format_size(compressed_size)
    );

    Ok(())
}

/// Show .vndat archive information
pub fn show_info(path: &Path) -> anyhow::Result<()> {
    println!("Opening {}...", path.display());

    let mut archive = VndatArchive::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let variant = archive.classify()?;
    let entries = archive.entries()?;

    let files: Vec<_> = entries.iter().filter(|e| !e.is_dir).collect();
    let total_size: u64 = files.iter().map(|e| e.size).sum();
    let compressed_size: u64 = files.iter().map(|e| e.compressed_size).sum();
    let encrypted_count = files.iter().filter(|e| e.is_encrypted).count();

    let ratio = if total_size > 0 {
        (compressed_size as f64 / total_size as f64) * 100.0
    } else {
        0.0
    };

    println!();
    println!("Archive Information:");
    println!("  File: {}", path.display());
    println!("  Protection: {}", variant);
    println!("  Total files: {}", files.len());
    println!("  Directories: {}", entries.len() - files.len());
    println!("  Uncompressed size: {}", format_size(total_size));
    println!(
        "  Compressed size: {} ({:.1}%)",
        format_size(compressed_size),
        ratio
    );
    println!();
    println!("Encryption:");
    println!("  Encrypted: {} files", encrypted_count);
    println!("  Plain: {} files", files.len() - encrypted_count);

    Ok(())
}
