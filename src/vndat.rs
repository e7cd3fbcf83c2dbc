//! .vndat archive reading
//!
//! A .vndat file is a standard ZIP archive. Two protection variants exist:
//!
//! - Older builds encrypt every entry with ZipCrypto, using the Light.vn key
//!   as the password.
//! - Newer builds store entries unencrypted and XOR the head and tail of every
//!   file instead (see [`crate::crypto`]).
//!
//! Variant detection and extraction are separate passes over the archive:
//! [`VndatArchive::classify`] only reads raw entry records and never
//! decrypts anything.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{Error, Result};

/// Local file header signature at offset 0: `PK\x03\x04`
pub const CONTAINER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Protection variant of a .vndat archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// At least one entry uses ZIP password encryption
    NativelyEncrypted,
    /// No entry is encrypted; contents are XOR obfuscated
    Plain,
}

impl Variant {
    /// Whether entries must be read and written with the archive password
    pub fn is_encrypted(self) -> bool {
        matches!(self, Variant::NativelyEncrypted)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::NativelyEncrypted => write!(f, "password protected"),
            Variant::Plain => write!(f, "XOR obfuscated"),
        }
    }
}

/// Represents a single entry in a .vndat archive
#[derive(Debug, Clone)]
pub struct VndatEntry {
    /// Position of the entry in the central directory
    pub index: usize,
    /// File name/path within the archive
    pub name: String,
    /// Whether the entry is a directory marker
    pub is_dir: bool,
    /// Uncompressed size in bytes
    pub size: u64,
    /// Compressed size in bytes
    pub compressed_size: u64,
    /// Whether the entry uses ZIP password encryption
    pub is_encrypted: bool,
}

/// Check whether the file starts with the ZIP local header signature
///
/// Files shorter than four bytes are reported as not matching.
pub fn has_container_signature<P: AsRef<Path>>(path: P) -> Result<bool> {
    let mut file = File::open(path)?;
    let mut signature = [0u8; 4];

    match file.read_exact(&mut signature) {
        Ok(()) => Ok(signature == CONTAINER_SIGNATURE),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Open the archive at `path` and detect its protection variant
pub fn classify_path<P: AsRef<Path>>(path: P) -> Result<Variant> {
    VndatArchive::open(path)?.classify()
}

/// A .vndat archive reader
pub struct VndatArchive {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
}

impl VndatArchive {
    /// Open a .vndat file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let archive = ZipArchive::new(BufReader::new(file))?;

        Ok(Self { path, archive })
    }

    /// Path the archive was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries, directories included
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    /// Check if the archive is empty
    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// List all entries in central directory order
    pub fn entries(&mut self) -> Result<Vec<VndatEntry>> {
        let mut entries = Vec::with_capacity(self.archive.len());

        for index in 0..self.archive.len() {
            let file = self.archive.by_index_raw(index)?;
            entries.push(VndatEntry {
                index,
                name: file.name().to_string(),
                is_dir: file.is_dir(),
                size: file.size(),
                compressed_size: file.compressed_size(),
                is_encrypted: file.encrypted(),
            });
        }

        Ok(entries)
    }

    /// Detect the protection variant
    ///
    /// The archive is natively encrypted as soon as one entry carries the
    /// encryption flag, regardless of how many entries there are or where
    /// the encrypted one sits.
    pub fn classify(&mut self) -> Result<Variant> {
        for index in 0..self.archive.len() {
            if self.archive.by_index_raw(index)?.encrypted() {
                return Ok(Variant::NativelyEncrypted);
            }
        }

        Ok(Variant::Plain)
    }

    /// Read the decompressed contents of one entry
    pub fn read_entry(&mut self, index: usize, password: Option<&[u8]>) -> Result<Vec<u8>> {
        let mut file = match password {
            Some(password) => self.archive.by_index_decrypt(index, password)?,
            None => self.archive.by_index(index)?,
        };

        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;

        Ok(data)
    }

    /// Read every file entry into memory as `(name, bytes)` pairs
    ///
    /// Directory markers are skipped.
    pub fn extract_all(&mut self, password: Option<&[u8]>) -> Result<Vec<(String, Vec<u8>)>> {
        let entries = self.entries()?;
        let mut contents = Vec::with_capacity(entries.len());

        for entry in entries.into_iter().filter(|e| !e.is_dir) {
            let data = self.read_entry(entry.index, password)?;
            contents.push((entry.name, data));
        }

        Ok(contents)
    }

    /// Stream one entry to a file below `output_dir`
    ///
    /// Returns `Ok(None)` for directory markers. Failures confined to this
    /// entry come back as [`Error::Entry`]; a wrong password or a corrupt
    /// archive is returned as is.
    pub fn extract_entry_to(
        &mut self,
        index: usize,
        password: Option<&[u8]>,
        output_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        let opened = match password {
            Some(password) => self.archive.by_index_decrypt(index, password),
            None => self.archive.by_index(index),
        };

        let mut file = match opened {
            Ok(file) => file,
            Err(e @ (ZipError::InvalidPassword | ZipError::InvalidArchive(_))) => {
                return Err(Error::Zip(e))
            }
            Err(e) => return Err(Error::entry(format!("entry #{}", index), Error::Zip(e))),
        };

        if file.is_dir() {
            return Ok(None);
        }

        let name = file.name().to_string();
        let relative = file
            .enclosed_name()
            .ok_or_else(|| Error::entry(&name, Error::InvalidEntryName(name.clone())))?;
        let destination = resolve_entry_path(output_dir, &relative);

        match write_stream(&mut file, &destination) {
            Ok(_) => Ok(Some(destination)),
            Err(e) => Err(Error::entry(name, e)),
        }
    }
}

/// Join an enclosed entry name onto `root`, folding `.` and `..` lexically
///
/// `a.txt` and `sub/../a.txt` resolve to the same path.
fn resolve_entry_path(root: &Path, relative: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir => {
                resolved.pop();
            }
            _ => {}
        }
    }
    root.join(resolved)
}

/// Copy a decompressed entry stream to `destination`, creating parent directories
fn write_stream<R: Read>(reader: &mut R, destination: &Path) -> Result<u64> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut output = File::create(destination)?;
    Ok(io::copy(reader, &mut output)?)
}
