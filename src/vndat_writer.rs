//! .vndat archive writing
//!
//! Archives are always built fresh; an existing .vndat is never modified in
//! place. Entries are streamed from disk in fixed-size chunks.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;
use zip::unstable::write::FileOptionsExt;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;

/// Size of the copy buffer used when streaming files into the archive
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Options for creating .vndat files
#[derive(Debug, Clone)]
pub struct VndatWriteOptions {
    /// ZIP password; `None` writes unencrypted entries
    pub password: Option<Vec<u8>>,
    /// Deflate level (0-9), `None` for the library default
    pub compression_level: Option<i64>,
    /// Copy buffer size in bytes
    pub chunk_size: usize,
}

impl Default for VndatWriteOptions {
    fn default() -> Self {
        Self {
            password: None,
            compression_level: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Totals reported by [`VndatWriter::finish`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Number of entries written
    pub entries: usize,
    /// Uncompressed bytes written
    pub bytes: u64,
}

/// .vndat file writer for creating new archives
pub struct VndatWriter {
    zip: ZipWriter<BufWriter<File>>,
    options: VndatWriteOptions,
    summary: WriteSummary,
}

impl VndatWriter {
    /// Create a new .vndat file for writing, truncating any existing file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_options(path, VndatWriteOptions::default())
    }

    /// Create a new .vndat file with custom options
    pub fn create_with_options<P: AsRef<Path>>(path: P, options: VndatWriteOptions) -> Result<Self> {
        let file = File::create(path)?;

        Ok(Self {
            zip: ZipWriter::new(BufWriter::new(file)),
            options,
            summary: WriteSummary::default(),
        })
    }

    /// Whether entries are written with the ZIP password
    pub fn is_encrypted(&self) -> bool {
        self.options.password.is_some()
    }

    /// Begin a new entry whose uncompressed size is known up front
    fn start_entry(&mut self, name: &str, size: u64) -> Result<()> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(self.options.compression_level)
            .large_file(size >= u32::MAX as u64);

        let options = match self.options.password.as_deref() {
            Some(password) => options.with_deprecated_encryption(password),
            None => options,
        };

        self.zip.start_file(name, options)?;
        Ok(())
    }

    /// Stream a file from disk into a new entry
    pub fn add_file(&mut self, name: &str, path: &Path) -> Result<u64> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();

        self.start_entry(name, size)?;

        let mut buffer = vec![0u8; self.options.chunk_size.max(1)];
        let mut written = 0u64;
        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            self.zip.write_all(&buffer[..bytes_read])?;
            written += bytes_read as u64;
        }

        debug!("Added {} ({} bytes)", name, written);
        self.summary.entries += 1;
        self.summary.bytes += written;

        Ok(written)
    }

    /// Add an entry from memory
    pub fn add_bytes(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.start_entry(name, data.len() as u64)?;
        self.zip.write_all(data)?;

        self.summary.entries += 1;
        self.summary.bytes += data.len() as u64;

        Ok(())
    }

    /// Write the central directory and flush the file
    pub fn finish(self) -> Result<WriteSummary> {
        let mut writer = self.zip.finish()?;
        writer.flush()?;

        Ok(self.summary)
    }
}
