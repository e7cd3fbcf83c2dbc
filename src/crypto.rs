//! Positional XOR transform for .vndat entries
//!
//! Newer Light.vn builds store entries in a plain ZIP but obfuscate the first
//! 100 and the last 99 bytes of every file with a fixed 25-byte key. Older
//! builds skip the XOR and protect the whole archive with the same key used
//! as the ZIP password instead.
//!
//! The transform is its own inverse, so the same call both decodes and
//! encodes.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;

/// Length of the key in bytes
pub const KEY_LEN: usize = 25;

/// Number of leading bytes XORed with the forward key
pub const HEADER_LEN: usize = 100;

/// Number of trailing bytes XORed with the reversed key
pub const FOOTER_LEN: usize = 99;

/// The key used by Light.vn (`d6c5fKI3GgBWpZF3Tz6ia3kF0`)
pub const LIGHTVN_KEY: [u8; KEY_LEN] = *b"d6c5fKI3GgBWpZF3Tz6ia3kF0";

/// Key material shared by the XOR transform and the ZIP password
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    key: [u8; KEY_LEN],
    reversed: [u8; KEY_LEN],
}

impl Default for KeyMaterial {
    fn default() -> Self {
        Self::new(LIGHTVN_KEY)
    }
}

impl KeyMaterial {
    /// Build key material from a forward key
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        let mut reversed = key;
        reversed.reverse();
        Self { key, reversed }
    }

    /// The forward keystream
    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// The reversed keystream
    pub fn reversed(&self) -> &[u8; KEY_LEN] {
        &self.reversed
    }

    /// Password for natively encrypted archives (the key as UTF-8 text)
    pub fn password(&self) -> &[u8] {
        &self.key
    }

    /// Password rendered for log output
    pub fn password_text(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }

    /// Apply the positional XOR in place
    ///
    /// Buffers shorter than [`HEADER_LEN`] are XORed end to end with the
    /// reversed key. Longer buffers get the forward key over the first
    /// [`HEADER_LEN`] bytes, then the reversed key over the last
    /// [`FOOTER_LEN`] bytes. For lengths 100..=198 the two windows overlap
    /// and the overlapping bytes receive both passes.
    pub fn transform(&self, buffer: &mut [u8]) {
        let len = buffer.len();

        if len < HEADER_LEN {
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte ^= self.reversed[i % KEY_LEN];
            }
            return;
        }

        for (i, byte) in buffer[..HEADER_LEN].iter_mut().enumerate() {
            *byte ^= self.key[i % KEY_LEN];
        }

        for (i, byte) in buffer[len - FOOTER_LEN..].iter_mut().enumerate() {
            *byte ^= self.reversed[i % KEY_LEN];
        }
    }
}

/// Outcome of transforming a file on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTransform {
    /// The file was transformed and written
    Transformed(u64),
    /// The file was empty and left alone
    SkippedEmpty,
}

/// XOR the file at `src` and write the result to `dst`
///
/// `src` and `dst` may be the same path. Empty files are skipped without
/// touching `dst`.
pub fn transform_file(keys: &KeyMaterial, src: &Path, dst: &Path) -> Result<FileTransform> {
    let mut data = fs::read(src)?;

    if data.is_empty() {
        info!("Skipping {}. File is empty.", src.display());
        return Ok(FileTransform::SkippedEmpty);
    }

    if data.len() < HEADER_LEN {
        debug!("File size is smaller than {} bytes: {}", HEADER_LEN, src.display());
    }

    keys.transform(&mut data);
    fs::write(dst, &data)?;

    Ok(FileTransform::Transformed(data.len() as u64))
}
