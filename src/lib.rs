//! # vndat
//!
//! A Rust library for unpacking and repacking Light.vn `.vndat` archives.
//!
//! ## Overview
//!
//! `.vndat` files are ZIP archives. Depending on the engine version their
//! entries are protected in one of two ways:
//!
//! - ZIP password encryption, with the Light.vn key as the password
//! - a positional XOR over the first 100 and the last 99 bytes of each file
//!
//! This library provides:
//!
//! - Detecting which protection an archive uses
//! - Extracting archives and undoing the XOR where needed
//! - Repacking an edited folder with the same protection as the original,
//!   keeping a one-time backup of the original archive
//! - XORing standalone files (`.mcdat` saves)
//!
//! ## Example - Unpacking
//!
//! ```rust,no_run
//! use std::path::Path;
//! use vndat::{unpack, KeyMaterial, RoundTripOptions};
//!
//! fn main() -> anyhow::Result<()> {
//!     let keys = KeyMaterial::default();
//!     let report = unpack(Path::new("data.vndat"), None, &keys, &RoundTripOptions::default())?;
//!     println!("{} files written to {}", report.extracted.len(), report.output.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Example - Repacking
//!
//! ```rust,no_run
//! use std::path::Path;
//! use vndat::{repack, KeyMaterial, RoundTripOptions};
//!
//! fn main() -> anyhow::Result<()> {
//!     let keys = KeyMaterial::default();
//!     // writes data.vndat, backing up the original as data.vndat.bak
//!     let report = repack(Path::new("data"), &keys, &RoundTripOptions::default())?;
//!     println!("Created {}", report.target.display());
//!     Ok(())
//! }
//! ```

pub mod crypto;
pub mod error;
pub mod utils;
pub mod vndat;
pub mod vndat_utils;
pub mod vndat_writer;

pub use crypto::{transform_file, FileTransform, KeyMaterial, LIGHTVN_KEY};
pub use error::{Error, Result};
pub use utils::{collect_files, copy_dir, format_size};
pub use vndat::{has_container_signature, Variant, VndatArchive, VndatEntry};
pub use vndat_utils::{
    process_inputs, repack, unpack, xor_file, BackupStatus, BatchReport, InputOutcome,
    RepackReport, RoundTripOptions, UnpackReport, UnsupportedPolicy,
};
pub use vndat_writer::{VndatWriteOptions, VndatWriter, WriteSummary};
