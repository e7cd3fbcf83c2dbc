//! vndat - A tool for unpacking and repacking Light.vn .vndat archives
//!
//! Usage:
//!   vndat <paths>...                 - Unpack archives, repack folders, XOR .mcdat/.dec files
//!   vndat unpack <file> [-o dir]     - Extract an archive
//!   vndat repack <dir>               - Archive a folder as <dir>.vndat
//!   vndat xor <file> [-o output]     - XOR a standalone file
//!   vndat list <file> [filter]       - List files matching filter
//!   vndat info <file>                - Show archive information

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use vndat::vndat_utils::{list_entries, show_info, xor_file_to, DEFAULT_EXTENSION};
use vndat::{
    process_inputs, repack, unpack, xor_file, KeyMaterial, RoundTripOptions, UnsupportedPolicy,
};

#[derive(Parser)]
#[command(name = "vndat")]
#[command(version)]
#[command(about = "Unpack and repack Light.vn .vndat archives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Archives to unpack, folders to repack, or .mcdat/.dec files to XOR
    paths: Vec<PathBuf>,

    /// What to do with inputs that are none of the above
    #[arg(long, value_enum, default_value = "skip")]
    on_unsupported: OnUnsupported,

    /// Extension of repacked archives
    #[arg(long, default_value = DEFAULT_EXTENSION)]
    extension: String,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OnUnsupported {
    Skip,
    Abort,
}

impl From<OnUnsupported> for UnsupportedPolicy {
    fn from(p: OnUnsupported) -> Self {
        match p {
            OnUnsupported::Skip => UnsupportedPolicy::Skip,
            OnUnsupported::Abort => UnsupportedPolicy::Abort,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract an archive, undoing the XOR when it is not password protected
    Unpack {
        /// Path to the .vndat file
        file: PathBuf,
        /// Output directory (default: archive name without extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Archive a folder back into <folder>.vndat, keeping a backup of the original
    Repack {
        /// Folder to archive
        dir: PathBuf,
        /// Extension of the archive
        #[arg(short, long, default_value = DEFAULT_EXTENSION)]
        extension: String,
        /// Deflate level (0-9)
        #[arg(short, long)]
        level: Option<i64>,
    },
    /// XOR a standalone file (.mcdat -> .mcdat.dec, .dec -> .enc)
    Xor {
        /// File to transform
        file: PathBuf,
        /// Output path (default: derived from the extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List files in the archive
    List {
        /// Path to the .vndat file
        file: PathBuf,
        /// Filter pattern
        filter: Option<String>,
    },
    /// Show archive information
    Info {
        /// Path to the .vndat file
        file: PathBuf,
    },
}

fn print_usage() {
    eprintln!("vndat v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Unpack and repack tool for games made with the Light.vn engine.");
    eprintln!();
    eprintln!("Usage: vndat <paths>...");
    eprintln!("         Unpack: pass one or more .vndat files");
    eprintln!("         Repack: pass an unpacked folder");
    eprintln!("       vndat unpack <file> [-o output]");
    eprintln!("       vndat repack <dir> [-e extension]");
    eprintln!("       vndat xor <file> [-o output]");
    eprintln!("       vndat list <file> [filter]");
    eprintln!("       vndat info <file>");
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let keys = KeyMaterial::default();
    let mut options = RoundTripOptions {
        extension: cli.extension,
        unsupported: cli.on_unsupported.into(),
        progress: !cli.quiet,
        ..Default::default()
    };

    match cli.command {
        Some(Commands::Unpack { file, output }) => {
            let report = unpack(&file, output.as_deref(), &keys, &options)
                .with_context(|| format!("Failed to unpack {}", file.display()))?;
            if !report.failed.is_empty() {
                bail!("{} entries could not be extracted", report.failed.len());
            }
        }
        Some(Commands::Repack {
            dir,
            extension,
            level,
        }) => {
            options.extension = extension;
            options.compression_level = level;
            repack(&dir, &keys, &options)
                .with_context(|| format!("Failed to repack {}", dir.display()))?;
        }
        Some(Commands::Xor { file, output }) => {
            let output = match output {
                Some(output) => {
                    xor_file_to(&keys, &file, &output)?;
                    output
                }
                None => xor_file(&keys, &file)
                    .with_context(|| format!("Failed to XOR {}", file.display()))?,
            };
            println!("Written: {}", output.display());
        }
        Some(Commands::List { file, filter }) => {
            list_entries(&file, filter.as_deref())?;
        }
        Some(Commands::Info { file }) => {
            show_info(&file)?;
        }
        None => {
            if cli.paths.is_empty() {
                print_usage();
                std::process::exit(1);
            }

            let report = process_inputs(&cli.paths, &keys, &options);
            println!("\nDone.");
            if !report.is_success() {
                bail!("Some inputs could not be processed");
            }
        }
    }

    Ok(())
}
