//! Round-trip integration tests for vndat.
//!
//! These tests build small archives on disk and drive the unpack/repack
//! cycle end to end:
//! - Variant detection for plain, encrypted and mixed archives
//! - Unpack -> repack -> unpack identity for both variants
//! - Backup created once and never refreshed
//! - Source folder left untouched by repack
//! - Per-entry failure isolation and the unsupported input policy

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use vndat::vndat_utils::backup_path;
use vndat::{
    process_inputs, repack, unpack, BackupStatus, Error, InputOutcome, KeyMaterial,
    RoundTripOptions, UnsupportedPolicy, Variant, VndatArchive, VndatWriteOptions, VndatWriter,
};
use zip::unstable::write::FileOptionsExt;
use zip::write::SimpleFileOptions;

fn options() -> RoundTripOptions {
    RoundTripOptions {
        progress: false,
        ..Default::default()
    }
}

fn sample_files() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("config.txt", b"width=1280\nheight=720\n".to_vec()),
        ("script/main.txt", (0..4096u32).map(|i| (i % 97) as u8 + 32).collect()),
        ("image/bg/title.png", (0..150u32).map(|i| (i * 7) as u8).collect()),
        ("empty.dat", Vec::new()),
    ]
}

/// Build a newer-style archive: plain ZIP with XOR-obfuscated contents
fn write_plain_archive(path: &Path, files: &[(&str, Vec<u8>)], keys: &KeyMaterial) {
    let mut writer = VndatWriter::create(path).unwrap();
    for (name, data) in files {
        let mut data = data.clone();
        keys.transform(&mut data);
        writer.add_bytes(name, &data).unwrap();
    }
    writer.finish().unwrap();
}

/// Build an older-style archive: ZIP password encryption, contents in the clear
fn write_encrypted_archive(path: &Path, files: &[(&str, Vec<u8>)], keys: &KeyMaterial) {
    let options = VndatWriteOptions {
        password: Some(keys.password().to_vec()),
        ..Default::default()
    };
    let mut writer = VndatWriter::create_with_options(path, options).unwrap();
    for (name, data) in files {
        writer.add_bytes(name, data).unwrap();
    }
    writer.finish().unwrap();
}

fn assert_folder_matches(folder: &Path, files: &[(&str, Vec<u8>)]) {
    for (name, data) in files {
        let path = folder.join(name);
        assert_eq!(&fs::read(&path).unwrap(), data, "{} differs", path.display());
    }
}

fn dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_classify_plain_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.vndat");
    write_plain_archive(&path, &sample_files(), &KeyMaterial::default());

    let mut archive = VndatArchive::open(&path).unwrap();
    assert_eq!(archive.classify().unwrap(), Variant::Plain);
}

#[test]
fn test_classify_encrypted_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.vndat");
    write_encrypted_archive(&path, &sample_files(), &KeyMaterial::default());

    let mut archive = VndatArchive::open(&path).unwrap();
    assert_eq!(archive.classify().unwrap(), Variant::NativelyEncrypted);
    assert!(archive.entries().unwrap().iter().all(|e| e.is_encrypted));
}

#[test]
fn test_classify_single_encrypted_entry_last() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.vndat");

    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    zip.add_directory("assets/", SimpleFileOptions::default())
        .unwrap();
    zip.start_file("assets/a.txt", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"plain").unwrap();
    zip.start_file(
        "assets/b.txt",
        SimpleFileOptions::default().with_deprecated_encryption(b"pw"),
    )
    .unwrap();
    zip.write_all(b"secret").unwrap();
    zip.finish().unwrap();

    let mut archive = VndatArchive::open(&path).unwrap();
    assert_eq!(archive.len(), 3);
    assert_eq!(archive.classify().unwrap(), Variant::NativelyEncrypted);
}

#[test]
fn test_classify_empty_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.vndat");
    VndatWriter::create(&path).unwrap().finish().unwrap();

    let mut archive = VndatArchive::open(&path).unwrap();
    assert!(archive.is_empty());
    assert_eq!(archive.classify().unwrap(), Variant::Plain);
}

#[test]
fn test_unpack_plain_decodes_contents() {
    let dir = tempfile::tempdir().unwrap();
    let keys = KeyMaterial::default();
    let files = sample_files();
    let container = dir.path().join("data.vndat");
    write_plain_archive(&container, &files, &keys);

    let report = unpack(&container, None, &keys, &options()).unwrap();

    assert_eq!(report.variant, Variant::Plain);
    assert_eq!(report.output, dir.path().join("data"));
    assert_eq!(report.extracted.len(), files.len());
    assert_eq!(report.decoded, files.len() - 1);
    assert_eq!(report.skipped_empty, 1);
    assert!(report.failed.is_empty());
    assert_folder_matches(&report.output, &files);
}

#[test]
fn test_unpack_encrypted_leaves_contents() {
    let dir = tempfile::tempdir().unwrap();
    let keys = KeyMaterial::default();
    let files = sample_files();
    let container = dir.path().join("data.vndat");
    write_encrypted_archive(&container, &files, &keys);

    let report = unpack(&container, None, &keys, &options()).unwrap();

    assert_eq!(report.variant, Variant::NativelyEncrypted);
    assert_eq!(report.decoded, 0);
    assert_eq!(report.skipped_empty, 0);
    assert_folder_matches(&report.output, &files);
}

#[test]
fn test_unpack_rejects_non_zip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("data.vndat");
    fs::write(&input, b"definitely not a zip archive").unwrap();

    let err = unpack(&input, None, &KeyMaterial::default(), &options()).unwrap_err();
    assert!(matches!(err, Error::NotAContainer(_)));
    assert!(!dir.path().join("data").exists());
}

#[test]
fn test_unpack_isolates_entry_failures() {
    let dir = tempfile::tempdir().unwrap();
    let keys = KeyMaterial::default();
    let files = vec![
        ("blocked.txt", b"cannot be written".to_vec()),
        ("ok.txt", b"written fine".to_vec()),
    ];
    let container = dir.path().join("data.vndat");
    write_plain_archive(&container, &files, &keys);

    // a directory where the file should go makes that one entry fail
    let output = dir.path().join("out");
    fs::create_dir_all(output.join("blocked.txt")).unwrap();

    let report = unpack(&container, Some(&output), &keys, &options()).unwrap();

    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].is_recoverable());
    assert_eq!(report.extracted, vec![output.join("ok.txt")]);
    assert_eq!(fs::read(output.join("ok.txt")).unwrap(), b"written fine");
}

#[test]
fn test_unpack_decodes_aliased_entries_once() {
    let dir = tempfile::tempdir().unwrap();
    let keys = KeyMaterial::default();
    let payload = b"hello world, this is the payload".to_vec();
    let files = vec![("a.txt", payload.clone()), ("sub/../a.txt", payload.clone())];
    let container = dir.path().join("data.vndat");
    write_plain_archive(&container, &files, &keys);

    let report = unpack(&container, None, &keys, &options()).unwrap();

    assert!(report.failed.is_empty());
    assert_eq!(report.extracted, vec![report.output.join("a.txt")]);
    assert_eq!(report.decoded, 1);
    assert_eq!(fs::read(report.output.join("a.txt")).unwrap(), payload);
    assert!(!report.output.join("sub").exists());
}

#[test]
fn test_plain_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let keys = KeyMaterial::default();
    let files = sample_files();
    let container = dir.path().join("data.vndat");
    write_plain_archive(&container, &files, &keys);
    let original_bytes = fs::read(&container).unwrap();

    let unpacked = unpack(&container, None, &keys, &options()).unwrap();
    let repacked = repack(&unpacked.output, &keys, &options()).unwrap();

    assert_eq!(repacked.variant, Variant::Plain);
    assert_eq!(repacked.target, container);
    assert_eq!(repacked.backup_status, BackupStatus::Created);
    assert_eq!(repacked.summary.entries, files.len());
    assert_eq!(fs::read(backup_path(&container)).unwrap(), original_bytes);

    // the new archive carries XORed contents without a password
    let mut archive = VndatArchive::open(&container).unwrap();
    assert_eq!(archive.classify().unwrap(), Variant::Plain);
    let mut raw = archive.extract_all(None).unwrap();
    raw.sort();
    let mut expected: Vec<(String, Vec<u8>)> = files
        .iter()
        .map(|(name, data)| {
            let mut data = data.clone();
            keys.transform(&mut data);
            (name.to_string(), data)
        })
        .collect();
    expected.sort();
    assert_eq!(raw, expected);

    let check = dir.path().join("check");
    let again = unpack(&container, Some(&check), &keys, &options()).unwrap();
    assert_eq!(again.variant, Variant::Plain);
    assert_folder_matches(&check, &files);
}

#[test]
fn test_encrypted_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let keys = KeyMaterial::default();
    let files = sample_files();
    let container = dir.path().join("data.vndat");
    write_encrypted_archive(&container, &files, &keys);

    let unpacked = unpack(&container, None, &keys, &options()).unwrap();
    let repacked = repack(&unpacked.output, &keys, &options()).unwrap();
    assert_eq!(repacked.variant, Variant::NativelyEncrypted);

    let mut archive = VndatArchive::open(&container).unwrap();
    assert_eq!(archive.classify().unwrap(), Variant::NativelyEncrypted);

    let check = dir.path().join("check");
    let again = unpack(&container, Some(&check), &keys, &options()).unwrap();
    assert_eq!(again.variant, Variant::NativelyEncrypted);
    assert_folder_matches(&check, &files);
}

#[test]
fn test_backup_created_once() {
    let dir = tempfile::tempdir().unwrap();
    let keys = KeyMaterial::default();
    let container = dir.path().join("data.vndat");
    write_plain_archive(&container, &sample_files(), &keys);
    let original_bytes = fs::read(&container).unwrap();

    let unpacked = unpack(&container, None, &keys, &options()).unwrap();
    fs::write(unpacked.output.join("config.txt"), b"width=1920\n").unwrap();

    let first = repack(&unpacked.output, &keys, &options()).unwrap();
    assert_eq!(first.backup_status, BackupStatus::Created);

    fs::write(unpacked.output.join("config.txt"), b"width=2560\n").unwrap();
    let second = repack(&unpacked.output, &keys, &options()).unwrap();
    assert_eq!(second.backup_status, BackupStatus::AlreadyPresent);

    let backups: Vec<_> = dir_names(dir.path())
        .into_iter()
        .filter(|n| n.ends_with(".bak"))
        .collect();
    assert_eq!(backups, vec!["data.vndat.bak".to_string()]);
    assert_eq!(fs::read(&first.backup).unwrap(), original_bytes);

    let check = dir.path().join("check");
    unpack(&container, Some(&check), &keys, &options()).unwrap();
    assert_eq!(fs::read(check.join("config.txt")).unwrap(), b"width=2560\n");
}

#[test]
fn test_repack_leaves_source_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let keys = KeyMaterial::default();
    let files = sample_files();
    let container = dir.path().join("data.vndat");
    write_plain_archive(&container, &files, &keys);

    let unpacked = unpack(&container, None, &keys, &options()).unwrap();
    repack(&unpacked.output, &keys, &options()).unwrap();

    assert_folder_matches(&unpacked.output, &files);
    // the temporary copy is gone
    assert_eq!(
        dir_names(dir.path()),
        vec!["data", "data.vndat", "data.vndat.bak"]
    );
}

#[test]
fn test_repack_without_existing_archive() {
    let dir = tempfile::tempdir().unwrap();
    let keys = KeyMaterial::default();
    let source = dir.path().join("mod");
    fs::create_dir_all(source.join("script")).unwrap();
    fs::write(source.join("script/new.txt"), b"brand new content").unwrap();

    let report = repack(&source, &keys, &options()).unwrap();

    assert_eq!(report.backup_status, BackupStatus::NoTarget);
    assert_eq!(report.variant, Variant::Plain);
    assert_eq!(report.target, dir.path().join("mod.vndat"));
    assert!(!report.backup.exists());

    let check = dir.path().join("check");
    unpack(&report.target, Some(&check), &keys, &options()).unwrap();
    assert_eq!(
        fs::read(check.join("script/new.txt")).unwrap(),
        b"brand new content"
    );
}

#[test]
fn test_repack_with_custom_extension() {
    let dir = tempfile::tempdir().unwrap();
    let keys = KeyMaterial::default();
    let source = dir.path().join("save");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("slot.txt"), b"slot").unwrap();

    let options = RoundTripOptions {
        extension: "mcdat".to_string(),
        progress: false,
        ..Default::default()
    };
    let report = repack(&source, &keys, &options).unwrap();
    assert_eq!(report.target, dir.path().join("save.mcdat"));
}

#[test]
fn test_repack_rejects_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("file.txt");
    fs::write(&file, b"x").unwrap();

    let err = repack(&file, &KeyMaterial::default(), &options()).unwrap_err();
    assert!(matches!(err, Error::NotADirectory(_)));
}

fn batch_inputs(dir: &Path) -> (Vec<PathBuf>, PathBuf) {
    let unsupported = dir.join("notes.txt");
    fs::write(&unsupported, b"just text").unwrap();
    let save = dir.join("slot1.mcdat");
    fs::write(&save, vec![1u8; 120]).unwrap();
    (vec![unsupported, save.clone()], save)
}

#[test]
fn test_batch_skips_unsupported_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let (inputs, save) = batch_inputs(dir.path());

    let report = process_inputs(&inputs, &KeyMaterial::default(), &options());

    assert!(!report.aborted);
    assert_eq!(report.outcomes.len(), 2);
    assert!(matches!(report.outcomes[0], InputOutcome::Unsupported(_)));
    assert!(matches!(report.outcomes[1], InputOutcome::Transformed(_)));
    assert!(dir.path().join("slot1.mcdat.dec").exists());
    assert_eq!(fs::read(&save).unwrap(), vec![1u8; 120]);
}

#[test]
fn test_batch_aborts_on_unsupported_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let (inputs, _) = batch_inputs(dir.path());
    let options = RoundTripOptions {
        unsupported: UnsupportedPolicy::Abort,
        progress: false,
        ..Default::default()
    };

    let report = process_inputs(&inputs, &KeyMaterial::default(), &options);

    assert!(report.aborted);
    assert!(!report.is_success());
    assert_eq!(report.outcomes.len(), 1);
    assert!(!dir.path().join("slot1.mcdat.dec").exists());
}

#[test]
fn test_batch_continues_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    let keys = KeyMaterial::default();

    // zip signature followed by garbage: passes the signature check, fails to open
    let broken = dir.path().join("broken.vndat");
    fs::write(&broken, [0x50, 0x4B, 0x03, 0x04, 0, 0, 0, 0]).unwrap();
    let container = dir.path().join("data.vndat");
    write_plain_archive(&container, &sample_files(), &keys);

    let report = process_inputs(&[broken, container], &keys, &options());

    assert!(matches!(report.outcomes[0], InputOutcome::Failed(..)));
    assert!(matches!(report.outcomes[1], InputOutcome::Unpacked(_)));
    assert!(!report.is_success());
    assert!(dir.path().join("data/config.txt").exists());
}
