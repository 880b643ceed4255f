//! Store integrity tests
//!
//! Checksums, symlink rejection, file-name sanitization and retrieval
//! after out-of-band deletion, exercised through the manager.

use std::fs;

use artifact_ledger::store::{compute_sha256, MAX_FILE_NAME_LEN};
use artifact_ledger::{
    ArtifactManager, ArtifactStatus, ArtifactType, CreateArtifact, ManagerError, StoreError,
};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

fn setup() -> (TempDir, ArtifactManager) {
    let dir = TempDir::new().unwrap();
    let manager = ArtifactManager::new(dir.path().join("ledger")).unwrap();
    (dir, manager)
}

// === Checksum ===

#[test]
fn test_checksum_matches_independent_hash() {
    let (dir, manager) = setup();
    // Larger than one read chunk so streaming is exercised
    let bytes: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let source = dir.path().join("audio.wav");
    fs::write(&source, &bytes).unwrap();

    let artifact = manager
        .create_artifact(CreateArtifact::new(ArtifactType::AudioRaw).source_path(&source))
        .unwrap();

    let expected = hex::encode(Sha256::digest(&bytes));
    assert_eq!(artifact.checksum.as_deref(), Some(expected.as_str()));
    assert_eq!(compute_sha256(&bytes), expected);
    assert_eq!(artifact.file_size, Some(bytes.len() as u64));

    let stored = manager.get_artifact_file(&artifact.artifact_id).unwrap().unwrap();
    assert_eq!(hex::encode(Sha256::digest(fs::read(stored).unwrap())), expected);
}

#[test]
fn test_same_bytes_same_checksum() {
    let (dir, manager) = setup();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, b"identical").unwrap();
    fs::write(&b, b"identical").unwrap();

    let first = manager
        .create_artifact(CreateArtifact::new(ArtifactType::TextRaw).source_path(&a))
        .unwrap();
    let second = manager
        .create_artifact(CreateArtifact::new(ArtifactType::TextRaw).source_path(&b))
        .unwrap();
    assert_ne!(first.artifact_id, second.artifact_id);
    assert_eq!(first.checksum, second.checksum);
}

#[test]
fn test_file_fields_all_or_nothing() {
    let (dir, manager) = setup();
    let source = dir.path().join("t.txt");
    fs::write(&source, b"x").unwrap();

    let with_file = manager
        .create_artifact(CreateArtifact::new(ArtifactType::TextRaw).source_path(&source))
        .unwrap();
    assert!(with_file.file_path.is_some());
    assert!(with_file.file_size.is_some());
    assert!(with_file.checksum.is_some());

    let without = manager
        .create_artifact(CreateArtifact::new(ArtifactType::Metadata))
        .unwrap();
    assert!(without.file_path.is_none());
    assert!(without.file_size.is_none());
    assert!(without.checksum.is_none());
}

// === Symlinks ===

#[cfg(unix)]
#[test]
fn test_symlink_source_rejected() {
    let (dir, manager) = setup();
    let target = dir.path().join("real.mp4");
    fs::write(&target, b"data").unwrap();
    let valid_link = dir.path().join("valid_link.mp4");
    std::os::unix::fs::symlink(&target, &valid_link).unwrap();
    let dangling = dir.path().join("dangling.mp4");
    std::os::unix::fs::symlink(dir.path().join("gone.mp4"), &dangling).unwrap();

    for link in [&valid_link, &dangling] {
        let err = manager
            .create_artifact(CreateArtifact::new(ArtifactType::VideoRaw).source_path(link))
            .unwrap_err();
        assert!(
            matches!(err, ManagerError::Store(StoreError::SymlinkRejected(_))),
            "unexpected error for {}: {}",
            link.display(),
            err
        );
    }

    assert!(manager.store().list(None, None).unwrap().is_empty());
}

// === Sanitization ===

#[test]
fn test_stored_name_is_sanitized_and_capped() {
    let (dir, manager) = setup();
    let long_name = format!("{} $(rm -rf) ünï;côdé{}.mp4", "a".repeat(20), "b".repeat(150));
    let source = dir.path().join(&long_name);
    fs::write(&source, b"v").unwrap();

    let artifact = manager
        .create_artifact(CreateArtifact::new(ArtifactType::VideoRaw).source_path(&source))
        .unwrap();
    let stored = artifact.file_path.unwrap();
    let file_name = stored.file_name().unwrap().to_string_lossy().into_owned();
    let sanitized = file_name
        .strip_prefix(&format!("{}_", artifact.artifact_id))
        .unwrap();

    assert_eq!(sanitized.chars().count(), MAX_FILE_NAME_LEN);
    assert!(sanitized
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')));
    assert!(sanitized.starts_with(&format!("{}___rm_-rf__", "a".repeat(20))));
    assert_eq!(
        stored.parent().unwrap(),
        manager.store().type_dir(ArtifactType::VideoRaw)
    );
}

#[test]
fn test_short_clean_name_kept() {
    let (dir, manager) = setup();
    let source = dir.path().join("clip-01.final.mp4");
    fs::write(&source, b"v").unwrap();
    let artifact = manager
        .create_artifact(CreateArtifact::new(ArtifactType::VideoRaw).source_path(&source))
        .unwrap();
    let file_name = artifact.file_path.unwrap();
    assert!(file_name
        .to_string_lossy()
        .ends_with(&format!("{}_clip-01.final.mp4", artifact.artifact_id)));
}

// === Retrieval ===

#[test]
fn test_retrieve_after_out_of_band_delete() {
    let (dir, manager) = setup();
    let source = dir.path().join("t.json");
    fs::write(&source, b"{}").unwrap();
    let artifact = manager
        .create_artifact(CreateArtifact::new(ArtifactType::AudioTranscript).source_path(&source))
        .unwrap();

    let stored = manager.get_artifact_file(&artifact.artifact_id).unwrap().unwrap();
    fs::remove_file(&stored).unwrap();

    assert!(manager.get_artifact_file(&artifact.artifact_id).unwrap().is_none());
    assert!(manager.get_artifact(&artifact.artifact_id).unwrap().is_some());
}

#[test]
fn test_missing_source_file_fails_loudly() {
    let (dir, manager) = setup();
    let err = manager
        .create_artifact(
            CreateArtifact::new(ArtifactType::VideoRaw).source_path(dir.path().join("nope.mp4")),
        )
        .unwrap_err();
    assert!(matches!(err, ManagerError::Store(StoreError::SourceNotFound(_))));
}

#[test]
fn test_unknown_stored_type_fails_loudly() {
    let (_dir, manager) = setup();
    let artifact = manager
        .create_artifact(CreateArtifact::new(ArtifactType::Log))
        .unwrap();
    let path = manager
        .store()
        .metadata_dir()
        .join(format!("{}.json", artifact.artifact_id));
    let tampered = fs::read_to_string(&path)
        .unwrap()
        .replace("\"log\"", "\"hologram\"");
    fs::write(&path, tampered).unwrap();

    let err = manager.get_artifact(&artifact.artifact_id).unwrap_err();
    assert!(matches!(err, ManagerError::Store(StoreError::UnknownVariant { .. })));
}

#[test]
fn test_truncated_metadata_reads_as_absent() {
    let (_dir, manager) = setup();
    let artifact = manager
        .create_artifact(CreateArtifact::new(ArtifactType::TextDeid))
        .unwrap();
    let path = manager
        .store()
        .metadata_dir()
        .join(format!("{}.json", artifact.artifact_id));
    fs::write(&path, "{trunc").unwrap();

    assert!(manager.get_artifact(&artifact.artifact_id).unwrap().is_none());
    assert!(manager.get_artifact_file(&artifact.artifact_id).unwrap().is_none());
    assert!(manager
        .update_artifact_status(&artifact.artifact_id, ArtifactStatus::Archived, None)
        .unwrap()
        .is_none());
}
