use anyhow::Result;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use minibackup_engine::plain::restore_verified;
use minibackup_engine::{ChecksumAlgorithm, Engine, EngineConfig, RestoreOutcome};

fn build_tree(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join("photos").join("2024"))?;
    fs::write(root.join("readme.md"), b"# notes\n")?;
    fs::write(root.join("photos").join("2024").join("cat.raw"), vec![7u8; 2048])?;
    Ok(())
}

#[test]
fn clean_backup_verifies_empty() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    build_tree(&src)?;

    let engine = Engine::new();
    assert!(engine.backup_simple(&src, &dst));
    assert_eq!(engine.verify_simple(&dst), "");
    Ok(())
}

#[test]
fn flipped_byte_is_reported_by_path() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    build_tree(&src)?;

    let engine = Engine::new();
    assert!(engine.backup_simple(&src, &dst));

    let victim = dst.join("photos").join("2024").join("cat.raw");
    let mut bytes = fs::read(&victim)?;
    bytes[100] ^= 0x01;
    fs::write(&victim, &bytes)?;

    let diagnostic = engine.verify_simple(&dst);
    assert!(!diagnostic.is_empty());
    assert!(diagnostic.contains("photos/2024/cat.raw"), "got: {}", diagnostic);
    assert!(!diagnostic.contains("readme.md"));
    Ok(())
}

#[test]
fn every_manifest_algorithm_detects_tampering() -> Result<()> {
    for algorithm in [
        ChecksumAlgorithm::Crc32,
        ChecksumAlgorithm::Md5,
        ChecksumAlgorithm::Sha256,
        ChecksumAlgorithm::Blake3,
    ] {
        let tmp = TempDir::new()?;
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        build_tree(&src)?;

        let engine = Engine::with_config(EngineConfig {
            manifest_algorithm: algorithm,
            ..EngineConfig::default()
        });
        assert!(engine.backup_simple(&src, &dst));
        assert_eq!(engine.verify_simple(&dst), "", "{} should verify clean", algorithm);

        fs::write(dst.join("readme.md"), b"# NOTES\n")?;
        assert_eq!(engine.verify_simple(&dst), "readme.md: checksum mismatch");
    }
    Ok(())
}

#[test]
fn restore_after_consent_copies_everything() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    build_tree(&src)?;
    let config = EngineConfig::default();
    let engine = Engine::with_config(config.clone());
    assert!(engine.backup_simple(&src, &dst));
    fs::write(dst.join("readme.md"), b"changed")?;

    let declined = tmp.path().join("declined");
    let outcome = restore_verified(&dst, &declined, &config, |_| false)?;
    assert!(matches!(outcome, RestoreOutcome::Cancelled { .. }));
    assert!(!declined.exists());

    let restored = tmp.path().join("restored");
    let outcome = restore_verified(&dst, &restored, &config, |_| true)?;
    assert!(matches!(outcome, RestoreOutcome::RestoredWithWarnings { .. }));
    assert_eq!(fs::read(restored.join("readme.md"))?, b"changed");
    assert_eq!(fs::read(restored.join("photos").join("2024").join("cat.raw"))?, vec![7u8; 2048]);
    Ok(())
}

#[test]
fn restore_simple_roundtrip() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    let out = tmp.path().join("out");
    build_tree(&src)?;

    let engine = Engine::new();
    assert!(engine.backup_simple(&src, &dst));
    assert!(engine.restore_simple(&dst, &out));
    assert_eq!(fs::read(out.join("readme.md"))?, b"# notes\n");
    assert!(!out.join(&engine.config().manifest_name).exists());
    Ok(())
}

#[test]
fn backup_into_own_tree_is_refused() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    build_tree(&src)?;

    let engine = Engine::new();
    assert!(!engine.backup_simple(&src, &src));
    assert!(!engine.backup_simple(&src, &src.join("photos").join("backup")));
    assert!(!src.join(&engine.config().manifest_name).exists());
    assert!(!src.join("photos").join("backup").exists());
    assert_eq!(fs::read(src.join("readme.md"))?, b"# notes\n");
    Ok(())
}

#[test]
fn second_backup_matches_current_source() -> Result<()> {
    let tmp = TempDir::new()?;
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    let out = tmp.path().join("out");
    build_tree(&src)?;

    let engine = Engine::new();
    assert!(engine.backup_simple(&src, &dst));
    fs::remove_file(src.join("photos").join("2024").join("cat.raw"))?;
    assert!(engine.backup_simple(&src, &dst));
    assert_eq!(engine.verify_simple(&dst), "");

    assert!(engine.restore_simple(&dst, &out));
    assert!(!out.join("photos").join("2024").join("cat.raw").exists());
    assert!(out.join("photos").join("2024").is_dir());
    Ok(())
}
