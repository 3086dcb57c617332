//! The engine's public operation set.
//!
//! [`Engine`] exposes the five entry points with plain `bool`/`String`
//! results for callers that only need success or failure, and a `try_*`
//! twin for each that keeps the typed result. Errors are logged here, at the
//! boundary, before being collapsed.

use std::path::Path;
use std::sync::Arc;
use tracing::error;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{CompressionMode, EncryptionMode, Filter};
use crate::pack::{PackOptions, PackSummary};
use crate::plain::CopySummary;
use crate::progress::ProgressCallback;
use crate::unpack::UnpackSummary;
use crate::verify::VerifyReport;
use crate::{pack, plain, unpack};

/// Stateless handle over the archive and plain-mode operations.
///
/// Every call is self-contained and blocking; a single `Engine` may be
/// shared across threads as long as concurrent calls target distinct paths.
#[derive(Clone, Default)]
pub struct Engine {
    config: EngineConfig,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl Engine {
    pub fn new() -> Self {
        Engine::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Engine {
            config,
            progress: None,
        }
    }

    /// Attach a progress sink that receives events from every operation.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn progress(&self) -> Option<&dyn ProgressCallback> {
        self.progress.as_deref()
    }

    /// Pack `source` into an archive at `dest`.
    pub fn pack(
        &self,
        source: &Path,
        dest: &Path,
        password: &str,
        encryption: EncryptionMode,
        filter: Option<&Filter>,
        compression: CompressionMode,
    ) -> bool {
        report("pack", self.try_pack(source, dest, password, encryption, filter, compression)).is_some()
    }

    pub fn try_pack(
        &self,
        source: &Path,
        dest: &Path,
        password: &str,
        encryption: EncryptionMode,
        filter: Option<&Filter>,
        compression: CompressionMode,
    ) -> Result<PackSummary, EngineError> {
        let options = PackOptions {
            password: password.to_string(),
            encryption,
            compression,
            filter: filter.cloned(),
        };
        pack::pack(source, dest, &options, self.progress())
    }

    /// Unpack an archive under `dest_root`.
    ///
    /// Integrity issues do not fail the call; use [`Engine::try_unpack`] to
    /// see them.
    pub fn unpack(&self, archive: &Path, dest_root: &Path, password: &str) -> bool {
        report("unpack", self.try_unpack(archive, dest_root, password)).is_some()
    }

    pub fn try_unpack(
        &self,
        archive: &Path,
        dest_root: &Path,
        password: &str,
    ) -> Result<UnpackSummary, EngineError> {
        unpack::unpack(archive, dest_root, password, self.config.preserve_mtime, self.progress())
    }

    pub fn backup_simple(&self, source: &Path, dest: &Path) -> bool {
        report("backup", self.try_backup_simple(source, dest)).is_some()
    }

    pub fn try_backup_simple(&self, source: &Path, dest: &Path) -> Result<CopySummary, EngineError> {
        plain::backup(source, dest, &self.config, self.progress())
    }

    /// Copy a plain backup back out. Callers are expected to have run
    /// [`Engine::verify_simple`] first.
    pub fn restore_simple(&self, source: &Path, dest: &Path) -> bool {
        report("restore", self.try_restore_simple(source, dest)).is_some()
    }

    pub fn try_restore_simple(&self, source: &Path, dest: &Path) -> Result<CopySummary, EngineError> {
        plain::restore(source, dest, &self.config, self.progress())
    }

    /// Verify a plain backup. An empty string means clean; otherwise one
    /// line per offending path, or the error that prevented verification.
    pub fn verify_simple(&self, path: &Path) -> String {
        match self.try_verify_simple(path) {
            Ok(report) => report.diagnostic(),
            Err(e) => {
                error!(path = %path.display(), error = %e, "verify failed");
                format!("{}: {}", path.display(), e)
            }
        }
    }

    pub fn try_verify_simple(&self, path: &Path) -> Result<VerifyReport, EngineError> {
        plain::verify(path, &self.config, self.progress())
    }
}

fn report<T>(operation: &str, result: Result<T, EngineError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!(operation, error = %e, "operation failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use crate::progress::Operation;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProgressCallback for Recorder {
        fn on_started(&self, operation: Operation, total: usize) {
            self.events.lock().unwrap().push(format!("start {} {}", operation, total));
        }

        fn on_entry_started(&self, _operation: Operation, _index: usize, _path: &str) {}

        fn on_entry_completed(&self, operation: Operation, _index: usize, path: &str, _bytes: u64) {
            self.events.lock().unwrap().push(format!("done {} {}", operation, path));
        }

        fn on_completed(&self, operation: Operation, entries: usize, _bytes: u64) {
            self.events.lock().unwrap().push(format!("end {} {}", operation, entries));
        }
    }

    #[test]
    fn test_failures_collapse_to_false() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let engine = Engine::new();
        let missing = temp_dir.path().join("missing");

        assert!(!engine.pack(
            &missing,
            &temp_dir.path().join("a.pck"),
            "",
            EncryptionMode::None,
            None,
            CompressionMode::None,
        ));
        assert!(!engine.unpack(&missing, temp_dir.path(), ""));
        assert!(!engine.backup_simple(&missing, &temp_dir.path().join("b")));
        assert!(!engine.restore_simple(&missing, &temp_dir.path().join("c")));
    }

    #[test]
    fn test_verify_simple_reports_missing_manifest() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let diagnostic = Engine::new().verify_simple(temp_dir.path());
        assert!(!diagnostic.is_empty());
    }

    #[test]
    fn test_progress_events_are_forwarded() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir_all(&src).expect("create src");
        fs::write(src.join("a.txt"), b"a").expect("write a");

        let recorder = Arc::new(Recorder::default());
        let engine = Engine::new().with_progress(recorder.clone());
        let archive = temp_dir.path().join("a.pck");
        assert!(engine.pack(&src, &archive, "", EncryptionMode::None, None, CompressionMode::Rle));

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, vec!["start pack 1", "done pack a.txt", "end pack 1"]);
    }
}
