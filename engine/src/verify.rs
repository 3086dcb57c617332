//! Integrity mismatches and the verify-then-restore protocol.
//!
//! Both archive and plain-mode restores run the same state machine:
//!
//! ```text
//! verify ──(no issues)──> Clean ──restore──> Restored
//!    │
//!    └──(issues)──> IssuesFound ──proceed, restore──> RestoredWithWarnings
//!                               └─cancel───────────> Cancelled
//! ```
//!
//! Verifying and force-restoring are not held as states: they are the runs
//! of the `verify` and `restore` closures handed to [`RestoreProtocol`].
//!
//! The engine never decides between `proceed` and `cancel`; the caller
//! supplies that decision after inspecting the mismatch list.

use std::fmt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use crate::error::EngineError;

/// Why a stored entry failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchReason {
    /// Recomputed digest differs from the recorded one
    ChecksumMismatch,
    /// Recorded entry is absent on disk
    MissingFile,
    /// Recovered length differs from the recorded length
    SizeMismatch,
    /// Payload could not be decompressed
    UndecodablePayload,
    /// File on disk has no manifest record
    UnexpectedFile,
    /// Recorded file exists but could not be read back
    UnreadableFile,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChecksumMismatch => write!(f, "checksum mismatch"),
            Self::MissingFile => write!(f, "missing file"),
            Self::SizeMismatch => write!(f, "size mismatch"),
            Self::UndecodablePayload => write!(f, "undecodable payload"),
            Self::UnexpectedFile => write!(f, "unexpected file"),
            Self::UnreadableFile => write!(f, "unreadable file"),
        }
    }
}

/// One suspect entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub path: String,
    pub reason: MismatchReason,
}

impl Mismatch {
    pub fn new(path: impl Into<String>, reason: MismatchReason) -> Self {
        Mismatch {
            path: path.into(),
            reason,
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// Result of checking every persisted record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Number of records checked
    pub checked: usize,
    pub mismatches: Vec<Mismatch>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Record a mismatch for `path`, keeping at most one entry per reason.
    pub fn flag(&mut self, path: impl Into<String>, reason: MismatchReason) {
        let mismatch = Mismatch::new(path, reason);
        if !self.mismatches.contains(&mismatch) {
            warn!(path = %mismatch.path, reason = %mismatch.reason, "integrity issue");
            self.mismatches.push(mismatch);
        }
    }

    /// Paths flagged at least once, in first-seen order.
    pub fn suspect_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::new();
        for m in &self.mismatches {
            if !paths.contains(&m.path.as_str()) {
                paths.push(&m.path);
            }
        }
        paths
    }

    /// Human-readable diagnostic: one line per mismatch, empty when clean.
    pub fn diagnostic(&self) -> String {
        self.mismatches
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// States of the verify-then-restore protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreState {
    /// Verified with no issues; restore will run unconditionally
    Clean,
    /// Verified with issues; waiting for the caller's decision
    IssuesFound,
    Cancelled,
    Restored,
    /// Restored after the caller chose to proceed past issues
    RestoredWithWarnings,
}

/// Terminal result of a restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Verification was clean and everything was restored
    Restored,
    /// Issues were found, the caller proceeded, every entry was restored
    RestoredWithWarnings { suspect: Vec<Mismatch> },
    /// Issues were found and the caller declined; nothing was written
    Cancelled { issues: Vec<Mismatch> },
}

impl RestoreOutcome {
    pub fn state(&self) -> RestoreState {
        match self {
            Self::Restored => RestoreState::Restored,
            Self::RestoredWithWarnings { .. } => RestoreState::RestoredWithWarnings,
            Self::Cancelled { .. } => RestoreState::Cancelled,
        }
    }
}

/// A restore that has been verified but not yet performed.
#[derive(Debug)]
pub struct RestoreProtocol {
    state: RestoreState,
    report: VerifyReport,
}

impl RestoreProtocol {
    /// Run the verification step.
    ///
    /// # Errors
    /// Propagates errors from `verify` (missing manifest, unreadable archive).
    pub fn verify<F>(verify: F) -> Result<Self, EngineError>
    where
        F: FnOnce() -> Result<VerifyReport, EngineError>,
    {
        let report = verify()?;
        let state = if report.is_clean() {
            RestoreState::Clean
        } else {
            RestoreState::IssuesFound
        };
        Ok(RestoreProtocol { state, report })
    }

    pub fn state(&self) -> RestoreState {
        self.state
    }

    pub fn issues(&self) -> &[Mismatch] {
        &self.report.mismatches
    }

    pub fn report(&self) -> &VerifyReport {
        &self.report
    }

    /// Finish the protocol.
    ///
    /// In the `Clean` state `proceed` is ignored and `restore` always runs. In
    /// `IssuesFound`, `restore` only runs when `proceed` is true.
    pub fn resolve<F>(self, proceed: bool, restore: F) -> Result<RestoreOutcome, EngineError>
    where
        F: FnOnce() -> Result<(), EngineError>,
    {
        match self.state {
            RestoreState::Clean => {
                restore()?;
                info!(checked = self.report.checked, "restore completed cleanly");
                Ok(RestoreOutcome::Restored)
            }
            _ if proceed => {
                warn!(
                    issues = self.report.mismatches.len(),
                    "restoring despite integrity issues"
                );
                restore()?;
                Ok(RestoreOutcome::RestoredWithWarnings {
                    suspect: self.report.mismatches,
                })
            }
            _ => {
                info!(issues = self.report.mismatches.len(), "restore cancelled by caller");
                Ok(RestoreOutcome::Cancelled {
                    issues: self.report.mismatches,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn dirty_report() -> VerifyReport {
        let mut report = VerifyReport {
            checked: 2,
            ..VerifyReport::default()
        };
        report.flag("a.txt", MismatchReason::ChecksumMismatch);
        report
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(MismatchReason::ChecksumMismatch.to_string(), "checksum mismatch");
        assert_eq!(MismatchReason::MissingFile.to_string(), "missing file");
        assert_eq!(MismatchReason::SizeMismatch.to_string(), "size mismatch");
        assert_eq!(MismatchReason::UnreadableFile.to_string(), "unreadable file");
    }

    #[test]
    fn test_diagnostic_lines() {
        let mut report = dirty_report();
        report.flag("b/c.bin", MismatchReason::MissingFile);
        report.flag("b/c.bin", MismatchReason::MissingFile);
        assert_eq!(report.diagnostic(), "a.txt: checksum mismatch\nb/c.bin: missing file");
        assert_eq!(report.suspect_paths(), vec!["a.txt", "b/c.bin"]);
        assert_eq!(VerifyReport::default().diagnostic(), "");
    }

    #[test]
    fn test_clean_restores_regardless_of_decision() {
        let ran = Cell::new(false);
        let protocol = RestoreProtocol::verify(|| Ok(VerifyReport::default())).expect("verify");
        assert_eq!(protocol.state(), RestoreState::Clean);

        let outcome = protocol
            .resolve(false, || {
                ran.set(true);
                Ok(())
            })
            .expect("resolve");
        assert_eq!(outcome, RestoreOutcome::Restored);
        assert!(ran.get());
    }

    #[test]
    fn test_issues_then_proceed() {
        let ran = Cell::new(false);
        let protocol = RestoreProtocol::verify(|| Ok(dirty_report())).expect("verify");
        assert_eq!(protocol.state(), RestoreState::IssuesFound);
        assert_eq!(protocol.issues().len(), 1);

        let outcome = protocol
            .resolve(true, || {
                ran.set(true);
                Ok(())
            })
            .expect("resolve");
        assert!(ran.get());
        assert_eq!(outcome.state(), RestoreState::RestoredWithWarnings);
        match outcome {
            RestoreOutcome::RestoredWithWarnings { suspect } => assert_eq!(suspect[0].path, "a.txt"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_issues_then_cancel_does_not_restore() {
        let protocol = RestoreProtocol::verify(|| Ok(dirty_report())).expect("verify");
        let outcome = protocol
            .resolve(false, || panic!("restore must not run"))
            .expect("resolve");
        assert_eq!(outcome.state(), RestoreState::Cancelled);
    }

    #[test]
    fn test_verify_error_propagates() {
        let result = RestoreProtocol::verify(|| {
            Err(EngineError::ManifestNotFound {
                path: "x".into(),
            })
        });
        assert!(result.is_err());
    }
}
