//! MiniBackup - Command-line interface for the backup engine.
//!
//! Packs and unpacks archives, makes plain backups, and runs the
//! verify-then-restore flow. Logging goes to stderr and is controlled by
//! `RUST_LOG` (or `--verbose`).
//!
//! Exit codes: 0 success, 1 integrity issues found or restore cancelled,
//! 2 the operation failed.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;
use minibackup_engine::{
    inspect_archive, plain, restore_archive, verify_archive, CompressionMode, EncryptionMode,
    Engine, EngineConfig, EntryKind, Filter, Mismatch, Operation, ProgressCallback,
    RestoreOutcome, VerifyReport,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// MiniBackup - selective backup archiver
#[derive(Parser, Debug)]
#[command(name = "minibackup")]
#[command(version = "0.1.0")]
#[command(about = "Pack, unpack, back up and verify file trees")]
struct Args {
    /// Engine config file (JSON)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pack a file or directory into an archive
    Pack {
        #[arg(long, value_name = "PATH")]
        src: PathBuf,

        /// Archive to create
        #[arg(long, value_name = "PATH")]
        dst: PathBuf,

        #[arg(long, env = "MINIBACKUP_PASSWORD", default_value = "", hide_env_values = true)]
        password: String,

        /// none, xor or rc4
        #[arg(long, value_name = "MODE", default_value = "none")]
        encryption: String,

        /// none or rle
        #[arg(long, value_name = "MODE", default_value = "none")]
        compression: String,

        /// Keep entries whose name contains this text
        #[arg(long, value_name = "TEXT")]
        name: Option<String>,

        /// Keep entries whose path contains this text
        #[arg(long, value_name = "TEXT")]
        path: Option<String>,

        /// file or dir
        #[arg(long, value_name = "KIND")]
        kind: Option<String>,

        /// Minimum file size in bytes
        #[arg(long, value_name = "BYTES")]
        min: Option<u64>,

        /// Maximum file size in bytes
        #[arg(long, value_name = "BYTES")]
        max: Option<u64>,

        /// Keep entries modified within this many days
        #[arg(long, value_name = "DAYS")]
        days: Option<u32>,

        /// Keep entries owned by this user id
        #[arg(long, value_name = "UID")]
        owner: Option<u32>,
    },

    /// Unpack an archive, reporting any integrity issues
    Unpack {
        #[arg(long, value_name = "PATH")]
        archive: PathBuf,

        #[arg(long, value_name = "PATH")]
        dst: PathBuf,

        #[arg(long, env = "MINIBACKUP_PASSWORD", default_value = "", hide_env_values = true)]
        password: String,
    },

    /// Copy a tree verbatim and write a manifest
    Backup {
        #[arg(long, value_name = "PATH")]
        src: PathBuf,

        #[arg(long, value_name = "PATH")]
        dst: PathBuf,
    },

    /// Verify a backup or archive, then restore it
    Restore {
        /// Plain backup directory or archive file
        #[arg(long, value_name = "PATH")]
        src: PathBuf,

        #[arg(long, value_name = "PATH")]
        dst: PathBuf,

        #[arg(long, env = "MINIBACKUP_PASSWORD", default_value = "", hide_env_values = true)]
        password: String,

        /// Restore even if verification finds issues
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Verify a plain backup directory or an archive file
    Verify {
        #[arg(value_name = "PATH")]
        target: PathBuf,

        /// Password for archive verification
        #[arg(long, env = "MINIBACKUP_PASSWORD", default_value = "", hide_env_values = true)]
        password: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the records of an archive without decrypting it
    Inspect {
        #[arg(value_name = "PATH")]
        archive: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Pack { .. } => "pack",
            Command::Unpack { .. } => "unpack",
            Command::Backup { .. } => "backup",
            Command::Restore { .. } => "restore",
            Command::Verify { .. } => "verify",
            Command::Inspect { .. } => "inspect",
        }
    }
}

/// Result of a command that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    /// Integrity issues were found, or a restore was declined
    Issues,
}

/// CLI implementation of ProgressCallback
struct CliProgress {
    verbose: bool,
    start_time: Instant,
    total: Mutex<usize>,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
            total: Mutex::new(0),
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        let mins = secs / 60;
        let secs = secs % 60;

        if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn print_progress_bar(percent: u32) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }
}

impl ProgressCallback for CliProgress {
    fn on_started(&self, operation: Operation, total: usize) {
        if let Ok(mut t) = self.total.lock() {
            *t = total;
        }
        eprintln!("Starting {} of {} entries...", operation, total);
    }

    fn on_entry_started(&self, _operation: Operation, index: usize, path: &str) {
        if self.verbose {
            eprintln!("[{:3}] {}", index, path);
        }
    }

    fn on_entry_completed(&self, _operation: Operation, index: usize, _path: &str, _bytes: u64) {
        if self.verbose {
            return;
        }
        let total = self.total.lock().map(|t| *t).unwrap_or(0).max(1);
        let percent = ((index + 1) as f64 / total as f64 * 100.0) as u32;
        eprint!("\rProgress: {}", Self::print_progress_bar(percent));
        let _ = io::stderr().flush();
    }

    fn on_completed(&self, operation: Operation, entries: usize, bytes: u64) {
        if !self.verbose {
            eprintln!();
        }
        eprintln!(
            "Finished {}: {} entries, {} in {}",
            operation,
            entries,
            Self::format_bytes(bytes),
            Self::format_duration(self.start_time.elapsed())
        );
    }
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let exit_code = match run_cli(&args, &confirm_force_restore) {
        Ok(Status::Ok) => 0,
        Ok(Status::Issues) => 1,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(p) => EngineConfig::load(p).with_context(|| format!("Failed to load config {}", p.display()))?,
        None => EngineConfig::from_env()?,
    };
    Ok(config)
}

fn parse_encryption(value: &str) -> Result<EncryptionMode> {
    match EncryptionMode::from_str(value) {
        Some(mode) => Ok(mode),
        None => bail!("Invalid encryption '{}'. Must be 'none', 'xor', or 'rc4'", value),
    }
}

fn parse_compression(value: &str) -> Result<CompressionMode> {
    match CompressionMode::from_str(value) {
        Some(mode) => Ok(mode),
        None => bail!("Invalid compression '{}'. Must be 'none' or 'rle'", value),
    }
}

fn parse_kind(value: &str) -> Result<EntryKind> {
    match value.to_lowercase().as_str() {
        "file" | "f" => Ok(EntryKind::File),
        "dir" | "directory" | "d" => Ok(EntryKind::Directory),
        _ => bail!("Invalid kind '{}'. Must be 'file' or 'dir'", value),
    }
}

fn print_issues(issues: &[Mismatch]) {
    eprintln!("Integrity issues:");
    for issue in issues {
        eprintln!("  {}", issue);
    }
}

fn report_status(report: &VerifyReport) -> Status {
    if report.is_clean() {
        Status::Ok
    } else {
        print_issues(&report.mismatches);
        Status::Issues
    }
}

/// Ask on the terminal whether to restore despite issues.
fn confirm_force_restore(issues: &[Mismatch]) -> bool {
    print_issues(issues);
    if !io::stdin().is_terminal() {
        eprintln!("Not restoring; pass --yes to restore anyway.");
        return false;
    }
    eprint!("Restore anyway? [y/N] ");
    let _ = io::stderr().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Main CLI logic - separated for testability
///
/// `confirm` is asked whether to restore when verification finds issues
/// and `--yes` was not given.
fn run_cli(args: &Args, confirm: &dyn Fn(&[Mismatch]) -> bool) -> Result<Status> {
    let config = load_config(args.config.as_deref())?;
    let progress = Arc::new(CliProgress::new(args.verbose));
    let engine = Engine::with_config(config.clone()).with_progress(progress);
    info!(command = args.command.name(), "minibackup starting");

    match &args.command {
        Command::Pack {
            src,
            dst,
            password,
            encryption,
            compression,
            name,
            path,
            kind,
            min,
            max,
            days,
            owner,
        } => {
            let encryption = parse_encryption(encryption)?;
            let compression = parse_compression(compression)?;
            if encryption != EncryptionMode::None && password.is_empty() {
                bail!("Encryption '{}' needs a password (--password or MINIBACKUP_PASSWORD)", encryption);
            }

            let filter = Filter {
                name_contains: name.clone(),
                path_contains: path.clone(),
                kind: kind.as_deref().map(parse_kind).transpose()?,
                // The engine treats 0 as "no bound".
                min_size: min.unwrap_or(0),
                max_size: max.unwrap_or(0),
                not_before: days.map_or(0, |d| Utc::now().timestamp() - i64::from(d) * 86_400),
                owner_id: *owner,
            };
            let filter = (!filter.is_unconstrained()).then_some(filter);

            let summary = engine
                .try_pack(src, dst, password, encryption, filter.as_ref(), compression)
                .context("Pack failed")?;
            println!(
                "Packed {} files and {} directories ({} skipped): {} -> {}",
                summary.files,
                summary.directories,
                summary.skipped,
                CliProgress::format_bytes(summary.original_bytes),
                CliProgress::format_bytes(summary.stored_bytes)
            );
            Ok(Status::Ok)
        }

        Command::Unpack { archive, dst, password } => {
            let summary = engine.try_unpack(archive, dst, password).context("Unpack failed")?;
            println!(
                "Unpacked {} entries ({} failed), {}",
                summary.written,
                summary.failed,
                CliProgress::format_bytes(summary.bytes_written)
            );
            if summary.failed > 0 {
                return Ok(Status::Issues);
            }
            Ok(report_status(&summary.report))
        }

        Command::Backup { src, dst } => {
            let summary = engine.try_backup_simple(src, dst).context("Backup failed")?;
            println!(
                "Backed up {} files and {} directories, {}",
                summary.files,
                summary.directories,
                CliProgress::format_bytes(summary.bytes)
            );
            Ok(Status::Ok)
        }

        Command::Restore { src, dst, password, yes } => {
            let decide = |issues: &[Mismatch]| {
                if *yes {
                    print_issues(issues);
                    true
                } else {
                    confirm(issues)
                }
            };
            let outcome = if src.is_file() {
                restore_archive(src, dst, password, config.preserve_mtime, decide)
            } else {
                plain::restore_verified(src, dst, &config, decide)
            }
            .context("Restore failed")?;

            match outcome {
                RestoreOutcome::Restored => {
                    println!("Restored {} to {}", src.display(), dst.display());
                    Ok(Status::Ok)
                }
                RestoreOutcome::RestoredWithWarnings { suspect } => {
                    println!("Restored with {} suspect entries", suspect.len());
                    Ok(Status::Issues)
                }
                RestoreOutcome::Cancelled { issues } => {
                    println!("Restore cancelled ({} issues)", issues.len());
                    Ok(Status::Issues)
                }
            }
        }

        Command::Verify { target, password, json } => {
            let report = if target.is_file() {
                verify_archive(target, password, None)
            } else {
                engine.try_verify_simple(target)
            }
            .context("Verify failed")?;

            if *json {
                let lines: Vec<serde_json::Value> = report
                    .mismatches
                    .iter()
                    .map(|m| serde_json::json!({ "path": m.path, "reason": m.reason.to_string() }))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "checked": report.checked,
                        "clean": report.is_clean(),
                        "mismatches": lines,
                    }))?
                );
            } else if report.is_clean() {
                println!("OK: {} entries verified", report.checked);
            }
            Ok(report_status(&report))
        }

        Command::Inspect { archive, json } => {
            let listing = inspect_archive(archive).context("Inspect failed")?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                println!("compression: {}, encryption: {}", listing.compression, listing.encryption);
                for entry in &listing.entries {
                    println!(
                        "{:>4} {:>10} {:>10} {} {}",
                        entry.kind,
                        entry.original_size,
                        entry.stored_size,
                        entry.checksum,
                        entry.path
                    );
                }
            }
            Ok(Status::Ok)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(command: Command) -> Args {
        Args {
            config: None,
            verbose: false,
            command,
        }
    }

    fn decline(_: &[Mismatch]) -> bool {
        false
    }

    fn pack_command(src: PathBuf, dst: PathBuf) -> Command {
        Command::Pack {
            src,
            dst,
            password: String::new(),
            encryption: "none".to_string(),
            compression: "none".to_string(),
            name: None,
            path: None,
            kind: None,
            min: None,
            max: None,
            days: None,
            owner: None,
        }
    }

    #[test]
    fn test_cli_pack_then_unpack() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let out_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("test.txt"), "hello").expect("Failed to write file");
        let archive = out_dir.path().join("test.pck");

        let mut command = pack_command(src_dir.path().to_path_buf(), archive.clone());
        if let Command::Pack { password, encryption, compression, .. } = &mut command {
            *password = "pw".to_string();
            *encryption = "rc4".to_string();
            *compression = "rle".to_string();
        }
        assert_eq!(run_cli(&args(command), &decline).expect("pack"), Status::Ok);

        let unpack = Command::Unpack {
            archive,
            dst: out_dir.path().join("restored"),
            password: "pw".to_string(),
        };
        assert_eq!(run_cli(&args(unpack), &decline).expect("unpack"), Status::Ok);
        assert_eq!(
            std::fs::read(out_dir.path().join("restored").join("test.txt")).expect("read"),
            b"hello"
        );
    }

    #[test]
    fn test_cli_unpack_wrong_password_reports_issues() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let out_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("test.txt"), "hello").expect("Failed to write file");
        let archive = out_dir.path().join("test.pck");

        let mut command = pack_command(src_dir.path().to_path_buf(), archive.clone());
        if let Command::Pack { password, encryption, .. } = &mut command {
            *password = "secret".to_string();
            *encryption = "rc4".to_string();
        }
        run_cli(&args(command), &decline).expect("pack");

        let unpack = Command::Unpack {
            archive,
            dst: out_dir.path().join("restored"),
            password: "wrong".to_string(),
        };
        assert_eq!(run_cli(&args(unpack), &decline).expect("unpack"), Status::Issues);
    }

    #[test]
    fn test_cli_rejects_invalid_encryption() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let mut command = pack_command(src_dir.path().to_path_buf(), src_dir.path().join("a.pck"));
        if let Command::Pack { encryption, .. } = &mut command {
            *encryption = "aes".to_string();
        }
        assert!(run_cli(&args(command), &decline).is_err(), "CLI should reject unknown encryption");
    }

    #[test]
    fn test_cli_rejects_encryption_without_password() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let mut command = pack_command(src_dir.path().to_path_buf(), src_dir.path().join("a.pck"));
        if let Command::Pack { encryption, .. } = &mut command {
            *encryption = "xor".to_string();
        }
        assert!(run_cli(&args(command), &decline).is_err());
    }

    #[test]
    fn test_cli_rejects_missing_source() {
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let command = pack_command(PathBuf::from("/nonexistent/path"), dst_dir.path().join("a.pck"));
        assert!(run_cli(&args(command), &decline).is_err(), "CLI should reject missing source");
    }

    #[test]
    fn test_cli_backup_verify_restore() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let work = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("test.txt"), "hello").expect("Failed to write file");
        let backup = work.path().join("backup");

        let command = Command::Backup {
            src: src_dir.path().to_path_buf(),
            dst: backup.clone(),
        };
        assert_eq!(run_cli(&args(command), &decline).expect("backup"), Status::Ok);

        let verify = || Command::Verify {
            target: backup.clone(),
            password: String::new(),
            json: false,
        };
        assert_eq!(run_cli(&args(verify()), &decline).expect("verify"), Status::Ok);

        std::fs::write(backup.join("test.txt"), "HELLO").expect("tamper");
        assert_eq!(run_cli(&args(verify()), &decline).expect("verify"), Status::Issues);

        let restore = |yes| Command::Restore {
            src: backup.clone(),
            dst: work.path().join(if yes { "forced" } else { "declined" }),
            password: String::new(),
            yes,
        };
        assert_eq!(run_cli(&args(restore(false)), &decline).expect("restore"), Status::Issues);
        assert!(!work.path().join("declined").exists());

        assert_eq!(run_cli(&args(restore(true)), &decline).expect("restore"), Status::Issues);
        assert_eq!(
            std::fs::read(work.path().join("forced").join("test.txt")).expect("read"),
            b"HELLO"
        );
    }

    #[test]
    fn test_cli_verify_missing_manifest_fails() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let command = Command::Verify {
            target: dir.path().to_path_buf(),
            password: String::new(),
            json: true,
        };
        assert!(run_cli(&args(command), &decline).is_err());
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("file").expect("file"), EntryKind::File);
        assert_eq!(parse_kind("DIR").expect("dir"), EntryKind::Directory);
        assert!(parse_kind("link").is_err());
    }

    #[test]
    fn test_cli_size_and_age_filters() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let out_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("tiny.txt"), "abc").expect("Failed to write file");
        std::fs::write(src_dir.path().join("mid.txt"), "m".repeat(100)).expect("Failed to write file");
        std::fs::write(src_dir.path().join("huge.txt"), "h".repeat(5000)).expect("Failed to write file");

        let archive = out_dir.path().join("sized.pck");
        let mut command = pack_command(src_dir.path().to_path_buf(), archive.clone());
        if let Command::Pack { min, max, days, .. } = &mut command {
            *min = Some(10);
            *max = Some(1000);
            *days = Some(1);
        }
        assert_eq!(run_cli(&args(command), &decline).expect("pack"), Status::Ok);

        let restored = out_dir.path().join("sized");
        let unpack = Command::Unpack {
            archive,
            dst: restored.clone(),
            password: String::new(),
        };
        assert_eq!(run_cli(&args(unpack), &decline).expect("unpack"), Status::Ok);
        assert!(restored.join("mid.txt").exists());
        assert!(!restored.join("tiny.txt").exists());
        assert!(!restored.join("huge.txt").exists());

        // Only a lower bound: the upper one stays open.
        let archive = out_dir.path().join("min-only.pck");
        let mut command = pack_command(src_dir.path().to_path_buf(), archive.clone());
        if let Command::Pack { min, .. } = &mut command {
            *min = Some(10);
        }
        assert_eq!(run_cli(&args(command), &decline).expect("pack"), Status::Ok);

        let restored = out_dir.path().join("min-only");
        let unpack = Command::Unpack {
            archive,
            dst: restored.clone(),
            password: String::new(),
        };
        assert_eq!(run_cli(&args(unpack), &decline).expect("unpack"), Status::Ok);
        assert!(restored.join("mid.txt").exists());
        assert!(restored.join("huge.txt").exists());
        assert!(!restored.join("tiny.txt").exists());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(CliProgress::format_bytes(512), "512.00 B");
        assert_eq!(CliProgress::format_bytes(1536), "1.50 KB");
    }
}
