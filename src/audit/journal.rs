//! Rotating JSON-lines audit journal

use chrono::Utc;
use std::cmp::Reverse;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{error, info, warn};

use super::{AuditEntry, AuditError, AuditQuery, ErrorSummary, ExportFormat, TimeRange};

/// Rotation threshold used when none is configured.
pub const DEFAULT_ROTATION_SIZE_MB: u64 = 100;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Append-only, rotating, queryable operation journal.
#[derive(Debug)]
pub struct AuditLog {
    audit_path: PathBuf,
    rotation_threshold_bytes: u64,
    /// Held around check-rotate-append only
    write_lock: Mutex<()>,
}

impl AuditLog {
    /// Open a journal directory, rotating files at `rotation_size_mb`.
    pub fn new(audit_path: impl Into<PathBuf>, rotation_size_mb: u64) -> Result<Self, AuditError> {
        Self::with_rotation_bytes(audit_path, rotation_size_mb.saturating_mul(BYTES_PER_MB))
    }

    /// Open a journal directory with a byte-granular rotation threshold.
    pub fn with_rotation_bytes(
        audit_path: impl Into<PathBuf>,
        rotation_threshold_bytes: u64,
    ) -> Result<Self, AuditError> {
        let audit_path = audit_path.into();
        fs::create_dir_all(&audit_path)?;
        Ok(Self {
            audit_path,
            rotation_threshold_bytes,
            write_lock: Mutex::new(()),
        })
    }

    pub fn audit_path(&self) -> &Path {
        &self.audit_path
    }

    pub fn rotation_threshold_bytes(&self) -> u64 {
        self.rotation_threshold_bytes
    }

    /// Active file for the current UTC month.
    pub fn current_log_path(&self) -> PathBuf {
        self.audit_path
            .join(format!("audit_{}.jsonl", Utc::now().format("%Y%m")))
    }

    /// Append one entry, rotating the active file first if it is full.
    pub fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let current = self.current_log_path();
            if self.should_rotate(&current)? {
                self.rotate(&current)?;
            }
            let mut file = OpenOptions::new().create(true).append(true).open(&current)?;
            file.write_all(line.as_bytes())?;
        }

        if entry.success {
            info!(
                operation = %entry.operation,
                action = %entry.action,
                artifact_id = entry.artifact_id.as_deref().unwrap_or("-"),
                "audit: success"
            );
        } else {
            error!(
                operation = %entry.operation,
                action = %entry.action,
                artifact_id = entry.artifact_id.as_deref().unwrap_or("-"),
                error = entry.error_message.as_deref().unwrap_or(""),
                "audit: failed"
            );
        }
        Ok(())
    }

    fn should_rotate(&self, current: &Path) -> Result<bool, AuditError> {
        match fs::metadata(current) {
            Ok(meta) => Ok(meta.len() >= self.rotation_threshold_bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Rename the active file to the smallest unused `.<n>` suffix.
    fn rotate(&self, current: &Path) -> Result<PathBuf, AuditError> {
        let stem = current
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut n: u32 = 1;
        let rotated = loop {
            let candidate = self.audit_path.join(format!("{}.{}.jsonl", stem, n));
            if !candidate.exists() {
                break candidate;
            }
            n += 1;
        };

        fs::rename(current, &rotated)?;
        info!(path = %rotated.display(), "rotated audit log");
        Ok(rotated)
    }

    /// All journal files, newest first.
    ///
    /// Months are ordered newest first; within a month the active file
    /// precedes its rotated files, which run from the highest suffix down.
    pub fn log_files(&self) -> Result<Vec<PathBuf>, AuditError> {
        let mut files: Vec<(LogFileName, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.audit_path)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(parsed) = LogFileName::parse(name) {
                files.push((parsed, path));
            }
        }

        files.sort_by_key(|(name, _)| {
            (
                Reverse(name.month.clone()),
                name.rotation.is_some(),
                Reverse(name.rotation),
            )
        });
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// Entries matching `query`, scanning files newest first.
    ///
    /// Lines within a file come back in write order, so results are ordered
    /// per file rather than globally by timestamp. Unparsable lines are
    /// skipped with a warning. Scanning stops once `query.limit` matches
    /// have been collected.
    pub fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        let mut entries = Vec::new();
        if query.limit == Some(0) {
            return Ok(entries);
        }

        for path in self.log_files()? {
            let file = match File::open(&path) {
                Ok(f) => f,
                // Rotated away between listing and opening
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            for (index, line) in BufReader::new(file).lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry: AuditEntry = match serde_json::from_str(&line) {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(
                            file = %path.display(),
                            line = index + 1,
                            error = %e,
                            "skipping invalid audit line"
                        );
                        continue;
                    }
                };

                if !query.matches(&entry) {
                    continue;
                }
                entries.push(entry);
                if query.limit.is_some_and(|limit| entries.len() >= limit) {
                    return Ok(entries);
                }
            }
        }

        Ok(entries)
    }

    /// Every entry recorded against one artifact.
    pub fn artifact_history(&self, artifact_id: &str) -> Result<Vec<AuditEntry>, AuditError> {
        self.query(&AuditQuery::new().artifact_id(artifact_id))
    }

    /// Aggregate failed entries inside `range`.
    pub fn error_summary(&self, range: TimeRange) -> Result<ErrorSummary, AuditError> {
        let errors = self.query(&AuditQuery::new().range(range).success(false))?;
        Ok(ErrorSummary::from_entries(&errors, range))
    }

    /// Write entries inside `range` to `output_path`.
    pub fn export(
        &self,
        output_path: &Path,
        range: TimeRange,
        format: ExportFormat,
    ) -> Result<PathBuf, AuditError> {
        let entries = self.query(&AuditQuery::new().range(range))?;
        let rendered = format.render(&entries)?;
        fs::write(output_path, rendered)?;
        info!(
            count = entries.len(),
            format = %format,
            path = %output_path.display(),
            "exported audit entries"
        );
        Ok(output_path.to_path_buf())
    }
}

/// Parsed `audit_<YYYYMM>[.<n>].jsonl`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogFileName {
    month: String,
    rotation: Option<u32>,
}

impl LogFileName {
    fn parse(name: &str) -> Option<Self> {
        let body = name.strip_prefix("audit_")?.strip_suffix(".jsonl")?;
        let (month, rotation) = match body.split_once('.') {
            Some((month, n)) => (month, Some(n.parse().ok()?)),
            None => (body, None),
        };
        if month.len() != 6 || !month.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            month: month.to_string(),
            rotation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{actions, operations};
    use tempfile::TempDir;

    fn entry(action: &str) -> AuditEntry {
        AuditEntry::new(operations::ARTIFACT_ACCESS, action)
    }

    #[test]
    fn test_parse_log_file_names() {
        assert_eq!(
            LogFileName::parse("audit_202410.jsonl"),
            Some(LogFileName { month: "202410".to_string(), rotation: None })
        );
        assert_eq!(
            LogFileName::parse("audit_202410.12.jsonl"),
            Some(LogFileName { month: "202410".to_string(), rotation: Some(12) })
        );
        assert_eq!(LogFileName::parse("audit_2024.jsonl"), None);
        assert_eq!(LogFileName::parse("audit_202410.x.jsonl"), None);
        assert_eq!(LogFileName::parse("export.json"), None);
    }

    #[test]
    fn test_log_files_order() {
        let dir = TempDir::new().unwrap();
        for name in [
            "audit_202409.jsonl",
            "audit_202410.1.jsonl",
            "audit_202410.jsonl",
            "audit_202410.10.jsonl",
            "audit_202410.2.jsonl",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let log = AuditLog::new(dir.path(), 1).unwrap();

        let names: Vec<String> = log
            .log_files()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "audit_202410.jsonl",
                "audit_202410.10.jsonl",
                "audit_202410.2.jsonl",
                "audit_202410.1.jsonl",
                "audit_202409.jsonl",
            ]
        );
    }

    #[test]
    fn test_append_writes_one_line_per_entry() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path(), DEFAULT_ROTATION_SIZE_MB).unwrap();
        log.append(&entry(actions::GET_METADATA)).unwrap();
        log.append(&entry(actions::GET_FILE)).unwrap();

        let contents = fs::read_to_string(log.current_log_path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
        for line in contents.lines() {
            serde_json::from_str::<AuditEntry>(line).unwrap();
        }
    }

    #[test]
    fn test_query_skips_corrupt_lines() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path(), DEFAULT_ROTATION_SIZE_MB).unwrap();
        log.append(&entry(actions::GET_METADATA)).unwrap();
        {
            let mut f = OpenOptions::new()
                .append(true)
                .open(log.current_log_path())
                .unwrap();
            writeln!(f, "{{garbage").unwrap();
        }
        log.append(&entry(actions::GET_FILE)).unwrap();

        let all = log.query(&AuditQuery::new()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].action, actions::GET_METADATA);
        assert_eq!(all[1].action, actions::GET_FILE);
    }

    #[test]
    fn test_query_limit_stops_early() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path(), DEFAULT_ROTATION_SIZE_MB).unwrap();
        for _ in 0..5 {
            log.append(&entry(actions::GET_FILE)).unwrap();
        }
        assert_eq!(log.query(&AuditQuery::new().limit(3)).unwrap().len(), 3);
        assert!(log.query(&AuditQuery::new().limit(0)).unwrap().is_empty());
    }

    #[test]
    fn test_rotation_renames_full_file() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::with_rotation_bytes(dir.path(), 1).unwrap();

        log.append(&entry(actions::GET_FILE)).unwrap();
        // Active file is non-empty, so the next append rotates it first
        log.append(&entry(actions::GET_FILE)).unwrap();

        let stem = log
            .current_log_path()
            .file_stem()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(dir.path().join(format!("{}.1.jsonl", stem)).exists());
        assert_eq!(
            fs::read_to_string(log.current_log_path()).unwrap().lines().count(),
            1
        );
    }
}
