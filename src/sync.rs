//! Schedule synchronizer: keeps `cron.json` and the live job set in step.

use crate::cron::{validate, CronExpr};
use crate::error::SyncError;
use crate::schedule::{ScheduleDocument, ScheduleEntry};
use crate::scheduler::{TriggerScheduler, ValidatedEntry};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Validity of one schedule entry, as reported by [`check_document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryCheck {
    pub id: String,
    pub name: String,
    pub cron: String,
    pub enabled: bool,
    pub summary: String,
    /// `None` when the cron expression is valid.
    pub error: Option<String>,
}

impl EntryCheck {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

pub struct ScheduleSynchronizer {
    path: PathBuf,
    scheduler: Arc<TriggerScheduler>,
    apply_lock: Mutex<()>,
}

impl ScheduleSynchronizer {
    pub fn new(path: impl Into<PathBuf>, scheduler: Arc<TriggerScheduler>) -> Self {
        ScheduleSynchronizer {
            path: path.into(),
            scheduler,
            apply_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted document. A missing file is an empty schedule.
    pub fn load(&self) -> Result<ScheduleDocument, SyncError> {
        load_document(&self.path)
    }

    /// Validate, persist, then replace the live job set. Invalid entries are
    /// logged and skipped. If persisting fails the live jobs are untouched.
    pub fn apply(&self, document: &ScheduleDocument) -> Result<usize, SyncError> {
        let _guard = self.apply_lock.lock();
        let entries = validated_entries(document);
        persist_atomic(&self.path, document)?;
        let count = self.scheduler.replace_all(entries);
        info!(
            path = %self.path.display(),
            entries = document.len(),
            active_jobs = count,
            "schedule applied"
        );
        Ok(count)
    }

    /// Register the persisted document without rewriting it.
    pub fn reload(&self) -> Result<usize, SyncError> {
        let _guard = self.apply_lock.lock();
        let document = self.load()?;
        let count = self.scheduler.replace_all(validated_entries(&document));
        info!(path = %self.path.display(), active_jobs = count, "schedule loaded");
        Ok(count)
    }
}

pub fn load_document(path: &Path) -> Result<ScheduleDocument, SyncError> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no schedule file, starting empty");
            return Ok(ScheduleDocument::default());
        }
        Err(source) => {
            return Err(SyncError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    Ok(serde_json::from_str(&text)?)
}

/// Report the validity of every entry without touching anything.
pub fn check_document(document: &ScheduleDocument) -> Vec<EntryCheck> {
    document
        .entries()
        .into_iter()
        .map(|entry| EntryCheck {
            id: entry.job_id(),
            name: entry.job_name(),
            error: entry_rule(&entry).err(),
            summary: entry.template.summary(),
            cron: entry.cron,
            enabled: entry.enabled,
        })
        .collect()
}

/// The parsed rule, or why the entry cannot become a job.
fn entry_rule(entry: &ScheduleEntry) -> Result<CronExpr, String> {
    let rule = validate(&entry.cron).map_err(|e| e.to_string())?;
    match entry.template.invalid_id() {
        Some((field, value)) => Err(format!("invalid {} '{}': not a clip id", field, value)),
        None => Ok(rule),
    }
}

fn validated_entries(document: &ScheduleDocument) -> Vec<ValidatedEntry> {
    document
        .entries()
        .into_iter()
        .filter_map(|entry: ScheduleEntry| match entry_rule(&entry) {
            Ok(rule) => Some(ValidatedEntry { entry, rule }),
            Err(e) => {
                warn!(job = %entry.job_id(), cron = %entry.cron, "skipping entry: {}", e);
                None
            }
        })
        .collect()
}

/// Write to `<path>.tmp` in the same directory, fsync, then rename over `path`.
fn persist_atomic(path: &Path, document: &ScheduleDocument) -> Result<(), SyncError> {
    let fail = |source: std::io::Error| SyncError::Persistence {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_string_pretty(document)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(fail)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(fail(e));
    }
    Ok(())
}
