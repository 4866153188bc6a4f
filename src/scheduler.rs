//! Trigger scheduler: the live job table and the minute tick loop.
//!
//! The job table is swapped as a whole by `replace_all`; a tick works on a
//! snapshot, so it sees either the old or the new job set. Each job fires at
//! most once per calendar minute. Firing hands the template to a
//! [`Dispatcher`], which must not block on playback.

use crate::announcement::AnnouncementTemplate;
use crate::cron::{truncate_to_minute, CronExpr};
use crate::error::PlaybackError;
use crate::schedule::ScheduleEntry;
use chrono::{Local, NaiveDateTime, Timelike};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default interval between ticks of the background loop.
pub const DEFAULT_POLL: Duration = Duration::from_secs(15);

/// Receives fired jobs. Implementations hand the work off and return quickly.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job_id: &str, template: &AnnouncementTemplate) -> Result<(), PlaybackError>;
}

/// A schedule entry whose cron expression has already been validated.
#[derive(Debug, Clone)]
pub struct ValidatedEntry {
    pub entry: ScheduleEntry,
    pub rule: CronExpr,
}

struct Job {
    id: String,
    name: String,
    rule: CronExpr,
    template: AnnouncementTemplate,
    /// Minute this job last fired in. Shared with its replacement when the
    /// job survives a `replace_all` unchanged.
    last_fired: Arc<Mutex<Option<NaiveDateTime>>>,
}

/// Introspection row for one registered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: String,
    pub name: String,
    pub cron: String,
    /// Next matching minute, `%Y-%m-%d %H:%M:%S`, or "Not scheduled".
    pub next_run: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub jobs: Vec<JobStatus>,
}

struct JobTable {
    jobs: RwLock<Arc<Vec<Arc<Job>>>>,
    dispatcher: Arc<dyn Dispatcher>,
}

struct TickLoop {
    stop_tx: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

pub struct TriggerScheduler {
    table: Arc<JobTable>,
    tick_loop: Mutex<Option<TickLoop>>,
}

impl TriggerScheduler {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        TriggerScheduler {
            table: Arc::new(JobTable {
                jobs: RwLock::new(Arc::new(Vec::new())),
                dispatcher,
            }),
            tick_loop: Mutex::new(None),
        }
    }

    /// Discard every job and register one per enabled entry. Returns the
    /// number of jobs now registered.
    pub fn replace_all(&self, entries: Vec<ValidatedEntry>) -> usize {
        let mut table = self.table.jobs.write();
        let previous = Arc::clone(&*table);

        let mut jobs = Vec::with_capacity(entries.len());
        for ValidatedEntry { entry, rule } in entries {
            let id = entry.job_id();
            if !entry.enabled {
                debug!(job = %id, "entry disabled, not registered");
                continue;
            }
            let last_fired = previous
                .iter()
                .find(|j| j.id == id && j.rule == rule && j.template == entry.template)
                .map(|j| Arc::clone(&j.last_fired))
                .unwrap_or_default();
            debug!(job = %id, cron = %rule, "{}", entry.template.summary());
            jobs.push(Arc::new(Job {
                name: entry.job_name(),
                id,
                rule,
                template: entry.template,
                last_fired,
            }));
        }

        let count = jobs.len();
        *table = Arc::new(jobs);
        info!(active_jobs = count, "scheduler job set replaced");
        count
    }

    /// Fire every job matching `now`'s minute that has not fired in it yet.
    /// Returns the ids of the jobs fired by this call.
    pub fn tick(&self, now: NaiveDateTime) -> Vec<String> {
        self.table.tick(now)
    }

    pub fn job_count(&self) -> usize {
        self.table.snapshot().len()
    }

    pub fn job_ids(&self) -> Vec<String> {
        self.table.snapshot().iter().map(|j| j.id.clone()).collect()
    }

    /// Whether the background tick loop is active.
    pub fn is_running(&self) -> bool {
        self.tick_loop.lock().is_some()
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status_at(Local::now().naive_local())
    }

    /// Status with next-run hints computed relative to `now`.
    pub fn status_at(&self, now: NaiveDateTime) -> SchedulerStatus {
        let jobs = self
            .table
            .snapshot()
            .iter()
            .map(|job| JobStatus {
                id: job.id.clone(),
                name: job.name.clone(),
                cron: job.rule.to_string(),
                next_run: job
                    .rule
                    .next_after(now)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "Not scheduled".to_string()),
            })
            .collect();
        SchedulerStatus {
            running: self.is_running(),
            jobs,
        }
    }

    /// Start the background tick loop. No-op if already running.
    pub fn start(&self, poll: Duration) -> std::io::Result<()> {
        let mut slot = self.tick_loop.lock();
        if slot.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let table = Arc::clone(&self.table);
        let handle = thread::Builder::new()
            .name("trigger-scheduler".into())
            .spawn(move || run_tick_loop(&table, stop_rx, poll))?;

        info!(poll_secs = poll.as_secs_f32(), "trigger scheduler started");
        *slot = Some(TickLoop { stop_tx, handle });
        Ok(())
    }

    /// Stop the tick loop and wait for the thread to exit.
    pub fn stop(&self) {
        let tick_loop = self.tick_loop.lock().take();
        if let Some(TickLoop { stop_tx, handle }) = tick_loop {
            let _ = stop_tx.send(());
            if handle.join().is_err() {
                error!("trigger scheduler thread panicked");
            }
            info!("trigger scheduler stopped");
        }
    }
}

impl Drop for TriggerScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl JobTable {
    fn snapshot(&self) -> Arc<Vec<Arc<Job>>> {
        self.jobs.read().clone()
    }

    fn tick(&self, now: NaiveDateTime) -> Vec<String> {
        let minute = truncate_to_minute(now);
        let mut fired = Vec::new();

        for job in self.snapshot().iter() {
            if !job.rule.matches(minute) {
                continue;
            }
            {
                let mut last = job.last_fired.lock();
                if *last == Some(minute) {
                    continue;
                }
                *last = Some(minute);
            }

            info!(job = %job.id, "firing: {}", job.template.summary());
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                self.dispatcher.dispatch(&job.id, &job.template)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(job = %job.id, "dispatch failed: {}", e),
                Err(_) => error!(job = %job.id, "dispatch panicked"),
            }
            fired.push(job.id.clone());
        }
        fired
    }
}

fn run_tick_loop(table: &JobTable, stop_rx: mpsc::Receiver<()>, poll: Duration) {
    loop {
        let now = Local::now().naive_local();
        if catch_unwind(AssertUnwindSafe(|| table.tick(now))).is_err() {
            error!("scheduler tick panicked, continuing");
        }

        match stop_rx.recv_timeout(poll.min(until_next_minute(now))) {
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            // Stop requested or scheduler dropped
            _ => break,
        }
    }
}

/// Time until just past the next minute boundary.
fn until_next_minute(now: NaiveDateTime) -> Duration {
    let into_minute = Duration::from_secs(now.second() as u64)
        + Duration::from_nanos(now.nanosecond() as u64 % 1_000_000_000);
    Duration::from_secs(60).saturating_sub(into_minute) + Duration::from_millis(20)
}
