//! Sequence player: plays resolved clip sequences on a bounded worker pool.
//!
//! `play` never blocks. Inside one sequence, clips play strictly in order
//! with a fixed gap between attempted clips. Missing clips are skipped
//! without a gap. Sequences on different workers may overlap.

use crate::announcement::{
    clip_path, resolve, stays_under_root, AnnouncementKind, AnnouncementTemplate, AudioSequence,
};
use crate::error::{PlaybackError, ResolutionError};
use crate::player::AudioOutput;
use crate::scheduler::Dispatcher;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_GAP: Duration = Duration::from_millis(300);
pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_QUEUE: usize = 8;
/// Finished sequences kept for the history view.
pub const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
    /// Sequences that may wait for a free worker.
    pub queue_capacity: usize,
    pub gap: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE,
            gap: DEFAULT_GAP,
        }
    }
}

/// Outcome of one sequence, by clip reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SequenceReport {
    pub played: Vec<String>,
    pub missing: Vec<String>,
    pub failed: Vec<String>,
}

/// Completion handle for an enqueued sequence. Dropping it is fine.
pub struct PlaybackHandle {
    done: mpsc::Receiver<SequenceReport>,
}

impl PlaybackHandle {
    /// Block until the sequence has finished. `None` if the worker died.
    pub fn wait(self) -> Option<SequenceReport> {
        self.done.recv().ok()
    }
}

/// The announcement most recently started by `announce`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentAnnouncement {
    pub template: AnnouncementTemplate,
    pub started_at: DateTime<Local>,
}

/// A finished sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackRecord {
    /// `None` for raw sequences such as the audio test.
    pub announcement: Option<AnnouncementTemplate>,
    pub clips: Vec<String>,
    pub report: SequenceReport,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

/// Snapshot of the playback pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub workers: usize,
    pub capacity: usize,
    /// Accepted sequences still waiting for a worker.
    pub queued: usize,
    pub playing: usize,
    pub completed: u64,
    pub history_count: usize,
}

struct Activity {
    queued: AtomicUsize,
    playing: AtomicUsize,
    completed: AtomicU64,
    history: Mutex<VecDeque<PlaybackRecord>>,
    limit: usize,
}

impl Activity {
    fn new(limit: usize) -> Self {
        Activity {
            queued: AtomicUsize::new(0),
            playing: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            history: Mutex::new(VecDeque::new()),
            limit,
        }
    }

    fn record(&self, record: PlaybackRecord) {
        let mut history = self.history.lock();
        history.push_back(record);
        while history.len() > self.limit {
            history.pop_front();
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// Newest first. `limit == 0` returns everything kept.
    fn recent(&self, limit: usize) -> Vec<PlaybackRecord> {
        let history = self.history.lock();
        let take = if limit == 0 { history.len() } else { limit };
        history.iter().rev().take(take).cloned().collect()
    }
}

struct Task {
    sequence: AudioSequence,
    announcement: Option<AnnouncementTemplate>,
    done: mpsc::Sender<SequenceReport>,
}

struct WorkerPool {
    tx: Mutex<Option<mpsc::SyncSender<Task>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    size: usize,
    capacity: usize,
}

impl WorkerPool {
    fn spawn<F>(config: &PoolConfig, run: F) -> std::io::Result<Self>
    where
        F: Fn(Task) + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::sync_channel::<Task>(config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let run = Arc::new(run);

        let size = config.workers.max(1);
        let mut workers = Vec::with_capacity(size);
        for n in 0..size {
            let rx = Arc::clone(&rx);
            let run = Arc::clone(&run);
            let handle = thread::Builder::new()
                .name(format!("playback-{}", n))
                .spawn(move || {
                    loop {
                        // Lock is released before the task runs.
                        let task = rx.lock().recv();
                        match task {
                            Ok(task) => run(task),
                            Err(_) => break,
                        }
                    }
                    debug!(worker = n, "playback worker exiting");
                })?;
            workers.push(handle);
        }

        Ok(WorkerPool {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            size,
            capacity: config.queue_capacity,
        })
    }

    fn submit(&self, task: Task) -> Result<(), PlaybackError> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(PlaybackError::ShutDown)?;
        tx.try_send(task).map_err(|e| match e {
            mpsc::TrySendError::Full(_) => PlaybackError::QueueFull {
                capacity: self.capacity,
            },
            mpsc::TrySendError::Disconnected(_) => PlaybackError::ShutDown,
        })
    }

    /// Stop accepting work, let queued sequences finish, join the workers.
    fn shutdown(&self) {
        self.tx.lock().take();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for w in workers {
            if w.join().is_err() {
                error!("playback worker panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct SequencePlayer {
    output: Arc<dyn AudioOutput>,
    clip_root: PathBuf,
    pool: WorkerPool,
    activity: Arc<Activity>,
    current: Mutex<Option<CurrentAnnouncement>>,
}

impl SequencePlayer {
    pub fn new(
        output: Arc<dyn AudioOutput>,
        clip_root: impl Into<PathBuf>,
        config: PoolConfig,
    ) -> std::io::Result<Self> {
        let clip_root = clip_root.into();
        let activity = Arc::new(Activity::new(HISTORY_LIMIT));
        let pool = {
            let output = Arc::clone(&output);
            let activity = Arc::clone(&activity);
            let root = clip_root.clone();
            let gap = config.gap;
            WorkerPool::spawn(&config, move |task: Task| {
                activity.queued.fetch_sub(1, Ordering::SeqCst);
                activity.playing.fetch_add(1, Ordering::SeqCst);
                let started_at = Local::now();
                let report = play_sequence(output.as_ref(), &root, gap, &task.sequence);
                activity.playing.fetch_sub(1, Ordering::SeqCst);
                activity.record(PlaybackRecord {
                    announcement: task.announcement,
                    clips: task.sequence.clips().to_vec(),
                    report: report.clone(),
                    started_at,
                    finished_at: Local::now(),
                });
                let _ = task.done.send(report);
            })?
        };
        info!(
            workers = pool.size,
            queue = config.queue_capacity,
            root = %clip_root.display(),
            "sequence player ready"
        );
        Ok(SequencePlayer {
            output,
            clip_root,
            pool,
            activity,
            current: Mutex::new(None),
        })
    }

    pub fn clip_root(&self) -> &Path {
        &self.clip_root
    }

    pub fn output(&self) -> &Arc<dyn AudioOutput> {
        &self.output
    }

    /// Enqueue a sequence and return immediately.
    pub fn play(&self, sequence: AudioSequence) -> Result<PlaybackHandle, PlaybackError> {
        self.enqueue(sequence, None)
    }

    fn enqueue(
        &self,
        sequence: AudioSequence,
        announcement: Option<AnnouncementTemplate>,
    ) -> Result<PlaybackHandle, PlaybackError> {
        let (done, rx) = mpsc::channel();
        debug!(clips = sequence.len(), "enqueueing sequence");
        self.activity.queued.fetch_add(1, Ordering::SeqCst);
        let task = Task {
            sequence,
            announcement,
            done,
        };
        if let Err(e) = self.pool.submit(task) {
            self.activity.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(e);
        }
        Ok(PlaybackHandle { done: rx })
    }

    /// Resolve and enqueue a template. Station and safety calls replace the
    /// current-announcement marker first.
    pub fn announce(&self, template: &AnnouncementTemplate) -> Result<PlaybackHandle, PlaybackError> {
        if matches!(
            template.kind(),
            AnnouncementKind::Station | AnnouncementKind::Safety
        ) {
            let mut current = self.current.lock();
            if let Some(previous) = current.take() {
                debug!("superseding: {}", previous.template.summary());
            }
            *current = Some(CurrentAnnouncement {
                template: template.clone(),
                started_at: Local::now(),
            });
        }
        info!("announcing: {}", template.summary());
        self.enqueue(resolve(template), Some(template.clone()))
    }

    /// Clear the marker. Audio already in flight keeps playing.
    pub fn stop_current(&self) -> Option<CurrentAnnouncement> {
        let cleared = self.current.lock().take();
        if let Some(c) = &cleared {
            info!("stop requested: {}", c.template.summary());
        }
        cleared
    }

    pub fn current(&self) -> Option<CurrentAnnouncement> {
        self.current.lock().clone()
    }

    pub fn queue_status(&self) -> QueueStatus {
        QueueStatus {
            workers: self.pool.size,
            capacity: self.pool.capacity,
            queued: self.activity.queued.load(Ordering::SeqCst),
            playing: self.activity.playing.load(Ordering::SeqCst),
            completed: self.activity.completed.load(Ordering::SeqCst),
            history_count: self.activity.history.lock().len(),
        }
    }

    /// Most recent finished sequences, newest first.
    pub fn history(&self, limit: usize) -> Vec<PlaybackRecord> {
        self.activity.recent(limit)
    }
}

impl Dispatcher for SequencePlayer {
    fn dispatch(&self, _job_id: &str, template: &AnnouncementTemplate) -> Result<(), PlaybackError> {
        self.announce(template).map(|_| ())
    }
}

fn play_sequence(
    output: &dyn AudioOutput,
    root: &Path,
    gap: Duration,
    sequence: &AudioSequence,
) -> SequenceReport {
    let mut report = SequenceReport::default();
    let mut attempted = false;

    for clip in sequence.clips() {
        if !stays_under_root(clip) {
            warn!(clip = %clip, "clip reference leaves the clip root, skipping");
            report.missing.push(clip.clone());
            continue;
        }
        let path = clip_path(root, clip);
        if !path.is_file() {
            warn!("{}", ResolutionError { path });
            report.missing.push(clip.clone());
            continue;
        }

        if attempted {
            thread::sleep(gap);
        }
        attempted = true;

        match catch_unwind(AssertUnwindSafe(|| output.play_clip(&path))) {
            Ok(Ok(())) => report.played.push(clip.clone()),
            Ok(Err(e)) => {
                warn!(clip = %clip, "{}", e);
                report.failed.push(clip.clone());
            }
            Err(_) => {
                error!(clip = %clip, "audio output panicked");
                report.failed.push(clip.clone());
            }
        }
    }

    debug!(
        played = report.played.len(),
        missing = report.missing.len(),
        failed = report.failed.len(),
        "sequence finished"
    );
    report
}
