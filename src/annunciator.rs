//! Annunciator: owns every component and is the single entry point for the
//! HTTP layer, the CLI and the tests.

use crate::announcement::{AnnouncementTemplate, AudioSequence, CHIME_CLIP};
use crate::catalog::Catalog;
use crate::config::Settings;
use crate::error::{CatalogError, PlaybackError};
use crate::player::{volume_percent, AudioOutput, NullOutput, RodioOutput};
use crate::scheduler::{SchedulerStatus, TriggerScheduler};
use crate::sequencer::{
    CurrentAnnouncement, PlaybackHandle, PlaybackRecord, QueueStatus, SequencePlayer,
};
use crate::sync::ScheduleSynchronizer;
use chrono::Local;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct AnnunciatorStatus {
    pub status: &'static str,
    pub audio_available: bool,
    pub scheduler_running: bool,
    pub active_jobs: usize,
    pub volume: f32,
    pub volume_percent: u8,
    pub current_announcement: Option<CurrentAnnouncement>,
    pub timestamp: String,
}

pub struct Annunciator {
    settings: Settings,
    catalog: Catalog,
    player: Arc<SequencePlayer>,
    scheduler: Arc<TriggerScheduler>,
    sync: ScheduleSynchronizer,
}

impl Annunciator {
    /// Build with the output chosen by `settings.audio_enabled`.
    pub fn new(settings: Settings) -> std::io::Result<Self> {
        let output: Arc<dyn AudioOutput> = if settings.audio_enabled {
            Arc::new(RodioOutput::new(settings.volume)?)
        } else {
            info!("audio disabled, using null output");
            Arc::new(NullOutput::new(settings.volume))
        };
        Self::with_output(settings, output)
    }

    pub fn with_output(settings: Settings, output: Arc<dyn AudioOutput>) -> std::io::Result<Self> {
        let catalog = Catalog::load(&settings.json_dir());
        let player = Arc::new(SequencePlayer::new(
            output,
            settings.clip_root(),
            settings.pool_config(),
        )?);
        let scheduler = Arc::new(TriggerScheduler::new(player.clone()));
        let sync = ScheduleSynchronizer::new(settings.schedule_path(), scheduler.clone());
        Ok(Annunciator {
            settings,
            catalog,
            player,
            scheduler,
            sync,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn player(&self) -> &SequencePlayer {
        &self.player
    }

    pub fn scheduler(&self) -> &TriggerScheduler {
        &self.scheduler
    }

    pub fn sync(&self) -> &ScheduleSynchronizer {
        &self.sync
    }

    /// Register the persisted schedule and start the tick loop.
    pub fn start(&self) -> std::io::Result<usize> {
        let count = match self.sync.reload() {
            Ok(n) => n,
            Err(e) => {
                warn!("persisted schedule not loaded: {}", e);
                0
            }
        };
        self.scheduler.start(self.settings.poll())?;
        Ok(count)
    }

    pub fn shutdown(&self) {
        self.scheduler.stop();
    }

    /// Manual trigger: validate ids and catalogs, then enqueue.
    pub fn announce(&self, template: &AnnouncementTemplate) -> Result<PlaybackHandle, AnnounceError> {
        self.catalog.check(template)?;
        Ok(self.player.announce(template)?)
    }

    pub fn stop_current(&self) -> Option<CurrentAnnouncement> {
        self.player.stop_current()
    }

    /// Play the chime once.
    pub fn test_audio(&self) -> Result<PlaybackHandle, PlaybackError> {
        self.player
            .play(AudioSequence::new(vec![CHIME_CLIP.to_string()]))
    }

    pub fn volume(&self) -> f32 {
        self.player.output().volume()
    }

    pub fn set_volume(&self, volume: f32) -> f32 {
        self.player.output().set_volume(volume);
        self.volume()
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.player.queue_status()
    }

    pub fn history(&self, limit: usize) -> Vec<PlaybackRecord> {
        self.player.history(limit)
    }

    pub fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    pub fn status(&self) -> AnnunciatorStatus {
        let volume = self.volume();
        AnnunciatorStatus {
            status: "online",
            audio_available: self.player.output().is_available(),
            scheduler_running: self.scheduler.is_running(),
            active_jobs: self.scheduler.job_count(),
            volume,
            volume_percent: volume_percent(volume),
            current_announcement: self.player.current(),
            timestamp: Local::now().to_rfc3339(),
        }
    }
}

/// Why a manual announcement was not enqueued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnnounceError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn annunciator(dir: &std::path::Path) -> Annunciator {
        let mut settings = Settings::with_base_dir(dir);
        settings.audio_enabled = false;
        settings.gap_ms = 1;
        Annunciator::with_output(settings, Arc::new(NullOutput::default())).unwrap()
    }

    #[test]
    fn status_reports_idle_scheduler() {
        let dir = tempfile::tempdir().unwrap();
        let a = annunciator(dir.path());
        let s = a.status();
        assert_eq!(s.status, "online");
        assert!(!s.audio_available);
        assert!(!s.scheduler_running);
        assert_eq!(s.active_jobs, 0);
    }

    #[test]
    fn announce_checks_catalog_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("json")).unwrap();
        fs::write(
            dir.path().join("json").join("safety.json"),
            r#"{"safety": [{"id": "english", "name": "English"}]}"#,
        )
        .unwrap();
        let a = annunciator(dir.path());
        let err = a
            .announce(&AnnouncementTemplate::Safety { language: "german".into() })
            .err()
            .unwrap();
        assert!(matches!(err, AnnounceError::Catalog(_)));
        assert!(a.player().current().is_none());

        a.announce(&AnnouncementTemplate::Safety { language: "english".into() })
            .unwrap();
        assert!(a.status().current_announcement.is_some());
    }

    #[test]
    fn start_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let a = annunciator(dir.path());
        assert_eq!(a.start().unwrap(), 0);
        assert!(a.status().scheduler_running);
        a.shutdown();
        assert!(!a.status().scheduler_running);
    }

    #[test]
    fn set_volume_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let a = annunciator(dir.path());
        assert_eq!(a.set_volume(40.0), 0.4);
    }
}
