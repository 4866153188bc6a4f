//! Runtime settings: `json/settings.json` under the base directory, with
//! command-line and environment overrides on top.

use crate::error::ConfigError;
use crate::player::{normalize_volume, DEFAULT_VOLUME};
use crate::scheduler::DEFAULT_POLL;
use crate::sequencer::{PoolConfig, DEFAULT_GAP, DEFAULT_QUEUE, DEFAULT_WORKERS};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const SETTINGS_FILE: &str = "settings.json";
pub const SCHEDULE_FILE: &str = "cron.json";

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalOpts {
    /// Directory holding `json/` and `static/mp3/`
    #[arg(long, global = true, env = "ANNUNCIATOR_BASE_DIR")]
    pub base_dir: Option<PathBuf>,
    /// Address to bind the HTTP API to
    #[arg(long, global = true, env = "HOST")]
    pub host: Option<String>,
    #[arg(long, global = true, env = "PORT")]
    pub port: Option<u16>,
    /// Playback worker threads
    #[arg(long, global = true, env = "ANNUNCIATOR_WORKERS")]
    pub workers: Option<usize>,
    /// Announcements that may wait for a free worker
    #[arg(long, global = true, env = "ANNUNCIATOR_QUEUE")]
    pub queue: Option<usize>,
    /// Output volume, 0.0-1.0 or 0-100
    #[arg(long, global = true, env = "ANNUNCIATOR_VOLUME")]
    pub volume: Option<f32>,
    /// Run without opening an audio device
    #[arg(long, global = true)]
    pub no_audio: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip)]
    pub base_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub queue_capacity: usize,
    /// Silence after each clip of a sequence.
    pub gap_ms: u64,
    /// Upper bound on the tick loop's sleep.
    pub poll_secs: u64,
    pub volume: f32,
    pub audio_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_dir: PathBuf::from("."),
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE,
            gap_ms: DEFAULT_GAP.as_millis() as u64,
            poll_secs: DEFAULT_POLL.as_secs(),
            volume: DEFAULT_VOLUME,
            audio_enabled: true,
        }
    }
}

impl Settings {
    /// Settings rooted at `base_dir` with every other value at its default.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Settings {
            base_dir: base_dir.into(),
            ..Settings::default()
        }
    }

    /// Read `settings.json` from the base directory, then apply `opts`.
    pub fn resolve(opts: &GlobalOpts) -> Result<Self, ConfigError> {
        let base_dir = opts.base_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        let mut settings = Settings::load(&base_dir)?;
        settings.apply(opts);
        Ok(settings)
    }

    /// Load from `<base_dir>/json/settings.json`. A missing file gives defaults.
    pub fn load(base_dir: &Path) -> Result<Self, ConfigError> {
        let path = base_dir.join("json").join(SETTINGS_FILE);
        let mut settings = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<Settings>(&text).map_err(|source| {
                ConfigError::Malformed {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                Settings::default()
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        settings.base_dir = base_dir.to_path_buf();
        settings.volume = normalize_volume(settings.volume);
        Ok(settings)
    }

    /// Command-line and environment values win over the file.
    pub fn apply(&mut self, opts: &GlobalOpts) {
        if let Some(host) = &opts.host {
            self.host = host.clone();
        }
        if let Some(port) = opts.port {
            self.port = port;
        }
        if let Some(workers) = opts.workers {
            self.workers = workers;
        }
        if let Some(queue) = opts.queue {
            self.queue_capacity = queue;
        }
        if let Some(volume) = opts.volume {
            self.volume = normalize_volume(volume);
        }
        if opts.no_audio {
            self.audio_enabled = false;
        }
    }

    pub fn json_dir(&self) -> PathBuf {
        self.base_dir.join("json")
    }

    pub fn clip_root(&self) -> PathBuf {
        self.base_dir.join("static").join("mp3")
    }

    pub fn schedule_path(&self) -> PathBuf {
        self.json_dir().join(SCHEDULE_FILE)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_secs.max(1))
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers.max(1),
            queue_capacity: self.queue_capacity,
            gap: Duration::from_millis(self.gap_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(dir.path()).unwrap();
        assert_eq!(s.port, 8080);
        assert_eq!(s.gap_ms, 300);
        assert_eq!(s.schedule_path(), dir.path().join("json").join("cron.json"));
        assert_eq!(s.clip_root(), dir.path().join("static").join("mp3"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("json")).unwrap();
        fs::write(
            dir.path().join("json").join(SETTINGS_FILE),
            r#"{"port": 5000, "volume": 80}"#,
        )
        .unwrap();
        let s = Settings::load(dir.path()).unwrap();
        assert_eq!(s.port, 5000);
        assert_eq!(s.volume, 0.8);
        assert_eq!(s.workers, DEFAULT_WORKERS);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("json")).unwrap();
        fs::write(dir.path().join("json").join(SETTINGS_FILE), "{port:").unwrap();
        assert!(matches!(
            Settings::load(dir.path()),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn options_override_file() {
        let mut s = Settings::default();
        s.apply(&GlobalOpts {
            host: Some("127.0.0.1".into()),
            port: Some(9000),
            workers: Some(0),
            volume: Some(150.0),
            no_audio: true,
            ..Default::default()
        });
        assert_eq!(s.bind_addr(), "127.0.0.1:9000");
        assert_eq!(s.volume, 1.0);
        assert!(!s.audio_enabled);
        assert_eq!(s.pool_config().workers, 1);
    }
}
