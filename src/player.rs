use crate::audio_runtime::{spawn_audio_runtime, AudioHandle};
use crate::error::PlaybackError;
use parking_lot::Mutex;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

/// Volume used when nothing else is configured.
pub const DEFAULT_VOLUME: f32 = 0.7;

/// Audio output used by the sequence player.
///
/// `play_clip` blocks the calling worker until the clip has finished.
pub trait AudioOutput: Send + Sync {
    fn play_clip(&self, path: &Path) -> Result<(), PlaybackError>;

    /// Set the output volume. Accepts a fraction or a percentage, see
    /// [`normalize_volume`].
    fn set_volume(&self, volume: f32);

    fn volume(&self) -> f32;

    fn is_available(&self) -> bool;
}

/// Map a raw volume to `[0, 1]`. Values above 1 are read as percentages.
pub fn normalize_volume(raw: f32) -> f32 {
    if raw.is_nan() {
        return 0.0;
    }
    let v = if raw > 1.0 { raw / 100.0 } else { raw };
    v.clamp(0.0, 1.0)
}

/// Volume as a whole percentage.
pub fn volume_percent(volume: f32) -> u8 {
    (normalize_volume(volume) * 100.0).round() as u8
}

/// rodio device wrapper. Lives on the audio thread only; `OutputStream` is not `Send`.
pub struct Player {
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
}

impl Player {
    /// Open the default output device.
    pub fn new() -> Result<Self, PlaybackError> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| PlaybackError::Unavailable(format!("failed to open audio output: {}", e)))?;
        Ok(Player {
            _stream: stream,
            stream_handle: handle,
        })
    }

    /// Decode `path` and start it on its own sink at `volume`.
    pub fn play_clip_new_sink(&self, path: &Path, volume: f32) -> Result<Sink, PlaybackError> {
        let file = File::open(path).map_err(|e| PlaybackError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let source = Decoder::new(BufReader::new(file)).map_err(|e| PlaybackError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| PlaybackError::Unavailable(format!("failed to create sink: {}", e)))?;
        sink.set_volume(volume);
        sink.append(source);
        sink.play();
        Ok(sink)
    }
}

/// Output backed by rodio on the dedicated audio thread.
pub struct RodioOutput {
    handle: AudioHandle,
    volume: Mutex<f32>,
}

impl RodioOutput {
    pub fn new(volume: f32) -> std::io::Result<Self> {
        let volume = normalize_volume(volume);
        let handle = spawn_audio_runtime(volume)?;
        Ok(RodioOutput {
            handle,
            volume: Mutex::new(volume),
        })
    }
}

impl AudioOutput for RodioOutput {
    fn play_clip(&self, path: &Path) -> Result<(), PlaybackError> {
        self.handle.play(path.to_path_buf())
    }

    fn set_volume(&self, volume: f32) {
        let v = normalize_volume(volume);
        *self.volume.lock() = v;
        self.handle.set_volume(v);
        info!(volume = v, "output volume set");
    }

    fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    fn is_available(&self) -> bool {
        self.handle.probe()
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

/// Output with no device. Every clip fails with `Unavailable`.
pub struct NullOutput {
    volume: Mutex<f32>,
}

impl NullOutput {
    pub fn new(volume: f32) -> Self {
        NullOutput {
            volume: Mutex::new(normalize_volume(volume)),
        }
    }
}

impl Default for NullOutput {
    fn default() -> Self {
        NullOutput::new(DEFAULT_VOLUME)
    }
}

impl AudioOutput for NullOutput {
    fn play_clip(&self, path: &Path) -> Result<(), PlaybackError> {
        warn!(clip = %path.display(), "no audio output, clip not played");
        Err(PlaybackError::Unavailable("no audio output configured".into()))
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock() = normalize_volume(volume);
    }

    fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    fn is_available(&self) -> bool {
        false
    }
}
