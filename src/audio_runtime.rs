//! AudioRuntime: dedicated audio thread with channel-based command dispatch.
//!
//! Owns the rodio `Player` on a single thread. Callers use `AudioHandle`
//! (wraps `mpsc::Sender<AudioCmd>`), which is Send+Sync. Every clip gets its
//! own sink so sequences from different workers can overlap. Clip-end
//! detection happens inside the thread loop via `recv_timeout` + `Sink::empty`.

use crate::error::PlaybackError;
use crate::player::Player;
use rodio::Sink;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, info, warn};

type Reply<T> = mpsc::Sender<T>;

/// Commands sent to the audio thread.
pub enum AudioCmd {
    /// Play a clip; the reply is sent when it has finished or failed.
    Play {
        path: PathBuf,
        reply: Reply<Result<(), PlaybackError>>,
    },
    /// Applies to clips in flight and to later clips.
    SetVolume(f32),
    /// Open the device if needed and report whether it is usable.
    Probe(Reply<bool>),
    Shutdown,
}

/// Thread-safe handle for sending commands to the audio runtime.
#[derive(Clone)]
pub struct AudioHandle {
    tx: mpsc::Sender<AudioCmd>,
}

impl AudioHandle {
    /// Play `path` and block until it ends.
    pub fn play(&self, path: PathBuf) -> Result<(), PlaybackError> {
        let (reply, done) = mpsc::channel();
        self.tx
            .send(AudioCmd::Play { path, reply })
            .map_err(|_| PlaybackError::ShutDown)?;
        done.recv().map_err(|_| PlaybackError::ShutDown)?
    }

    pub fn set_volume(&self, volume: f32) {
        let _ = self.tx.send(AudioCmd::SetVolume(volume));
    }

    pub fn probe(&self) -> bool {
        let (reply, answer) = mpsc::channel();
        if self.tx.send(AudioCmd::Probe(reply)).is_err() {
            return false;
        }
        answer.recv().unwrap_or(false)
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(AudioCmd::Shutdown);
    }
}

/// Spawn the audio runtime on a dedicated thread. The device is opened on
/// first use, not here.
pub fn spawn_audio_runtime(volume: f32) -> std::io::Result<AudioHandle> {
    let (tx, rx) = mpsc::channel::<AudioCmd>();

    std::thread::Builder::new()
        .name("audio-runtime".into())
        .spawn(move || audio_thread_loop(rx, volume))?;

    Ok(AudioHandle { tx })
}

struct ActiveClip {
    path: PathBuf,
    sink: Sink,
    reply: Reply<Result<(), PlaybackError>>,
}

/// Open the device lazily. A failed open is retried on the next command.
fn ensure_player(player: &mut Option<Player>) -> Result<&Player, PlaybackError> {
    if player.is_none() {
        let p = Player::new()?;
        info!("audio output opened");
        *player = Some(p);
    }
    player
        .as_ref()
        .ok_or_else(|| PlaybackError::Unavailable("audio output not initialised".into()))
}

/// Main loop for the audio thread. Owns the Player and all live sinks.
fn audio_thread_loop(rx: mpsc::Receiver<AudioCmd>, mut volume: f32) {
    let mut player: Option<Player> = None;
    let mut active: Vec<ActiveClip> = Vec::new();

    loop {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(AudioCmd::Play { path, reply }) => {
                let started = ensure_player(&mut player)
                    .and_then(|p| p.play_clip_new_sink(&path, volume));
                match started {
                    Ok(sink) => {
                        debug!(clip = %path.display(), "clip started");
                        active.push(ActiveClip { path, sink, reply });
                    }
                    Err(e) => {
                        warn!("{}", e);
                        let _ = reply.send(Err(e));
                    }
                }
            }

            Ok(AudioCmd::SetVolume(v)) => {
                volume = v;
                for clip in &active {
                    clip.sink.set_volume(v);
                }
            }

            Ok(AudioCmd::Probe(reply)) => {
                let _ = reply.send(ensure_player(&mut player).is_ok());
            }

            Ok(AudioCmd::Shutdown) => {
                for clip in active.drain(..) {
                    clip.sink.stop();
                    let _ = clip.reply.send(Err(PlaybackError::ShutDown));
                }
                break;
            }

            Err(mpsc::RecvTimeoutError::Timeout) => {}

            // All senders dropped
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        active.retain(|clip| {
            if clip.sink.empty() {
                debug!(clip = %clip.path.display(), "clip finished");
                let _ = clip.reply.send(Ok(()));
                false
            } else {
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AudioHandle>();
    }

    #[test]
    fn play_nonexistent_reports_error() {
        let handle = spawn_audio_runtime(1.0).unwrap();
        // Either the file is missing or there is no device; both are errors.
        let result = handle.play(PathBuf::from("__nonexistent_file__.mp3"));
        assert!(matches!(
            result,
            Err(PlaybackError::Open { .. }) | Err(PlaybackError::Unavailable(_))
        ));
        handle.shutdown();
    }

    #[test]
    fn play_after_shutdown_is_shut_down() {
        let handle = spawn_audio_runtime(1.0).unwrap();
        handle.shutdown();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(
            handle.play(PathBuf::from("chime.mp3")),
            Err(PlaybackError::ShutDown)
        );
        assert!(!handle.probe());
    }
}
