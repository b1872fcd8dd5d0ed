//! Reply playback with fallback substitution.
//!
//! `play` never raises to its caller: a primary failure automatically retries
//! the fixed fallback resource, and total failure is reported as a missing
//! handle plus a diagnostic string. The handle fires exactly once, on natural
//! end of playback.

use crate::error::{LoopError, LoopResult};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Outcome of a play attempt. `handle` is `None` only when the primary and
/// the fallback both failed.
pub struct Playback {
    pub handle: Option<PlaybackHandle>,
    pub diagnostic: Option<String>,
}

/// Single-use completion notification for one playback.
pub struct PlaybackHandle {
    done: oneshot::Receiver<()>,
}

impl PlaybackHandle {
    /// Wrap a completion receiver. For alternative `Player` implementations;
    /// send on the paired sender exactly when playback naturally ends.
    pub fn new(done: oneshot::Receiver<()>) -> Self {
        Self { done }
    }

    /// Resolve when playback reaches its natural end.
    pub async fn finished(self) {
        let _ = self.done.await;
    }
}

/// The speaker seam the turn controller drives.
pub trait Player {
    fn play(&self, resource_ref: &str) -> Playback;
}

/// Rodio-backed player. Resource refs are absolute URLs, paths relative to a
/// base URL, or local file paths. Fetches with a blocking client: inside an
/// async runtime, call through `tokio::task::block_in_place` (the turn
/// controller does).
pub struct RodioPlayer {
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
    sink: Arc<Sink>,
    client: reqwest::blocking::Client,
    base_url: Option<String>,
    fallback_resource: String,
}

impl RodioPlayer {
    /// Create on the default output device with the given fallback resource.
    pub fn new(fallback_resource: impl Into<String>) -> LoopResult<Self> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| LoopError::Playback(e.to_string()))?;
        let sink =
            Sink::try_new(&stream_handle).map_err(|e| LoopError::Playback(e.to_string()))?;
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| LoopError::Playback(e.to_string()))?;
        info!("🔊 Playback sink ready");
        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
            sink: Arc::new(sink),
            client,
            base_url: None,
            fallback_resource: fallback_resource.into(),
        })
    }

    /// Resolve relative resource refs (e.g. `/r1.mp3`) against this base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn fetch(&self, resource: &str) -> LoopResult<Vec<u8>> {
        let url = if resource.starts_with("http://") || resource.starts_with("https://") {
            resource.to_string()
        } else if let Some(ref base) = self.base_url {
            format!(
                "{}/{}",
                base.trim_end_matches('/'),
                resource.trim_start_matches('/')
            )
        } else {
            return Ok(std::fs::read(resource)?);
        };
        let res = self
            .client
            .get(&url)
            .send()
            .map_err(|e| LoopError::Playback(e.to_string()))?;
        if !res.status().is_success() {
            return Err(LoopError::Playback(format!(
                "audio resource {} returned {}",
                url,
                res.status()
            )));
        }
        let bytes = res
            .bytes()
            .map_err(|e| LoopError::Playback(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn try_play(&self, resource: &str) -> LoopResult<PlaybackHandle> {
        let bytes = self.fetch(resource)?;
        if bytes.is_empty() {
            return Err(LoopError::Playback(format!("empty audio resource {}", resource)));
        }
        let source = rodio::Decoder::new(Cursor::new(bytes))
            .map_err(|e| LoopError::Playback(format!("decode failed: {}", e)))?;
        self.sink.append(source.convert_samples::<f32>());

        let (tx, rx) = oneshot::channel();
        let sink = Arc::clone(&self.sink);
        thread::spawn(move || {
            sink.sleep_until_end();
            let _ = tx.send(());
        });
        Ok(PlaybackHandle { done: rx })
    }
}

impl Player for RodioPlayer {
    fn play(&self, resource_ref: &str) -> Playback {
        match self.try_play(resource_ref) {
            Ok(handle) => Playback {
                handle: Some(handle),
                diagnostic: None,
            },
            Err(primary) => {
                warn!(
                    "Playback of {} failed ({}); trying fallback {}",
                    resource_ref, primary, self.fallback_resource
                );
                match self.try_play(&self.fallback_resource) {
                    Ok(handle) => Playback {
                        handle: Some(handle),
                        diagnostic: Some(primary.to_string()),
                    },
                    Err(fallback) => Playback {
                        handle: None,
                        diagnostic: Some(format!("{}; fallback: {}", primary, fallback)),
                    },
                }
            }
        }
    }
}
