//! Microphone capture: the fragment-producing side of the loop, over CPAL.
//!
//! `MicCapture` owns the input stream lifecycle. While a capture session is
//! active it emits one binary `Fragment` per emission interval (~1 second of
//! PCM); `end()` flushes the partial tail fragment and closes the stream.

use crate::error::{LoopError, LoopResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One time-sequential chunk of encoded audio from an active capture session.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Opaque binary payload (i16 little-endian PCM for `MicCapture`).
    pub bytes: Vec<u8>,

    /// When the fragment was emitted.
    pub captured_at: Instant,
}

/// Fixed capture parameters. Mono at 44.1 kHz, chosen to preserve natural
/// speech dynamics for downstream transcription. Echo cancellation and gain
/// control are host/OS concerns on desktop; the stream itself applies no
/// noise suppression.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate in Hz (default: 44100)
    pub sample_rate: u32,

    /// Number of channels (default: 1 for mono)
    pub channels: u16,

    /// How much audio each emitted fragment covers (default: 1 second)
    pub emission_interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            emission_interval: Duration::from_secs(1),
        }
    }
}

/// The microphone seam the turn controller drives.
///
/// `acquire` may be called repeatedly (idempotent once granted); `begin`
/// rejects a second concurrent session; `end` is idempotent and safe to call
/// when not capturing.
pub trait CaptureDevice {
    /// Request exclusive access to the input device. Fails with
    /// `DeviceUnavailable` on permission denial or absent hardware.
    fn acquire(&mut self) -> LoopResult<()>;

    /// Start producing fragments until `end()`. A second concurrent session
    /// is rejected with `AlreadyCapturing`.
    fn begin(&mut self) -> LoopResult<mpsc::UnboundedReceiver<Fragment>>;

    /// Stop the active session, flushing any partial fragment.
    fn end(&mut self);

    /// Container/codec label for payloads built from this device's fragments.
    fn mime_type(&self) -> &str;
}

/// Convert f32 samples (-1.0..1.0) to i16 little-endian PCM bytes.
pub(crate) fn pcm_f32_to_i16_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let clamped = s.clamp(-1.0, 1.0);
        let i = (clamped * 32767.0).round() as i16;
        bytes.extend_from_slice(&i.to_le_bytes());
    }
    bytes
}

/// CPAL-backed capture device.
pub struct MicCapture {
    config: CaptureConfig,
    mime: String,
    device: Option<Device>,
    stream_config: Option<StreamConfig>,
    stream: Option<Stream>,
    fragment_tx: Option<mpsc::UnboundedSender<Fragment>>,
    pending: Arc<Mutex<Vec<f32>>>,
}

impl MicCapture {
    pub fn new(config: CaptureConfig) -> Self {
        let mime = format!(
            "audio/L16;rate={};channels={}",
            config.sample_rate, config.channels
        );
        Self {
            config,
            mime,
            device: None,
            stream_config: None,
            stream: None,
            fragment_tx: None,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn samples_per_fragment(&self) -> usize {
        let per_second = self.config.sample_rate as usize * self.config.channels as usize;
        let samples =
            (per_second as f64 * self.config.emission_interval.as_secs_f64()).round() as usize;
        samples.max(1)
    }
}

impl CaptureDevice for MicCapture {
    fn acquire(&mut self) -> LoopResult<()> {
        if self.device.is_some() {
            return Ok(());
        }

        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| LoopError::DeviceUnavailable("no input device available".to_string()))?;

        info!(
            "🎤 Acquired input device: {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        // Probing the default config surfaces permission errors up front.
        let _ = device.default_input_config()?;

        self.stream_config = Some(StreamConfig {
            channels: self.config.channels,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        });
        self.device = Some(device);
        Ok(())
    }

    fn begin(&mut self) -> LoopResult<mpsc::UnboundedReceiver<Fragment>> {
        if self.stream.is_some() {
            return Err(LoopError::AlreadyCapturing);
        }
        self.acquire()?;

        let device = self
            .device
            .as_ref()
            .ok_or_else(|| LoopError::Config("capture device not acquired".to_string()))?;
        let stream_config = self
            .stream_config
            .clone()
            .ok_or_else(|| LoopError::Config("capture device not acquired".to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let chunk_tx = tx.clone();
        let samples_per_fragment = self.samples_per_fragment();
        let pending = Arc::clone(&self.pending);
        pending
            .lock()
            .map_err(|e| LoopError::Config(format!("capture buffer poisoned: {}", e)))?
            .clear();

        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mut buf = match pending.lock() {
                    Ok(b) => b,
                    Err(_) => return,
                };
                buf.extend_from_slice(data);
                while buf.len() >= samples_per_fragment {
                    let chunk: Vec<f32> = buf.drain(..samples_per_fragment).collect();
                    let fragment = Fragment {
                        bytes: pcm_f32_to_i16_bytes(&chunk),
                        captured_at: Instant::now(),
                    };
                    if chunk_tx.send(fragment).is_err() {
                        break;
                    }
                }
            },
            move |err| {
                warn!("Capture stream error: {}", err);
            },
            None,
        )?;
        stream.play()?;

        self.stream = Some(stream);
        self.fragment_tx = Some(tx);
        info!(
            "▶️ Capture started ({} Hz, {} ch, {:?} fragments)",
            self.config.sample_rate, self.config.channels, self.config.emission_interval
        );
        Ok(rx)
    }

    fn end(&mut self) {
        if self.stream.is_none() {
            return;
        }
        // Drop the stream first so the callback stops appending, then flush
        // the partial tail so sub-interval utterances are not lost.
        self.stream = None;
        if let Some(tx) = self.fragment_tx.take() {
            if let Ok(mut buf) = self.pending.lock() {
                if !buf.is_empty() {
                    let tail: Vec<f32> = buf.drain(..).collect();
                    let _ = tx.send(Fragment {
                        bytes: pcm_f32_to_i16_bytes(&tail),
                        captured_at: Instant::now(),
                    });
                }
            }
        }
        info!("⏹️ Capture ended");
    }

    fn mime_type(&self) -> &str {
        &self.mime
    }
}
