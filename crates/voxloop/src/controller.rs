//! Turn controller: the state machine driving the hands-free conversation
//! loop.
//!
//! Idle → Listening → Uploading → Speaking → Idle, with automatic re-arm into
//! Listening after a settling delay. Every failure is converted at its
//! boundary into a status string plus a state transition; the only terminal
//! cases are device denial and total playback failure, and even those leave
//! the controller in a resumable state. The always-attempt-fallback policy
//! keeps the loop self-healing: the user always hears something.

use crate::agent::AgentEndpoint;
use crate::capture::{CaptureDevice, Fragment};
use crate::error::LoopError;
use crate::playback::Player;
use crate::recording::RecordingBuffer;
use crate::session::SessionManager;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::block_in_place;
use tracing::{debug, info, warn};

/// Exactly one instance per conversational session, mutated only by the
/// controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Listening,
    Uploading,
    Speaking,
    Error,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::Listening => "listening",
            ControllerState::Uploading => "uploading",
            ControllerState::Speaking => "speaking",
            ControllerState::Error => "error",
        }
    }
}

/// Configuration for the turn controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Re-enter Listening automatically after a reply finishes playing
    /// (default: true).
    pub auto_re_arm: bool,

    /// Delay between playback completion and re-arm, so the microphone does
    /// not capture the tail of the agent's own voice (default: 450ms).
    pub settling_delay: Duration,

    /// Minimum viable utterance size in bytes (default: 1000).
    pub viability_threshold_bytes: usize,

    /// Audio resource played when the reply reference is missing or fails.
    pub fallback_resource: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            auto_re_arm: true,
            settling_delay: Duration::from_millis(450),
            viability_threshold_bytes: crate::recording::DEFAULT_VIABILITY_THRESHOLD,
            fallback_resource: "/uploads/fallback.mp3".to_string(),
        }
    }
}

/// Events emitted toward the presentation layer (chat bubbles, status text).
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    StateChanged {
        from: ControllerState,
        to: ControllerState,
    },

    /// User-visible status line.
    Status(String),

    /// Transcript of what the user said, as heard by the endpoint.
    UserTranscript(String),

    /// The agent's reply text.
    AssistantReply(String),

    /// A fresh conversation id is now active.
    SessionChanged(String),
}

/// The finite-state controller governing capture → upload → playback → re-arm.
///
/// The endpoint and player seams use blocking HTTP clients; the controller
/// shields those calls with [`block_in_place`], so it must be driven from a
/// multi-thread Tokio runtime (the `#[tokio::main]` default).
pub struct TurnController {
    config: ControllerConfig,
    state: ControllerState,
    capture: Box<dyn CaptureDevice>,
    agent: Box<dyn AgentEndpoint>,
    player: Box<dyn Player>,
    sessions: SessionManager,
    buffer: RecordingBuffer,
    fragment_rx: Option<mpsc::UnboundedReceiver<Fragment>>,
    event_tx: mpsc::UnboundedSender<ControllerEvent>,
}

impl TurnController {
    pub fn new(
        config: ControllerConfig,
        capture: Box<dyn CaptureDevice>,
        agent: Box<dyn AgentEndpoint>,
        player: Box<dyn Player>,
        sessions: SessionManager,
    ) -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let buffer = RecordingBuffer::new(config.viability_threshold_bytes);
        let controller = Self {
            config,
            state: ControllerState::Idle,
            capture,
            agent,
            player,
            sessions,
            buffer,
            fragment_rx: None,
            event_tx,
        };
        (controller, event_rx)
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// The active session id, creating one if needed.
    pub fn session_id(&mut self) -> String {
        self.sessions.current_id()
    }

    /// The single user trigger. Idle (or Error, as a manual retry) starts
    /// listening; Listening stops and runs the turn to completion. Triggers
    /// arriving mid-upload or mid-playback are ignored, so at most one upload
    /// is ever in flight.
    pub async fn tap(&mut self) {
        match self.state {
            ControllerState::Idle | ControllerState::Error => self.start_listening(),
            ControllerState::Listening => self.complete_turn().await,
            ControllerState::Uploading | ControllerState::Speaking => {
                debug!("Tap ignored while {}", self.state.as_str());
            }
        }
    }

    /// Rotate the session id, starting a new conversation. Ignored while a
    /// turn is running.
    pub fn new_session(&mut self) {
        if matches!(
            self.state,
            ControllerState::Uploading | ControllerState::Speaking
        ) {
            debug!("new_session ignored while {}", self.state.as_str());
            return;
        }
        let id = self.sessions.rotate();
        self.emit(ControllerEvent::SessionChanged(id));
        self.status("New session started.");
        self.emit(ControllerEvent::AssistantReply(
            "New session created. Tap the mic to start talking.".to_string(),
        ));
    }

    fn start_listening(&mut self) {
        if let Err(e) = self.capture.acquire() {
            warn!("Mic access failed: {}", e);
            self.status("Microphone access denied.");
            self.set_state(ControllerState::Error);
            return;
        }
        self.buffer.reset();
        match self.capture.begin() {
            Ok(rx) => {
                self.fragment_rx = Some(rx);
                self.set_state(ControllerState::Listening);
                self.status("Listening…");
            }
            Err(LoopError::AlreadyCapturing) => {
                debug!("begin() while already capturing; ignored");
            }
            Err(e) => {
                warn!("Start recording failed: {}", e);
                self.status("Error starting recording.");
                self.set_state(ControllerState::Idle);
            }
        }
    }

    /// Stop listening, validate the utterance, upload it, and speak the
    /// reply. Runs to completion or failure before the machine advances;
    /// there is no mid-upload or mid-playback cancellation.
    async fn complete_turn(&mut self) {
        self.capture.end();
        self.status("Processing…");

        // Fragments arrive strictly in temporal order on one channel; drain
        // them in that order into the buffer.
        if let Some(mut rx) = self.fragment_rx.take() {
            while let Ok(fragment) = rx.try_recv() {
                self.buffer.append(fragment);
            }
        }

        let utterance = match self.buffer.finalize(self.capture.mime_type()) {
            Ok(u) => u,
            Err(LoopError::EmptyRecording) => {
                self.status("No audio recorded.");
                self.set_state(ControllerState::Idle);
                return;
            }
            Err(LoopError::TooShort { size, threshold }) => {
                info!("Utterance discarded: {} bytes < {} threshold", size, threshold);
                self.status("Recording too short.");
                self.set_state(ControllerState::Idle);
                return;
            }
            Err(e) => {
                warn!("Finalize failed: {}", e);
                self.status(format!("Error: {}", e));
                self.set_state(ControllerState::Idle);
                return;
            }
        };

        self.set_state(ControllerState::Uploading);
        let session_id = self.sessions.current_id();
        info!(
            "⬆️ Uploading {} bytes ({}) for session {}",
            utterance.payload.len(),
            utterance.mime_type,
            session_id
        );

        // Discard-and-continue: a failed upload never retries the same
        // utterance; the loop degrades to fallback playback and moves on.
        // block_in_place: the endpoint is a blocking client and must not run
        // on a runtime worker directly.
        let chat = block_in_place(|| self.agent.chat(&session_id, &utterance));
        let resource = match chat {
            Ok(reply) => {
                if let Some(msg) = reply.error {
                    warn!("{}", LoopError::RemoteReported(msg.clone()));
                    self.status(format!("Server error: {}", msg));
                }
                if let Some(transcript) = reply.transcript {
                    self.emit(ControllerEvent::UserTranscript(transcript));
                }
                if let Some(text) = reply.llm_text {
                    self.emit(ControllerEvent::AssistantReply(text));
                }
                reply
                    .audio_url
                    .unwrap_or_else(|| self.config.fallback_resource.clone())
            }
            Err(e) => {
                warn!("Upload failed: {}", e);
                self.status(format!("Error: {}", e));
                self.emit(ControllerEvent::AssistantReply(
                    "I had trouble connecting. You can try again.".to_string(),
                ));
                self.config.fallback_resource.clone()
            }
        };

        self.speak(resource, true).await;
    }

    /// Speak arbitrary text through the standalone synthesis endpoint. A
    /// caller-initiated Speaking phase, not a turn: no re-arm afterwards.
    /// Ignored unless Idle.
    pub async fn say(&mut self, text: &str) {
        if self.state != ControllerState::Idle {
            debug!("say ignored while {}", self.state.as_str());
            return;
        }
        let resource = match block_in_place(|| self.agent.speak(text)) {
            Ok(reply) => {
                if let Some(msg) = reply.error {
                    warn!("{}", LoopError::RemoteReported(msg.clone()));
                    self.status(format!("Server error: {}", msg));
                }
                reply
                    .audio_url
                    .unwrap_or_else(|| self.config.fallback_resource.clone())
            }
            Err(e) => {
                warn!("Synthesis request failed: {}", e);
                self.status(format!("Error: {}", e));
                self.config.fallback_resource.clone()
            }
        };
        self.speak(resource, false).await;
    }

    /// Play the chosen resource; on completion, settle and re-arm when this
    /// was a turn and auto re-arm is configured.
    async fn speak(&mut self, resource: String, re_arm: bool) {
        self.set_state(ControllerState::Speaking);
        // The player fetches the resource with a blocking client too.
        let playback = block_in_place(|| self.player.play(&resource));
        if let Some(ref diagnostic) = playback.diagnostic {
            warn!("Playback degraded: {}", diagnostic);
        }
        match playback.handle {
            Some(handle) => {
                self.status("Speaking…");
                handle.finished().await;
                self.status("Ready.");
                self.set_state(ControllerState::Idle);
                if re_arm && self.config.auto_re_arm {
                    tokio::time::sleep(self.config.settling_delay).await;
                    self.start_listening();
                }
            }
            None => {
                // Both the reply and the fallback failed; the loop halts
                // here and the user must resume manually.
                self.status("Could not play audio.");
                self.set_state(ControllerState::Idle);
            }
        }
    }

    fn set_state(&mut self, to: ControllerState) {
        if to != self.state {
            debug!("State: {} → {}", self.state.as_str(), to.as_str());
            self.emit(ControllerEvent::StateChanged {
                from: self.state,
                to,
            });
            self.state = to;
        }
    }

    fn status(&self, text: impl Into<String>) {
        self.emit(ControllerEvent::Status(text.into()));
    }

    fn emit(&self, event: ControllerEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let c = ControllerConfig::default();
        assert!(c.auto_re_arm);
        assert_eq!(c.settling_delay, Duration::from_millis(450));
        assert_eq!(c.viability_threshold_bytes, 1000);
        assert_eq!(c.fallback_resource, "/uploads/fallback.mp3");
    }

    #[test]
    fn state_naming() {
        assert_eq!(ControllerState::Idle.as_str(), "idle");
        assert_eq!(ControllerState::Speaking.as_str(), "speaking");
        assert_ne!(ControllerState::Listening, ControllerState::Uploading);
    }
}
