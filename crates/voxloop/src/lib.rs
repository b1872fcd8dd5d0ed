//! # voxloop: hands-free voice conversation turn loop
//!
//! Captures spoken audio from the microphone, ships it to a remote agent
//! endpoint, plays the synthesized reply, and automatically re-arms capture so
//! the user can speak again.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      Turn Controller                       │
//! │  ┌─────────────┐   ┌────────────┐   ┌─────────────────┐   │
//! │  │   Capture   │ → │ Recording  │ → │  Agent Endpoint │   │
//! │  │   (cpal)    │   │   Buffer   │   │ (POST /agent/…) │   │
//! │  └─────────────┘   └────────────┘   └─────────────────┘   │
//! │         ↑                                    ↓             │
//! │  ┌─────────────┐    settle + re-arm  ┌──────────────┐     │
//! │  │   re-arm    │ ←───────────────────│   Playback   │     │
//! │  │  (450 ms)   │                     │   (rodio)    │     │
//! │  └─────────────┘                     └──────────────┘     │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failures degrade rather than terminate: a failed upload or missing reply
//! audio substitutes a fixed fallback clip, and the loop returns to a
//! listening-capable state.

pub mod agent;
pub mod capture;
pub mod controller;
pub mod error;
pub mod playback;
pub mod recording;
pub mod session;

pub use agent::{AgentEndpoint, HttpAgent, SpeakReply, TurnReply};
pub use capture::{CaptureConfig, CaptureDevice, Fragment, MicCapture};
pub use controller::{ControllerConfig, ControllerEvent, ControllerState, TurnController};
pub use error::{LoopError, LoopResult};
pub use playback::{Playback, PlaybackHandle, Player, RodioPlayer};
pub use recording::{RecordingBuffer, Utterance, DEFAULT_VIABILITY_THRESHOLD};
pub use session::{MemoryStore, QueryStringStore, SessionManager, SessionStore};
