//! Remote agent endpoint client.
//!
//! The endpoint is an opaque service: it takes one utterance and returns a
//! transcript, a generated reply, and a reference to synthesized speech. Any
//! field may be absent. Implement `AgentEndpoint` for test doubles; `HttpAgent`
//! is the production client.

use crate::error::{LoopError, LoopResult};
use crate::recording::Utterance;
use serde::Deserialize;

/// Response to one uploaded utterance. Consumed immediately by the turn
/// controller; not retained.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TurnReply {
    pub transcript: Option<String>,
    pub llm_text: Option<String>,
    #[serde(rename = "audioUrl")]
    pub audio_url: Option<String>,
    pub error: Option<String>,
}

/// Response from the standalone synthesis endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpeakReply {
    #[serde(rename = "audioUrl")]
    pub audio_url: Option<String>,
    pub error: Option<String>,
}

/// The remote processing seam: speech-to-text, reply generation, and
/// text-to-speech live behind these two calls.
pub trait AgentEndpoint: Send + Sync {
    /// `POST /agent/chat/{sessionId}`: multipart body, single field `audio`.
    fn chat(&self, session_id: &str, utterance: &Utterance) -> LoopResult<TurnReply>;

    /// `POST /speak`: JSON body `{ "text": ... }`.
    fn speak(&self, text: &str) -> LoopResult<SpeakReply>;
}

/// Production client over reqwest. No request timeout in the base design;
/// the remote call runs to completion or failure.
///
/// This is a blocking client: inside an async runtime, callers must hop
/// through `tokio::task::block_in_place` (the turn controller does).
#[derive(Debug, Clone)]
pub struct HttpAgent {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpAgent {
    /// Create with an explicit base URL (no trailing slash required).
    pub fn new(base_url: impl Into<String>) -> LoopResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| LoopError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    /// Build from environment: `VOXLOOP_AGENT_URL`, defaulting to the local
    /// development server.
    pub fn from_env() -> LoopResult<Self> {
        let base_url = std::env::var("VOXLOOP_AGENT_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:5000".to_string());
        Self::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl AgentEndpoint for HttpAgent {
    fn chat(&self, session_id: &str, utterance: &Utterance) -> LoopResult<TurnReply> {
        let url = format!(
            "{}/agent/chat/{}",
            self.base_url.trim_end_matches('/'),
            session_id
        );
        let file_name = format!("recording_{}.pcm", utterance.created_at.timestamp_millis());
        let part = reqwest::blocking::multipart::Part::bytes(utterance.payload.clone())
            .file_name(file_name)
            .mime_str(&utterance.mime_type)
            .map_err(|e| LoopError::Transport(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new().part("audio", part);

        let res = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(|e| LoopError::Transport(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(LoopError::Transport(format!(
                "agent endpoint error {}: {}",
                status, body
            )));
        }
        res.json::<TurnReply>()
            .map_err(|e| LoopError::Transport(e.to_string()))
    }

    fn speak(&self, text: &str) -> LoopResult<SpeakReply> {
        let url = format!("{}/speak", self.base_url.trim_end_matches('/'));
        let res = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .map_err(|e| LoopError::Transport(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(LoopError::Transport(format!(
                "speak endpoint error {}: {}",
                status, body
            )));
        }
        res.json::<SpeakReply>()
            .map_err(|e| LoopError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_reply_parses_camel_case_audio_url() {
        let json = r#"{"transcript":"hello","llm_text":"hi there","audioUrl":"/r1.mp3"}"#;
        let reply: TurnReply = serde_json::from_str(json).unwrap();
        assert_eq!(reply.transcript.as_deref(), Some("hello"));
        assert_eq!(reply.llm_text.as_deref(), Some("hi there"));
        assert_eq!(reply.audio_url.as_deref(), Some("/r1.mp3"));
        assert!(reply.error.is_none());
    }

    #[test]
    fn turn_reply_all_fields_optional() {
        let reply: TurnReply = serde_json::from_str("{}").unwrap();
        assert!(reply.transcript.is_none());
        assert!(reply.llm_text.is_none());
        assert!(reply.audio_url.is_none());
        assert!(reply.error.is_none());
    }

    #[test]
    fn turn_reply_error_alongside_audio() {
        let json = r#"{"error":"tts degraded","audioUrl":"/fallback-ish.mp3"}"#;
        let reply: TurnReply = serde_json::from_str(json).unwrap();
        assert_eq!(reply.error.as_deref(), Some("tts degraded"));
        assert_eq!(reply.audio_url.as_deref(), Some("/fallback-ish.mp3"));
    }

    #[test]
    fn speak_reply_parses() {
        let reply: SpeakReply = serde_json::from_str(r#"{"audioUrl":"/s1.mp3"}"#).unwrap();
        assert_eq!(reply.audio_url.as_deref(), Some("/s1.mp3"));
    }
}
