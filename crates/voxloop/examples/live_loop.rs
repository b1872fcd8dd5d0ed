//! Live loop demo: microphone → agent endpoint → speaker, hands-free.
//!
//! Press Enter to start talking, Enter again to stop and hear the reply;
//! after the reply the loop re-arms by itself. Commands:
//! - `session`: rotate to a fresh conversation id
//! - `say <text>`: hear the standalone synthesis endpoint
//! - `quit`: exit
//!
//! Set `VOXLOOP_AGENT_URL` in the environment or `.env` (defaults to
//! http://127.0.0.1:5000).

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use voxloop::{
    CaptureConfig, ControllerConfig, ControllerEvent, HttpAgent, MemoryStore, MicCapture,
    RodioPlayer, SessionManager, TurnController,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("🎙️ voxloop live demo");
    info!("Enter = talk/stop, `session` = new conversation, `say <text>`, `quit`.");

    let config = ControllerConfig::default();
    let agent = HttpAgent::from_env()?;
    info!("Agent endpoint: {}", agent.base_url());
    let player =
        RodioPlayer::new(config.fallback_resource.clone()).map(|p| p.with_base_url(agent.base_url()))?;
    let capture = MicCapture::new(CaptureConfig::default());
    let sessions = SessionManager::new(Box::new(MemoryStore::default()));

    let (mut controller, mut events) = TurnController::new(
        config,
        Box::new(capture),
        Box::new(agent),
        Box::new(player),
        sessions,
    );
    info!("Session: {}", controller.session_id());

    // Presentation side: the event stream is the chat surface.
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ControllerEvent::Status(s) => info!("[status] {}", s),
                ControllerEvent::UserTranscript(t) => info!("🧑 {}", t),
                ControllerEvent::AssistantReply(t) => info!("🤖 {}", t),
                ControllerEvent::SessionChanged(id) => info!("[session] {}", id),
                ControllerEvent::StateChanged { from, to } => {
                    info!("[state] {} → {}", from.as_str(), to.as_str());
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "quit" {
            break;
        } else if line == "session" {
            controller.new_session();
        } else if let Some(text) = line.strip_prefix("say ") {
            controller.say(text).await;
        } else {
            controller.tap().await;
        }
    }

    info!("👋 Goodbye!");
    Ok(())
}
