//! Session orchestrator: owns the lifecycle of the one realtime
//! bidirectional session and routes every inbound message to the
//! transcript log, the playback scheduler, or the tool dispatcher.
//!
//! The orchestrator is transport-agnostic. It consumes decoded server
//! events and user commands, mutates its own session context (no
//! shared globals), and returns the side effects the runtime must
//! execute: events to send over the wire and buffers to play.

use std::sync::Arc;

use jarvis_audio::pcm::{self, CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};
use jarvis_audio::playback::{Clock, HandleId, PlaybackScheduler, Scheduled};
use jarvis_realtime::types::{ClientEvent, ServerEvent, SessionConfig, SessionUpdateEvent, TranscriptRole};

use crate::capability::Capability;
use crate::hud::{HudState, Role};
use crate::memory::MemoryVault;
use crate::router::{Attachment, Router};
use crate::tools;

const INSTRUCTIONS: &str = "You are Jarvis, a refined British AI butler. \
    Address the user as Sir. Keep spoken replies concise. Use the \
    save_memory tool when the user shares personal preferences, and the \
    web_search or find_nearby tools for current facts and locations.";
const SESSION_VOICE: &str = "Fenrir";

/// Lifecycle of the single realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Live,
    Closed,
}

/// A side effect the runtime must carry out for the orchestrator.
#[derive(Debug)]
pub enum Action {
    /// Send this event over the live session.
    Send(ClientEvent),
    /// Start playing this scheduled buffer.
    Play(Scheduled),
}

pub struct Orchestrator {
    phase: SessionPhase,
    capability: Arc<dyn Capability + Send + Sync>,
    router: Router,
    scheduler: PlaybackScheduler,
    attachment: Option<Attachment>,
    pub hud: HudState,
    pub vault: MemoryVault,
}

impl Orchestrator {
    pub fn new(
        capability: Arc<dyn Capability + Send + Sync>,
        vault: MemoryVault,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            phase: SessionPhase::Idle,
            capability,
            router: Router::default(),
            scheduler: PlaybackScheduler::new(clock),
            attachment: None,
            hud: HudState::new(),
            vault,
        }
    }

    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_speaking(&self) -> bool {
        self.scheduler.is_speaking()
    }

    /// A connect request while already Live or Connecting is a no-op.
    /// Returns true when a new connect attempt should proceed.
    pub fn begin_connect(&mut self) -> bool {
        match self.phase {
            SessionPhase::Live | SessionPhase::Connecting => {
                tracing::debug!("connect requested while {:?}; ignoring", self.phase);
                false
            }
            SessionPhase::Idle | SessionPhase::Closed => {
                self.hud.push_log(Role::System, "Powering up arc reactor...");
                self.phase = SessionPhase::Connecting;
                true
            }
        }
    }

    /// Connect attempt failed before the session went live: back to a
    /// disconnected state, no automatic retry.
    pub fn connect_failed(&mut self, error: &str) {
        self.phase = SessionPhase::Idle;
        self.hud.push_log(
            Role::System,
            format!(
                "Neural error: {}. Ensure microphone access is granted.",
                error
            ),
        );
    }

    /// Encodes one captured microphone frame for immediate forwarding.
    /// Frames are only forwarded while Live, so disconnecting halts
    /// capture forwarding synchronously.
    pub fn capture_frame(&self, samples: &[f32]) -> Option<ClientEvent> {
        if self.phase != SessionPhase::Live {
            return None;
        }
        Some(ClientEvent::InputAudioAppend(
            jarvis_realtime::types::InputAudioAppendEvent::new(
                pcm::encode_base64(samples),
                pcm::pcm_mime(CAPTURE_SAMPLE_RATE as u32),
            ),
        ))
    }

    /// Routes one inbound server message. Transcript and audio
    /// fragments apply in arrival order; each tool invocation yields
    /// exactly one correlated response.
    pub async fn handle_server_event(&mut self, event: ServerEvent) -> Vec<Action> {
        match event {
            ServerEvent::SessionCreated(created) => {
                tracing::info!("session created: {}", created.session_id());
                self.phase = SessionPhase::Live;
                self.scheduler.interrupt_all();
                self.hud.status.online = true;
                self.hud.push_log(Role::System, "Neural uplink established.");

                let session = SessionConfig::new()
                    .with_instructions(INSTRUCTIONS)
                    .with_voice(SESSION_VOICE)
                    .with_tools(tools::declarations())
                    .with_output_transcription();
                vec![Action::Send(ClientEvent::SessionUpdate(
                    SessionUpdateEvent::new(session),
                ))]
            }
            ServerEvent::TranscriptDelta(delta) => {
                let role = match delta.role() {
                    TranscriptRole::User => Role::User,
                    TranscriptRole::Assistant => Role::Assistant,
                };
                self.hud.push_log(role, delta.text());
                Vec::new()
            }
            ServerEvent::AudioDelta(delta) => {
                let samples = pcm::decode_base64(delta.audio());
                if samples.is_empty() {
                    return Vec::new();
                }
                let buffer = pcm::AudioBuffer::new(samples, PLAYBACK_SAMPLE_RATE as u32, 1);
                let scheduled = self.scheduler.schedule(buffer);
                vec![Action::Play(scheduled)]
            }
            ServerEvent::ToolCall(call) => {
                let mut actions = Vec::with_capacity(call.invocations().len());
                for invocation in call.invocations() {
                    let response = tools::dispatch_invocation(
                        invocation,
                        self.capability.as_ref(),
                        &mut self.hud,
                        &mut self.vault,
                    )
                    .await;
                    actions.push(Action::Send(ClientEvent::ToolResponse(response)));
                }
                actions
            }
            ServerEvent::Grounding(grounding) => {
                self.hud.set_grounding_sources(grounding.sources().to_vec());
                Vec::new()
            }
            ServerEvent::Error(error) => {
                // Non-fatal: surfaced and the session keeps running.
                self.hud
                    .push_log(Role::System, format!("Session error: {}", error.message()));
                Vec::new()
            }
            ServerEvent::Close { reason } => {
                self.disconnect(reason.as_deref());
                Vec::new()
            }
        }
    }

    /// Tears the session down: playback is interrupted and capture
    /// forwarding stops before this call returns. Returns the stopped
    /// playback handles so the runtime can silence them.
    pub fn disconnect(&mut self, reason: Option<&str>) -> Vec<HandleId> {
        let stopped = self.scheduler.interrupt_all();
        if self.phase == SessionPhase::Live || self.phase == SessionPhase::Connecting {
            let reason = reason.unwrap_or("link severed");
            self.hud
                .push_log(Role::System, format!("Neural uplink offline ({}).", reason));
        }
        self.phase = SessionPhase::Closed;
        self.hud.status.online = false;
        stopped
    }

    /// The runtime reports a buffer finished playing naturally.
    /// Returns the aggregate speaking signal after removal.
    pub fn playback_complete(&mut self, id: HandleId) -> bool {
        self.scheduler.complete(id);
        self.scheduler.is_speaking()
    }

    /// Loads a file for the vision path.
    pub fn attach_file(&mut self, attachment: Attachment) {
        self.hud
            .push_log(Role::System, format!("Node loaded: {}", attachment.name));
        self.attachment = Some(attachment);
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Handles one free-text command from the user. Chat replies are
    /// additionally forwarded to the speech-synthesis path and
    /// scheduled for playback.
    pub async fn handle_command(&mut self, command: &str) -> Vec<Action> {
        let command = command.trim();
        if command.is_empty() {
            return Vec::new();
        }
        self.hud.push_log(Role::User, command);

        let report = self
            .router
            .dispatch(
                command,
                self.attachment.as_ref(),
                self.capability.as_ref(),
                &mut self.hud,
            )
            .await;

        let Some(text) = report.speak else {
            return Vec::new();
        };
        match self.capability.synthesize_speech(&text).await {
            Ok(bytes) => {
                let buffer = pcm::to_playable_buffer(&bytes, PLAYBACK_SAMPLE_RATE as u32, 1);
                if buffer.samples().is_empty() {
                    return Vec::new();
                }
                let scheduled = self.scheduler.schedule(buffer);
                vec![Action::Play(scheduled)]
            }
            Err(e) => {
                // Speech synthesis failure never fails the chat path.
                tracing::error!("speech synthesis failed: {:?}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::MockCapability;
    use crate::memory::{EphemeralStore, MemoryVault};
    use jarvis_audio::playback::SystemClock;

    fn orchestrator(capability: MockCapability) -> Orchestrator {
        Orchestrator::new(
            Arc::new(capability),
            MemoryVault::open(Box::new(EphemeralStore)),
            Arc::new(SystemClock::new()),
        )
    }

    fn session_created() -> ServerEvent {
        serde_json::from_str(r#"{"type":"session.created","session_id":"live-1"}"#).unwrap()
    }

    fn audio_delta(seconds: f32) -> ServerEvent {
        let samples = vec![0.25f32; (PLAYBACK_SAMPLE_RATE * seconds as f64) as usize];
        let raw = format!(
            r#"{{"type":"audio.delta","audio":"{}","mime_type":"audio/pcm;rate=24000"}}"#,
            pcm::encode_base64(&samples)
        );
        serde_json::from_str(&raw).unwrap()
    }

    async fn go_live(orchestrator: &mut Orchestrator) {
        assert!(orchestrator.begin_connect());
        orchestrator.handle_server_event(session_created()).await;
        assert_eq!(orchestrator.phase(), SessionPhase::Live);
    }

    #[tokio::test]
    async fn connect_while_live_or_connecting_is_a_noop() {
        let mut orch = orchestrator(MockCapability::new());
        assert!(orch.begin_connect());
        assert!(!orch.begin_connect());

        orch.handle_server_event(session_created()).await;
        assert!(!orch.begin_connect());

        orch.disconnect(None);
        assert!(orch.begin_connect());
    }

    #[tokio::test]
    async fn handshake_advertises_the_tool_roster() {
        let mut orch = orchestrator(MockCapability::new());
        orch.begin_connect();
        let actions = orch.handle_server_event(session_created()).await;

        assert_eq!(actions.len(), 1);
        match &actions[0] {
            Action::Send(ClientEvent::SessionUpdate(update)) => {
                assert_eq!(update.session().tools().len(), 3);
            }
            other => panic!("unexpected action: {:?}", other),
        }
        assert!(orch.hud.status.online);
    }

    #[tokio::test]
    async fn capture_frames_forward_only_while_live() {
        let mut orch = orchestrator(MockCapability::new());
        let frame = vec![0.5f32; 1024];

        assert!(orch.capture_frame(&frame).is_none());
        go_live(&mut orch).await;

        let event = orch.capture_frame(&frame).expect("frame while live");
        match event {
            ClientEvent::InputAudioAppend(append) => {
                assert_eq!(append.mime_type(), "audio/pcm;rate=16000");
                assert_eq!(pcm::decode_base64(append.audio()).len(), 1024);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        orch.disconnect(None);
        assert!(orch.capture_frame(&frame).is_none());
    }

    #[tokio::test]
    async fn audio_deltas_schedule_in_order_and_track_speaking() {
        let mut orch = orchestrator(MockCapability::new());
        go_live(&mut orch).await;
        assert!(!orch.is_speaking());

        let first = orch.handle_server_event(audio_delta(1.0)).await;
        let second = orch.handle_server_event(audio_delta(1.0)).await;
        assert!(orch.is_speaking());

        let (a, b) = match (&first[0], &second[0]) {
            (Action::Play(a), Action::Play(b)) => (a.clone(), b.clone()),
            other => panic!("unexpected actions: {:?}", other),
        };
        assert!(b.start_at >= a.end_at());

        assert!(orch.playback_complete(a.id));
        assert!(!orch.playback_complete(b.id));
        assert!(!orch.is_speaking());
    }

    #[tokio::test]
    async fn disconnect_stops_playback_synchronously() {
        let mut orch = orchestrator(MockCapability::new());
        go_live(&mut orch).await;

        orch.handle_server_event(audio_delta(1.0)).await;
        orch.handle_server_event(audio_delta(1.0)).await;
        assert!(orch.is_speaking());

        let stopped = orch.disconnect(Some("user request"));
        assert_eq!(stopped.len(), 2);
        assert!(!orch.is_speaking());
        assert_eq!(orch.phase(), SessionPhase::Closed);
    }

    #[tokio::test]
    async fn every_tool_invocation_gets_one_correlated_response() {
        let mut capability = MockCapability::new();
        capability.expect_web_search().times(1).returning(|_| {
            Ok(crate::capability::Grounded {
                text: "found it".to_string(),
                sources: vec![],
            })
        });
        let mut orch = orchestrator(capability);
        go_live(&mut orch).await;

        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"tool.call","invocations":[
                {"id":"call-1","name":"web_search","args":{"query":"news"}},
                {"id":"call-2","name":"save_memory","args":{"category":"diet","content":"no sugar"}}
            ]}"#,
        )
        .unwrap();
        let actions = orch.handle_server_event(event).await;

        let mut ids: Vec<String> = actions
            .iter()
            .map(|action| match action {
                Action::Send(ClientEvent::ToolResponse(resp)) => resp.id().to_string(),
                other => panic!("unexpected action: {:?}", other),
            })
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["call-1", "call-2"]);
        assert_eq!(orch.vault.facts().len(), 1);
    }

    #[tokio::test]
    async fn transcripts_append_in_arrival_order() {
        let mut orch = orchestrator(MockCapability::new());
        go_live(&mut orch).await;
        let before = orch.hud.logs().len();

        for (role, text) in [("user", "hello"), ("assistant", "good evening, Sir")] {
            let raw = format!(
                r#"{{"type":"transcript.delta","role":"{}","text":"{}"}}"#,
                role, text
            );
            orch.handle_server_event(serde_json::from_str(&raw).unwrap())
                .await;
        }

        let logs = orch.hud.logs();
        assert_eq!(logs.len(), before + 2);
        assert_eq!(logs[before].text, "hello");
        assert_eq!(logs[before + 1].text, "good evening, Sir");
    }

    #[tokio::test]
    async fn chat_reply_is_spoken_through_the_scheduler() {
        let mut capability = MockCapability::new();
        capability
            .expect_generate_text()
            .times(1)
            .returning(|_, _| Ok("All systems nominal.".to_string()));
        capability
            .expect_synthesize_speech()
            .times(1)
            .returning(|_| Ok(pcm::encode(&vec![0.1f32; 24000])));

        let mut orch = orchestrator(capability);
        let actions = orch.handle_command("status report").await;

        assert_eq!(actions.len(), 1);
        match &actions[0] {
            Action::Play(scheduled) => {
                assert!((scheduled.buffer.duration_secs() - 1.0).abs() < 1e-6);
            }
            other => panic!("unexpected action: {:?}", other),
        }
        assert!(orch.is_speaking());
    }

    #[tokio::test]
    async fn synthesis_failure_does_not_fail_the_chat_path() {
        let mut capability = MockCapability::new();
        capability
            .expect_generate_text()
            .times(1)
            .returning(|_, _| Ok("All systems nominal.".to_string()));
        capability
            .expect_synthesize_speech()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("tts offline")));

        let mut orch = orchestrator(capability);
        let actions = orch.handle_command("status report").await;

        assert!(actions.is_empty());
        assert_eq!(orch.hud.last_log().unwrap().text, "All systems nominal.");
    }

    #[tokio::test]
    async fn session_error_is_surfaced_but_not_fatal() {
        let mut orch = orchestrator(MockCapability::new());
        go_live(&mut orch).await;

        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"error","message":"quota exceeded"}"#).unwrap();
        orch.handle_server_event(event).await;

        assert_eq!(orch.phase(), SessionPhase::Live);
        assert!(orch
            .hud
            .last_log()
            .unwrap()
            .text
            .contains("quota exceeded"));
    }

    #[tokio::test]
    async fn close_event_tears_the_session_down() {
        let mut orch = orchestrator(MockCapability::new());
        go_live(&mut orch).await;

        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"close","reason":"server shutdown"}"#).unwrap();
        orch.handle_server_event(event).await;

        assert_eq!(orch.phase(), SessionPhase::Closed);
        assert!(!orch.hud.status.online);
    }
}
