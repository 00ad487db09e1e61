//! Wire protocol for the realtime bidirectional session.
//!
//! Events are internally tagged JSON objects. Client events flow out
//! over the websocket; server events flow in and are fanned out to
//! subscribers.

/// Audio data encoded as base64.
pub type Base64EncodedAudioBytes = String;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate(SessionUpdateEvent),
    #[serde(rename = "input_audio.append")]
    InputAudioAppend(InputAudioAppendEvent),
    #[serde(rename = "tool.response")]
    ToolResponse(ToolResponseEvent),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "close")]
    Close { reason: Option<String> },
    #[serde(rename = "error")]
    Error(ErrorEvent),
    #[serde(rename = "session.created")]
    SessionCreated(SessionCreatedEvent),
    #[serde(rename = "transcript.delta")]
    TranscriptDelta(TranscriptDeltaEvent),
    #[serde(rename = "audio.delta")]
    AudioDelta(AudioDeltaEvent),
    #[serde(rename = "tool.call")]
    ToolCall(ToolCallEvent),
    #[serde(rename = "grounding")]
    Grounding(GroundingEvent),
}

/// Session parameters sent on `session.update`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SessionConfig {
    instructions: Option<String>,
    voice: Option<String>,
    tools: Vec<ToolDeclaration>,
    output_transcription: bool,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.instructions = Some(instructions.to_string());
        self
    }

    pub fn with_voice(mut self, voice: &str) -> Self {
        self.voice = Some(voice.to_string());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_output_transcription(mut self) -> Self {
        self.output_transcription = true;
        self
    }

    pub fn tools(&self) -> &[ToolDeclaration] {
        &self.tools
    }
}

/// A named action the remote model may ask the local system to run.
/// `parameters` is a JSON Schema object.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl ToolDeclaration {
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &serde_json::Value {
        &self.parameters
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionUpdateEvent {
    session: SessionConfig,
}

impl SessionUpdateEvent {
    pub fn new(session: SessionConfig) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }
}

/// One captured-and-encoded microphone frame.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioAppendEvent {
    audio: Base64EncodedAudioBytes,
    mime_type: String,
}

impl InputAudioAppendEvent {
    pub fn new(audio: Base64EncodedAudioBytes, mime_type: String) -> Self {
        Self { audio, mime_type }
    }

    pub fn audio(&self) -> &str {
        &self.audio
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

/// The single correlated reply to one received [`ToolInvocation`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolResponseEvent {
    id: String,
    name: String,
    result: serde_json::Value,
}

impl ToolResponseEvent {
    pub fn new(id: String, name: String, result: serde_json::Value) -> Self {
        Self { id, name, result }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn result(&self) -> &serde_json::Value {
        &self.result
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    message: String,
}

impl ErrorEvent {
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionCreatedEvent {
    session_id: String,
}

impl SessionCreatedEvent {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    User,
    Assistant,
}

/// A transcript fragment, applied to the conversation log in arrival
/// order.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TranscriptDeltaEvent {
    role: TranscriptRole,
    text: String,
}

impl TranscriptDeltaEvent {
    pub fn role(&self) -> TranscriptRole {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// A chunk of model speech: base64 PCM16 at the playback rate.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AudioDeltaEvent {
    audio: Base64EncodedAudioBytes,
    mime_type: Option<String>,
}

impl AudioDeltaEvent {
    pub fn audio(&self) -> &str {
        &self.audio
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }
}

/// One remote request for a local action. Correlated by `id`, not by
/// arrival order.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolInvocation {
    id: String,
    name: String,
    args: serde_json::Value,
}

impl ToolInvocation {
    pub fn new(id: &str, name: &str, args: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            args,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &serde_json::Value {
        &self.args
    }
}

/// The remote may issue several invocations in one message; each is
/// independent.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolCallEvent {
    invocations: Vec<ToolInvocation>,
}

impl ToolCallEvent {
    pub fn new(invocations: Vec<ToolInvocation>) -> Self {
        Self { invocations }
    }

    pub fn invocations(&self) -> &[ToolInvocation] {
        &self.invocations
    }
}

/// Citation backing a generated answer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GroundingSource {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GroundingEvent {
    sources: Vec<GroundingSource>,
}

impl GroundingEvent {
    pub fn sources(&self) -> &[GroundingSource] {
        &self.sources
    }
}
