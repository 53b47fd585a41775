use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::persona::AgentPersona;
use super::room::Room;
use crate::protocol::client_events::ClientEvent;
use crate::protocol::models::{
    AudioConfig, DEFAULT_MODEL, InputAudioConfig, InputAudioTranscription, Item, OutputAudioConfig,
    OutputModalities, ResponseConfig, SessionKind, SessionUpdate, Temperature, ToolChoice, TurnDetection,
    Voice,
};
use crate::protocol::server_events::ServerEvent;
use crate::tools::ToolCall;
use crate::transport::Transport;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechToText {
    pub model: String,
}

impl Default for SpeechToText {
    fn default() -> Self {
        Self { model: "whisper-1".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceActivityDetection {
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for VoiceActivityDetection {
    fn default() -> Self {
        Self { threshold: 0.5, prefix_padding_ms: 300, silence_duration_ms: 500 }
    }
}

impl VoiceActivityDetection {
    fn turn_detection(&self) -> TurnDetection {
        TurnDetection::ServerVad {
            threshold: Some(self.threshold),
            prefix_padding_ms: Some(self.prefix_padding_ms),
            silence_duration_ms: Some(self.silence_duration_ms),
            create_response: Some(true),
            interrupt_response: Some(true),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LanguageModel {
    pub model: String,
    pub temperature: Temperature,
}

impl Default for LanguageModel {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: Temperature::new(0.7).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextToSpeech {
    pub voice: String,
}

impl Default for TextToSpeech {
    fn default() -> Self {
        Self { voice: "shimmer".to_string() }
    }
}

/// The four pluggable speech pipeline stages. The realtime room service
/// hosts them; this only selects models and tuning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionProviders {
    pub stt: SpeechToText,
    pub vad: VoiceActivityDetection,
    pub llm: LanguageModel,
    pub tts: TextToSpeech,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomOutputOptions {
    pub transcription_enabled: bool,
    pub audio_enabled: bool,
}

impl Default for RoomOutputOptions {
    fn default() -> Self {
        Self { transcription_enabled: true, audio_enabled: true }
    }
}

/// Build the `session.update` body for a persona running on `providers`.
///
/// # Errors
/// Returns an error if a tool schema cannot be serialized.
#[allow(clippy::result_large_err)]
pub fn session_update(
    providers: &SessionProviders,
    persona: &AgentPersona,
    output: RoomOutputOptions,
) -> Result<SessionUpdate> {
    let tools = persona.tool_declarations()?;
    let has_tools = !tools.is_empty();

    let input = InputAudioConfig {
        turn_detection: Some(providers.vad.turn_detection()),
        transcription: output.transcription_enabled.then(|| InputAudioTranscription {
            model: Some(providers.stt.model.clone()),
        }),
    };
    let audio_out = output.audio_enabled.then(|| OutputAudioConfig {
        voice: Some(Voice::from(providers.tts.voice.as_str())),
    });

    Ok(SessionUpdate {
        kind: Some(SessionKind::Realtime),
        output_modalities: Some(if output.audio_enabled {
            OutputModalities::Audio
        } else {
            OutputModalities::Text
        }),
        instructions: Some(persona.instructions().to_string()),
        audio: Some(AudioConfig { input: Some(input), output: audio_out }),
        tools: has_tools.then_some(tools),
        tool_choice: has_tools.then_some(ToolChoice::Auto),
        temperature: Some(providers.llm.temperature),
    })
}

/// A configured but not yet started voice session.
#[derive(Debug, Clone, Default)]
pub struct AgentSession {
    providers: SessionProviders,
}

impl AgentSession {
    #[must_use]
    pub const fn new(providers: SessionProviders) -> Self {
        Self { providers }
    }

    /// Configure the room with the persona and start serving it.
    ///
    /// Taking `Room` by value means a session can only start on a room the
    /// connector has already joined.
    ///
    /// # Errors
    /// Returns an error if the session configuration cannot be sent.
    pub async fn start(
        self,
        room: Room,
        persona: AgentPersona,
        output: RoomOutputOptions,
    ) -> Result<RunningSession> {
        let update = session_update(&self.providers, &persona, output)?;
        let (identity, mut transport) = room.into_parts();
        transport
            .send(ClientEvent::SessionUpdate { event_id: None, session: Box::new(update) })
            .await?;
        tracing::info!(agent = persona.name(), %identity, "Agent session started");
        Ok(RunningSession::spawn(identity, transport, persona, output))
    }
}

enum Command {
    Send { event: ClientEvent, respond: oneshot::Sender<Result<()>> },
}

/// Handle to a live session. The session keeps serving the room after the
/// handle's last command; it ends when the room disconnects.
#[derive(Debug)]
pub struct RunningSession {
    identity: String,
    sender: mpsc::Sender<Command>,
    task: JoinHandle<Result<()>>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send { event, .. } => f.debug_struct("Send").field("event", event).finish(),
        }
    }
}

impl RunningSession {
    fn spawn(
        identity: String,
        transport: Box<dyn Transport>,
        persona: AgentPersona,
        output: RoomOutputOptions,
    ) -> Self {
        let (sender, cmd_rx) = mpsc::channel::<Command>(16);
        let task = tokio::spawn(run_loop(transport, persona, output, cmd_rx));
        Self { identity, sender, task }
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Ask the model to speak, steered by `instructions`.
    ///
    /// # Errors
    /// Returns an error if the session has ended or the send fails.
    pub async fn generate_reply(&self, instructions: impl Into<String>) -> Result<()> {
        let response = ResponseConfig { instructions: Some(instructions.into()) };
        self.send_event(ClientEvent::ResponseCreate { event_id: None, response: Some(Box::new(response)) })
            .await
    }

    async fn send_event(&self, event: ClientEvent) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Command::Send { event, respond: tx })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)??;
        Ok(())
    }

    /// Wait until the room disconnects.
    ///
    /// # Errors
    /// Returns the error that ended the session, if any.
    pub async fn closed(self) -> Result<()> {
        let Self { sender, task, .. } = self;
        drop(sender);
        task.await.map_err(|e| Error::SessionTask(e.to_string()))?
    }
}

async fn run_loop(
    mut transport: Box<dyn Transport>,
    persona: AgentPersona,
    output: RoomOutputOptions,
    mut cmd_rx: mpsc::Receiver<Command>,
) -> Result<()> {
    let mut commands_open = true;
    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if commands_open => match cmd {
                Some(Command::Send { event, respond }) => {
                    let result = transport.send(event).await;
                    let _ = respond.send(result);
                }
                None => commands_open = false,
            },
            event = transport.next_event() => match event {
                Ok(Some(evt)) => handle_server_event(evt, &persona, output, &mut transport).await?,
                Ok(None) => {
                    tracing::info!("Room disconnected");
                    return Ok(());
                }
                Err(err) => {
                    tracing::error!(error = %err, "Room connection failed");
                    return Err(err);
                }
            },
        }
    }
}

async fn handle_server_event(
    evt: ServerEvent,
    persona: &AgentPersona,
    output: RoomOutputOptions,
    transport: &mut Box<dyn Transport>,
) -> Result<()> {
    match evt {
        ServerEvent::ResponseFunctionCallArgumentsDone { call_id, name, arguments, .. } => {
            let call = ToolCall { name, call_id, arguments: parse_arguments(arguments) };
            run_tool(call, persona, transport).await?;
        }
        ServerEvent::Error { error, .. } => {
            tracing::warn!(code = ?error.code, message = %error.message, "Room service reported an error");
        }
        ServerEvent::InputAudioTranscriptionCompleted { transcript, .. } if output.transcription_enabled => {
            tracing::info!(%transcript, "User said");
        }
        ServerEvent::ResponseOutputAudioTranscriptDone { transcript, .. } if output.transcription_enabled => {
            tracing::info!(%transcript, "Agent said");
        }
        ServerEvent::InputAudioBufferSpeechStarted { audio_start_ms, .. } => {
            tracing::debug!(audio_start_ms, "User started speaking");
        }
        ServerEvent::InputAudioBufferSpeechStopped { audio_end_ms, .. } => {
            tracing::debug!(audio_end_ms, "User stopped speaking");
        }
        ServerEvent::SessionUpdated { session, .. } => {
            tracing::debug!(session_id = %session.id, "Session configuration applied");
        }
        ServerEvent::ResponseDone { response, .. } => {
            tracing::debug!(response_id = %response.id, status = ?response.status, "Response finished");
        }
        other => tracing::trace!(kind = other.kind(), "Ignoring server event"),
    }
    Ok(())
}

/// Run a tool call and hand its output back to the model. Tool failures are
/// reported to the model as `{"error": ...}` rather than ending the session.
async fn run_tool(call: ToolCall, persona: &AgentPersona, transport: &mut Box<dyn Transport>) -> Result<()> {
    let call_id = call.call_id.clone();
    let tool = call.name.clone();
    let output = match persona.call_tool(call).await {
        Ok(result) => result.output_text(),
        Err(err) => {
            tracing::warn!(%tool, error = %err, "Tool call failed");
            serde_json::json!({ "error": err.to_string() }).to_string()
        }
    };

    let item = Item::FunctionCallOutput { id: None, call_id, output };
    transport
        .send(ClientEvent::ConversationItemCreate { event_id: None, previous_item_id: None, item: Box::new(item) })
        .await?;
    transport.send(ClientEvent::ResponseCreate { event_id: None, response: None }).await
}

fn parse_arguments(raw: String) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}
