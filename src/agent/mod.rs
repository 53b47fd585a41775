//! The voice agent: persona, room connection, session loop and the startup
//! sequence that ties them together.

mod orchestrator;
mod persona;
mod room;
mod session;

pub use orchestrator::{SessionOrchestrator, Stage, Startup};
pub use persona::{AgentPersona, SUNNY_INSTRUCTIONS, WELCOME_MESSAGE};
pub use room::{RealtimeRoomConnector, Room, RoomConnector};
pub use session::{
    AgentSession, LanguageModel, RoomOutputOptions, RunningSession, SessionProviders, SpeechToText,
    TextToSpeech, VoiceActivityDetection, session_update,
};
