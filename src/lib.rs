#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

pub mod agent;
pub mod config;
pub mod deploy;
pub mod error;
pub mod protocol;
pub mod tools;
pub mod transport;
pub mod weather;

pub use agent::{
    AgentPersona, AgentSession, RealtimeRoomConnector, Room, RoomConnector, RoomOutputOptions, RunningSession,
    SessionOrchestrator, SessionProviders, Stage, Startup,
};
pub use config::{AgentConfig, Credentials};
pub use error::{Error, Result};
pub use protocol::client_events::ClientEvent;
pub use protocol::server_events::ServerEvent;
pub use tools::{ToolCall, ToolRegistry, ToolResult, WeatherArgs, weather_tools};
pub use transport::Transport;
pub use transport::ws::RealtimeClient;
pub use weather::{WeatherConfig, WeatherLookup, WeatherOutcome, WeatherReport};

