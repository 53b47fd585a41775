use async_trait::async_trait;

use crate::config::AgentConfig;
use crate::protocol::server_events::ServerEvent;
use crate::transport::Transport;
use crate::transport::ws::RealtimeClient;
use crate::{Error, Result};

/// A joined room: the agent's identity plus the live event channel.
pub struct Room {
    identity: String,
    transport: Box<dyn Transport>,
}

impl Room {
    #[must_use]
    pub fn new(identity: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Self { identity: identity.into(), transport }
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub(crate) fn into_parts(self) -> (String, Box<dyn Transport>) {
        (self.identity, self.transport)
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room").field("identity", &self.identity).finish_non_exhaustive()
    }
}

/// Joins the room a session will run in.
#[async_trait]
pub trait RoomConnector: Send + Sync {
    async fn connect(&self, config: &AgentConfig) -> Result<Room>;
}

/// Connects to the realtime room service over WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealtimeRoomConnector;

#[async_trait]
impl RoomConnector for RealtimeRoomConnector {
    async fn connect(&self, config: &AgentConfig) -> Result<Room> {
        let mut client = RealtimeClient::connect(
            &config.realtime_url,
            config.api_key(),
            Some(config.providers.llm.model.as_str()),
        )
        .await?;

        // The service opens every connection with `session.created`.
        let identity = match client.next_event().await? {
            Some(ServerEvent::SessionCreated { session, .. }) => session.id,
            Some(ServerEvent::Error { error, .. }) => return Err(Error::Api(error)),
            Some(other) => {
                tracing::warn!(kind = other.kind(), "Room opened without session.created");
                "agent".to_string()
            }
            None => return Err(Error::ConnectionClosed),
        };

        Ok(Room::new(identity, Box::new(client)))
    }
}
