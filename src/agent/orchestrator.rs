use std::sync::Arc;
use std::time::Duration;

use super::persona::{AgentPersona, WELCOME_MESSAGE};
use super::room::RoomConnector;
use super::session::{AgentSession, RoomOutputOptions, RunningSession};
use crate::config::{AgentConfig, Credentials};
use crate::tools::weather_tools;
use crate::weather::WeatherLookup;
use crate::{Error, Result};

/// Startup progress. `Aborted` is only reached through missing credentials;
/// every other failure is returned as an error and leaves the stage where
/// it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    CredentialsChecked,
    Connected,
    SessionStarted,
    Greeted,
    Running,
    Aborted,
}

#[derive(Debug)]
pub enum Startup {
    Aborted { missing: Vec<String> },
    Running(RunningSession),
}

/// Drives one agent from credentials to a greeted, running session.
#[derive(Debug)]
pub struct SessionOrchestrator<C> {
    connector: C,
    output: RoomOutputOptions,
    greeting_delay: Option<Duration>,
    stage: Stage,
}

impl<C: RoomConnector> SessionOrchestrator<C> {
    #[must_use]
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            output: RoomOutputOptions::default(),
            greeting_delay: None,
            stage: Stage::Idle,
        }
    }

    /// Override the configured pause between session start and greeting.
    #[must_use]
    pub fn with_greeting_delay(mut self, delay: Duration) -> Self {
        self.greeting_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: RoomOutputOptions) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, next: Stage) {
        tracing::debug!(from = ?self.stage, to = ?next, "Orchestrator stage");
        self.stage = next;
    }

    /// Validate credentials, join the room, start the session and greet.
    ///
    /// Missing credentials yield `Startup::Aborted` without contacting the
    /// room service.
    ///
    /// # Errors
    /// Returns an error if a configuration value is invalid, or if the room
    /// connection, session start or greeting fails.
    pub async fn start(&mut self, credentials: &Credentials) -> Result<Startup> {
        let config = match AgentConfig::from_credentials(credentials) {
            Ok(config) => config,
            Err(Error::MissingCredentials(missing)) => {
                tracing::error!(
                    missing = %missing.join(", "),
                    "Missing required API keys. Set them in .env and restart."
                );
                self.advance(Stage::Aborted);
                return Ok(Startup::Aborted { missing });
            }
            Err(err) => return Err(err),
        };
        self.advance(Stage::CredentialsChecked);

        let lookup = WeatherLookup::new(config.weather.clone())?;
        let persona = AgentPersona::sunny(weather_tools(Arc::new(lookup)));

        let room = self.connector.connect(&config).await?;
        tracing::info!(identity = room.identity(), "Agent connected to room");
        self.advance(Stage::Connected);

        let session = AgentSession::new(config.providers.clone())
            .start(room, persona, self.output)
            .await?;
        self.advance(Stage::SessionStarted);

        tokio::time::sleep(self.greeting_delay.unwrap_or(config.greeting_delay)).await;
        session.generate_reply(WELCOME_MESSAGE).await?;
        self.advance(Stage::Greeted);

        tracing::info!("Sunny weather agent started successfully");
        self.advance(Stage::Running);
        Ok(Startup::Running(session))
    }
}
