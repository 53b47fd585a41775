//! sunny-agent: joins one realtime room as Sunny, the San Ramon weather expert.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use sunny_agent::{AgentConfig, Credentials, Error, RealtimeRoomConnector, SessionOrchestrator, Startup};

#[derive(Parser, Debug)]
#[command(name = "sunny-agent", about = "Realtime voice weather agent")]
struct Args {
    /// Pause between session start and the spoken welcome, in milliseconds.
    #[arg(long)]
    greeting_delay_ms: Option<u64>,

    /// Validate credentials and configuration, then exit without connecting.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sunny_agent=info".into()),
        )
        .init();

    let args = Args::parse();
    let credentials = Credentials::from_env();

    if args.check {
        return match AgentConfig::from_credentials(&credentials) {
            Ok(config) => {
                tracing::info!(?config, "Configuration is complete");
                Ok(ExitCode::SUCCESS)
            }
            Err(Error::MissingCredentials(missing)) => {
                tracing::error!(missing = %missing.join(", "), "Missing required API keys");
                Ok(ExitCode::FAILURE)
            }
            Err(err) => Err(err).context("invalid configuration"),
        };
    }

    let mut orchestrator = SessionOrchestrator::new(RealtimeRoomConnector);
    if let Some(ms) = args.greeting_delay_ms {
        orchestrator = orchestrator.with_greeting_delay(Duration::from_millis(ms));
    }

    match orchestrator.start(&credentials).await.context("agent startup failed")? {
        Startup::Aborted { .. } => Ok(ExitCode::FAILURE),
        Startup::Running(session) => {
            session.closed().await.context("agent session failed")?;
            tracing::info!("Agent session ended");
            Ok(ExitCode::SUCCESS)
        }
    }
}
