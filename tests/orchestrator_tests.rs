use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sunny_agent::agent::WELCOME_MESSAGE;
use sunny_agent::config::{OPENAI_API_KEY, REALTIME_URL};
use sunny_agent::protocol::models::Item;
use sunny_agent::transport::BoxFuture;
use sunny_agent::weather::NO_KEY_FALLBACK;
use sunny_agent::{
    AgentConfig, ClientEvent, Credentials, Error, Result, Room, RoomConnector, ServerEvent, SessionOrchestrator,
    Stage, Startup, Transport,
};
use tokio::sync::mpsc;

type Journal = Arc<Mutex<Vec<String>>>;

struct RecordingTransport {
    incoming: mpsc::Receiver<ServerEvent>,
    outgoing: mpsc::Sender<ClientEvent>,
    journal: Journal,
}

impl Transport for RecordingTransport {
    fn send(&mut self, event: ClientEvent) -> BoxFuture<'_, Result<()>> {
        let kind = match &event {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::ConversationItemCreate { .. } => "conversation.item.create",
            ClientEvent::ResponseCreate { .. } => "response.create",
        };
        self.journal.lock().unwrap().push(kind.to_string());
        let outgoing = self.outgoing.clone();
        Box::pin(async move {
            outgoing.send(event).await.map_err(|_| Error::ConnectionClosed)?;
            Ok(())
        })
    }

    fn next_event(&mut self) -> BoxFuture<'_, Result<Option<ServerEvent>>> {
        Box::pin(async move { Ok(self.incoming.recv().await) })
    }
}

struct MockConnector {
    calls: Arc<AtomicUsize>,
    journal: Journal,
    room: Mutex<Option<(mpsc::Receiver<ServerEvent>, mpsc::Sender<ClientEvent>)>>,
    fail: bool,
}

struct Harness {
    calls: Arc<AtomicUsize>,
    journal: Journal,
    events: mpsc::Sender<ServerEvent>,
    sent: mpsc::Receiver<ClientEvent>,
}

fn mock_connector(fail: bool) -> (MockConnector, Harness) {
    let (event_tx, event_rx) = mpsc::channel(8);
    let (out_tx, out_rx) = mpsc::channel(8);
    let calls = Arc::new(AtomicUsize::new(0));
    let journal = Journal::default();
    let connector = MockConnector {
        calls: Arc::clone(&calls),
        journal: Arc::clone(&journal),
        room: Mutex::new(Some((event_rx, out_tx))),
        fail,
    };
    (connector, Harness { calls, journal, events: event_tx, sent: out_rx })
}

#[async_trait]
impl RoomConnector for MockConnector {
    async fn connect(&self, _config: &AgentConfig) -> Result<Room> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().unwrap().push("connect".to_string());
        if self.fail {
            return Err(Error::ConnectionClosed);
        }
        let (incoming, outgoing) = self.room.lock().unwrap().take().ok_or(Error::ConnectionClosed)?;
        let transport = RecordingTransport { incoming, outgoing, journal: Arc::clone(&self.journal) };
        Ok(Room::new("agent-test", Box::new(transport)))
    }
}

fn complete_credentials() -> Credentials {
    Credentials::from_pairs([(REALTIME_URL, "wss://rooms.example.com/v1/realtime"), (OPENAI_API_KEY, "sk-test")])
}

#[tokio::test]
async fn missing_credentials_abort_before_connecting() {
    let cases = [
        Credentials::default(),
        Credentials::from_pairs([(REALTIME_URL, "wss://rooms.example.com")]),
        Credentials::from_pairs([(OPENAI_API_KEY, "sk-test")]),
        Credentials::from_pairs([(REALTIME_URL, "wss://rooms.example.com"), (OPENAI_API_KEY, "")]),
    ];

    for credentials in cases {
        let (connector, harness) = mock_connector(false);
        let mut orchestrator = SessionOrchestrator::new(connector).with_greeting_delay(Duration::ZERO);

        let startup = orchestrator.start(&credentials).await.unwrap();

        let Startup::Aborted { missing } = startup else {
            panic!("expected abort for {credentials:?}");
        };
        assert!(!missing.is_empty());
        assert_eq!(orchestrator.stage(), Stage::Aborted);
        assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
        assert!(harness.journal.lock().unwrap().is_empty());
    }
}

#[tokio::test]
async fn startup_connects_then_starts_then_greets() {
    let (connector, mut harness) = mock_connector(false);
    let mut orchestrator = SessionOrchestrator::new(connector).with_greeting_delay(Duration::ZERO);

    let startup = orchestrator.start(&complete_credentials()).await.unwrap();

    let Startup::Running(session) = startup else {
        panic!("expected a running session");
    };
    assert_eq!(session.identity(), "agent-test");
    assert_eq!(orchestrator.stage(), Stage::Running);
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *harness.journal.lock().unwrap(),
        vec!["connect", "session.update", "response.create"]
    );

    let ClientEvent::SessionUpdate { session: update, .. } = harness.sent.recv().await.unwrap() else {
        panic!("expected session.update first");
    };
    let update = serde_json::to_value(&update).unwrap();
    assert_eq!(update["tools"][0]["name"], "get_current_weather");
    assert!(update["instructions"].as_str().unwrap().contains("Sunny"));

    let ClientEvent::ResponseCreate { response: Some(greeting), .. } = harness.sent.recv().await.unwrap() else {
        panic!("expected the welcome response.create");
    };
    assert_eq!(greeting.instructions.as_deref(), Some(WELCOME_MESSAGE));
}

#[tokio::test]
async fn greeting_waits_for_the_configured_delay() {
    let (connector, _harness) = mock_connector(false);
    let mut orchestrator = SessionOrchestrator::new(connector).with_greeting_delay(Duration::from_millis(100));

    let started = Instant::now();
    let startup = orchestrator.start(&complete_credentials()).await.unwrap();

    assert!(matches!(startup, Startup::Running(_)));
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn connection_failure_propagates() {
    let (connector, harness) = mock_connector(true);
    let mut orchestrator = SessionOrchestrator::new(connector).with_greeting_delay(Duration::ZERO);

    let err = orchestrator.start(&complete_credentials()).await.unwrap_err();

    assert!(matches!(err, Error::ConnectionClosed));
    assert_eq!(orchestrator.stage(), Stage::CredentialsChecked);
    assert_eq!(*harness.journal.lock().unwrap(), vec!["connect"]);
}

#[tokio::test]
async fn weather_tool_call_is_answered_in_the_room() {
    let (connector, mut harness) = mock_connector(false);
    let mut orchestrator = SessionOrchestrator::new(connector).with_greeting_delay(Duration::ZERO);
    let Startup::Running(session) = orchestrator.start(&complete_credentials()).await.unwrap() else {
        panic!("expected a running session");
    };
    // session.update and the greeting
    harness.sent.recv().await.unwrap();
    harness.sent.recv().await.unwrap();

    harness
        .events
        .send(ServerEvent::ResponseFunctionCallArgumentsDone {
            event_id: "evt_9".to_string(),
            response_id: "resp_9".to_string(),
            item_id: "item_9".to_string(),
            output_index: 0,
            call_id: "call_weather".to_string(),
            name: "get_current_weather".to_string(),
            arguments: "{}".to_string(),
        })
        .await
        .unwrap();

    let ClientEvent::ConversationItemCreate { item, .. } = harness.sent.recv().await.unwrap() else {
        panic!("expected tool output");
    };
    let Item::FunctionCallOutput { call_id, output, .. } = *item;
    assert_eq!(call_id, "call_weather");
    assert_eq!(output, NO_KEY_FALLBACK);
    assert!(matches!(harness.sent.recv().await.unwrap(), ClientEvent::ResponseCreate { response: None, .. }));

    drop(harness.events);
    session.closed().await.unwrap();
}
