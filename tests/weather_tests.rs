use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use sunny_agent::weather::{BAD_STATUS_FALLBACK, NO_KEY_FALLBACK, TRANSPORT_FALLBACK};
use sunny_agent::{WeatherConfig, WeatherLookup, WeatherOutcome};
use tracing_subscriber::fmt::MakeWriter;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}

fn lookup_for(server_uri: &str, api_key: Option<&str>) -> WeatherLookup {
    let config = WeatherConfig {
        api_key: api_key.map(str::to_string),
        base_url: server_uri.to_string(),
        timeout: Duration::from_millis(500),
    };
    WeatherLookup::new(config).unwrap()
}

fn clear_sky() -> serde_json::Value {
    json!({
        "weather": [{ "id": 800, "main": "Clear", "description": "clear sky" }],
        "main": { "temp": 72, "feels_like": 70, "humidity": 45, "pressure": 1015 },
        "wind": { "speed": 5, "deg": 270 },
        "name": "San Ramon"
    })
}

#[tokio::test]
async fn success_reports_all_readings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("q", "San Ramon,CA,US"))
        .and(query_param("appid", "test-key"))
        .and(query_param("units", "imperial"))
        .respond_with(ResponseTemplate::new(200).set_body_json(clear_sky()))
        .expect(1)
        .mount(&server)
        .await;

    let text = lookup_for(&server.uri(), Some("test-key"))
        .get_weather("San Ramon", "CA")
        .await;

    for expected in ["72", "70", "45", "Clear Sky", "5"] {
        assert!(text.contains(expected), "missing {expected:?} in {text}");
    }
    assert!(text.contains("San Ramon, CA"));
}

#[tokio::test]
async fn requested_city_is_used() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("q", "Austin,TX,US"))
        .respond_with(ResponseTemplate::new(200).set_body_json(clear_sky()))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = lookup_for(&server.uri(), Some("test-key")).fetch("Austin", "TX").await;
    let WeatherOutcome::Success(report) = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(report.city, "Austin");
    assert_eq!(report.state, "TX");
}

#[tokio::test]
async fn service_unavailable_returns_bad_status_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let lookup = lookup_for(&server.uri(), Some("test-key"));
    assert_eq!(lookup.get_weather("San Ramon", "CA").await, BAD_STATUS_FALLBACK);
}

#[tokio::test]
async fn unauthorized_is_a_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "cod": 401, "message": "Invalid API key" })))
        .mount(&server)
        .await;

    let outcome = lookup_for(&server.uri(), Some("bad-key")).fetch("San Ramon", "CA").await;
    assert_eq!(outcome, WeatherOutcome::ProviderError(reqwest::StatusCode::UNAUTHORIZED));
}

#[tokio::test]
async fn unreachable_provider_returns_transport_fallback_and_logs() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let (logs, _guard) = capture_logs();
    let text = lookup_for(&uri, Some("test-key")).get_weather("San Ramon", "CA").await;

    assert_eq!(text, TRANSPORT_FALLBACK);
    let logged = logs.contents();
    assert!(logged.contains("ERROR"), "no error logged: {logged}");
    assert!(logged.contains("Weather API error"));
}

#[tokio::test]
async fn slow_provider_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(clear_sky()).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let outcome = lookup_for(&server.uri(), Some("test-key")).fetch("San Ramon", "CA").await;
    assert!(matches!(outcome, WeatherOutcome::TransportError(_)), "got {outcome:?}");
}

#[tokio::test]
async fn malformed_body_returns_transport_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let lookup = lookup_for(&server.uri(), Some("test-key"));
    assert_eq!(lookup.get_weather("San Ramon", "CA").await, TRANSPORT_FALLBACK);
}

#[tokio::test]
async fn missing_key_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

    let lookup = lookup_for(&server.uri(), None);
    assert_eq!(lookup.get_weather("San Ramon", "CA").await, NO_KEY_FALLBACK);
    server.verify().await;
}
