//! Current-conditions lookup against the OpenWeather HTTP API.
//!
//! Lookups never fail from the caller's point of view: every problem is
//! folded into a [`WeatherOutcome`] and rendered as friendly text the agent
//! can speak.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::Result;

pub const DEFAULT_CITY: &str = "San Ramon";
pub const DEFAULT_STATE: &str = "CA";
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const COUNTRY_CODE: &str = "US";
const UNITS: &str = "imperial";

pub const NO_KEY_FALLBACK: &str = "I'm sorry, I don't have access to live weather data right now, but San Ramon typically enjoys a Mediterranean climate with warm, dry summers and mild winters!";
pub const BAD_STATUS_FALLBACK: &str = "I'm having trouble accessing the weather data right now, but San Ramon usually has beautiful weather!";
pub const TRANSPORT_FALLBACK: &str = "I'm having trouble getting the latest weather data, but San Ramon typically has wonderful Mediterranean weather!";

#[derive(Clone)]
pub struct WeatherConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

impl WeatherConfig {
    #[must_use]
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|key| !key.is_empty()),
            ..Self::default()
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for WeatherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub city: String,
    pub state: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WeatherOutcome {
    Success(WeatherReport),
    NoKeyConfigured,
    ProviderError(StatusCode),
    TransportError(String),
}

impl WeatherOutcome {
    /// Render the outcome as the text handed back to the conversation.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Success(report) => render_report(report),
            Self::NoKeyConfigured => NO_KEY_FALLBACK.to_string(),
            Self::ProviderError(_) => BAD_STATUS_FALLBACK.to_string(),
            Self::TransportError(_) => TRANSPORT_FALLBACK.to_string(),
        }
    }
}

fn render_report(report: &WeatherReport) -> String {
    format!(
        "Here's the current weather in {city}, {state}:\n\
         \n\
         🌡️ Temperature: {temp}°F (feels like {feels}°F)\n\
         🌤️ Conditions: {conditions}\n\
         💧 Humidity: {humidity}%\n\
         💨 Wind Speed: {wind} mph\n\
         \n\
         As someone who's lived in San Ramon for years, I can tell you this is pretty typical for our area!\n\
         We're blessed with great weather year-round here in the East Bay.",
        city = report.city,
        state = report.state,
        temp = report.temperature,
        feels = report.feels_like,
        conditions = title_case(&report.description),
        humidity = report.humidity,
        wind = report.wind_speed,
    )
}

/// Uppercase the first letter of every word, lowercase the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for c in text.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    main: MainReadings,
    weather: Vec<Condition>,
    wind: Wind,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    feels_like: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct Wind {
    speed: f64,
}

/// Weather lookup client. One outbound request per call.
#[derive(Clone, Debug)]
pub struct WeatherLookup {
    client: Client,
    config: WeatherConfig,
}

impl WeatherLookup {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn new(config: WeatherConfig) -> Result<Self> {
        if config.api_key.is_none() {
            tracing::warn!("OpenWeather API key not found. Weather functionality will be limited.");
        }
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub const fn has_api_key(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Look up current conditions and render them as speakable text.
    pub async fn get_weather(&self, city: &str, state: &str) -> String {
        self.fetch(city, state).await.render()
    }

    /// Look up current conditions, classifying every failure.
    pub async fn fetch(&self, city: &str, state: &str) -> WeatherOutcome {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return WeatherOutcome::NoKeyConfigured;
        };

        let url = format!("{}/data/2.5/weather", self.config.base_url.trim_end_matches('/'));
        let location = format!("{city},{state},{COUNTRY_CODE}");
        tracing::debug!(%location, "Requesting current weather");

        let response = match self
            .client
            .get(&url)
            .query(&[("q", location.as_str()), ("appid", api_key), ("units", UNITS)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, "Weather API error");
                return WeatherOutcome::TransportError(err.to_string());
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!(%status, "Weather API returned non-success status");
            return WeatherOutcome::ProviderError(status);
        }

        match response.json::<CurrentWeather>().await {
            Ok(body) => match into_report(body, city, state) {
                Some(report) => WeatherOutcome::Success(report),
                None => {
                    tracing::error!("Weather API error: response has no weather conditions");
                    WeatherOutcome::TransportError("missing weather conditions".to_string())
                }
            },
            Err(err) => {
                tracing::error!(error = %err, "Weather API error");
                WeatherOutcome::TransportError(err.to_string())
            }
        }
    }
}

fn into_report(body: CurrentWeather, city: &str, state: &str) -> Option<WeatherReport> {
    let description = body.weather.into_iter().next()?.description;
    Some(WeatherReport {
        city: city.to_string(),
        state: state.to_string(),
        temperature: body.main.temp,
        feels_like: body.main.feels_like,
        humidity: body.main.humidity,
        wind_speed: body.wind.speed,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> WeatherReport {
        WeatherReport {
            city: "San Ramon".to_string(),
            state: "CA".to_string(),
            temperature: 72.0,
            feels_like: 70.0,
            humidity: 45.0,
            wind_speed: 5.0,
            description: "clear sky".to_string(),
        }
    }

    #[test]
    fn title_case_matches_word_boundaries() {
        assert_eq!(title_case("clear sky"), "Clear Sky");
        assert_eq!(title_case("LIGHT rain"), "Light Rain");
        assert_eq!(title_case("thunderstorm with drizzle"), "Thunderstorm With Drizzle");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn success_renders_readings() {
        let text = WeatherOutcome::Success(sample_report()).render();
        assert!(text.starts_with("Here's the current weather in San Ramon, CA:"));
        assert!(text.contains("Temperature: 72°F (feels like 70°F)"));
        assert!(text.contains("Conditions: Clear Sky"));
        assert!(text.contains("Humidity: 45%"));
        assert!(text.contains("Wind Speed: 5 mph"));
        assert!(text.ends_with("here in the East Bay."));
    }

    #[test]
    fn fractional_readings_keep_precision() {
        let mut report = sample_report();
        report.temperature = 68.54;
        report.wind_speed = 3.6;
        let text = WeatherOutcome::Success(report).render();
        assert!(text.contains("68.54°F"));
        assert!(text.contains("3.6 mph"));
    }

    #[test]
    fn failures_render_fixed_fallbacks() {
        assert_eq!(WeatherOutcome::NoKeyConfigured.render(), NO_KEY_FALLBACK);
        assert_eq!(
            WeatherOutcome::ProviderError(StatusCode::SERVICE_UNAVAILABLE).render(),
            BAD_STATUS_FALLBACK
        );
        assert_eq!(
            WeatherOutcome::TransportError("connection refused".to_string()).render(),
            TRANSPORT_FALLBACK
        );
    }

    #[test]
    fn empty_key_counts_as_missing() {
        let config = WeatherConfig::new(Some(String::new()));
        assert!(config.api_key.is_none());
    }

    #[tokio::test]
    async fn missing_key_skips_network() {
        let config = WeatherConfig {
            api_key: None,
            // Unroutable: any request would fail rather than return the no-key text.
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_millis(50),
        };
        let lookup = WeatherLookup::new(config).unwrap();
        assert!(!lookup.has_api_key());
        assert_eq!(lookup.fetch(DEFAULT_CITY, DEFAULT_STATE).await, WeatherOutcome::NoKeyConfigured);
    }
}
