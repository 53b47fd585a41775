//! Startup configuration read once from the process environment.
//!
//! `Credentials` is the raw snapshot of the variables the agent knows about;
//! `AgentConfig` is the validated, typed view handed to the orchestrator.

use std::collections::BTreeMap;
use std::time::Duration;

use url::Url;

use crate::agent::SessionProviders;
use crate::weather::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT, WeatherConfig};
use crate::{Error, Result};

pub const REALTIME_URL: &str = "REALTIME_URL";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const OPENWEATHER_API_KEY: &str = "OPENWEATHER_API_KEY";
pub const OPENWEATHER_BASE_URL: &str = "OPENWEATHER_BASE_URL";
pub const WEATHER_TIMEOUT_SECS: &str = "WEATHER_TIMEOUT_SECS";
pub const REALTIME_MODEL: &str = "REALTIME_MODEL";
pub const AGENT_GREETING_DELAY_MS: &str = "AGENT_GREETING_DELAY_MS";

/// Variables that must be present and non-empty before a session may start.
pub const REQUIRED_CREDENTIALS: [&str; 2] = [REALTIME_URL, OPENAI_API_KEY];

/// Variables the deployed task needs to run the agent.
pub const FORWARDED_VARIABLES: [&str; 3] = [REALTIME_URL, OPENAI_API_KEY, OPENWEATHER_API_KEY];

/// Tuning variables passed to the task only when set; unset ones keep the
/// agent's built-in defaults.
pub const OPTIONAL_FORWARDED_VARIABLES: [&str; 5] =
    [REALTIME_MODEL, AGENT_GREETING_DELAY_MS, WEATHER_TIMEOUT_SECS, OPENWEATHER_BASE_URL, "RUST_LOG"];

const KNOWN_VARIABLES: [&str; 7] = [
    REALTIME_URL,
    OPENAI_API_KEY,
    OPENWEATHER_API_KEY,
    OPENWEATHER_BASE_URL,
    WEATHER_TIMEOUT_SECS,
    REALTIME_MODEL,
    AGENT_GREETING_DELAY_MS,
];

pub const DEFAULT_GREETING_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    values: BTreeMap<String, String>,
}

impl Credentials {
    /// Snapshot the known variables from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Snapshot the known variables through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let values = KNOWN_VARIABLES
            .iter()
            .filter_map(|name| lookup(name).map(|value| ((*name).to_string(), value)))
            .collect();
        Self { values }
    }

    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { values }
    }

    /// The value of `name`, treating empty strings as unset.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Required names that are unset or empty, in declaration order.
    #[must_use]
    pub fn missing_required(&self) -> Vec<String> {
        REQUIRED_CREDENTIALS
            .iter()
            .filter(|name| self.get(name).is_none())
            .map(|name| (*name).to_string())
            .collect()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("present", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Clone)]
pub struct AgentConfig {
    pub realtime_url: String,
    api_key: String,
    pub weather: WeatherConfig,
    pub providers: SessionProviders,
    pub greeting_delay: Duration,
}

impl AgentConfig {
    /// # Errors
    /// Returns `Error::MissingCredentials` if a required variable is unset,
    /// or `Error::InvalidConfig` if a value cannot be parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        Self::from_credentials(&Credentials::from_env())
    }

    /// Like [`AgentConfig::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    /// Returns `Error::MissingCredentials` if a required variable is unset,
    /// or `Error::InvalidConfig` if a value cannot be parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Self::from_credentials(&Credentials::from_lookup(lookup))
    }

    /// # Errors
    /// Returns `Error::MissingCredentials` if a required variable is unset,
    /// or `Error::InvalidConfig` if a value cannot be parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        let missing = credentials.missing_required();
        if !missing.is_empty() {
            return Err(Error::MissingCredentials(missing));
        }

        let realtime_url = required(credentials, REALTIME_URL)?.to_string();
        validate_room_url(&realtime_url)?;
        let api_key = required(credentials, OPENAI_API_KEY)?.to_string();

        let weather = WeatherConfig {
            api_key: credentials.get(OPENWEATHER_API_KEY).map(str::to_string),
            base_url: credentials
                .get(OPENWEATHER_BASE_URL)
                .unwrap_or(DEFAULT_BASE_URL)
                .to_string(),
            timeout: parse_duration(credentials, WEATHER_TIMEOUT_SECS, Duration::from_secs)?
                .unwrap_or(DEFAULT_TIMEOUT),
        };

        let mut providers = SessionProviders::default();
        if let Some(model) = credentials.get(REALTIME_MODEL) {
            providers.llm.model = model.to_string();
        }

        let greeting_delay = parse_duration(credentials, AGENT_GREETING_DELAY_MS, Duration::from_millis)?
            .unwrap_or(DEFAULT_GREETING_DELAY);

        Ok(Self { realtime_url, api_key, weather, providers, greeting_delay })
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("realtime_url", &self.realtime_url)
            .field("api_key", &"<redacted>")
            .field("weather", &self.weather)
            .field("providers", &self.providers)
            .field("greeting_delay", &self.greeting_delay)
            .finish()
    }
}

#[allow(clippy::result_large_err)]
fn required<'a>(credentials: &'a Credentials, name: &str) -> Result<&'a str> {
    credentials
        .get(name)
        .ok_or_else(|| Error::MissingCredentials(vec![name.to_string()]))
}

#[allow(clippy::result_large_err)]
fn validate_room_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(Error::InvalidConfig(format!(
            "{REALTIME_URL} must use ws:// or wss://, got {other}://"
        ))),
    }
}

#[allow(clippy::result_large_err)]
fn parse_duration(
    credentials: &Credentials,
    name: &str,
    unit: fn(u64) -> Duration,
) -> Result<Option<Duration>> {
    credentials
        .get(name)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(unit)
                .map_err(|e| Error::InvalidConfig(format!("{name}={raw}: {e}")))
        })
        .transpose()
}
