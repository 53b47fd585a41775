//! Typed function tools the model can call mid-conversation.

use crate::protocol::models::Tool;
use crate::weather::{DEFAULT_CITY, DEFAULT_STATE, WeatherLookup};
use crate::{Error, Result};
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type ToolHandler = Box<dyn Fn(Value) -> BoxFuture<Result<Value>> + Send + Sync>;

pub const WEATHER_TOOL_NAME: &str = "get_current_weather";
pub const WEATHER_TOOL_DESCRIPTION: &str =
    "Get the current weather conditions for a specified city and state";

#[derive(Clone, Debug)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub schema: RootSchema,
}

#[derive(Clone, Debug)]
pub struct ToolCall {
    pub name: String,
    pub call_id: String,
    pub arguments: Value,
}

#[derive(Clone, Debug)]
pub struct ToolResult {
    pub call_id: String,
    pub output: Value,
}

impl ToolResult {
    /// Tool output as sent back over the wire: strings verbatim, anything
    /// else as JSON text.
    #[must_use]
    pub fn output_text(&self) -> String {
        match &self.output {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    defs: Vec<ToolDefinition>,
    handlers: HashMap<String, ToolHandler>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.defs.iter().map(|d| d.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn tool<TArgs, TResp, F, Fut>(&mut self, name: &str, handler: F)
    where
        TArgs: DeserializeOwned + JsonSchema + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        self.register(name, None, handler);
    }

    pub fn tool_with_description<TArgs, TResp, F, Fut>(
        &mut self,
        name: &str,
        description: impl Into<String>,
        handler: F,
    )
    where
        TArgs: DeserializeOwned + JsonSchema + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        self.register(name, Some(description.into()), handler);
    }

    fn register<TArgs, TResp, F, Fut>(&mut self, name: &str, description: Option<String>, handler: F)
    where
        TArgs: DeserializeOwned + JsonSchema + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        let schema = schemars::schema_for!(TArgs);
        let name = name.to_string();
        // Re-registering a name replaces the previous tool.
        self.defs.retain(|def| def.name != name);
        self.defs.push(ToolDefinition { name: name.clone(), description, schema });

        let user_handler = Arc::new(handler);
        let tool_name = name.clone();
        let handler = move |value: Value| -> BoxFuture<Result<Value>> {
            let user_handler = Arc::clone(&user_handler);
            let tool_name = tool_name.clone();
            Box::pin(async move {
                let args: TArgs = serde_json::from_value(value).map_err(|e| Error::ToolArguments {
                    tool: tool_name.clone(),
                    reason: e.to_string(),
                })?;
                let resp = user_handler(args).await?;
                Ok(serde_json::to_value(resp)?)
            })
        };

        self.handlers.insert(name, Box::new(handler));
    }

    /// Convert all registered tools into protocol-level tool definitions.
    ///
    /// # Errors
    /// Returns an error if schema serialization fails.
    #[allow(clippy::result_large_err)]
    pub fn try_as_tools(&self) -> Result<Vec<Tool>> {
        self.defs
            .iter()
            .map(|def| {
                Ok(Tool::Function {
                    name: def.name.clone(),
                    description: def.description.clone(),
                    parameters: serde_json::to_value(&def.schema)?,
                })
            })
            .collect()
    }

    /// Dispatch a tool call to the registered handler.
    ///
    /// # Errors
    /// Returns an error if the tool is unknown, its arguments do not match
    /// the declared schema, or the handler fails.
    pub async fn dispatch(&self, call: ToolCall) -> Result<ToolResult> {
        let handler = self
            .handlers
            .get(&call.name)
            .ok_or_else(|| Error::UnknownTool(call.name.clone()))?;
        tracing::debug!(tool = %call.name, call_id = %call.call_id, "Dispatching tool call");
        let output = handler(call.arguments).await?;
        Ok(ToolResult { call_id: call.call_id, output })
    }
}

fn default_city() -> String {
    DEFAULT_CITY.to_string()
}

fn default_state() -> String {
    DEFAULT_STATE.to_string()
}

/// Arguments of the `get_current_weather` tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct WeatherArgs {
    /// City name, e.g. "San Ramon".
    #[serde(default = "default_city")]
    pub city: String,
    /// Two-letter US state code, e.g. "CA".
    #[serde(default = "default_state")]
    pub state: String,
}

impl Default for WeatherArgs {
    fn default() -> Self {
        Self { city: default_city(), state: default_state() }
    }
}

/// Registry exposing the single `get_current_weather` tool backed by `lookup`.
#[must_use]
pub fn weather_tools(lookup: Arc<WeatherLookup>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.tool_with_description(
        WEATHER_TOOL_NAME,
        WEATHER_TOOL_DESCRIPTION,
        move |args: WeatherArgs| {
            let lookup = Arc::clone(&lookup);
            async move {
                tracing::info!(city = %args.city, state = %args.state, "Weather tool invoked");
                Ok::<_, Error>(lookup.get_weather(&args.city, &args.state).await)
            }
        },
    );
    registry
}
