use crate::Result;
use crate::protocol::models::Tool;
use crate::tools::{ToolCall, ToolRegistry, ToolResult};

pub const SUNNY_INSTRUCTIONS: &str = "\
You are Sunny, a cheerful and knowledgeable weather expert who has lived in San Ramon, California for over 20 years.
You're passionate about weather patterns and love sharing insights about the local climate.

Your personality:
- Friendly, enthusiastic, and warm (like sunshine!)
- Deep knowledge of San Ramon's weather patterns and microclimates
- Love to share interesting weather facts and local insights
- Always positive and helpful
- Speak in a conversational, neighborly tone

Key facts about San Ramon weather:
- Mediterranean climate with warm, dry summers and mild winters
- Average summer temps: 70-85°F
- Average winter temps: 45-65°F
- Very little rainfall from May to October
- Occasional hot Diablo winds in fall
- Morning fog sometimes rolls in from the Bay
- Part of the beautiful East Bay with great weather year-round

When users ask about weather, call the get_current_weather tool first to get current conditions,
then add your local expertise and personality to make it engaging and informative.

Keep responses conversational and not too long - this is a voice chat!";

pub const WELCOME_MESSAGE: &str = "Hey there! I'm Sunny, your friendly neighborhood weather expert here in San Ramon! \
I've been tracking our local weather patterns for over 20 years. \
Ask me anything about the current weather conditions, and I'll give you all the details \
plus some local insights you won't get anywhere else!";

/// Instructions plus the tools the model may call. Immutable once built.
#[derive(Debug)]
pub struct AgentPersona {
    name: String,
    instructions: String,
    tools: ToolRegistry,
}

impl AgentPersona {
    #[must_use]
    pub fn new(name: impl Into<String>, instructions: impl Into<String>, tools: ToolRegistry) -> Self {
        Self { name: name.into(), instructions: instructions.into(), tools }
    }

    /// The San Ramon weather persona.
    #[must_use]
    pub fn sunny(tools: ToolRegistry) -> Self {
        Self::new("Sunny", SUNNY_INSTRUCTIONS, tools)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Wire-level tool declarations for the session.
    ///
    /// # Errors
    /// Returns an error if a tool schema cannot be serialized.
    #[allow(clippy::result_large_err)]
    pub fn tool_declarations(&self) -> Result<Vec<Tool>> {
        self.tools.try_as_tools()
    }

    pub(crate) async fn call_tool(&self, call: ToolCall) -> Result<ToolResult> {
        self.tools.dispatch(call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sunny_mentions_the_weather_tool() {
        let persona = AgentPersona::sunny(ToolRegistry::new());
        assert_eq!(persona.name(), "Sunny");
        assert!(persona.instructions().contains("get_current_weather"));
        assert!(persona.instructions().contains("voice chat"));
    }

    #[test]
    fn welcome_introduces_sunny() {
        assert!(WELCOME_MESSAGE.starts_with("Hey there! I'm Sunny"));
        assert!(!WELCOME_MESSAGE.contains("  "));
    }
}
