//! Completion request builder

use crate::messages::Message;
use crate::tools::ToolDefinition;

/// One request to a language model
///
/// Built by the model node from the current state and the run config.
/// Tool definitions are attached only when the run allows tools, so
/// providers never see schemas the allowlist filtered out.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Conversation to complete, oldest first
    pub messages: Vec<Message>,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token cap
    pub max_tokens: Option<u32>,
    /// Tool schemas the model may call
    pub tools: Vec<ToolDefinition>,
}

impl CompletionRequest {
    /// Request completing `messages` with default parameters
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: 0.7,
            max_tokens: None,
            tools: Vec::new(),
        }
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the completion token cap
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Attach tool schemas
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_parameters() {
        let request = CompletionRequest::new(vec![Message::user("hi")])
            .with_temperature(0.2)
            .with_max_tokens(128);

        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.max_tokens, Some(128));
        assert!(request.tools.is_empty());
    }
}
