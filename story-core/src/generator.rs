//! Story generation.
//!
//! Turns a user message and the prior conversation into an assistant reply
//! via the Claude Messages API, prefixing every prompt with the knowledge
//! base's system context. Replies come back either buffered or as a
//! fragment stream with normalized spacing across fragment boundaries.

use crate::knowledge::{KnowledgeBase, KnowledgeError};
use crate::store::{Message, Role};
use async_trait::async_trait;
use futures::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio_stream::Stream;

/// A lazy, finite, non-restartable sequence of reply fragments.
///
/// Fragments concatenate in emission order to the full reply text.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GenerateError>> + Send>>;

/// Errors from story generation.
///
/// Generation failures are surfaced, not retried: the caller reports the
/// failure and the user resubmits.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Claude API error: {0}")]
    Api(#[from] claude::Error),

    #[error("model stream error: {0}")]
    Stream(String),

    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
}

/// The seam between the session orchestrator and the model backend.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Produce the full reply text for one turn.
    async fn generate(
        &self,
        user_message: &str,
        history: &[Message],
    ) -> Result<String, GenerateError>;

    /// Produce the reply as a fragment stream.
    ///
    /// Spacing across fragment boundaries is already normalized; consumers
    /// concatenate fragments verbatim.
    async fn generate_stream(
        &self,
        user_message: &str,
        history: &[Message],
    ) -> Result<FragmentStream, GenerateError>;
}

/// Configuration for story generation.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Model override; `None` uses the client default.
    pub model: Option<String>,

    /// Output-length cap per reply.
    pub max_tokens: usize,

    /// Sampling temperature, fixed per generator.
    pub temperature: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 1024,
            temperature: 0.8,
        }
    }
}

impl GeneratorConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Claude-backed story generator.
pub struct StoryGenerator {
    client: claude::Claude,
    knowledge: Arc<KnowledgeBase>,
    config: GeneratorConfig,
}

impl StoryGenerator {
    /// Create a generator over an existing client.
    pub fn new(client: claude::Claude, knowledge: Arc<KnowledgeBase>) -> Self {
        Self {
            client,
            knowledge,
            config: GeneratorConfig::default(),
        }
    }

    /// Create a generator from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env(knowledge: Arc<KnowledgeBase>) -> Result<Self, GenerateError> {
        let client = claude::Claude::from_env()?;
        Ok(Self::new(client, knowledge))
    }

    /// Configure the generator.
    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Ordered prompt sequence: system (persona + knowledge context), the
    /// prior turns, then the new user message.
    fn build_request(
        &self,
        user_message: &str,
        history: &[Message],
    ) -> Result<claude::Request, GenerateError> {
        let mut system = self.knowledge.system_prompt()?;
        let context = self.knowledge.knowledge_context()?;
        if !context.is_empty() {
            system.push_str("\n\n");
            system.push_str(&context);
        }

        let mut messages = Vec::with_capacity(history.len() + 1);
        for message in history {
            match message.role {
                Role::User => messages.push(claude::Message::user(&message.content)),
                Role::Assistant => messages.push(claude::Message::assistant(&message.content)),
                // System turns live in the system string, never the
                // conversation
                Role::System => {}
            }
        }
        messages.push(claude::Message::user(user_message));

        let mut request = claude::Request::new(messages)
            .with_system(system)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);

        if let Some(ref model) = self.config.model {
            request = request.with_model(model);
        }

        Ok(request)
    }
}

#[async_trait]
impl ReplyGenerator for StoryGenerator {
    async fn generate(
        &self,
        user_message: &str,
        history: &[Message],
    ) -> Result<String, GenerateError> {
        let request = self.build_request(user_message, history)?;
        let response = self.client.complete(request).await?;

        tracing::debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = ?response.stop_reason,
            "story generated"
        );

        Ok(response.text)
    }

    async fn generate_stream(
        &self,
        user_message: &str,
        history: &[Message],
    ) -> Result<FragmentStream, GenerateError> {
        let request = self.build_request(user_message, history)?;
        let events = self.client.stream(request).await?;

        let fragments = events
            .scan(FragmentSpacer::new(), |spacer, event| {
                let item: Option<Result<String, GenerateError>> = match event {
                    Ok(claude::StreamEvent::TextDelta { text, .. }) => spacer.push(&text).map(Ok),
                    Ok(claude::StreamEvent::Error { message }) => {
                        Some(Err(GenerateError::Stream(message)))
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(GenerateError::Api(e))),
                };
                futures::future::ready(Some(item))
            })
            .filter_map(futures::future::ready);

        Ok(Box::pin(fragments))
    }
}

/// Normalizes whitespace across fragment boundaries.
///
/// Model deltas split the reply at arbitrary points, and downstream
/// consumers concatenate fragments verbatim. The boundary rules: a
/// fragment never starts with a space when the previously emitted fragment
/// ended in whitespace, and exactly one separating space is supplied
/// between two fragments that carry none.
#[derive(Debug, Default)]
pub struct FragmentSpacer {
    prev_ends_in_whitespace: Option<bool>,
}

impl FragmentSpacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize the next fragment. `None` means nothing should be emitted.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        if fragment.is_empty() {
            return None;
        }

        let out = match self.prev_ends_in_whitespace {
            // Leading spaces before any text are artifacts
            None => fragment.trim_start_matches(' ').to_string(),
            Some(true) => fragment.trim_start_matches(' ').to_string(),
            Some(false) => {
                if fragment.chars().next().is_some_and(char::is_whitespace) {
                    fragment.to_string()
                } else {
                    format!(" {fragment}")
                }
            }
        };

        if out.is_empty() {
            return None;
        }

        self.prev_ends_in_whitespace =
            Some(out.chars().last().is_some_and(char::is_whitespace));
        Some(out)
    }
}
