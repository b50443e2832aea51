//! Session orchestration - the primary public API for storytelling.
//!
//! Each call is stateless given persisted history: it loads the session's
//! messages, seeds a welcome message for a brand-new session, runs the
//! generator, and appends both sides of the exchange. Requests for
//! different sessions may run concurrently; two concurrent requests
//! against the same session are not serialized and may interleave their
//! appends.

use crate::generator::{GenerateError, ReplyGenerator};
use crate::store::{ConversationStore, Message, NewMessage, Role, StoreError};
use futures::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio_stream::Stream;

/// Greeting seeded into a brand-new session.
const DEFAULT_WELCOME: &str = "Hi there, young explorer! I'm your storyteller. \
Ask me about anything in the world of blockchain - try \"Tell me about Solana\" - \
and I'll turn it into a story just for you.";

/// Longest user message accepted for generation, in characters.
const DEFAULT_MAX_MESSAGE_CHARS: usize = 2000;

/// Errors from storyteller operations.
#[derive(Debug, Error)]
pub enum StorytellerError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerateError),
}

/// Configuration for the storyteller.
#[derive(Debug, Clone)]
pub struct StorytellerConfig {
    /// Text of the synthesized first assistant message.
    pub welcome_text: String,

    /// Longest accepted user message, in characters.
    pub max_message_chars: usize,
}

impl Default for StorytellerConfig {
    fn default() -> Self {
        Self {
            welcome_text: DEFAULT_WELCOME.to_string(),
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }
}

impl StorytellerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the welcome message text.
    pub fn with_welcome_text(mut self, text: impl Into<String>) -> Self {
        self.welcome_text = text.into();
        self
    }

    /// Set the accepted user-message length cap.
    pub fn with_max_message_chars(mut self, chars: usize) -> Self {
        self.max_message_chars = chars;
        self
    }
}

/// A session as returned to callers: its id and full message log.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub session_id: String,
    pub messages: Vec<Message>,
}

/// Events on a streamed reply.
#[derive(Debug)]
pub enum StoryEvent {
    /// The next fragment of reply text.
    Delta(String),

    /// Terminal sentinel: the full reply as persisted. The stream closes
    /// after this.
    Done(Message),
}

/// A streamed reply: delta events followed by one `Done` sentinel.
pub type StoryStream = Pin<Box<dyn Stream<Item = Result<StoryEvent, StorytellerError>> + Send>>;

/// The storytelling facade.
///
/// Explicitly constructed from its collaborators; there is no process-wide
/// state beyond what the injected store and knowledge base hold.
pub struct Storyteller {
    store: Arc<dyn ConversationStore>,
    generator: Arc<dyn ReplyGenerator>,
    config: StorytellerConfig,
}

impl Storyteller {
    /// Create a storyteller with the default configuration.
    pub fn new(store: Arc<dyn ConversationStore>, generator: Arc<dyn ReplyGenerator>) -> Self {
        Self {
            store,
            generator,
            config: StorytellerConfig::default(),
        }
    }

    /// Configure the storyteller.
    pub fn with_config(mut self, config: StorytellerConfig) -> Self {
        self.config = config;
        self
    }

    /// Fetch a session's messages, seeding the welcome message when the
    /// session has no history yet.
    ///
    /// Idempotent across repeated calls: the welcome message is appended
    /// exactly once, only while the session is empty.
    pub async fn fetch_or_create_session(
        &self,
        session_id: &str,
        user_id: Option<i64>,
    ) -> Result<SessionView, StorytellerError> {
        validate_session_id(session_id)?;

        let mut messages = self.store.list_by_session(session_id).await?;
        if messages.is_empty() {
            messages.push(self.seed_welcome(session_id, user_id).await?);
        }

        Ok(SessionView {
            session_id: session_id.to_string(),
            messages,
        })
    }

    /// Generate and persist a reply to `user_message`, returning the stored
    /// assistant message.
    ///
    /// The user message is appended before generation runs, so a failed
    /// generation leaves it in the log; resubmission is the recovery path.
    pub async fn generate_reply(
        &self,
        session_id: &str,
        user_id: Option<i64>,
        user_message: &str,
    ) -> Result<Message, StorytellerError> {
        let history = self.prepare_turn(session_id, user_id, user_message).await?;

        let reply = match self.generator.generate(user_message, &history).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "story generation failed");
                return Err(e.into());
            }
        };

        let stored = self
            .store
            .append(NewMessage::new(
                Role::Assistant,
                reply,
                session_id,
                user_id,
            ))
            .await?;
        Ok(stored)
    }

    /// Stream a reply to `user_message` as normalized text fragments.
    ///
    /// When the upstream stream completes, the accumulated reply is
    /// persisted and emitted as a terminal [`StoryEvent::Done`]. A
    /// mid-stream failure ends the stream with the error instead: the user
    /// message stays persisted, no assistant message is written. Dropping
    /// the stream stops forwarding and skips persistence.
    pub async fn stream_reply(
        &self,
        session_id: &str,
        user_id: Option<i64>,
        user_message: &str,
    ) -> Result<StoryStream, StorytellerError> {
        let history = self.prepare_turn(session_id, user_id, user_message).await?;

        let fragments = self
            .generator
            .generate_stream(user_message, &history)
            .await?;

        let store = Arc::clone(&self.store);
        let session_id = session_id.to_string();

        let stream = futures::stream::unfold(
            TurnState::Streaming {
                fragments,
                accumulated: String::new(),
            },
            move |state| {
                let store = Arc::clone(&store);
                let session_id = session_id.clone();
                async move {
                    match state {
                        TurnState::Streaming {
                            mut fragments,
                            mut accumulated,
                        } => match fragments.next().await {
                            Some(Ok(fragment)) => {
                                accumulated.push_str(&fragment);
                                Some((
                                    Ok(StoryEvent::Delta(fragment)),
                                    TurnState::Streaming {
                                        fragments,
                                        accumulated,
                                    },
                                ))
                            }
                            Some(Err(e)) => {
                                tracing::warn!(%session_id, error = %e, "story stream failed");
                                Some((Err(e.into()), TurnState::Closed))
                            }
                            None => {
                                let append = store
                                    .append(NewMessage::new(
                                        Role::Assistant,
                                        accumulated,
                                        session_id,
                                        user_id,
                                    ))
                                    .await;
                                match append {
                                    Ok(stored) => {
                                        Some((Ok(StoryEvent::Done(stored)), TurnState::Closed))
                                    }
                                    Err(e) => Some((Err(e.into()), TurnState::Closed)),
                                }
                            }
                        },
                        TurnState::Closed => None,
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }

    /// Shared front half of a generate turn: validate, load history, seed
    /// the welcome for a new session, and append the user message.
    ///
    /// Returns the model-facing history: the messages preceding this turn,
    /// minus the welcome seed (display-only, never a model turn).
    async fn prepare_turn(
        &self,
        session_id: &str,
        user_id: Option<i64>,
        user_message: &str,
    ) -> Result<Vec<Message>, StorytellerError> {
        validate_session_id(session_id)?;
        self.validate_message(user_message)?;

        let mut history = self.store.list_by_session(session_id).await?;
        if history.is_empty() {
            self.seed_welcome(session_id, user_id).await?;
        }

        self.store
            .append(NewMessage::new(
                Role::User,
                user_message,
                session_id,
                user_id,
            ))
            .await?;

        strip_welcome_seed(&mut history);
        tracing::debug!(session_id, turns = history.len(), "prepared story turn");
        Ok(history)
    }

    async fn seed_welcome(
        &self,
        session_id: &str,
        user_id: Option<i64>,
    ) -> Result<Message, StorytellerError> {
        tracing::info!(session_id, "seeding welcome message for new session");
        let stored = self
            .store
            .append(NewMessage::new(
                Role::Assistant,
                self.config.welcome_text.clone(),
                session_id,
                user_id,
            ))
            .await?;
        Ok(stored)
    }

    fn validate_message(&self, user_message: &str) -> Result<(), StorytellerError> {
        if user_message.trim().is_empty() {
            return Err(StorytellerError::Validation(
                "message must not be empty".to_string(),
            ));
        }
        let chars = user_message.chars().count();
        if chars > self.config.max_message_chars {
            return Err(StorytellerError::Validation(format!(
                "message too long: {chars} chars (limit {})",
                self.config.max_message_chars
            )));
        }
        Ok(())
    }
}

/// Internal state of a streamed turn.
enum TurnState {
    Streaming {
        fragments: crate::generator::FragmentStream,
        accumulated: String,
    },
    Closed,
}

fn validate_session_id(session_id: &str) -> Result<(), StorytellerError> {
    if session_id.trim().is_empty() {
        return Err(StorytellerError::Validation(
            "session id must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Drop the leading welcome seed from model-facing history.
///
/// The first message of a session is either the welcome (assistant) or a
/// user turn; a conversation sent to the model must start with the user.
fn strip_welcome_seed(history: &mut Vec<Message>) {
    if history.first().is_some_and(|m| m.role == Role::Assistant) {
        history.remove(0);
    }
}
