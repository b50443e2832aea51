//! Storytelling session engine with an AI narrator.
//!
//! This crate provides the backend core of a children's storytelling
//! application:
//! - Knowledge base composing a bounded prompt context from reference assets
//! - Append-only conversation store (memory and file backends)
//! - Story generation over the Claude API, buffered or streamed
//! - Session orchestration with welcome seeding
//! - Speech playback chunking driven by an explicit advance cursor
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use story_core::{FileStore, KnowledgeBase, Storyteller, StoryGenerator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let knowledge = Arc::new(KnowledgeBase::new("story-core/knowledge"));
//!     knowledge.initialize().await?;
//!
//!     let generator = StoryGenerator::from_env(Arc::clone(&knowledge))?;
//!     let store = FileStore::new("./conversations").await?;
//!     let storyteller = Storyteller::new(Arc::new(store), Arc::new(generator));
//!
//!     let reply = storyteller
//!         .generate_reply("s1", Some(1), "Tell me about Solana")
//!         .await?;
//!     println!("{}", reply.content);
//!     Ok(())
//! }
//! ```

pub mod generator;
pub mod knowledge;
pub mod session;
pub mod speech;
pub mod store;
pub mod testing;

// Primary public API
pub use generator::{
    FragmentSpacer, FragmentStream, GenerateError, GeneratorConfig, ReplyGenerator, StoryGenerator,
};
pub use knowledge::{KnowledgeBase, KnowledgeError};
pub use session::{
    SessionView, StoryEvent, StoryStream, Storyteller, StorytellerConfig, StorytellerError,
};
pub use speech::{chunk_text, PlaybackQueue};
pub use store::{
    ConversationStore, FileStore, MemoryStore, Message, NewMessage, Role, StoreError,
};
pub use testing::{MockGenerator, TestHarness};
