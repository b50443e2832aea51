//! Knowledge base for the storyteller.
//!
//! Loads the persona prompt and the reference collections once per process
//! and serves the composed context that is prepended to every model prompt.
//! The composed context is bounded: each reference text is excerpted and
//! each collection is capped, so prompt size stays fixed no matter how
//! large the source documents grow.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tokio::fs;

/// Maximum characters kept from any single reference text.
const EXCERPT_CHARS: usize = 600;

/// Maximum items included per reference collection.
const MAX_ITEMS_PER_CATEGORY: usize = 5;

const SYSTEM_PROMPT_FILE: &str = "system_prompt.txt";
const FACTS_FILE: &str = "blockchain_facts.json";
const EXEMPLARS_FILE: &str = "story_exemplars.json";
const DISCUSSIONS_FILE: &str = "community_discussions.json";

/// Errors from the knowledge base.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("knowledge base not initialized")]
    NotInitialized,

    #[error("missing knowledge asset {name}: {source}")]
    MissingAsset {
        name: &'static str,
        source: std::io::Error,
    },

    #[error("malformed knowledge asset {name}: {source}")]
    Malformed {
        name: &'static str,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct Fact {
    topic: String,
    fact: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Exemplar {
    title: String,
    story: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Discussion {
    question: String,
    answer: String,
}

#[derive(Debug)]
struct Assets {
    system_prompt: String,
    facts: Vec<Fact>,
    exemplars: Vec<Exemplar>,
    discussions: Vec<Discussion>,
}

/// One-shot loader for the storyteller's reference assets.
///
/// Read-only after a successful `initialize`. A failed load leaves no
/// partial state behind: a retry performs a full reload.
#[derive(Debug)]
pub struct KnowledgeBase {
    dir: PathBuf,
    assets: RwLock<Option<Assets>>,
}

impl KnowledgeBase {
    /// Create an un-loaded knowledge base rooted at the given asset directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            assets: RwLock::new(None),
        }
    }

    /// Load all assets. Idempotent: after the first success, later calls
    /// are no-ops. A missing or malformed asset fails the whole call.
    pub async fn initialize(&self) -> Result<(), KnowledgeError> {
        if self.is_initialized() {
            return Ok(());
        }

        let assets = load_assets(&self.dir).await?;
        tracing::info!(
            facts = assets.facts.len(),
            exemplars = assets.exemplars.len(),
            discussions = assets.discussions.len(),
            "knowledge base loaded"
        );

        let mut guard = self.assets.write().unwrap();
        if guard.is_none() {
            *guard = Some(assets);
        }
        Ok(())
    }

    /// Whether a successful `initialize` has completed.
    pub fn is_initialized(&self) -> bool {
        self.assets.read().unwrap().is_some()
    }

    /// The storyteller persona prompt.
    pub fn system_prompt(&self) -> Result<String, KnowledgeError> {
        let guard = self.assets.read().unwrap();
        let assets = guard.as_ref().ok_or(KnowledgeError::NotInitialized)?;
        Ok(assets.system_prompt.clone())
    }

    /// The bounded, deterministic context digest of the reference material.
    pub fn knowledge_context(&self) -> Result<String, KnowledgeError> {
        let guard = self.assets.read().unwrap();
        let assets = guard.as_ref().ok_or(KnowledgeError::NotInitialized)?;
        Ok(compose_context(assets))
    }
}

async fn load_assets(dir: &Path) -> Result<Assets, KnowledgeError> {
    let system_prompt = read_text(dir, SYSTEM_PROMPT_FILE).await?;
    let facts = read_collection::<Fact>(dir, FACTS_FILE).await?;
    let exemplars = read_collection::<Exemplar>(dir, EXEMPLARS_FILE).await?;
    let discussions = read_collection::<Discussion>(dir, DISCUSSIONS_FILE).await?;

    Ok(Assets {
        system_prompt,
        facts,
        exemplars,
        discussions,
    })
}

async fn read_text(dir: &Path, name: &'static str) -> Result<String, KnowledgeError> {
    fs::read_to_string(dir.join(name))
        .await
        .map_err(|source| KnowledgeError::MissingAsset { name, source })
}

async fn read_collection<T: DeserializeOwned>(
    dir: &Path,
    name: &'static str,
) -> Result<Vec<T>, KnowledgeError> {
    let content = read_text(dir, name).await?;
    serde_json::from_str(&content).map_err(|source| KnowledgeError::Malformed { name, source })
}

/// Compose the context digest. Section order and excerpt bounds are fixed,
/// so the output is deterministic for a given set of loaded assets.
fn compose_context(assets: &Assets) -> String {
    let mut context = String::new();

    if !assets.facts.is_empty() {
        context.push_str("## Blockchain Facts\n");
        for fact in assets.facts.iter().take(MAX_ITEMS_PER_CATEGORY) {
            context.push_str(&format!("- {}: {}\n", fact.topic, excerpt(&fact.fact)));
        }
    }

    if !assets.exemplars.is_empty() {
        context.push_str("\n## Example Stories\n");
        for exemplar in assets.exemplars.iter().take(MAX_ITEMS_PER_CATEGORY) {
            context.push_str(&format!(
                "### {}\n{}\n",
                exemplar.title,
                excerpt(&exemplar.story)
            ));
        }
    }

    if !assets.discussions.is_empty() {
        context.push_str("\n## Questions Children Ask\n");
        for discussion in assets.discussions.iter().take(MAX_ITEMS_PER_CATEGORY) {
            context.push_str(&format!(
                "- Q: {} A: {}\n",
                excerpt(&discussion.question),
                excerpt(&discussion.answer)
            ));
        }
    }

    context
}

/// Unicode-safe excerpt of the first `EXCERPT_CHARS` characters.
fn excerpt(text: &str) -> String {
    if text.chars().count() > EXCERPT_CHARS {
        let truncated: String = text.chars().take(EXCERPT_CHARS).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_assets(dir: &Path) {
        std::fs::write(dir.join(SYSTEM_PROMPT_FILE), "You are a storyteller.").unwrap();
        std::fs::write(
            dir.join(FACTS_FILE),
            r#"[{"topic": "Solana", "fact": "A fast blockchain."}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join(EXEMPLARS_FILE),
            r#"[{"title": "The Ledger Tree", "story": "Once upon a time..."}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join(DISCUSSIONS_FILE),
            r#"[{"question": "What is a wallet?", "answer": "A keyring for coins."}]"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_initialize_and_read() {
        let dir = TempDir::new().expect("temp dir");
        write_assets(dir.path());

        let kb = KnowledgeBase::new(dir.path());
        assert!(!kb.is_initialized());
        kb.initialize().await.unwrap();

        assert_eq!(kb.system_prompt().unwrap(), "You are a storyteller.");
        let context = kb.knowledge_context().unwrap();
        assert!(context.contains("Solana"));
        assert!(context.contains("The Ledger Tree"));
        assert!(context.contains("What is a wallet?"));
    }

    #[tokio::test]
    async fn test_reads_fail_before_initialize() {
        let kb = KnowledgeBase::new("/nonexistent");
        assert!(matches!(
            kb.system_prompt(),
            Err(KnowledgeError::NotInitialized)
        ));
        assert!(matches!(
            kb.knowledge_context(),
            Err(KnowledgeError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_missing_asset_fails_whole_load() {
        let dir = TempDir::new().expect("temp dir");
        write_assets(dir.path());
        std::fs::remove_file(dir.path().join(FACTS_FILE)).unwrap();

        let kb = KnowledgeBase::new(dir.path());
        let err = kb.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            KnowledgeError::MissingAsset { name, .. } if name == FACTS_FILE
        ));

        // No partial state: reads still refuse
        assert!(!kb.is_initialized());
        assert!(matches!(
            kb.system_prompt(),
            Err(KnowledgeError::NotInitialized)
        ));

        // A retry after the asset appears performs a full load
        std::fs::write(dir.path().join(FACTS_FILE), "[]").unwrap();
        kb.initialize().await.unwrap();
        assert!(kb.is_initialized());
    }

    #[tokio::test]
    async fn test_malformed_asset_rejected() {
        let dir = TempDir::new().expect("temp dir");
        write_assets(dir.path());
        std::fs::write(dir.path().join(EXEMPLARS_FILE), "not json").unwrap();

        let kb = KnowledgeBase::new(dir.path());
        let err = kb.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            KnowledgeError::Malformed { name, .. } if name == EXEMPLARS_FILE
        ));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        write_assets(dir.path());

        let kb = KnowledgeBase::new(dir.path());
        kb.initialize().await.unwrap();
        let first = kb.knowledge_context().unwrap();

        // Changing assets on disk after a successful load has no effect
        std::fs::write(dir.path().join(FACTS_FILE), "[]").unwrap();
        kb.initialize().await.unwrap();
        assert_eq!(kb.knowledge_context().unwrap(), first);
    }

    #[tokio::test]
    async fn test_context_is_bounded() {
        let dir = TempDir::new().expect("temp dir");
        let huge = "x".repeat(50_000);
        std::fs::write(dir.path().join(SYSTEM_PROMPT_FILE), "prompt").unwrap();

        // 100 oversized facts; only 5 excerpts should survive
        let facts: Vec<String> = (0..100)
            .map(|i| format!(r#"{{"topic": "t{i}", "fact": "{huge}"}}"#))
            .collect();
        std::fs::write(
            dir.path().join(FACTS_FILE),
            format!("[{}]", facts.join(",")),
        )
        .unwrap();
        std::fs::write(
            dir.path().join(EXEMPLARS_FILE),
            format!(r#"[{{"title": "big", "story": "{huge}"}}]"#),
        )
        .unwrap();
        std::fs::write(dir.path().join(DISCUSSIONS_FILE), "[]").unwrap();

        let kb = KnowledgeBase::new(dir.path());
        kb.initialize().await.unwrap();

        let context = kb.knowledge_context().unwrap();
        let cap = (MAX_ITEMS_PER_CATEGORY * 2 + 1) * (EXCERPT_CHARS + 200);
        assert!(
            context.chars().count() < cap,
            "context not bounded: {} chars",
            context.chars().count()
        );
        assert!(context.contains("t0"));
        assert!(!context.contains("t5"), "item cap not applied");
    }

    #[tokio::test]
    async fn test_context_deterministic() {
        let dir = TempDir::new().expect("temp dir");
        write_assets(dir.path());

        let kb = KnowledgeBase::new(dir.path());
        kb.initialize().await.unwrap();

        assert_eq!(
            kb.knowledge_context().unwrap(),
            kb.knowledge_context().unwrap()
        );
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let text = "é".repeat(EXCERPT_CHARS + 10);
        let out = excerpt(&text);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), EXCERPT_CHARS + 3);
    }

    #[test]
    fn test_excerpt_short_text_untouched() {
        assert_eq!(excerpt("short"), "short");
    }
}
