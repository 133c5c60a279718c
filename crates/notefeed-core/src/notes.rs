//! Note indexing, note search, and saving topics as notes.
//!
//! Notes are chunked with [`chunk_text`] and every chunk is embedded; the
//! chunk vectors back semantic search, the RAG chat, and the user's
//! relevance profile.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::chunk::{chunk_text, DEFAULT_MAX_CHUNK_CHARS};
use crate::completion::{extract_json, ChatMessage, CompletionProvider};
use crate::embedding::{truncate_chars, EmbeddingGenerator};
use crate::error::{NoteError, StoreError};
use crate::models::{Action, Note, NoteMatch, Topic};
use crate::store::{InteractionRepository, NoteRepository, TopicRepository};

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.3;
pub const DEFAULT_MATCH_COUNT: usize = 10;
/// Characters of note content returned by a tag search hit.
pub const TAG_SNIPPET_CHARS: usize = 200;
/// Characters of note content sent for title/summary generation.
pub const MAX_SUMMARY_INPUT_CHARS: usize = 3000;
pub const MAX_TITLE_CHARS: usize = 100;
pub const SAVED_TOPIC_TAG: &str = "discovery";
pub const SAVED_TOPIC_TAG_COLOR: &str = "#4f9cf9";
pub const SAVED_TOPIC_TITLE_PREFIX: &str = "📰 ";

const UNTITLED: &str = "Untitled";
const SIMPLE_TITLE_CHARS: usize = 50;

/// Title and summary proposed by the completion provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TitleSummary {
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
}

pub struct NoteService {
    notes: Arc<dyn NoteRepository>,
    topics: Arc<dyn TopicRepository>,
    interactions: Arc<dyn InteractionRepository>,
    embeddings: EmbeddingGenerator,
    completion: Option<Arc<dyn CompletionProvider>>,
    chunk_size: usize,
    match_threshold: f64,
    match_count: usize,
}

impl NoteService {
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        topics: Arc<dyn TopicRepository>,
        interactions: Arc<dyn InteractionRepository>,
        embeddings: EmbeddingGenerator,
        completion: Option<Arc<dyn CompletionProvider>>,
    ) -> Self {
        Self {
            notes,
            topics,
            interactions,
            embeddings,
            completion,
            chunk_size: DEFAULT_MAX_CHUNK_CHARS,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            match_count: DEFAULT_MATCH_COUNT,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_matching(mut self, threshold: f64, count: usize) -> Self {
        self.match_threshold = threshold;
        self.match_count = count;
        self
    }

    /// Store a note for `user_id` and index it.
    ///
    /// Without an explicit title the provider proposes one, falling back to
    /// the first line of the content. `#hashtags` in the content become
    /// tags. Indexing failures are logged; the note is kept.
    pub async fn create_note(
        &self,
        user_id: &str,
        title: Option<&str>,
        content: &str,
    ) -> Result<Note, NoteError> {
        let generated = match title {
            Some(_) => None,
            None => self.generate_title_and_summary(content).await,
        };
        let title = match (title.map(str::trim).filter(|t| !t.is_empty()), &generated) {
            (Some(t), _) => t.to_string(),
            (None, Some(g)) => g.title.clone(),
            (None, None) => simple_title(content),
        };

        let note = Note {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title,
            content: content.to_string(),
            summary: generated.and_then(|g| g.summary),
            created_at: Utc::now(),
        };
        self.notes.insert_note(&note).await?;

        for tag in parse_content_tags(content) {
            self.notes.tag_note(user_id, &note.id, &tag, None).await?;
        }

        self.index_quietly(&note).await;
        Ok(note)
    }

    /// Rebuild the stored chunk vectors of a note. Returns the number of
    /// chunks stored; chunks whose embedding failed are dropped.
    pub async fn index_note(&self, user_id: &str, note_id: &str) -> Result<usize, NoteError> {
        if !self.embeddings.is_enabled() {
            return Err(NoteError::EmbeddingsUnavailable);
        }
        let note = self
            .notes
            .get_note(user_id, note_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("note {}", note_id)))?;
        self.index(&note).await
    }

    async fn index(&self, note: &Note) -> Result<usize, NoteError> {
        let text = format!("{}\n\n{}", note.title, note.content);
        let mut stored = Vec::new();
        for chunk in chunk_text(&text, self.chunk_size) {
            if let Some(vector) = self.embeddings.embed(&chunk).await {
                stored.push((chunk, vector));
            }
        }
        self.notes.replace_note_embeddings(&note.id, &stored).await?;
        tracing::debug!(note_id = %note.id, chunks = stored.len(), "indexed note");
        Ok(stored.len())
    }

    async fn index_quietly(&self, note: &Note) {
        if !self.embeddings.is_enabled() {
            return;
        }
        if let Err(e) = self.index(note).await {
            tracing::warn!(note_id = %note.id, error = %e, "note indexing failed");
        }
    }

    /// Search the user's notes.
    ///
    /// `#tag` returns notes carrying that tag with similarity `1.0`; any
    /// other query runs a semantic search over note chunks.
    pub async fn search(&self, user_id: &str, query: &str) -> Result<Vec<NoteMatch>, NoteError> {
        if let Some(tag) = parse_tag_query(query) {
            let notes = self
                .notes
                .notes_with_tag(user_id, tag, self.match_count)
                .await?;
            return Ok(notes
                .into_iter()
                .map(|n| NoteMatch {
                    note_id: n.id,
                    content: truncate_chars(&n.content, TAG_SNIPPET_CHARS).to_string(),
                    similarity: 1.0,
                })
                .collect());
        }

        if !self.embeddings.is_enabled() {
            return Err(NoteError::EmbeddingsUnavailable);
        }
        let vector = self
            .embeddings
            .embed(query)
            .await
            .ok_or(NoteError::EmbeddingFailed)?;
        Ok(self
            .notes
            .match_note_embeddings(user_id, &vector, self.match_threshold, self.match_count)
            .await?)
    }

    /// Copy a topic into a new note tagged `discovery` and mark the topic
    /// saved for the user.
    pub async fn save_topic(&self, user_id: &str, topic_id: &str) -> Result<Note, NoteError> {
        let topic = self
            .topics
            .get_topic(topic_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("topic {}", topic_id)))?;

        let content = compose_topic_note(&topic);
        let generated = self.generate_title_and_summary(&content).await;
        let (title, summary) = match generated {
            Some(g) => (g.title, g.summary),
            None => (topic.title.clone(), None),
        };

        let note = Note {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: format!("{}{}", SAVED_TOPIC_TITLE_PREFIX, title),
            content,
            summary,
            created_at: Utc::now(),
        };
        self.notes.insert_note(&note).await?;
        self.notes
            .tag_note(user_id, &note.id, SAVED_TOPIC_TAG, Some(SAVED_TOPIC_TAG_COLOR))
            .await?;
        self.index_quietly(&note).await;
        self.interactions
            .record(user_id, topic_id, Action::Saved, Utc::now())
            .await?;

        tracing::info!(user_id, topic_id, note_id = %note.id, "saved topic as note");
        Ok(note)
    }

    /// Ask the provider for a short title and summary. `None` when no
    /// provider is configured or the reply is unusable.
    pub async fn generate_title_and_summary(&self, content: &str) -> Option<TitleSummary> {
        let provider = self.completion.as_ref()?;
        let prompt = format!(
            "Analyse the note below and reply with JSON.\n\
             - title: a concise title (at most 20 words)\n\
             - summary: the key points in 3 to 5 short lines\n\n\
             Note:\n\"\"\"\n{}\n\"\"\"\n\n\
             Reply with JSON only:\n{{\"title\":\"...\",\"summary\":\"...\"}}",
            truncate_chars(content, MAX_SUMMARY_INPUT_CHARS)
        );

        let reply = match provider.complete(None, &[ChatMessage::user(prompt)]).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "title generation failed");
                return None;
            }
        };
        parse_title_summary(&reply)
    }
}

/// Parse a `{"title","summary"}` reply; the title is capped at
/// [`MAX_TITLE_CHARS`] and an empty summary becomes `None`.
pub fn parse_title_summary(reply: &str) -> Option<TitleSummary> {
    let parsed: TitleSummary = serde_json::from_str(extract_json(reply)).ok()?;
    let title = parsed.title.trim();
    let title = if title.is_empty() { UNTITLED } else { title };
    Some(TitleSummary {
        title: truncate_chars(title, MAX_TITLE_CHARS).to_string(),
        summary: parsed
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    })
}

/// Note body for a saved topic: title, description, source URL, source
/// label, and tags, one per paragraph, omitting absent parts.
pub fn compose_topic_note(topic: &Topic) -> String {
    let mut parts: Vec<String> = vec![topic.title.clone()];
    if let Some(d) = topic.description.as_deref().filter(|d| !d.is_empty()) {
        parts.push(d.to_string());
    }
    if let Some(url) = topic.source_url.as_deref().filter(|u| !u.is_empty()) {
        parts.push(format!("Source: {}", url));
    }
    parts.push(format!("Via: {}", topic.source));
    if !topic.tags.is_empty() {
        let tags: Vec<String> = topic.tags.iter().map(|t| format!("#{}", t)).collect();
        parts.push(format!("Tags: {}", tags.join(" ")));
    }
    parts.join("\n")
}

/// `"#rust"` → `Some("rust")`. Bare `#` and non-tag queries → `None`.
pub fn parse_tag_query(query: &str) -> Option<&str> {
    let tag = query.trim().strip_prefix('#')?.trim();
    (!tag.is_empty()).then_some(tag)
}

/// Lowercased `#hashtags` in `content`, de-duplicated in order.
pub fn parse_content_tags(content: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '#' {
            continue;
        }
        let mut tag = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_alphanumeric() || next == '_' {
                tag.push(next);
                chars.next();
            } else {
                break;
            }
        }
        let tag = tag.to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// First non-empty line of `content`, capped at 50 characters.
pub fn simple_title(content: &str) -> String {
    let first = content.lines().next().unwrap_or("").trim();
    if first.is_empty() {
        return UNTITLED.to_string();
    }
    if first.chars().count() > SIMPLE_TITLE_CHARS {
        format!("{}…", truncate_chars(first, SIMPLE_TITLE_CHARS))
    } else {
        first.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::testing::ScriptedCompletion;
    use crate::embedding::testing::KeywordEmbedder;
    use crate::models::NewTopic;
    use crate::store::memory::InMemoryStore;

    fn service(
        store: &Arc<InMemoryStore>,
        embeddings: EmbeddingGenerator,
        completion: Option<Arc<dyn CompletionProvider>>,
    ) -> NoteService {
        NoteService::new(store.clone(), store.clone(), store.clone(), embeddings, completion)
    }

    fn keyword_embeddings() -> EmbeddingGenerator {
        EmbeddingGenerator::new(Arc::new(KeywordEmbedder::new(8)))
    }

    async fn seed_topic(store: &InMemoryStore) -> String {
        store
            .upsert_topic(
                &NewTopic {
                    source: "hackernews".into(),
                    source_id: "101".into(),
                    title: "Open LLM weights released".into(),
                    description: Some("Hacker News (120 points, 45 comments)".into()),
                    source_url: Some("https://example.com/llm".into()),
                    score: 120,
                    tags: vec!["AI".into(), "LLM".into()],
                    embedding: None,
                    content_hash: String::new(),
                },
                Utc::now(),
            )
            .await
            .unwrap();
        store.find_by_key("hackernews", "101").await.unwrap().unwrap().id
    }

    #[test]
    fn test_parse_tag_query() {
        assert_eq!(parse_tag_query("#rust"), Some("rust"));
        assert_eq!(parse_tag_query("  # rust "), Some("rust"));
        assert_eq!(parse_tag_query("#"), None);
        assert_eq!(parse_tag_query("rust #tips"), None);
    }

    #[test]
    fn test_parse_content_tags() {
        let tags = parse_content_tags("Notes on #Rust and #async_io, again #rust. #日本語");
        assert_eq!(tags, vec!["rust", "async_io", "日本語"]);
        assert!(parse_content_tags("no tags # here").is_empty());
    }

    #[test]
    fn test_simple_title() {
        assert_eq!(simple_title("First line\nsecond"), "First line");
        assert_eq!(simple_title(""), "Untitled");
        let long = "x".repeat(60);
        assert_eq!(simple_title(&long).chars().count(), 51);
    }

    #[test]
    fn test_parse_title_summary() {
        let parsed = parse_title_summary("```json\n{\"title\":\"T\",\"summary\":\" s \"}\n```").unwrap();
        assert_eq!(parsed.title, "T");
        assert_eq!(parsed.summary.as_deref(), Some("s"));

        let long = format!("{{\"title\":\"{}\"}}", "y".repeat(150));
        let parsed = parse_title_summary(&long).unwrap();
        assert_eq!(parsed.title.chars().count(), MAX_TITLE_CHARS);
        assert_eq!(parsed.summary, None);

        assert!(parse_title_summary("not json").is_none());
    }

    #[tokio::test]
    async fn test_create_and_semantic_search() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store, keyword_embeddings(), None);
        let rust = svc
            .create_note("u1", Some("Rust notes"), "Ownership in rust")
            .await
            .unwrap();
        svc.create_note("u1", Some("Dinner"), "cooking pasta")
            .await
            .unwrap();

        let hits = svc.search("u1", "rust borrow checker").await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].note_id, rust.id);
        assert!(hits.iter().all(|h| h.similarity >= DEFAULT_MATCH_THRESHOLD));
    }

    #[tokio::test]
    async fn test_tag_search_truncates_content() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store, EmbeddingGenerator::disabled(), None);
        let body = format!("#rust {}", "z".repeat(400));
        svc.create_note("u1", Some("Long"), &body).await.unwrap();

        let hits = svc.search("u1", "#rust").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].similarity, 1.0);
        assert_eq!(hits[0].content.chars().count(), TAG_SNIPPET_CHARS);
    }

    #[tokio::test]
    async fn test_semantic_search_without_embeddings_is_unavailable() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store, EmbeddingGenerator::disabled(), None);
        let err = svc.search("u1", "anything").await.unwrap_err();
        assert!(matches!(err, NoteError::EmbeddingsUnavailable));
    }

    #[tokio::test]
    async fn test_failed_query_embedding() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(
            &store,
            EmbeddingGenerator::new(Arc::new(KeywordEmbedder::failing(8))),
            None,
        );
        let err = svc.search("u1", "anything").await.unwrap_err();
        assert!(matches!(err, NoteError::EmbeddingFailed));
    }

    #[tokio::test]
    async fn test_index_note_requires_embeddings_and_ownership() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store, keyword_embeddings(), None);
        let note = svc.create_note("u1", Some("t"), "llm\ngpu").await.unwrap();
        assert_eq!(svc.index_note("u1", &note.id).await.unwrap(), 1);
        assert!(matches!(
            svc.index_note("u2", &note.id).await,
            Err(NoteError::Store(StoreError::NotFound(_)))
        ));

        let disabled = service(&store, EmbeddingGenerator::disabled(), None);
        assert!(matches!(
            disabled.index_note("u1", &note.id).await,
            Err(NoteError::EmbeddingsUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_create_note_generates_title() {
        let store = Arc::new(InMemoryStore::new());
        let completion = Arc::new(ScriptedCompletion::replying(
            "{\"title\":\"Generated\",\"summary\":\"- point\"}",
        ));
        let svc = service(&store, EmbeddingGenerator::disabled(), Some(completion));
        let note = svc.create_note("u1", None, "some body").await.unwrap();
        assert_eq!(note.title, "Generated");
        assert_eq!(note.summary.as_deref(), Some("- point"));

        let plain = service(&store, EmbeddingGenerator::disabled(), None);
        let note = plain.create_note("u1", None, "first line\nrest").await.unwrap();
        assert_eq!(note.title, "first line");
    }

    #[tokio::test]
    async fn test_save_topic() {
        let store = Arc::new(InMemoryStore::new());
        let topic_id = seed_topic(&store).await;
        let svc = service(&store, keyword_embeddings(), None);

        let note = svc.save_topic("u1", &topic_id).await.unwrap();
        assert_eq!(note.title, "📰 Open LLM weights released");
        assert!(note.content.contains("Source: https://example.com/llm"));
        assert!(note.content.contains("Via: hackernews"));
        assert!(note.content.contains("Tags: #AI #LLM"));

        let tagged = store.notes_with_tag("u1", "discovery", 10).await.unwrap();
        assert_eq!(tagged.len(), 1);

        let actions = store.actions_for("u1", &[topic_id.clone()]).await.unwrap();
        assert_eq!(actions[&topic_id], vec![Action::Saved]);

        let hits = svc.search("u1", "llm").await.unwrap();
        assert!(hits.iter().any(|h| h.note_id == note.id));
    }

    #[tokio::test]
    async fn test_save_missing_topic() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store, EmbeddingGenerator::disabled(), None);
        assert!(matches!(
            svc.save_topic("u1", "nope").await,
            Err(NoteError::Store(StoreError::NotFound(_)))
        ));
    }

    #[test]
    fn test_compose_topic_note_omits_absent_parts() {
        let now = Utc::now();
        let topic = Topic {
            id: "t".into(),
            title: "Title".into(),
            description: None,
            source_url: None,
            source: "devto".into(),
            source_id: "1".into(),
            score: 0,
            tags: vec![],
            embedding: None,
            content_hash: String::new(),
            fetched_at: now,
            created_at: now,
        };
        assert_eq!(compose_topic_note(&topic), "Title\nVia: devto");
    }
}
