//! Note commands: `note add`, `note embed`, `search`, `save`, `chat`,
//! `session`, `stats`.

use anyhow::{bail, Result};
use notefeed_core::completion::Role;

use crate::config::{Config, Secrets};
use crate::services::Services;

pub async fn run_note_add(
    config: &Config,
    secrets: &Secrets,
    user_id: &str,
    title: Option<&str>,
    content: &str,
) -> Result<()> {
    if content.trim().is_empty() {
        bail!("note content must not be empty");
    }
    let services = Services::open(config, secrets).await?;
    let note = services.notes.create_note(user_id, title, content).await?;
    println!("Created note {}", note.id);
    println!("  title: {}", note.title);
    if let Some(summary) = &note.summary {
        println!("  summary: {}", summary);
    }
    Ok(())
}

pub async fn run_note_embed(
    config: &Config,
    secrets: &Secrets,
    user_id: &str,
    note_id: &str,
) -> Result<()> {
    let services = Services::open(config, secrets).await?;
    let chunks = services.notes.index_note(user_id, note_id).await?;
    println!("Indexed note {} ({} chunks).", note_id, chunks);
    Ok(())
}

pub async fn run_search(
    config: &Config,
    secrets: &Secrets,
    user_id: &str,
    query: &str,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("search query must not be empty");
    }
    let services = Services::open(config, secrets).await?;
    let results = services.notes.search(user_id, query.trim()).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, m) in results.iter().enumerate() {
        println!("{}. [{:.3}] note {}", i + 1, m.similarity, m.note_id);
        println!("    {}", m.content.replace('\n', " "));
    }
    Ok(())
}

pub async fn run_save(
    config: &Config,
    secrets: &Secrets,
    user_id: &str,
    topic_id: &str,
) -> Result<()> {
    let services = Services::open(config, secrets).await?;
    let note = services.notes.save_topic(user_id, topic_id).await?;
    println!("Saved topic {} as note {}", topic_id, note.id);
    println!("  title: {}", note.title);
    Ok(())
}

pub async fn run_chat(
    config: &Config,
    secrets: &Secrets,
    user_id: &str,
    message: &str,
    session_id: Option<&str>,
) -> Result<()> {
    if message.trim().is_empty() {
        bail!("message must not be empty");
    }
    let services = Services::open(config, secrets).await?;
    let reply = match session_id {
        Some(id) => services.sessions.send(user_id, id, message).await?,
        None => services.chat.answer(user_id, message, &[]).await,
    };
    println!("{}", reply);
    Ok(())
}

pub async fn run_session_new(config: &Config, secrets: &Secrets, user_id: &str) -> Result<()> {
    let services = Services::open(config, secrets).await?;
    let session = services.sessions.create(user_id).await?;
    println!("{}", session.id);
    Ok(())
}

pub async fn run_session_history(
    config: &Config,
    secrets: &Secrets,
    user_id: &str,
    session_id: &str,
) -> Result<()> {
    let services = Services::open(config, secrets).await?;
    let messages = services.sessions.history(user_id, session_id).await?;
    if messages.is_empty() {
        println!("No messages.");
        return Ok(());
    }
    for m in &messages {
        let who = match m.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        println!("[{}] {}", who, m.content);
    }
    Ok(())
}

pub async fn run_session_delete(
    config: &Config,
    secrets: &Secrets,
    user_id: &str,
    session_id: &str,
) -> Result<()> {
    let services = Services::open(config, secrets).await?;
    if !services.sessions.delete(user_id, session_id).await? {
        bail!("chat session {} not found", session_id);
    }
    println!("Deleted session {}", session_id);
    Ok(())
}

pub async fn run_stats(config: &Config, secrets: &Secrets, user_id: &str) -> Result<()> {
    let services = Services::open(config, secrets).await?;
    let stats = services.stats.collect(user_id).await?;
    println!("Notes:          {}", stats.total_notes);
    println!("Embedded notes: {}", stats.embedded_notes);
    println!("Saved topics:   {}", stats.saved_topics);
    if !stats.tag_stats.is_empty() {
        println!("Tags:");
        for tag in &stats.tag_stats {
            println!("  #{} ({})", tag.name, tag.note_count);
        }
    }
    Ok(())
}
