//! `notefeed feed` and `notefeed interact`.

use anyhow::Result;
use chrono::{Duration, Utc};

use notefeed_core::ranking::drop_skipped;
use notefeed_core::{Action, RankedTopic};

use crate::config::{Config, Secrets};
use crate::services::Services;

pub async fn run_feed(
    config: &Config,
    secrets: &Secrets,
    user_id: &str,
    limit: Option<usize>,
    include_skipped: bool,
) -> Result<()> {
    let services = Services::open(config, secrets).await?;
    let feed = services
        .ranker
        .rank(
            user_id,
            Duration::hours(config.feed.window_hours),
            limit.unwrap_or(config.feed.limit),
            Utc::now(),
        )
        .await?;
    let feed = if include_skipped {
        feed
    } else {
        drop_skipped(feed)
    };

    if feed.is_empty() {
        println!("No topics in the last {} hours.", config.feed.window_hours);
        return Ok(());
    }

    for (i, entry) in feed.iter().enumerate() {
        print_entry(i + 1, entry);
    }
    Ok(())
}

fn print_entry(rank: usize, entry: &RankedTopic) {
    let topic = &entry.topic;
    println!(
        "{}. [{:.2}] {}  ({}, {} points)",
        rank, entry.relevance_score, topic.title, topic.source, topic.score
    );
    if let Some(description) = &topic.description {
        println!("    {}", description);
    }
    if let Some(url) = &topic.source_url {
        println!("    {}", url);
    }
    if !topic.tags.is_empty() {
        println!("    tags: {}", topic.tags.join(", "));
    }
    if !entry.user_actions.is_empty() {
        let actions: Vec<&str> = entry.user_actions.iter().map(Action::as_str).collect();
        println!("    you: {}", actions.join(", "));
    }
    println!("    id: {}", topic.id);
}

pub async fn run_interact(
    config: &Config,
    secrets: &Secrets,
    user_id: &str,
    topic_id: &str,
    action: &str,
) -> Result<()> {
    let action: Action = action.parse()?;
    let services = Services::open(config, secrets).await?;
    let created = services.ledger.record(user_id, topic_id, action).await?;
    if created {
        println!("Recorded {} on {}.", action, topic_id);
    } else {
        println!("Already recorded {} on {}.", action, topic_id);
    }
    Ok(())
}
