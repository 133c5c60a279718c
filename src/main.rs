//! # notefeed CLI
//!
//! The `notefeed` binary drives ingestion, the personalized topic feed,
//! note indexing and search, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! notefeed --config ./config/notefeed.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `notefeed init` | Create the SQLite database and run schema migrations |
//! | `notefeed ingest` | Fetch, translate, embed and store topics, then sweep |
//! | `notefeed sweep` | Delete topics past the retention horizon |
//! | `notefeed feed` | Print the ranked feed for a user |
//! | `notefeed interact <topic> <action>` | Record viewed / saved / skipped |
//! | `notefeed note add` | Create a note |
//! | `notefeed note embed <id>` | Rebuild a note's embeddings |
//! | `notefeed search "<query>"` | `#tag` or semantic note search |
//! | `notefeed save <topic>` | Save a topic as a note |
//! | `notefeed chat "<message>"` | Ask a question over your notes |
//! | `notefeed session new\|history\|delete` | Manage persisted chat sessions |
//! | `notefeed stats` | Tag distribution and note counts |
//! | `notefeed serve` | Start the HTTP server |
//! | `notefeed completions <shell>` | Print shell completions |
//!
//! Logs go to stderr; set `RUST_LOG` to change the level (default `info`).

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use notefeed::config::{self, Secrets};
use notefeed::{feed, ingest, migrate, notes_cmd, server};

/// notefeed: a personal knowledge-note service with a personalized AI-news feed.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/notefeed.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "notefeed",
    about = "Personal knowledge notes with a personalized AI-news topic feed",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/notefeed.toml")]
    config: PathBuf,

    /// User id the command acts for.
    #[arg(long, global = true, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Run one ingestion cycle across all enabled connectors.
    Ingest,

    /// Delete topics older than `[ingest].retention_days`.
    Sweep,

    /// Print the ranked topic feed.
    Feed {
        /// Maximum number of topics (defaults to `[feed].limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Also show topics you skipped.
        #[arg(long)]
        include_skipped: bool,
    },

    /// Record an action on a topic.
    Interact {
        /// Topic id.
        topic_id: String,
        /// One of `viewed`, `saved`, `skipped`.
        action: String,
    },

    /// Manage notes.
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },

    /// Search notes. `#tag` lists tagged notes; anything else is semantic.
    Search {
        query: String,
    },

    /// Save a topic as a note.
    Save {
        topic_id: String,
    },

    /// Ask a question answered from your notes.
    Chat {
        message: String,

        /// Answer within a stored session and append both turns to it.
        #[arg(long)]
        session: Option<String>,
    },

    /// Manage persisted chat sessions.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Show tag distribution, note counts and saved topics.
    Stats,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Print shell completions.
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum NoteAction {
    /// Create a note. Without `--title` one is generated.
    Add {
        #[arg(long)]
        title: Option<String>,
        content: String,
    },
    /// Rebuild the chunk embeddings of a note.
    Embed {
        note_id: String,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Start a session and print its id.
    New,
    /// Print the stored messages of a session.
    History { session_id: String },
    /// Delete a session and its messages.
    Delete { session_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "notefeed", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    let secrets = Secrets::from_env(&cfg);
    let user = cli.user.as_str();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest => {
            ingest::run_ingest(&cfg, &secrets).await?;
        }
        Commands::Sweep => {
            ingest::run_sweep(&cfg, &secrets).await?;
        }
        Commands::Feed {
            limit,
            include_skipped,
        } => {
            feed::run_feed(&cfg, &secrets, user, limit, include_skipped).await?;
        }
        Commands::Interact { topic_id, action } => {
            feed::run_interact(&cfg, &secrets, user, &topic_id, &action).await?;
        }
        Commands::Note { action } => match action {
            NoteAction::Add { title, content } => {
                notes_cmd::run_note_add(&cfg, &secrets, user, title.as_deref(), &content).await?;
            }
            NoteAction::Embed { note_id } => {
                notes_cmd::run_note_embed(&cfg, &secrets, user, &note_id).await?;
            }
        },
        Commands::Search { query } => {
            notes_cmd::run_search(&cfg, &secrets, user, &query).await?;
        }
        Commands::Save { topic_id } => {
            notes_cmd::run_save(&cfg, &secrets, user, &topic_id).await?;
        }
        Commands::Chat { message, session } => {
            notes_cmd::run_chat(&cfg, &secrets, user, &message, session.as_deref()).await?;
        }
        Commands::Session { action } => match action {
            SessionAction::New => {
                notes_cmd::run_session_new(&cfg, &secrets, user).await?;
            }
            SessionAction::History { session_id } => {
                notes_cmd::run_session_history(&cfg, &secrets, user, &session_id).await?;
            }
            SessionAction::Delete { session_id } => {
                notes_cmd::run_session_delete(&cfg, &secrets, user, &session_id).await?;
            }
        },
        Commands::Stats => {
            notes_cmd::run_stats(&cfg, &secrets, user).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg, &secrets).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
