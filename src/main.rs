//! # ragchat CLI
//!
//! ```bash
//! ragchat --config ./config/ragchat.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat init` | Create both databases and run migrations |
//! | `ragchat serve` | Start the HTTP API |
//! | `ragchat index` | Index the documents directory |
//! | `ragchat search "<query>"` | Similarity search against the index |
//! | `ragchat ask "<message>"` | One chat turn from the terminal |
//! | `ragchat seed [--force]` | Create demo users and submissions |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragchat::chat::ChatRequest;
use ragchat::config;
use ragchat::server::{self, AppState};
use ragchat::{db, ingest, migrate, submissions};

/// Retrieval-augmented chat over a directory of legal documents.
#[derive(Parser)]
#[command(name = "ragchat", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the relational and vector databases. Safe to run repeatedly.
    Init,

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Load, split, embed, and store everything in `[documents].path`.
    Index,

    /// Print the chunks nearest to a query.
    Search {
        query: String,

        /// Number of results (defaults to `[retrieval].k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Ask one question, optionally continuing a conversation.
    Ask {
        message: String,

        #[arg(long)]
        conversation: Option<i64>,
    },

    /// Create demo users and questionnaire submissions.
    Seed {
        /// Delete all existing users and submissions first.
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(cfg.app.debug);
    if cfg.auth.uses_default_secret() {
        tracing::warn!("auth.secret_key is the built-in default; set RAGCHAT_SECRET_KEY");
    }

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
            println!("Vector store initialized at {}", cfg.vectors.path.display());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Index => {
            let state = AppState::from_config(&cfg).await?;
            let report = ingest::index_documents(&state.pool, &cfg, &state.retriever).await?;
            println!("index {}", cfg.documents.path.display());
            println!("  documents loaded: {}", report.documents_loaded);
            println!("  chunks created: {}", report.chunks_created);
            println!("  vector store count: {}", report.vectorstore_count);
            println!("ok");
        }
        Commands::Search { query, k } => {
            let state = AppState::from_config(&cfg).await?;
            let hits = state
                .retriever
                .similarity_search(&query, k.unwrap_or(cfg.retrieval.k))
                .await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!("{}. [{:.3}] {}", i + 1, hit.score, hit.chunk.source());
                println!("    {}", preview(&hit.chunk.text, 200));
            }
        }
        Commands::Ask {
            message,
            conversation,
        } => {
            let state = AppState::from_config(&cfg).await?;
            let mut request = ChatRequest::new(message);
            request.conversation_id = conversation;
            let response = state.chat.chat(request).await?;
            println!("{}", response.answer);
            for source in &response.sources {
                println!("  source: {}", source.source);
            }
            println!("(conversation {})", response.conversation_id);
        }
        Commands::Seed { force } => {
            migrate::run_migrations(&cfg).await?;
            let pool = db::connect(&cfg).await?;
            run_seed(&pool, force).await?;
            pool.close().await;
        }
    }

    Ok(())
}

async fn run_seed(pool: &sqlx::SqlitePool, force: bool) -> anyhow::Result<()> {
    match submissions::seed(pool, force).await? {
        submissions::SeedOutcome::Seeded {
            users,
            submissions: created,
        } => {
            println!("Created {} users and {} submissions.", users, created);
            println!("All demo users share the password: {}", submissions::SEED_PASSWORD);
        }
        submissions::SeedOutcome::Skipped { existing_users } => {
            println!(
                "Database already has {} users; not seeding. Re-run with --force to replace them.",
                existing_users
            );
        }
    }
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut)
}
