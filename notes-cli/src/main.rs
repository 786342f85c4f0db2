//! notes: operator CLI for the note publishing core.
//!
//! Reads config from env vars (a `.env` file is honoured):
//!   DATABASE_URL   Postgres connection string; without it an in-memory
//!                  store is used and discarded on exit
//!   NOTES_CONFIG   YAML config file (defaults apply when unset)
//!   NOTES_USER     acting user id (default: cli)
//!
//! # Usage
//!
//! ```bash
//! notes --as-user alice create
//! notes --as-user alice update Ab3dE5gH7jK9 --title "Hello World" --content "<p>Hi</p>"
//! notes --as-user alice publish Ab3dE5gH7jK9
//! notes search hello --size 5
//! notes --as-user root --role admin reassign Ab3dE5gH7jK9 bob 2024-01-31
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use notes_core::memory::{MemoryContentStore, MemorySearchIndex};
use notes_core::records::{NoteRecord, NoteRightsRecord, NoteSummaryRecord};
use notes_core::validation::require_valid_note_id;
use notes_core::{
    ContentStore, NoteChange, NoteId, NoteQueries, NoteService, NotesConfig, Principal,
};

#[derive(Parser)]
#[command(name = "notes")]
#[command(version)]
#[command(about = "Create, edit, publish and search notes")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Acting user id
    #[arg(long, global = true, env = "NOTES_USER", default_value = "cli")]
    as_user: String,

    /// Role held by the acting user (repeatable)
    #[arg(long = "role", global = true, default_value = "editor")]
    roles: Vec<String>,

    /// YAML config file (falls back to NOTES_CONFIG, then defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Postgres connection string
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty draft authored by the acting user
    Create,

    /// Edit a note, optionally publishing or unpublishing it
    Update {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        subtitle: Option<String>,

        /// HTML content
        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,

        /// Read HTML content from a file
        #[arg(long)]
        content_file: Option<PathBuf>,

        /// true publishes after saving, false returns a published note to draft
        #[arg(long)]
        publish: Option<bool>,
    },

    /// Publish a note
    Publish { id: String },

    /// Return a published note to draft
    Unpublish { id: String },

    /// Delete a note and its summary, rights and index entry
    Delete { id: String },

    /// Show a note with its summary and rights
    Show {
        /// Note id, or url fragment with --by-fragment
        target: String,

        #[arg(long)]
        by_fragment: bool,
    },

    /// List published notes, newest first
    Published {
        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long)]
        limit: Option<usize>,

        /// Only notes by this author
        #[arg(long)]
        author: Option<String>,
    },

    /// Drafts and published notes a user can edit
    Dashboard {
        /// Defaults to the acting user
        user: Option<String>,
    },

    /// Keyword search over published notes
    Search {
        query: String,

        #[arg(long, default_value_t = 10)]
        size: usize,

        #[arg(long)]
        offset: Option<usize>,
    },

    /// Published and draft totals
    Stats {
        /// Only notes this user can edit
        #[arg(long)]
        editor: Option<String>,
    },

    /// Everything stored about a user
    Export {
        /// Defaults to the acting user
        user: Option<String>,
    },

    /// Grant a user edit rights on a note
    AddEditor { id: String, user: String },

    /// Revoke a user's edit rights on a note
    RemoveEditor { id: String, user: String },

    /// Remove a user from every note they did not author
    Deassign { user: String },

    /// Move a note to another author with a backdated publish date (admin)
    Reassign {
        id: String,
        author: String,
        /// YYYY-MM-DD
        date: NaiveDate,
    },
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,notes_core=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

struct App {
    service: NoteService,
    queries: NoteQueries,
    config: NotesConfig,
    principal: Principal,
}

async fn open_store(database_url: Option<&str>) -> Result<Arc<dyn ContentStore>> {
    #[cfg(feature = "postgres")]
    {
        if let Some(url) = database_url {
            let store = notes_core::postgres::PgContentStore::connect(url).await?;
            store.migrate().await?;
            info!("Connected to notes database");
            return Ok(Arc::new(store));
        }
    }

    #[cfg(not(feature = "postgres"))]
    {
        if database_url.is_some() {
            warn!("Built without the postgres feature; ignoring DATABASE_URL");
        }
    }

    warn!("No database configured; using an in-memory store that is discarded on exit");
    Ok(Arc::new(MemoryContentStore::new()))
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => NotesConfig::load(path)?,
        None => NotesConfig::from_env()?,
    };

    let store = open_store(cli.database_url.as_deref()).await?;
    let index = Arc::new(MemorySearchIndex::new());

    let service = NoteService::new(store.clone(), index.clone(), config.clone());
    let queries = NoteQueries::new(store, index, config.clone());

    let indexed = service
        .reindex_published()
        .await
        .context("Failed to build the search index")?;
    info!(indexed, "Search index ready");

    let app = App {
        service,
        queries,
        config,
        principal: Principal::new(cli.as_user, cli.roles),
    };
    app.dispatch(cli.command).await
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl App {
    fn note_id(&self, raw: &str) -> Result<NoteId> {
        require_valid_note_id(raw, &self.config.limits)?;
        Ok(NoteId::new(raw))
    }

    /// Rights must exist and the acting user must be able to edit them.
    async fn require_can_edit(&self, id: &NoteId) -> Result<()> {
        let rights = self.queries.get_rights(id).await?;
        if rights.is_none() {
            bail!("The given note does not exist: {id}");
        }
        if !self.service.check_can_edit(&self.principal, rights.as_ref()) {
            bail!(
                "{} does not have permission to edit note {id}",
                self.principal.actor_id
            );
        }
        Ok(())
    }

    async fn dispatch(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Create => {
                let note = self.service.create(&self.principal.actor_id).await?;
                print_json(&NoteRecord::from(&note))
            }
            Commands::Update {
                id,
                title,
                subtitle,
                content,
                content_file,
                publish,
            } => {
                let content = match content_file {
                    Some(path) => Some(
                        std::fs::read_to_string(&path)
                            .with_context(|| format!("Failed to read {}", path.display()))?,
                    ),
                    None => content,
                };
                self.cmd_update(&id, NoteChange { title, subtitle, content }, publish)
                    .await
            }
            Commands::Publish { id } => {
                let id = self.note_id(&id)?;
                self.require_can_edit(&id).await?;
                let note = self.service.publish(&id).await?;
                print_json(&NoteRecord::from(&note))
            }
            Commands::Unpublish { id } => {
                let id = self.note_id(&id)?;
                self.require_can_edit(&id).await?;
                self.service.unpublish(&id).await?;
                print_json(&json!({ "unpublished": id }))
            }
            Commands::Delete { id } => {
                let id = self.note_id(&id)?;
                self.require_can_edit(&id).await?;
                self.service.delete(&id).await?;
                print_json(&json!({ "deleted": id }))
            }
            Commands::Show {
                target,
                by_fragment,
            } => self.cmd_show(&target, by_fragment).await,
            Commands::Published {
                offset,
                limit,
                author,
            } => {
                let summaries = match author {
                    Some(author) => {
                        self.queries
                            .get_published_by_author(&author, limit, offset)
                            .await?
                    }
                    None => self.queries.get_published(offset, limit).await?,
                };
                let records: Vec<NoteSummaryRecord> =
                    summaries.iter().map(NoteSummaryRecord::from).collect();
                print_json(&records)
            }
            Commands::Dashboard { user } => {
                let user = user.unwrap_or_else(|| self.principal.actor_id.clone());
                let drafts = self.queries.get_by_author_and_status(&user, false).await?;
                let published = self.queries.get_by_author_and_status(&user, true).await?;
                print_json(&json!({
                    "user": user,
                    "drafts": drafts.iter().map(NoteSummaryRecord::from).collect::<Vec<_>>(),
                    "published": published.iter().map(NoteSummaryRecord::from).collect::<Vec<_>>(),
                }))
            }
            Commands::Search {
                query,
                size,
                offset,
            } => {
                let (summaries, next_offset) =
                    self.queries.search_summaries(&query, size, offset).await?;
                print_json(&json!({
                    "results": summaries.iter().map(NoteSummaryRecord::from).collect::<Vec<_>>(),
                    "next_offset": next_offset,
                }))
            }
            Commands::Stats { editor } => {
                let counts = match editor {
                    Some(editor) => self.queries.counts_for_editor(&editor).await?,
                    None => self.queries.counts().await?,
                };
                print_json(&counts)
            }
            Commands::Export { user } => {
                let user = user.unwrap_or_else(|| self.principal.actor_id.clone());
                print_json(&self.queries.export_user_data(&user).await?)
            }
            Commands::AddEditor { id, user } => {
                let id = self.note_id(&id)?;
                let rights = self.service.add_editor(&self.principal, &id, &user).await?;
                print_json(&NoteRightsRecord::from(&rights))
            }
            Commands::RemoveEditor { id, user } => {
                let id = self.note_id(&id)?;
                let rights = self
                    .service
                    .remove_editor(&self.principal, &id, &user)
                    .await?;
                print_json(&NoteRightsRecord::from(&rights))
            }
            Commands::Deassign { user } => {
                let changed = self
                    .service
                    .deassign_user_from_all_notes(&self.principal, &user)
                    .await?;
                print_json(&json!({ "user": user, "notes_changed": changed }))
            }
            Commands::Reassign { id, author, date } => {
                let id = self.note_id(&id)?;
                let note = self
                    .service
                    .reassign_author(&self.principal, &id, &author, date)
                    .await?;
                print_json(&NoteRecord::from(&note))
            }
        }
    }

    async fn cmd_update(
        &self,
        raw_id: &str,
        change: NoteChange,
        publish: Option<bool>,
    ) -> Result<()> {
        let id = self.note_id(raw_id)?;
        self.require_can_edit(&id).await?;

        if change.is_empty() && publish.is_none() {
            bail!("Nothing to update: pass --title, --subtitle, --content or --publish");
        }
        if let Some(title) = &change.title {
            if self.queries.exists_by_title(title.trim(), &id).await? {
                bail!("A note with the title '{}' already exists", title.trim());
            }
        }

        let note = match publish {
            Some(publish) => {
                self.service
                    .save_and_set_status(&id, &change, publish)
                    .await?
            }
            None => self.service.update(&id, &change).await?,
        };
        print_json(&NoteRecord::from(&note))
    }

    async fn cmd_show(&self, target: &str, by_fragment: bool) -> Result<()> {
        let note = if by_fragment {
            self.queries
                .get_note_by_url_fragment(target)
                .await?
                .with_context(|| format!("No note has the url fragment {target}"))?
        } else {
            self.queries.get_note_strict(&self.note_id(target)?).await?
        };
        let summary = self.queries.get_summary(&note.id).await?;
        let rights = self.queries.get_rights(&note.id).await?;
        let can_edit = self.service.check_can_edit(&self.principal, rights.as_ref());

        print_json(&json!({
            "note": NoteRecord::from(&note),
            "summary": summary.as_ref().map(NoteSummaryRecord::from),
            "rights": rights.as_ref().map(NoteRightsRecord::from),
            "can_edit": can_edit,
        }))
    }
}
