use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use qagallery_core::logging::{LogSettings, init_logging, sanitize_path};
use qagallery_core::{
    Config, Gallery, MemoryQuestionStore, QueryState, Question, QuestionDraft, QuestionId, QuestionPatch,
    QuestionStore, StoreBackend, parse_tag_input,
};
use qagallery_store::{LocalCache, LocalQuestionStore, MigrationOutcome, MigrationRunner, SqliteQuestionStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// qagallery - a searchable gallery of questions and answers
#[derive(Parser, Debug)]
#[command(name = "qagallery")]
#[command(about = "Browse, search and edit a gallery of Q&A records", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the config file (default: ./qagallery.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the configured store backend (memory, local, sqlite)
    #[arg(short, long, value_name = "BACKEND")]
    backend: Option<StoreBackend>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List questions, newest first
    List {
        /// Only show questions whose title, description or tags contain this text
        #[arg(short, long, value_name = "TEXT")]
        query: Option<String>,

        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a single question with its answer
    Show {
        #[arg(value_name = "ID")]
        id: QuestionId,
    },
    /// Add a question
    Add {
        #[command(flatten)]
        fields: DraftArgs,
    },
    /// Change fields of an existing question
    Edit {
        #[arg(value_name = "ID")]
        id: QuestionId,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        answer: Option<String>,

        /// Comma-separated tags; replaces the existing tags
        #[arg(long, value_name = "TAGS")]
        tags: Option<String>,
    },
    /// Delete a question
    Delete {
        #[arg(value_name = "ID")]
        id: QuestionId,
    },
    /// Report what the startup migration of the local cache did
    Migrate,
    /// Save a question into the local cache; it moves to the database on the next run
    Stash {
        #[command(flatten)]
        fields: DraftArgs,
    },
}

#[derive(clap::Args, Debug)]
struct DraftArgs {
    #[arg(long)]
    title: String,

    #[arg(long, default_value = "")]
    description: String,

    #[arg(long, default_value = "")]
    answer: String,

    /// Comma-separated tags, e.g. "csv, pandas"
    #[arg(long, value_name = "TAGS", default_value = "")]
    tags: String,
}

impl DraftArgs {
    fn into_draft(self) -> QuestionDraft {
        QuestionDraft::new(self.title, self.description, self.answer, parse_tag_input(&self.tags))
    }
}

/// What happened to the local cache when the store was opened
#[derive(Debug)]
enum StartupMigration {
    /// The backend is not the authoritative store
    NotApplicable(StoreBackend),
    Finished(MigrationOutcome),
    Failed(qagallery_core::Error),
}

struct App {
    config: Config,
    gallery: Gallery,
    migration: StartupMigration,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from("qagallery.toml"));
    let mut config = load_config(&config_path)?;
    if let Some(backend) = cli.backend {
        config.store.backend = backend;
    }

    let mut log_settings = LogSettings::from(config.logging.clone());
    if cli.verbose {
        log_settings = log_settings.with_level("debug");
    }
    let _log_guard = init_logging(Some(log_settings)).map_err(|e| anyhow::anyhow!("Failed to start logging: {}", e))?;

    if cli.verbose {
        println!("{} Using config: {}", "Info:".blue().bold(), config_path.display());
        println!("{} Store backend: {}", "Info:".blue().bold(), config.store.backend.cyan());
    }

    let app = open_app(config).await?;
    report_startup_migration(&app.migration, cli.verbose);

    let result = match cli.command {
        Commands::List { query, json } => cmd_list(&app, query.as_deref(), json).await,
        Commands::Show { id } => cmd_show(&app, id).await,
        Commands::Add { fields } => cmd_add(&app, fields.into_draft()).await,
        Commands::Edit { id, title, description, answer, tags } => {
            let patch = QuestionPatch { title, description, answer, tags: tags.as_deref().map(parse_tag_input) };
            cmd_edit(&app, id, patch).await
        }
        Commands::Delete { id } => cmd_delete(&app, id).await,
        Commands::Migrate => cmd_migrate(&app),
        Commands::Stash { fields } => cmd_stash(&app, fields.into_draft()).await,
    };

    app.gallery.close();
    result
}

/// Load config from file, or use defaults when there is none
fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load_or_default(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(config.resolve_paths(&cwd))
}

/// Open the configured store. For SQLite, the local cache is migrated into
/// it first, exactly once.
async fn open_app(config: Config) -> Result<App> {
    let retry = config.fetch.retry_config();

    let (store, migration): (Arc<dyn QuestionStore>, StartupMigration) = match config.store.backend {
        StoreBackend::Memory => (Arc::new(MemoryQuestionStore::seeded()), StartupMigration::NotApplicable(StoreBackend::Memory)),
        StoreBackend::Local => {
            let cache = open_cache(&config).await?;
            (Arc::new(LocalQuestionStore::new(cache)), StartupMigration::NotApplicable(StoreBackend::Local))
        }
        StoreBackend::Sqlite => {
            let db_path = &config.store.database_path;
            let store = SqliteQuestionStore::open(db_path)
                .await
                .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
            let store: Arc<dyn QuestionStore> = Arc::new(store);

            let cache = open_cache(&config).await?;
            let migration = match MigrationRunner::new(cache, Arc::clone(&store)).run().await {
                Ok(outcome) => StartupMigration::Finished(outcome),
                Err(e) => StartupMigration::Failed(e),
            };
            (store, migration)
        }
    };

    Ok(App { gallery: Gallery::new(store, retry), config, migration })
}

async fn open_cache(config: &Config) -> Result<Arc<LocalCache>> {
    let path = &config.store.local_cache_path;
    let cache = LocalCache::open(path)
        .await
        .with_context(|| format!("Failed to open local cache at {}", path.display()))?;
    Ok(Arc::new(cache))
}

fn report_startup_migration(migration: &StartupMigration, verbose: bool) {
    match migration {
        StartupMigration::Failed(e) => {
            eprintln!("{} Local questions were not fully migrated: {}", "Warning:".yellow().bold(), e);
            eprintln!("{} They stay in the local cache and will be retried next run", "Info:".blue().bold());
        }
        StartupMigration::Finished(MigrationOutcome::Complete { migrated, .. }) => {
            println!("{} Moved {} question(s) from the local cache", "Info:".blue().bold(), migrated);
        }
        StartupMigration::Finished(MigrationOutcome::NothingToMigrate) | StartupMigration::NotApplicable(_) => {
            if verbose {
                println!("{} Nothing to migrate", "Info:".blue().bold());
            }
        }
    }
}

async fn cmd_list(app: &App, query: Option<&str>, json: bool) -> Result<()> {
    let state = match query {
        Some(query) => app.gallery.search(query).await,
        None => app.gallery.list().await,
    };
    let questions = settled_questions(state)?;

    if json {
        println!("{}", serde_json::to_string_pretty(questions.as_slice())?);
        return Ok(());
    }

    if questions.is_empty() {
        match query {
            Some(query) if !query.is_empty() => println!("{} No questions match '{}'", "Info:".blue().bold(), query),
            _ => println!("{} No questions yet", "Info:".blue().bold()),
        }
        return Ok(());
    }

    for question in questions.iter() {
        println!("{}", summary_line(question));
    }
    Ok(())
}

async fn cmd_show(app: &App, id: QuestionId) -> Result<()> {
    let question = app
        .gallery
        .get(id)
        .await?
        .with_context(|| format!("No question with id {}", id))?;

    println!("{}", question.title.green().bold().underline());
    println!("{} {}", "Asked:".blue().bold(), question.created_at.format("%Y-%m-%d %H:%M UTC"));
    if !question.tags.is_empty() {
        println!("{} {}", "Tags:".blue().bold(), question.tags.join(", ").cyan());
    }
    println!();
    println!("{}", question.description);
    println!();
    println!("{}", "Answer".green().bold());
    println!("{}", question.answer);
    Ok(())
}

async fn cmd_add(app: &App, draft: QuestionDraft) -> Result<()> {
    let question = app.gallery.create(draft).await?;
    println!("{} Added question {}", "Success:".green().bold(), question.id.cyan());
    Ok(())
}

async fn cmd_edit(app: &App, id: QuestionId, patch: QuestionPatch) -> Result<()> {
    if patch.is_empty() {
        anyhow::bail!("Nothing to change; pass at least one of --title, --description, --answer, --tags");
    }
    app.gallery.update(id, patch).await?;
    println!("{} Updated question {}", "Success:".green().bold(), id.cyan());
    Ok(())
}

async fn cmd_delete(app: &App, id: QuestionId) -> Result<()> {
    app.gallery.delete(id).await?;
    println!("{} Deleted question {}", "Success:".green().bold(), id.cyan());
    Ok(())
}

fn cmd_migrate(app: &App) -> Result<()> {
    match &app.migration {
        StartupMigration::NotApplicable(backend) => {
            println!("{} The {} backend does not migrate the local cache", "Info:".blue().bold(), backend);
        }
        StartupMigration::Finished(MigrationOutcome::NothingToMigrate) => {
            println!("{} The local cache holds no questions", "Info:".blue().bold());
        }
        StartupMigration::Finished(MigrationOutcome::Complete { migrated, skipped }) => {
            println!("{} Migrated {} question(s)", "Success:".green().bold(), migrated);
            if *skipped > 0 {
                println!("  {} had already been moved by an earlier run", skipped);
            }
        }
        StartupMigration::Failed(e) => {
            if let Some(failure) = e.as_migration_failure() {
                for draft in &failure.pending {
                    println!("  pending: {}", draft.title);
                }
            }
            anyhow::bail!("Migration incomplete: {}", e);
        }
    }
    Ok(())
}

/// Write a draft into the local cache tier, bypassing the configured backend
async fn cmd_stash(app: &App, draft: QuestionDraft) -> Result<()> {
    let cache = open_cache(&app.config).await?;
    let question = LocalQuestionStore::new(cache).create(draft).await?;
    println!(
        "{} Stashed question {} in {}",
        "Success:".green().bold(),
        question.id.cyan(),
        sanitize_path(&app.config.store.local_cache_path)
    );
    Ok(())
}

fn settled_questions(state: QueryState) -> Result<Arc<Vec<Question>>> {
    match state {
        QueryState::Ready(questions) => Ok(questions),
        QueryState::Failed(failure) => Err(anyhow::anyhow!(failure)),
        QueryState::Loading => anyhow::bail!("Questions are still loading"),
    }
}

fn summary_line(question: &Question) -> String {
    let tags = if question.tags.is_empty() { String::new() } else { format!(" [{}]", question.tags.join(", ")) };
    format!(
        "{:>14}  {}  {}{}",
        question.id.to_string().cyan(),
        question.created_at.format("%Y-%m-%d"),
        question.title.bold(),
        tags.yellow()
    )
}
