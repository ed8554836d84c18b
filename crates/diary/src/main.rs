//! Diary CLI - personal notes grouped by recency.

mod config;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use diary_core::{
    parse_human_date, plan_save, DiaryService, Note, NoteStore, SaveOutcome, Session,
};
use diary_files::FilesStore;
use diary_remote::RemoteStore;
use diary_sqlite::SqliteStore;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::{Backend, Config, SavedSession, DIARY_DIR, SQLITE_FILE};

#[derive(Parser)]
#[command(name = "diary", about = "Personal notes grouped by recency", version)]
struct Cli {
    /// Diary directory (defaults to the nearest .diary above the current directory)
    #[arg(long, global = true, env = "DIARY_DIR")]
    dir: Option<PathBuf>,
    /// Storage backend, overriding the diary's config
    #[arg(long, global = true, env = "DIARY_BACKEND", value_enum)]
    backend: Option<Backend>,
    /// Base URL of the remote API
    #[arg(long, global = true, env = "DIARY_API_URL")]
    api_url: Option<String>,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new diary in the current directory
    Init {
        /// Delete the existing diary and reinitialize
        #[arg(long)]
        reinitialize: bool,
    },
    /// Create an account and log in
    Register {
        username: String,
        /// Password (remote backend only)
        #[arg(long, env = "DIARY_PASSWORD")]
        password: Option<String>,
    },
    /// Log in as an existing user
    Login {
        username: String,
        /// Password (remote backend only)
        #[arg(long, env = "DIARY_PASSWORD")]
        password: Option<String>,
    },
    /// Forget the saved session
    Logout,
    /// List notes grouped by recency
    Ls {
        /// Case-insensitive header filter
        query: Option<String>,
        /// Reference time for grouping (e.g., "yesterday", "2024-01-01")
        #[arg(long)]
        now: Option<String>,
        /// Print the groups as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one or more notes
    Show {
        /// Comma-separated note IDs
        ids: String,
        /// Only show the first n lines of each note body
        #[arg(short = 'n', long)]
        head: Option<usize>,
    },
    /// Add a new note
    Add {
        /// Note header
        #[arg(long, default_value = "")]
        header: String,
        /// Note body (reads from stdin if not provided)
        #[arg(long)]
        body: Option<String>,
    },
    /// Edit a note; emptying both header and body deletes it
    Edit {
        /// Note ID
        id: i64,
        /// New header
        #[arg(long)]
        header: Option<String>,
        /// New body (reads from stdin if not provided and stdin is not a tty;
        /// empty stdin keeps the current body)
        #[arg(long)]
        body: Option<String>,
        /// Delete without asking when the note is emptied
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete one or more notes
    Rm {
        /// Comma-separated note IDs
        ids: String,
    },
    /// Search headers and bodies with regular expressions
    Grep {
        /// Search pattern (regex)
        pattern: String,
        /// Case-sensitive search
        #[arg(short = 'C', long)]
        case_sensitive: bool,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("diary={}", level).parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();
}

fn parse_ids(ids: &str) -> Result<Vec<i64>> {
    ids.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().context(format!("Invalid note ID: {}", s)))
        .collect()
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read from stdin")?;
    Ok(buf)
}

fn is_stdin_tty() -> bool {
    atty::is(atty::Stream::Stdin)
}

fn confirm_delete(id: i64) -> Result<bool> {
    eprint!("Delete note {}? [y/N] ", id);
    io::stderr().flush().context("Failed to write prompt")?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read answer")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Report each missing note on stderr and exit with status 1.
fn exit_if_missing(ids: &[i64]) {
    if ids.is_empty() {
        return;
    }
    for id in ids {
        eprintln!("Note {} not found", id);
    }
    std::process::exit(1);
}

fn print_summary(note: &Note) {
    println!("  {}: {} ({})", note.id, note.display_header(), note.created_at);
}

fn require_session(saved: Option<SavedSession>, backend: Backend) -> Result<Session> {
    match saved {
        Some(saved) => saved.for_backend(backend),
        None => bail!("Not logged in. Run 'diary register <username>' or 'diary login <username>'."),
    }
}

fn init(cli: &Cli, reinitialize: bool) -> Result<()> {
    let diary_dir = cli.dir.clone().unwrap_or_else(|| PathBuf::from(DIARY_DIR));

    if diary_dir.exists() {
        if reinitialize {
            config::remove_diary_files(&diary_dir)?;
        } else if Config::exists(&diary_dir) {
            bail!("Diary is already initialized in {}. Use --reinitialize to delete and recreate.", diary_dir.display());
        }
    }
    std::fs::create_dir_all(&diary_dir).context("Failed to create diary directory")?;

    let config = Config {
        backend: cli.backend.unwrap_or_default(),
        api_url: cli.api_url.clone(),
    };
    match config.backend {
        Backend::Sqlite => {
            SqliteStore::open(diary_dir.join(SQLITE_FILE)).context("Failed to create database")?;
        }
        Backend::Files => {
            FilesStore::open(&diary_dir).context("Failed to create database")?;
        }
        Backend::Remote => {
            if config.api_url.is_none() {
                bail!("The remote backend needs --api-url");
            }
        }
    }
    config.save(&diary_dir)?;

    let verb = if reinitialize { "Reinitialized" } else { "Initialized" };
    println!("{} diary ({}) in {}", verb, config.backend, diary_dir.display());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Commands::Init { reinitialize } = cli.command {
        return init(&cli, reinitialize);
    }

    // All other commands need an initialized diary
    let diary_dir = config::get_diary_dir(cli.dir.clone())?;
    let config = Config::load(&diary_dir)?;
    let backend = cli.backend.unwrap_or(config.backend);
    let saved = config::load_session(&diary_dir)?;
    debug!(%backend, dir = %diary_dir.display(), "opening diary");

    match backend {
        Backend::Sqlite => {
            let store = SqliteStore::open(diary_dir.join(SQLITE_FILE))
                .context("Failed to open database")?;
            run(DiaryService::new(store), cli.command, &diary_dir, backend, saved).await
        }
        Backend::Files => {
            let store = FilesStore::open(&diary_dir).context("Failed to open database")?;
            run(DiaryService::new(store), cli.command, &diary_dir, backend, saved).await
        }
        Backend::Remote => {
            let api_url = cli
                .api_url
                .or(config.api_url)
                .context("No API URL configured. Pass --api-url or set DIARY_API_URL.")?;
            let mut store = RemoteStore::new(&api_url)?;
            let token = saved
                .as_ref()
                .filter(|s| s.backend == Backend::Remote)
                .and_then(|s| s.session.token.clone());
            if let Some(token) = token {
                store = store.with_token(token);
            }
            run(DiaryService::new(store), cli.command, &diary_dir, backend, saved).await
        }
    }
}

async fn run<D: NoteStore>(
    service: DiaryService<D>,
    command: Commands,
    diary_dir: &Path,
    backend: Backend,
    saved: Option<SavedSession>,
) -> Result<()> {
    match command {
        Commands::Init { .. } => unreachable!(),

        Commands::Register { username, password } => {
            let session = service.register(&username, password.as_deref()).await?;
            println!("Registered {} (user {})", session.username, session.user_id);
            config::save_session(diary_dir, backend, session)?;
        }

        Commands::Login { username, password } => {
            let session = service.authenticate(&username, password.as_deref()).await?;
            println!("Logged in as {}", session.username);
            config::save_session(diary_dir, backend, session)?;
        }

        Commands::Logout => {
            if config::clear_session(diary_dir)? {
                println!("Logged out");
            } else {
                println!("Not logged in");
            }
        }

        Commands::Ls { query, now, json } => {
            let user = require_session(saved, backend)?;
            let current = Local::now().naive_local();
            let now = match now {
                Some(s) => {
                    parse_human_date(&s, current).ok_or_else(|| anyhow!("Invalid date: {}", s))?
                }
                None => current,
            };

            let groups = service
                .list(user.user_id, query.as_deref().unwrap_or(""), now)
                .await?;
            if json {
                let out = serde_json::to_string_pretty(&groups).context("Failed to serialize notes")?;
                println!("{}", out);
                return Ok(());
            }
            if groups.is_empty() {
                eprintln!("No notes found");
            }
            for (i, group) in groups.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                println!("{}", group.label());
                for note in &group.notes {
                    print_summary(note);
                }
            }
        }

        Commands::Show { ids, head } => {
            let user = require_session(saved, backend)?;
            let ids = parse_ids(&ids)?;
            if ids.is_empty() {
                eprintln!("No note IDs provided");
                std::process::exit(1);
            }

            let mut not_found = Vec::new();
            let mut first = true;

            for id in &ids {
                match service.get_note(user.user_id, *id).await? {
                    Some(note) => {
                        if !first {
                            println!("\n{}\n", "=".repeat(40));
                        }
                        first = false;

                        println!("# {}\n", note.display_header());

                        if let Some(n) = head {
                            let lines: Vec<&str> = note.body.lines().take(n).collect();
                            println!("{}", lines.join("\n"));
                            if note.body.lines().count() > n {
                                println!("...");
                            }
                        } else {
                            println!("{}", note.body);
                        }

                        println!("\n---\n");
                        println!("Created: {}", note.created_at);
                        println!("Last modified: {}", note.updated_at);
                    }
                    None => not_found.push(*id),
                }
            }

            if !first && !not_found.is_empty() {
                eprintln!();
            }
            exit_if_missing(&not_found);
        }

        Commands::Add { header, body } => {
            let user = require_session(saved, backend)?;
            let body = match body {
                Some(b) => b,
                None => read_stdin()?,
            };

            match service.save(user.user_id, plan_save(None, &header, &body)).await? {
                SaveOutcome::Created(note) => println!("Added note {}", note.id),
                _ => {
                    eprintln!("Nothing to save");
                    std::process::exit(1);
                }
            }
        }

        Commands::Edit {
            id,
            header,
            body,
            yes,
        } => {
            let user = require_session(saved, backend)?;
            let Some(existing) = service.get_note(user.user_id, id).await? else {
                exit_if_missing(&[id]);
                return Ok(());
            };

            let header = header.unwrap_or(existing.header);
            let body = match body {
                Some(b) => b,
                None if !is_stdin_tty() => {
                    let input = read_stdin()?;
                    if input.trim().is_empty() {
                        existing.body
                    } else {
                        input
                    }
                }
                None => existing.body,
            };

            let action = plan_save(Some(id), &header, &body);
            match service.save(user.user_id, action).await? {
                SaveOutcome::Updated(id) => println!("Edited note {}", id),
                SaveOutcome::NeedsConfirmation(id) => {
                    if !yes && !confirm_delete(id)? {
                        println!("Kept note {}", id);
                    } else if service.delete_note(user.user_id, id).await? {
                        println!("Deleted note {}", id);
                    } else {
                        exit_if_missing(&[id]);
                    }
                }
                _ => exit_if_missing(&[id]),
            }
        }

        Commands::Rm { ids } => {
            let user = require_session(saved, backend)?;
            let ids = parse_ids(&ids)?;
            if ids.is_empty() {
                eprintln!("No note IDs provided");
                std::process::exit(1);
            }

            let mut deleted = Vec::new();
            let mut not_found = Vec::new();

            for id in &ids {
                if service.delete_note(user.user_id, *id).await? {
                    deleted.push(*id);
                } else {
                    not_found.push(*id);
                }
            }

            for id in &deleted {
                println!("Deleted note {}", id);
            }
            exit_if_missing(&not_found);
        }

        Commands::Grep {
            pattern,
            case_sensitive,
        } => {
            let user = require_session(saved, backend)?;
            let notes = service.grep(user.user_id, &pattern, case_sensitive).await?;
            for note in notes {
                println!(
                    "{}: {} ({}) -- {}",
                    note.id,
                    note.display_header(),
                    note.created_at,
                    note.preview(80)
                );
            }
        }
    }

    Ok(())
}
