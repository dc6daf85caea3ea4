//! # devassist CLI
//!
//! Every command operates on one workspace, given by `--workspace` or by
//! `[workspace].root` in the config file.
//!
//! ## Usage
//!
//! ```bash
//! devassist --workspace ./project <command>
//! devassist --config ./devassist.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `devassist ls [path]` | List a workspace directory |
//! | `devassist read <path>` | Print a file with function, class and TODO hints |
//! | `devassist search <term>` | Keyword search with surrounding lines |
//! | `devassist semantic <query>` | Semantic search over the workspace index |
//! | `devassist index status\|rebuild` | Inspect or rebuild the semantic index |
//! | `devassist test <path>` | Run pytest, jest or mocha |
//! | `devassist lint <path>` | Run flake8, pylint or mypy |
//! | `devassist context` | Project files, folders and imports |
//! | `devassist serve` | Start the HTTP tool server |
//!
//! `--json` prints the raw result object instead of the text rendering.
//! Logs go to stderr; set `RUST_LOG=devassist=debug` for detail.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use devassist::config::{load_config, Config};
use devassist::keyword::KeywordQuery;
use devassist::models::{
    ContextSnapshot, DirListing, EntryKind, ExecutionResult, FileView, IndexStatus, SearchHit,
    SemanticOutcome,
};
use devassist::server;
use devassist::workspace::Workspace;

const DEFAULT_CONFIG: &str = "./devassist.toml";

/// Workspace-bounded code intelligence: sandboxed file access, project
/// context, keyword and semantic search, test and lint orchestration.
#[derive(Parser)]
#[command(name = "devassist", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When omitted, `./devassist.toml` is used if present; otherwise all
    /// defaults apply.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workspace root. Overrides `[workspace].root`.
    #[arg(long, short = 'w', global = true)]
    workspace: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the entries of a workspace directory.
    Ls {
        /// Workspace-relative directory.
        #[arg(default_value = "")]
        path: String,
    },

    /// Print a workspace file with its structural hints.
    Read { path: String },

    /// Case-insensitive keyword search across the workspace.
    Search {
        term: String,

        /// Glob matched against file names.
        #[arg(long, default_value = "*")]
        pattern: String,

        /// Lines of context on each side of a match.
        #[arg(long, default_value_t = 2)]
        context: usize,

        /// Treat the term as a regular expression.
        #[arg(long)]
        regex: bool,
    },

    /// Semantic search. Builds the index on first use.
    Semantic {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Inspect or rebuild the semantic index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Run tests at a workspace path.
    Test {
        path: String,

        /// `pytest`, `jest` or `mocha`.
        #[arg(long, default_value = "pytest")]
        framework: String,

        /// Hard deadline in seconds (default from `[execution]`).
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Run a linter or type checker at a workspace path.
    Lint {
        path: String,

        /// `flake8`, `pylint` or `mypy`.
        #[arg(long, default_value = "flake8")]
        tool: String,

        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show project files, folders and imports.
    Context {
        /// Crawl again instead of using the cached snapshot.
        #[arg(long)]
        refresh: bool,

        /// Print the short text digest only.
        #[arg(long)]
        summary: bool,
    },

    /// Start the HTTP tool server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Report the index state without building it.
    Status,
    /// Discard the index and build it again.
    Rebuild,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => load_config(Path::new(DEFAULT_CONFIG))?,
        None => {
            let root = cli
                .workspace
                .clone()
                .context("no config file found; pass --workspace or --config")?;
            Config::minimal(root)
        }
    };
    if let Some(root) = &cli.workspace {
        config.workspace.root = root.clone();
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let ws = Workspace::open(config)?;
    let json = cli.json;

    match cli.command {
        Commands::Ls { path } => {
            let listing = ws.list_dir(&path)?;
            if json {
                print_json(&listing)?;
            } else {
                print_listing(&listing);
            }
        }
        Commands::Read { path } => {
            let view = ws.read_file(&path)?;
            if json {
                print_json(&view)?;
            } else {
                print_file(&view);
            }
        }
        Commands::Search {
            term,
            pattern,
            context,
            regex,
        } => {
            let hits = ws
                .search_keyword(KeywordQuery {
                    term,
                    file_pattern: pattern,
                    context_lines: context,
                    regex,
                })
                .await?;
            if json {
                print_json(&hits)?;
            } else {
                print_hits(&hits);
            }
        }
        Commands::Semantic { query, top_k } => {
            let outcome = ws.search_semantic(&query, top_k).await;
            if json {
                print_json(&outcome)?;
            } else {
                print_semantic(&outcome);
            }
        }
        Commands::Index { action } => {
            let status = match action {
                IndexAction::Status => ws.index_status(),
                IndexAction::Rebuild => ws.rebuild_index().await,
            };
            if json {
                print_json(&status)?;
            } else {
                print_index_status(&status);
            }
        }
        Commands::Test {
            path,
            framework,
            timeout,
        } => {
            let result = ws.run_tests(&path, &framework, timeout).await?;
            if json {
                print_json(&result)?;
            } else {
                print_execution(&result);
            }
        }
        Commands::Lint {
            path,
            tool,
            timeout,
        } => {
            let result = ws.analyze(&path, &tool, timeout).await?;
            if json {
                print_json(&result)?;
            } else {
                println!("{}", result.summary);
                for issue in &result.issues {
                    println!("  {}: {}", issue.location, issue.message);
                }
                if result.issue_count > result.issues.len() {
                    println!("  ... {} more", result.issue_count - result.issues.len());
                }
            }
        }
        Commands::Context { refresh, summary } => {
            if summary {
                if refresh {
                    ws.project_context(true).await?;
                }
                let text = ws.project_summary().await?;
                if json {
                    print_json(&serde_json::json!({ "summary": text }))?;
                } else {
                    println!("{}", text);
                }
            } else {
                let snapshot = ws.project_context(refresh).await?;
                if json {
                    print_json(&*snapshot)?;
                } else {
                    print_snapshot(&snapshot);
                }
            }
        }
        Commands::Serve => {
            server::run_server(Arc::new(ws)).await?;
        }
    }

    Ok(())
}

// ============ Text rendering ============

fn print_listing(listing: &DirListing) {
    for entry in &listing.entries {
        match entry.kind {
            EntryKind::Directory => println!("{:>10}  {}/", "-", entry.name),
            EntryKind::File => println!("{:>10}  {}", entry.size.unwrap_or(0), entry.name),
        }
    }
}

fn print_file(view: &FileView) {
    println!("{}", view.content);
    let a = &view.analysis;
    if a.functions.is_empty() && a.classes.is_empty() && a.todos.is_empty() && a.deprecated.is_empty()
    {
        return;
    }
    println!("--- {} ---", view.path);
    for f in &a.functions {
        println!("function {} (line {})", f.name, f.line);
    }
    for c in &a.classes {
        println!("class {} (line {})", c.name, c.line);
    }
    for t in &a.todos {
        println!("{} line {}: {}", t.kind, t.line, t.message);
    }
    for d in &a.deprecated {
        println!("deprecated line {}: {}", d.line, d.content);
    }
}

fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No matches.");
        return;
    }
    for hit in hits {
        println!("{}:{}", hit.file, hit.line);
        for line in hit.context.lines() {
            println!("    {}", line);
        }
        println!();
    }
}

fn print_semantic(outcome: &SemanticOutcome) {
    match outcome {
        SemanticOutcome::Advisory { message } => println!("{}", message),
        SemanticOutcome::Answer(answer) => {
            if let Some(response) = &answer.response {
                println!("{}\n", response);
            }
            for (i, p) in answer.passages.iter().enumerate() {
                println!("{}. [{:.3}] {} (chunk {})", i + 1, p.score, p.file, p.chunk_index);
                for line in p.text.lines().take(6) {
                    println!("    {}", line);
                }
                println!();
            }
        }
    }
}

fn print_index_status(status: &IndexStatus) {
    match status {
        IndexStatus::Unloaded => println!("unloaded"),
        IndexStatus::Building => println!("building"),
        IndexStatus::Unavailable { reason } => println!("unavailable: {}", reason),
        IndexStatus::Ready {
            model,
            documents,
            chunks,
        } => println!("ready: {} documents, {} chunks ({})", documents, chunks, model),
    }
}

fn print_execution(result: &ExecutionResult) {
    let c = &result.counts;
    println!(
        "{}: {} (total {}, passed {}, failed {}, errors {}, skipped {}) in {}ms",
        result.framework,
        result.status.as_str(),
        c.total,
        c.passed,
        c.failed,
        c.errors,
        c.skipped,
        result.duration_ms
    );
    if !result.output_snippet.is_empty() {
        println!("\n{}", result.output_snippet);
    }
    if let Some(suggestion) = &result.suggestion {
        println!("\nSuggested fix:\n{}", suggestion);
    }
}

fn print_snapshot(snapshot: &ContextSnapshot) {
    println!("Folders ({}):", snapshot.folders.len());
    for folder in &snapshot.folders {
        println!("  {}/", folder);
    }
    println!("Files ({}):", snapshot.files.len());
    for file in &snapshot.files {
        match snapshot.imports.get(file) {
            Some(imports) => println!("  {}  [{}]", file, imports.join(", ")),
            None => println!("  {}", file),
        }
    }
}
