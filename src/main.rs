use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docsift::engine::Engine;
use docsift::model::IngestReport;
use docsift::pipeline::IngestRequest;
use docsift::{config, logging};
use serde_json::{Value, json};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "docsift",
    about = "Ingest documents and search them with vector, keyword, and live-scan fallback"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a file, or every file under a directory.
    Ingest {
        owner: String,
        path: PathBuf,
        /// Display name for a single file.
        #[arg(long)]
        name: Option<String>,
        /// MIME type; guessed from the extension when omitted.
        #[arg(long)]
        mime: Option<String>,
    },
    /// Report exact and near duplicates for a file without ingesting it.
    Check { owner: String, file: PathBuf },
    /// Search an owner's documents.
    Search {
        owner: String,
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Remove a document from every index and store.
    Purge { document_id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_tracing(true);
    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::init_config().context("failed to load configuration")?;
    let engine = Engine::open(config)
        .await
        .context("failed to open docsift engine")?;

    let mut failed_files = 0;
    let output = match cli.command {
        Command::Ingest {
            owner,
            path,
            name,
            mime,
        } => {
            let (output, failed) = ingest(&engine, &owner, &path, name, mime).await?;
            failed_files = failed;
            output
        }
        Command::Check { owner, file } => {
            let text = read_text(&file)?;
            let report = engine
                .pipeline
                .check(&owner, &text, &file_name(&file))
                .await
                .context("duplicate check failed")?;
            json!({
                "content_hash": report.content_hash,
                "exact_duplicate": report.exact_duplicate,
                "similar_candidates": report.similar_candidates,
            })
        }
        Command::Search {
            owner,
            query,
            limit,
        } => {
            let limit = limit.unwrap_or(config.search_default_limit);
            let cancel = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            let outcome = engine
                .retriever
                .search_with_cancel(&owner, &query, limit, cancel)
                .await
                .context("search failed")?;
            serde_json::to_value(outcome)?
        }
        Command::Purge { document_id } => {
            let report = engine
                .purger
                .purge(&document_id)
                .await
                .with_context(|| format!("failed to purge {document_id}"))?;
            serde_json::to_value(report)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    engine.close().await;
    if failed_files > 0 {
        bail!("{failed_files} file(s) failed to ingest");
    }
    Ok(())
}

/// Ingest every file under `path`, reporting each one separately. A failing file does not
/// stop the batch; the returned count says how many failed.
async fn ingest(
    engine: &Engine,
    owner: &str,
    path: &Path,
    name: Option<String>,
    mime: Option<String>,
) -> Result<(Value, usize)> {
    let files = collect_files(path)?;
    if files.len() > 1 && name.is_some() {
        bail!("--name only applies when ingesting a single file");
    }

    let mut reports = Vec::with_capacity(files.len());
    let mut failed = 0;
    for file in files {
        let path = file.display().to_string();
        match ingest_file(engine, owner, &file, name.as_deref(), mime.as_deref()).await {
            Ok(report) => reports.push(json!({ "path": path, "report": report })),
            Err(err) => {
                tracing::warn!(path = %path, error = %format!("{err:#}"), "File ingestion failed");
                failed += 1;
                reports.push(json!({ "path": path, "error": format!("{err:#}") }));
            }
        }
    }

    let metrics = engine.pipeline.metrics().snapshot();
    tracing::debug!(?metrics, failed, "Ingestion finished");
    Ok((json!({ "documents": reports, "metrics": metrics }), failed))
}

async fn ingest_file(
    engine: &Engine,
    owner: &str,
    file: &Path,
    name: Option<&str>,
    mime: Option<&str>,
) -> Result<IngestReport> {
    let text = read_text(file)?;
    let mime_type = mime.unwrap_or_else(|| guess_mime(file)).to_string();
    let mut request = IngestRequest::new(owner, text, file_name(file), mime_type);
    if let Some(name) = name {
        request = request.with_display_name(name);
    }
    engine
        .pipeline
        .ingest_request(request)
        .await
        .with_context(|| format!("failed to ingest {}", file.display()))
}

fn collect_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("{} is neither a file nor a directory", path.display());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", path.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn read_text(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("md" | "markdown") => "text/markdown",
        Some("html" | "htm") => "text/html",
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        _ => "text/plain",
    }
}
