//! docindex CLI - ingest local files and search them.
//!
//! # Usage
//!
//! ```bash
//! docindex ingest notes.md report.txt --batch week-1
//! docindex search "release checklist" -n 5
//! docindex search "owners" --batch week-1 --json
//! docindex rebuild
//! docindex documents
//! docindex delete <document-id>
//! ```

mod cli;
mod files;
mod output;

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use docindex_retrieval::{IngestReport, RetrievalConfig, RetrievalService, SearchRequest};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, IngestArgs, SearchArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let service = RetrievalService::new(config).await?;

    let result = run(&service, cli.command, cli.json).await;
    finish(&service, result).await
}

/// Retry any pending snapshot write. A failure there is logged so it never
/// masks the command's own result.
async fn finish(service: &RetrievalService, result: Result<()>) -> Result<()> {
    if let Err(e) = service.flush().await {
        error!("Failed to write the vector index snapshot: {e}");
    }
    result
}

fn init_logging(verbose: u8) {
    // Logs go to stderr so JSON on stdout stays parseable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<RetrievalConfig> {
    let mut config = RetrievalConfig::load(cli.config.as_deref())?;
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir.clone_from(data_dir);
    }
    if let Some(backend) = cli.backend {
        config.index_backend = backend.into();
    }
    config.validate()?;
    Ok(config)
}

async fn run(service: &RetrievalService, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Ingest(args) => ingest(service, args, json).await,
        Command::Search(args) => search(service, args, json).await,
        Command::Rebuild => {
            let status = service.rebuild_index().await?;
            info!("Index rebuilt with {} entries", status.entries);
            print(json, &status, output::format_status);
            Ok(())
        }
        Command::Documents => {
            let documents = service.documents().await?;
            print(json, documents.as_slice(), output::format_documents);
            Ok(())
        }
        Command::Delete { id } => {
            let report = service.delete_document(&id).await?;
            print(json, &report, output::format_delete);
            Ok(())
        }
        Command::Status => {
            let status = service.load_index().await?;
            print(json, &status, output::format_status);
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct JsonIngest<'a> {
    path: &'a PathBuf,
    #[serde(flatten)]
    report: &'a IngestReport,
}

async fn ingest(service: &RetrievalService, args: IngestArgs, json: bool) -> Result<()> {
    let mut reports = Vec::with_capacity(args.paths.len());
    let mut failed = 0usize;

    for path in args.paths {
        let result = match files::load_file(&path, args.batch.as_deref()).await {
            Ok(file) => service
                .ingest_document(file.document, &file.text)
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(report) => reports.push((path, report)),
            Err(e) => {
                error!("Failed to ingest {}: {e:#}", path.display());
                failed += 1;
            }
        }
    }

    if json {
        let entries: Vec<JsonIngest<'_>> = reports
            .iter()
            .map(|(path, report)| JsonIngest { path, report })
            .collect();
        println!("{}", output::format_json(&entries));
    } else if !reports.is_empty() {
        println!("{}", output::format_ingest(&reports));
    }

    if failed > 0 {
        bail!("{failed} file(s) could not be ingested");
    }
    Ok(())
}

async fn search(service: &RetrievalService, args: SearchArgs, json: bool) -> Result<()> {
    let mut request = SearchRequest::new(args.query.as_str());
    if let Some(limit) = args.limit {
        request = request.with_k(limit);
    }
    if !args.documents.is_empty() {
        request = request.with_documents(args.documents);
    }
    if let Some(batch) = args.batch {
        request = request.with_batch(batch);
    }

    let results = service.search_chunks(&request).await?;
    let rendered = if json {
        output::format_json(&output::search_json(&args.query, &results))
    } else {
        output::format_search(&args.query, &results)
    };
    println!("{rendered}");
    Ok(())
}

fn print<T: Serialize + ?Sized>(json: bool, value: &T, human: impl Fn(&T) -> String) {
    let rendered = if json {
        output::format_json(value)
    } else {
        human(value)
    };
    println!("{rendered}");
}
