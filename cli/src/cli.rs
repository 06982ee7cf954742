use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use docindex_retrieval::IndexKind;

#[derive(Debug, Parser)]
#[command(
    name = "docindex",
    version,
    about = "Ingest documents and search them by meaning"
)]
pub struct Cli {
    /// Override the data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Similarity index backend
    #[arg(long, value_enum, global = true)]
    pub backend: Option<Backend>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chunk, embed and index files
    Ingest(IngestArgs),
    /// Search indexed chunks
    Search(SearchArgs),
    /// Rebuild the vector index from stored chunks
    Rebuild,
    /// List ingested documents
    Documents,
    /// Delete a document and its chunks
    Delete {
        /// Document id
        id: String,
    },
    /// Load the vector index and show its state
    Status,
}

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Files to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Batch the documents belong to
    #[arg(long)]
    pub batch: Option<String>,
}

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Maximum number of results (defaults to the configured top-k)
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Restrict the search to these document ids (repeatable)
    #[arg(long = "document", value_name = "ID")]
    pub documents: Vec<String>,

    /// Restrict the search to one batch
    #[arg(long, conflicts_with = "documents")]
    pub batch: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Exact,
    Parallel,
}

impl From<Backend> for IndexKind {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Exact => IndexKind::Exact,
            Backend::Parallel => IndexKind::Parallel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_args() {
        let cli = Cli::try_parse_from([
            "docindex",
            "search",
            "release checklist",
            "-n",
            "3",
            "--document",
            "a",
            "--document",
            "b",
            "--json",
        ])
        .unwrap();

        assert!(cli.json);
        let Command::Search(args) = cli.command else {
            panic!("expected search");
        };
        assert_eq!(args.query, "release checklist");
        assert_eq!(args.limit, Some(3));
        assert_eq!(args.documents, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(args.batch, None);
    }

    #[test]
    fn test_batch_conflicts_with_documents() {
        let result = Cli::try_parse_from([
            "docindex", "search", "q", "--document", "a", "--batch", "b",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_ingest_requires_paths() {
        assert!(Cli::try_parse_from(["docindex", "ingest"]).is_err());

        let cli = Cli::try_parse_from([
            "docindex", "-vv", "--backend", "parallel", "ingest", "a.md", "b.txt",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.backend.map(IndexKind::from), Some(IndexKind::Parallel));
        let Command::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        assert_eq!(args.paths.len(), 2);
    }
}
