use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "litrag")]
#[command(about = "Hybrid retrieval over scientific abstracts: lexical, vector, weighted hybrid and RRF.")]
pub(crate) struct Cli {
    /// Search backend.
    #[arg(long, value_enum, global = true, default_value = "opensearch")]
    pub(crate) backend: Backend,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Backend {
    Opensearch,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Strategy {
    Hybrid,
    Rrf,
    Lexical,
    Vector,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Retrieve the documents that best answer a question.
    Query {
        question: String,

        /// Number of documents to return.
        #[arg(long, default_value_t = 5)]
        amount: usize,

        #[arg(long, value_enum, default_value = "hybrid")]
        strategy: Strategy,

        /// Vector share for hybrid and rrf (default: retrieval.default_weight).
        #[arg(long)]
        weight: Option<f64>,

        /// Extract metadata filters from the question first.
        #[arg(long)]
        self_query: bool,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show the metadata filter extracted from a question.
    Filters { question: String },
    /// Fill the local index from a pre-fragmented dataset.
    Load {
        /// `{"documents": [...]}` with one record per fragment.
        fragments: PathBuf,

        /// Matching dataset with one record per whole abstract.
        #[arg(long)]
        abstracts: Option<PathBuf>,

        #[arg(long, default_value_t = 64)]
        batch_size: usize,
    },
}
