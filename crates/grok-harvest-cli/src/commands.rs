use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "grok-harvest")]
#[command(about = "Aggregate and retrieve Grok Imagine media", long_about = None)]
pub struct Cli {
    /// Site path of the browsing context, e.g. /imagine/favorites or /imagine/post/<id>
    #[arg(long, global = true, default_value = "/imagine/favorites")]
    pub path: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Merge observation batches (JSON arrays of subject records) into the store
    Ingest {
        files: Vec<PathBuf>,
        /// Treat the files as raw post listing responses instead
        #[arg(long)]
        api: bool,
    },
    /// Fold a page scan ({"images": [...], "videos": [...]}) into the pinned post,
    /// or into the session when the path is a prompt page
    Scan { file: PathBuf },
    /// Track generated posts in a session, optionally retrieve them, then export it
    Session {
        files: Vec<PathBuf>,
        /// Retrieve the tracked posts before exporting
        #[arg(long)]
        run: bool,
        /// Directory for the exported session document
        #[arg(long, default_value = ".")]
        export_dir: PathBuf,
    },
    /// Ingest post listing responses from stdin, one JSON document per line
    Follow,
    /// Show store, history and backlog counters for the context
    Stats,
    /// List outstanding assets for the context
    Backlog,
    /// Retrieve the whole backlog sequentially
    Run,
    /// Retrieve every member of the group shown for an asset id
    Group { id: String },
    /// Remove repeated members from every group
    Dedupe,
    /// Clear the media store for the context
    ResetStore,
    /// Forget which assets were already retrieved
    ResetHistory,
    /// Print configuration values
    PrintConfig,
}
