//! tend - keep a directory converged on a desired-state manifest
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! The binary loads a `tend.toml` manifest, registers every resource with a
//! [`tend_core::Coordinator`] and lets it drive a directory-backed runtime
//! until nothing is left to do.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.tend/
//! └── root/              # default apply root
//!     ├── artifacts/     # artifact bytes by entity
//!     ├── config/        # config maps as JSON
//!     └── .tend/         # ownership sidecars
//! ```

pub mod backend;
pub mod cmd;
pub mod manifest;
pub mod paths;
pub mod ui;

pub use paths::*;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tend_schema::Format;

#[derive(Debug, Parser)]
#[command(name = "tend")]
#[command(author, version, about = "tend - desired-state reconciliation for artifacts and configs")]
pub struct Cli {
    /// Log engine decisions at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Converge the runtime on a manifest
    Apply {
        /// Manifest to load
        #[arg(short, long, default_value = MANIFEST_FILE)]
        manifest: PathBuf,
        /// Directory to apply into (defaults to $TEND_HOME/root)
        #[arg(short, long, env = "TEND_ROOT")]
        root: Option<PathBuf>,
        /// Keep running and converge again on every change until Ctrl-C
        #[arg(short, long)]
        watch: bool,
        /// Apply against an in-memory runtime instead of the directory
        #[arg(long)]
        dry_run: bool,
    },
    /// Score a tag expression against a set of active tags
    Score {
        /// Expression such as `prod.eu,dev`
        expr: String,
        /// Active tags, comma separated
        #[arg(short, long, default_value = "")]
        tags: String,
    },
    /// Print the fingerprint of a payload
    Fingerprint {
        file: PathBuf,
        /// Treat the file as a TOML config map instead of raw bytes
        #[arg(long)]
        config: bool,
    },
    /// Render a TOML config map in another format
    Serialize {
        file: PathBuf,
        /// json, config, properties or xml
        #[arg(short, long, default_value = "json")]
        format: Format,
    },
}
