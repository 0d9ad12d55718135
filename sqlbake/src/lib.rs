//! # sqlbake
//!
//! Bakes a known set of SQL queries into generated source code, so that at
//! runtime each recognized query is served by precompiled code instead of
//! going through the SQL compiler.
//!
//! ## Pipeline
//!
//! ```text
//! queries -> Oracle -> EntryStore -> DispatchTable -> generated source
//! ```
//!
//! The generated table has two tiers. The entry routine hashes the query
//! it is given and switches on the hash; each hash bucket has its own
//! routine that compares the query against every query in the bucket and
//! runs the matching fragment. Anything else is "not recognized" and the
//! caller falls back to the regular compiler.
//!
//! ## Example
//!
//! ```rust
//! use sqlbake::{CodeFragment, Dialect, DispatchTable, EmitOptions, EntryStore};
//!
//! let mut store = EntryStore::new();
//! store.record("SELECT 1", CodeFragment::new("    one();\n"));
//! store.record("SELECT 2", CodeFragment::new("    two();\n"));
//!
//! let table = DispatchTable::from_store(&store);
//! assert!(table.lookup("SELECT 1").is_some());
//! assert!(table.lookup("SELECT 3").is_none());
//!
//! let source = table.render(&EmitOptions::new(Dialect::C));
//! assert!(source.contains("SQLITE_PRIVATE int sqlite3ExecuteCompiledSql("));
//! ```
//!
//! ## Module Overview
//!
//! - [`hash`] - The 32-bit query hash shared with the generated code
//! - [`escape`] - String literal escaping
//! - [`store`] - Duplicate-suppressing entry store
//! - [`oracle`] - The compilation oracle trait and its SQLite implementation
//! - [`dialect`] - C and Rust spellings of the generated code
//! - [`emit`] - Bucketing and serialization of the dispatch table
//! - [`session`] - Run context with emit-on-exit
//! - [`input`] - Blank-line-separated query reader
//! - [`config`] - `sqlbake.toml`

pub mod config;
pub mod dialect;
pub mod emit;
pub mod escape;
pub mod hash;
pub mod input;
pub mod oracle;
pub mod session;
pub mod store;

use std::path::PathBuf;

use thiserror::Error;

pub use config::{Config, ConfigError};
pub use dialect::Dialect;
pub use emit::{emit, Bucket, DispatchTable, EmitOptions};
pub use escape::{escape, EscapePolicy, NumericEscape};
pub use hash::QueryHash;
pub use input::{InputError, QueryBlocks};
pub use oracle::{Oracle, OracleError, SqliteOracle, VdbeOp, P4};
pub use session::{Output, OutputTarget, RunStats, Session, Submission};
pub use store::{CodeFragment, Entry, EntryStore};

/// Errors that end a generation run.
#[derive(Debug, Error)]
pub enum SqlbakeError {
    #[error("unable to open output {}: {source}", path.display())]
    OpenOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write dispatch table to {target}: {source}")]
    WriteOutput {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Input(#[from] InputError),
}

/// Result type for generation runs.
pub type SqlbakeResult<T> = Result<T, SqlbakeError>;
