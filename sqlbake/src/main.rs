//! sqlbake CLI
//!
//! Compiles a fixed set of SQL queries against a SQLite database and
//! appends a hash-dispatched table of the precompiled programs to an
//! output source file.
//!
//! # Usage
//!
//! ```text
//! sqlbake [OPTIONS] [DATABASE] [SQL]...
//!
//!   (no arguments)       append a stub that recognizes nothing
//!   DATABASE SQL...      compile each SQL argument
//!   DATABASE             read blank-line-separated queries from stdin
//!
//! Options:
//!   -o, --output <PATH>         Artifact to append to [default: sqlite3.c]
//!       --dialect <DIALECT>     c or rust [default: c]
//!       --function-name <NAME>  Name of the entry routine
//!       --strict-escapes        Escape every control byte in query literals
//!       --config <PATH>         Config file [default: ./sqlbake.toml if present]
//!   -v, --verbose               Increase verbosity (can be repeated)
//!   -q, --quiet                 Only report errors
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sqlbake::input::query_from_bytes;
use sqlbake::{
    Config, Dialect, OutputTarget, QueryBlocks, RunStats, Session, SqliteOracle,
};

/// Bake SQL queries into a precompiled dispatch table
#[derive(Parser)]
#[command(name = "sqlbake")]
#[command(version)]
#[command(about = "Bake SQL queries into a precompiled dispatch table", long_about = None)]
struct Cli {
    /// SQLite database the queries are compiled against
    #[arg(value_name = "DATABASE")]
    database: Option<PathBuf>,

    /// Queries to compile (read from stdin when omitted)
    #[arg(value_name = "SQL")]
    queries: Vec<OsString>,

    /// Artifact the table is appended to (`-` for stdout)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Language of the generated code
    #[arg(long, value_name = "DIALECT")]
    dialect: Option<Dialect>,

    /// Name of the generated entry routine
    #[arg(long, value_name = "NAME")]
    function_name: Option<String>,

    /// Escape every control byte in query literals, not just newline and tab
    #[arg(long)]
    strict_escapes: bool,

    /// Path to a sqlbake.toml config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    /// Settings given on the command line, layered over the config file.
    fn overrides(&self) -> Config {
        Config {
            output: self.output.clone(),
            dialect: self.dialect,
            function_name: self.function_name.clone(),
            strict_escapes: self.strict_escapes.then_some(true),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(stats) => {
            info!(
                "{} submitted, {} compiled, {} duplicate, {} rejected, {} buckets ({} with collisions)",
                stats.submitted,
                stats.compiled,
                stats.duplicates,
                stats.rejected,
                stats.buckets,
                stats.collisions
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

/// Diagnostics go to stderr so they never mix with generated code.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None => {
            let cwd = std::env::current_dir().context("Failed to read working directory")?;
            Ok(Config::discover(cwd)?.unwrap_or_default())
        }
    }
}

fn run(cli: Cli) -> Result<RunStats> {
    let config = load_config(cli.config.as_deref())?.merge(cli.overrides());
    config.validate()?;
    let options = config.emit_options();
    let target = OutputTarget::from_path(config.output());

    let Some(database) = cli.database else {
        warn!("database path or SQL not provided; appending empty function");
        let output = target.open()?;
        let session: Session<SqliteOracle> = Session::new(None, output, options);
        return Ok(session.finish()?);
    };

    let oracle = SqliteOracle::open(&database, options.dialect, options.escape)?;
    let output = target.open()?;
    let mut session = Session::new(Some(oracle), output, options);

    let submitted = if cli.queries.is_empty() {
        info!("reading queries from stdin");
        session.submit_all(QueryBlocks::new(std::io::stdin().lock()))
    } else {
        let queries = cli
            .queries
            .into_iter()
            .map(|q| query_from_bytes(q.into_encoded_bytes()));
        session.submit_all(queries)
    };

    if let Err(e) = submitted {
        session.abandon();
        return Err(e.into());
    }
    Ok(session.finish()?)
}
