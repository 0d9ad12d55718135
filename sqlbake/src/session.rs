//! Generation session.
//!
//! A [`Session`] is the context of one run: it owns the entry store, the
//! oracle and the open output artifact. Queries are submitted one at a
//! time; the dispatch table is emitted exactly once, by [`Session::finish`]
//! or, if the session is dropped before that on a normal exit path, by its
//! `Drop` impl. A fatal error from [`Session::submit`] or
//! [`Session::submit_all`] discards the output, so no partial table is
//! ever written.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::emit::{emit, DispatchTable, EmitOptions};
use crate::hash::QueryHash;
use crate::input::InputError;
use crate::oracle::Oracle;
use crate::store::EntryStore;
use crate::{SqlbakeError, SqlbakeResult};

/// Where the dispatch table goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Appended to a file, created if missing
    File(PathBuf),
    /// Written to stdout
    Stdout,
}

impl OutputTarget {
    /// `-` selects stdout; anything else is a file path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if path == Path::new("-") {
            OutputTarget::Stdout
        } else {
            OutputTarget::File(path.to_path_buf())
        }
    }

    /// Opens the target for appending.
    pub fn open(&self) -> SqlbakeResult<Output> {
        let writer: Box<dyn Write> = match self {
            OutputTarget::File(path) => Box::new(
                OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(path)
                    .map_err(|source| SqlbakeError::OpenOutput {
                        path: path.clone(),
                        source,
                    })?,
            ),
            OutputTarget::Stdout => Box::new(std::io::stdout()),
        };
        Ok(Output {
            target: self.clone(),
            writer,
        })
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::File(path) => write!(f, "{}", path.display()),
            OutputTarget::Stdout => write!(f, "<stdout>"),
        }
    }
}

/// An opened output artifact.
pub struct Output {
    target: OutputTarget,
    writer: Box<dyn Write>,
}

impl Output {
    /// Wraps an arbitrary writer.
    pub fn from_writer(target: OutputTarget, writer: Box<dyn Write>) -> Self {
        Self { target, writer }
    }

    /// What this output writes to.
    pub fn target(&self) -> &OutputTarget {
        &self.target
    }
}

/// Outcome of submitting one query.
#[derive(Debug)]
pub enum Submission {
    /// Compiled and recorded
    Compiled { hash: QueryHash },
    /// Already recorded; the oracle was not consulted
    Duplicate,
    /// The oracle rejected the query, or it never reached the oracle
    Rejected { reason: String },
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub submitted: usize,
    pub compiled: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub buckets: usize,
    pub collisions: usize,
    pub bytes_written: usize,
}

/// The context of one generation run.
pub struct Session<O: Oracle> {
    store: EntryStore,
    oracle: Option<O>,
    output: Option<Output>,
    options: EmitOptions,
    stats: RunStats,
}

impl<O: Oracle> Session<O> {
    /// Starts a session. Without an oracle every query is rejected and the
    /// emitted table is the stub.
    pub fn new(oracle: Option<O>, output: Output, options: EmitOptions) -> Self {
        Self {
            store: EntryStore::new(),
            oracle,
            output: Some(output),
            options,
            stats: RunStats::default(),
        }
    }

    /// Entries recorded so far.
    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    /// Counters so far.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Compiles and records one query.
    ///
    /// Rejections are reported and counted but are not errors; only a
    /// failure of the oracle itself is.
    pub fn submit(&mut self, sql: &str) -> SqlbakeResult<Submission> {
        self.stats.submitted += 1;

        if self.store.contains(sql) {
            debug!("skipping duplicate query {:?}", sql);
            self.stats.duplicates += 1;
            return Ok(Submission::Duplicate);
        }

        let Some(oracle) = self.oracle.as_mut() else {
            return Ok(self.reject(sql, "no database to compile against".to_string()));
        };

        match oracle.compile(sql) {
            Ok(fragment) => {
                let hash = QueryHash::of_str(sql);
                self.store.record(sql, fragment);
                self.stats.compiled += 1;
                debug!("compiled {:?} into bucket {}", sql, hash);
                Ok(Submission::Compiled { hash })
            }
            Err(e) if e.is_fatal() => Err(self.fail(e.into())),
            Err(e) => Ok(self.reject(sql, e.to_string())),
        }
    }

    /// Submits every query from `queries`, in order.
    ///
    /// Queries that could not be read are reported and skipped; a failing
    /// reader stops the run.
    pub fn submit_all<I>(&mut self, queries: I) -> SqlbakeResult<()>
    where
        I: IntoIterator<Item = Result<String, InputError>>,
    {
        for query in queries {
            match query {
                Ok(sql) => {
                    self.submit(&sql)?;
                }
                Err(e) if e.is_fatal() => return Err(self.fail(e.into())),
                Err(e) => {
                    self.stats.submitted += 1;
                    self.stats.rejected += 1;
                    warn!("{}", e);
                }
            }
        }
        Ok(())
    }

    /// Emits the table, closes the oracle and returns the run counters.
    pub fn finish(mut self) -> SqlbakeResult<RunStats> {
        self.flush()?;
        if let Some(oracle) = self.oracle.take() {
            oracle.finish()?;
        }
        Ok(self.stats.clone())
    }

    /// Ends the session without emitting anything.
    ///
    /// Used when the run failed and a partial table must not be written.
    pub fn abandon(mut self) {
        self.output = None;
        debug!("session abandoned; no dispatch table written");
    }

    /// Discards the output after a fatal error and hands the error back.
    fn fail(&mut self, e: SqlbakeError) -> SqlbakeError {
        if self.output.take().is_some() {
            debug!("fatal error; no dispatch table will be written");
        }
        e
    }

    fn reject(&mut self, sql: &str, reason: String) -> Submission {
        warn!("unable to prepare SQL {:?}: {}", sql, reason);
        self.stats.rejected += 1;
        Submission::Rejected { reason }
    }

    /// Emits the table if that has not happened yet.
    fn flush(&mut self) -> SqlbakeResult<()> {
        let Some(mut output) = self.output.take() else {
            return Ok(());
        };

        let table = DispatchTable::from_store(&self.store);
        let written = emit(&table, &self.options, &mut output.writer).map_err(|source| {
            SqlbakeError::WriteOutput {
                target: output.target.to_string(),
                source,
            }
        })?;

        self.stats.buckets = table.buckets().len();
        self.stats.collisions = table.collision_count();
        self.stats.bytes_written = written;
        info!(
            "wrote {} queries in {} buckets to {}",
            table.entry_count(),
            self.stats.buckets,
            output.target
        );
        Ok(())
    }
}

impl<O: Oracle> Drop for Session<O> {
    fn drop(&mut self) {
        if self.output.is_none() || std::thread::panicking() {
            return;
        }
        debug!("session dropped before finish; emitting dispatch table");
        if let Err(e) = self.flush() {
            error!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::oracle::OracleError;
    use crate::store::CodeFragment;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Writer whose contents stay readable after the session is gone.
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    type TestOracle = fn(&str) -> Result<CodeFragment, OracleError>;

    fn echo(sql: &str) -> Result<CodeFragment, OracleError> {
        if sql.contains("missing") {
            Err(OracleError::rejected("no such table: missing"))
        } else {
            Ok(CodeFragment::new(format!("    /* {sql} */\n")))
        }
    }

    fn session(buf: &SharedBuf) -> Session<TestOracle> {
        let output = Output::from_writer(OutputTarget::Stdout, Box::new(buf.clone()));
        Session::new(Some(echo as TestOracle), output, EmitOptions::new(Dialect::C))
    }

    #[test]
    fn test_submit_outcomes() {
        let buf = SharedBuf::default();
        let mut s = session(&buf);

        assert!(matches!(s.submit("SELECT 1").unwrap(), Submission::Compiled { .. }));
        assert!(matches!(s.submit("SELECT 1").unwrap(), Submission::Duplicate));
        assert!(matches!(
            s.submit("SELECT * FROM missing").unwrap(),
            Submission::Rejected { .. }
        ));

        let stats = s.finish().unwrap();
        assert_eq!(stats.submitted, 3);
        assert_eq!(stats.compiled, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.buckets, 1);
        assert!(buf.text().contains("/* SELECT 1 */"));
        assert!(!buf.text().contains("missing"));
    }

    #[test]
    fn test_oracle_called_once_per_distinct_query() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&calls);
        let oracle = move |sql: &str| {
            seen.borrow_mut().push(sql.to_string());
            Ok::<_, OracleError>(CodeFragment::new(format!("    /* {} */\n", seen.borrow().len())))
        };
        let buf = SharedBuf::default();
        let output = Output::from_writer(OutputTarget::Stdout, Box::new(buf.clone()));
        let mut s = Session::new(Some(oracle), output, EmitOptions::default());
        for sql in ["SELECT 1", "SELECT 2", "SELECT 1"] {
            s.submit(sql).unwrap();
        }
        s.finish().unwrap();

        assert_eq!(*calls.borrow(), ["SELECT 1", "SELECT 2"]);
        // The first fragment for SELECT 1 is the one emitted.
        assert!(buf.text().contains("/* 1 */"));
        assert!(!buf.text().contains("/* 3 */"));
    }

    #[test]
    fn test_drop_emits_once() {
        let buf = SharedBuf::default();
        {
            let mut s = session(&buf);
            s.submit("SELECT 1").unwrap();
        }
        let text = buf.text();
        assert_eq!(text.matches("SQLITE_PRIVATE int sqlite3ExecuteCompiledSql(").count(), 1);
        assert!(text.contains("/* SELECT 1 */"));
    }

    #[test]
    fn test_finish_then_drop_does_not_emit_twice() {
        let buf = SharedBuf::default();
        let mut s = session(&buf);
        s.submit("SELECT 1").unwrap();
        s.finish().unwrap();
        assert_eq!(buf.text().matches("Generated by sqlbake").count(), 1);
    }

    #[test]
    fn test_abandon_writes_nothing() {
        let buf = SharedBuf::default();
        let mut s = session(&buf);
        s.submit("SELECT 1").unwrap();
        s.abandon();
        assert!(buf.text().is_empty());
    }

    /// Yields one chunk of input, then fails.
    struct BrokenPipe {
        sent: bool,
    }

    impl std::io::Read for BrokenPipe {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.sent {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke"));
            }
            self.sent = true;
            let chunk = b"SELECT 1\n\n";
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    fn run_until_error(buf: &SharedBuf) -> SqlbakeResult<RunStats> {
        let mut s = session(buf);
        let reader = std::io::BufReader::new(BrokenPipe { sent: false });
        s.submit_all(crate::input::QueryBlocks::new(reader))?;
        s.finish()
    }

    #[test]
    fn test_fatal_input_error_writes_nothing() {
        let buf = SharedBuf::default();
        let err = run_until_error(&buf).unwrap_err();
        assert!(err.to_string().contains("pipe broke"));
        assert!(buf.text().is_empty());
    }

    #[test]
    fn test_fatal_oracle_error_writes_nothing() {
        fn closing(sql: &str) -> Result<CodeFragment, OracleError> {
            if sql == "SELECT 2" {
                Err(OracleError::Close(rusqlite::Error::InvalidQuery))
            } else {
                echo(sql)
            }
        }

        let buf = SharedBuf::default();
        {
            let output = Output::from_writer(OutputTarget::Stdout, Box::new(buf.clone()));
            let mut s = Session::new(Some(closing as TestOracle), output, EmitOptions::default());
            s.submit("SELECT 1").unwrap();
            assert!(s.submit("SELECT 2").is_err());
            // Dropped here without finish or abandon.
        }
        assert!(buf.text().is_empty());
    }

    #[test]
    fn test_finish_after_fatal_error_writes_nothing() {
        fn opening(_: &str) -> Result<CodeFragment, OracleError> {
            Err(OracleError::Open {
                path: PathBuf::from("gone.db"),
                source: rusqlite::Error::InvalidQuery,
            })
        }

        let buf = SharedBuf::default();
        let output = Output::from_writer(OutputTarget::Stdout, Box::new(buf.clone()));
        let mut s = Session::new(Some(opening as TestOracle), output, EmitOptions::default());
        assert!(s.submit("SELECT 1").is_err());
        s.finish().unwrap();
        assert!(buf.text().is_empty());
    }

    #[test]
    fn test_no_oracle_emits_stub() {
        let buf = SharedBuf::default();
        let output = Output::from_writer(OutputTarget::Stdout, Box::new(buf.clone()));
        let mut s: Session<TestOracle> = Session::new(None, output, EmitOptions::default());
        assert!(matches!(s.submit("SELECT 1").unwrap(), Submission::Rejected { .. }));
        let stats = s.finish().unwrap();
        assert_eq!(stats.buckets, 0);
        assert!(buf.text().contains("{\n  return 0;\n}\n"));
    }

    #[test]
    fn test_submit_all_skips_bad_input() {
        let buf = SharedBuf::default();
        let mut s = session(&buf);
        let queries = vec![
            Ok("SELECT 1".to_string()),
            Err(InputError::NotUtf8 {
                lossy: "SELECT \u{fffd}".to_string(),
            }),
            Ok("SELECT 2".to_string()),
        ];
        s.submit_all(queries).unwrap();
        assert_eq!(s.stats().compiled, 2);
        assert_eq!(s.stats().rejected, 1);
    }

    #[test]
    fn test_output_target_from_path() {
        assert_eq!(OutputTarget::from_path("-"), OutputTarget::Stdout);
        assert_eq!(
            OutputTarget::from_path("sqlite3.c"),
            OutputTarget::File(PathBuf::from("sqlite3.c"))
        );
    }
}
