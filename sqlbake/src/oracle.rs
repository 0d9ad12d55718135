//! Compilation Oracle
//!
//! The oracle turns one query into the code fragment that implements it.
//! The generator treats it as a black box: it asks once per distinct
//! query, stores what comes back, and skips queries the oracle rejects.
//!
//! [`SqliteOracle`] is backed by a real SQLite database. It validates each
//! query by preparing it, then captures the prepared program through
//! `EXPLAIN` and renders it in the target dialect.

use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use thiserror::Error;
use tracing::{debug, trace};

use crate::dialect::Dialect;
use crate::escape::EscapePolicy;
use crate::store::CodeFragment;

/// Query prepared at open time to force SQLite to load the schema.
const DUMMY_SQL: &str = "SELECT * FROM sqlite_master";

/// Oracle errors.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("unable to open database \"{}\": {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{message}")]
    Rejected { message: String },

    #[error("unable to explain query: {0}")]
    Explain(#[source] rusqlite::Error),

    #[error("failed to close database: {0}")]
    Close(#[source] rusqlite::Error),
}

impl OracleError {
    /// Creates a rejection carrying the oracle's diagnostic.
    pub fn rejected(message: impl Into<String>) -> Self {
        OracleError::Rejected {
            message: message.into(),
        }
    }

    /// Returns true if the error concerns the oracle itself rather than
    /// one query, and the run cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OracleError::Open { .. } | OracleError::Close(_))
    }
}

/// Something that compiles queries into code fragments.
pub trait Oracle {
    /// Compiles one query.
    fn compile(&mut self, sql: &str) -> Result<CodeFragment, OracleError>;

    /// Releases the oracle's resources once no more queries will be sent.
    fn finish(self) -> Result<(), OracleError>
    where
        Self: Sized,
    {
        Ok(())
    }
}

impl<F> Oracle for F
where
    F: FnMut(&str) -> Result<CodeFragment, OracleError>,
{
    fn compile(&mut self, sql: &str) -> Result<CodeFragment, OracleError> {
        self(sql)
    }
}

/// Opcodes whose P4 operand is a plain string.
const TEXT_P4_OPCODES: &[&str] = &[
    "String8",
    "Halt",
    "Explain",
    "Affinity",
    "MakeRecord",
    "Variable",
    "ParseSchema",
    "Trace",
];

/// Opcodes whose P4 points at a value that only prints like an integer.
const POINTER_P4_OPCODES: &[&str] = &["Int64", "Real", "Column"];

/// The P4 operand of an instruction, when it can be rebuilt from text.
///
/// SQLite also stores key descriptions, collations, functions and other
/// pointers in P4. Those have no constant spelling, so programs using
/// them are rejected instead of being represented here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum P4 {
    /// `P4_INT32`
    Int(i32),
    /// `P4_STATIC` string
    Text(String),
}

/// One instruction of a prepared SQLite program, as listed by `EXPLAIN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VdbeOp {
    pub opcode: String,
    pub p1: i64,
    pub p2: i64,
    pub p3: i64,
    pub p4: Option<P4>,
    pub p5: i64,
}

impl VdbeOp {
    /// Creates an instruction without a P4 operand.
    pub fn new(opcode: impl Into<String>, p1: i64, p2: i64, p3: i64, p5: i64) -> Self {
        Self {
            opcode: opcode.into(),
            p1,
            p2,
            p3,
            p4: None,
            p5,
        }
    }

    /// Sets an integer P4 operand.
    pub fn with_int(mut self, value: i32) -> Self {
        self.p4 = Some(P4::Int(value));
        self
    }

    /// Sets a string P4 operand.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.p4 = Some(P4::Text(text.into()));
        self
    }
}

/// Decides how the `EXPLAIN` text of a P4 operand is rebuilt.
fn p4_operand(opcode: &str, text: Option<String>) -> Result<Option<P4>, OracleError> {
    let Some(text) = text else {
        return Ok(None);
    };
    if TEXT_P4_OPCODES.contains(&opcode) {
        return Ok(Some(P4::Text(text)));
    }
    if text.is_empty() {
        return Ok(None);
    }
    if !POINTER_P4_OPCODES.contains(&opcode) {
        if let Ok(value) = text.parse::<i32>() {
            return Ok(Some(P4::Int(value)));
        }
    }
    Err(OracleError::rejected(format!(
        "{opcode} operand {text:?} cannot be baked"
    )))
}

/// Oracle backed by a SQLite database.
pub struct SqliteOracle {
    conn: Connection,
    path: PathBuf,
    dialect: Dialect,
    policy: EscapePolicy,
}

impl SqliteOracle {
    /// Opens (or creates) the database at `path`.
    ///
    /// Fails if the file cannot be opened or is not a SQLite database.
    pub fn open(
        path: impl AsRef<Path>,
        dialect: Dialect,
        policy: EscapePolicy,
    ) -> Result<Self, OracleError> {
        let path = path.as_ref().to_path_buf();
        let open_error = |source| OracleError::Open {
            path: path.clone(),
            source,
        };

        let conn = Connection::open(&path).map_err(open_error)?;
        // Preparing touches the schema, which surfaces corrupt or
        // unreadable files now instead of on the first query.
        conn.prepare(DUMMY_SQL).map_err(open_error)?;
        debug!("opened database {}", path.display());

        Ok(Self {
            conn,
            path,
            dialect,
            policy,
        })
    }

    /// Path of the backing database.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lists the program SQLite prepares for `sql`.
    ///
    /// Rejects programs with a P4 operand that cannot be rebuilt from
    /// its text.
    pub fn explain(&self, sql: &str) -> Result<Vec<VdbeOp>, OracleError> {
        let mut stmt = self
            .conn
            .prepare(&format!("EXPLAIN {sql}"))
            .map_err(OracleError::Explain)?;
        let rows = stmt
            .query_map([], |row| {
                let op = VdbeOp::new(
                    row.get::<_, String>(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(6)?,
                );
                Ok((op, value_text(row.get_ref(5)?)))
            })
            .map_err(OracleError::Explain)?;
        let listed = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(OracleError::Explain)?;

        listed
            .into_iter()
            .map(|(mut op, text)| {
                op.p4 = p4_operand(&op.opcode, text)?;
                Ok(op)
            })
            .collect()
    }
}

impl Oracle for SqliteOracle {
    fn compile(&mut self, sql: &str) -> Result<CodeFragment, OracleError> {
        if sql.trim().is_empty() {
            return Err(OracleError::rejected("empty query"));
        }
        self.conn
            .prepare(sql)
            .map_err(|e| OracleError::rejected(e.to_string()))?;

        let ops = self.explain(sql)?;
        trace!("{} ops for {:?}", ops.len(), sql);
        Ok(CodeFragment::new(
            self.dialect.program_fragment(&ops, self.policy),
        ))
    }

    fn finish(self) -> Result<(), OracleError> {
        debug!("closing database {}", self.path.display());
        self.conn.close().map_err(|(_, e)| OracleError::Close(e))
    }
}

fn value_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(r) => Some(r.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}
