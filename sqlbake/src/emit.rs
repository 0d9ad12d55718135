//! Table Emitter
//!
//! Serializes the entry store into a two-tier dispatch table: one routine
//! per hash bucket, holding an exact-match chain over the bucket's queries,
//! plus one entry routine that hashes the runtime query and switches to
//! the bucket routine. Keeping the chains per bucket bounds every routine
//! by the collision count of one hash instead of the total query count.
//!
//! Rendering is a pure function of the store contents, so two runs over
//! the same queries in the same order produce byte-identical output.

use std::io::Write;

use tracing::{debug, info};

use crate::dialect::Dialect;
use crate::escape::EscapePolicy;
use crate::hash::QueryHash;
use crate::store::{CodeFragment, Entry, EntryStore};

/// How the table is spelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitOptions {
    pub dialect: Dialect,
    pub function_name: String,
    pub escape: EscapePolicy,
}

impl EmitOptions {
    /// Options with the dialect's default entry routine name.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            function_name: dialect.default_function_name().to_string(),
            escape: EscapePolicy::Minimal,
        }
    }

    /// Sets the entry routine name.
    pub fn with_function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = name.into();
        self
    }

    /// Sets the escaping policy for query literals.
    pub fn with_escape(mut self, escape: EscapePolicy) -> Self {
        self.escape = escape;
        self
    }
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self::new(Dialect::default())
    }
}

/// All entries sharing one hash.
#[derive(Debug, Clone)]
pub struct Bucket<'a> {
    pub hash: QueryHash,
    pub entries: Vec<&'a Entry>,
}

impl<'a> Bucket<'a> {
    /// Runs the exact-match chain.
    pub fn lookup(&self, sql: &str) -> Option<&'a CodeFragment> {
        self.entries
            .iter()
            .copied()
            .find(|entry| entry.original == sql)
            .map(|entry| &entry.fragment)
    }

    /// Returns true if more than one query landed here.
    pub fn has_collision(&self) -> bool {
        self.entries.len() > 1
    }
}

/// The dispatch table over a finished store.
#[derive(Debug, Clone)]
pub struct DispatchTable<'a> {
    buckets: Vec<Bucket<'a>>,
}

impl<'a> DispatchTable<'a> {
    /// Groups the store's entries into buckets, ascending by hash.
    pub fn from_store(store: &'a EntryStore) -> Self {
        let buckets = store
            .buckets()
            .into_iter()
            .map(|(hash, entries)| Bucket { hash, entries })
            .collect();
        Self { buckets }
    }

    /// The buckets, ascending by hash.
    pub fn buckets(&self) -> &[Bucket<'a>] {
        &self.buckets
    }

    /// Total number of entries.
    pub fn entry_count(&self) -> usize {
        self.buckets.iter().map(|b| b.entries.len()).sum()
    }

    /// Number of buckets holding more than one entry.
    pub fn collision_count(&self) -> usize {
        self.buckets.iter().filter(|b| b.has_collision()).count()
    }

    /// Returns true if no query is recognized.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Resolves `sql` the way the generated code does at runtime: hash,
    /// pick the bucket, then compare exactly. `None` is "not recognized".
    pub fn lookup(&self, sql: &str) -> Option<&'a CodeFragment> {
        let hash = QueryHash::of_str(sql);
        let index = self
            .buckets
            .binary_search_by_key(&hash, |bucket| bucket.hash)
            .ok()?;
        self.buckets[index].lookup(sql)
    }

    /// Renders the table source.
    pub fn render(&self, options: &EmitOptions) -> String {
        let dialect = options.dialect;
        let name = options.function_name.as_str();
        let mut out = dialect.header(self.entry_count(), self.buckets.len());

        if self.buckets.is_empty() {
            out.push_str(&dialect.stub_routine(name));
            return out;
        }

        for bucket in &self.buckets {
            out.push_str(&dialect.bucket_routine(name, bucket.hash, &bucket.entries, options.escape));
            out.push('\n');
        }
        let hashes: Vec<QueryHash> = self.buckets.iter().map(|b| b.hash).collect();
        out.push_str(&dialect.entry_routine(name, &hashes));
        out
    }
}

/// Renders the table and writes it to `writer` in one piece.
pub fn emit<W: Write>(
    table: &DispatchTable<'_>,
    options: &EmitOptions,
    writer: &mut W,
) -> std::io::Result<usize> {
    for bucket in table.buckets().iter().filter(|b| b.has_collision()) {
        let queries: Vec<&str> = bucket.entries.iter().map(|e| e.original.as_str()).collect();
        info!("hash collision in bucket {}: {:?}", bucket.hash, queries);
    }

    let text = table.render(options);
    writer.write_all(text.as_bytes())?;
    writer.flush()?;
    debug!(
        "emitted {} bytes ({} entries, {} buckets)",
        text.len(),
        table.entry_count(),
        table.buckets().len()
    );
    Ok(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_of(queries: &[(&str, &str)]) -> EntryStore {
        let mut store = EntryStore::new();
        for (sql, fragment) in queries {
            store.record(sql, CodeFragment::new(*fragment));
        }
        store
    }

    #[test]
    fn test_empty_table_is_stub_only() {
        let store = EntryStore::new();
        let table = DispatchTable::from_store(&store);
        assert!(table.is_empty());
        assert_eq!(table.lookup("SELECT 1"), None);

        let text = table.render(&EmitOptions::new(Dialect::C));
        assert_eq!(
            text,
            "/* Generated by sqlbake: 0 queries in 0 buckets. */\n\
             SQLITE_PRIVATE int sqlite3ExecuteCompiledSql(Parse *pParse, const char *zSql, char **pzErrMsg){\n  return 0;\n}\n"
        );
        assert!(!text.contains("static int"));
    }

    #[test]
    fn test_two_buckets() {
        let store = store_of(&[("SELECT 1", "    one();\n"), ("SELECT 2", "    two();\n")]);
        let table = DispatchTable::from_store(&store);
        assert_eq!(table.buckets().len(), 2);
        assert_eq!(table.collision_count(), 0);
        assert_eq!(table.lookup("SELECT 1").unwrap().as_str(), "    one();\n");
        assert_eq!(table.lookup("SELECT 2").unwrap().as_str(), "    two();\n");
        assert_eq!(table.lookup("SELECT 3"), None);

        let text = table.render(&EmitOptions::new(Dialect::C));
        let first = text.find("static int sqlite3ExecuteCompiledSql_5b90eb0b(").unwrap();
        let second = text.find("static int sqlite3ExecuteCompiledSql_5c90ec9e(").unwrap();
        let entry = text.find("SQLITE_PRIVATE int sqlite3ExecuteCompiledSql(").unwrap();
        assert!(first < second && second < entry);
    }

    #[test]
    fn test_collision_chain_order() {
        let store = store_of(&[
            ("SELECT 379192", "    b();\n"),
            ("SELECT 1", "    one();\n"),
            ("SELECT 162789", "    a();\n"),
        ]);
        let table = DispatchTable::from_store(&store);
        assert_eq!(table.buckets().len(), 2);
        assert_eq!(table.collision_count(), 1);

        assert_eq!(table.lookup("SELECT 162789").unwrap().as_str(), "    a();\n");
        assert_eq!(table.lookup("SELECT 379192").unwrap().as_str(), "    b();\n");
        // Same hash, no matching text.
        assert_eq!(table.lookup("SELECT k4EBTA"), None);

        let text = table.render(&EmitOptions::new(Dialect::Rust));
        let b = text.find("if sql == \"SELECT 379192\"").unwrap();
        let a = text.find("if sql == \"SELECT 162789\"").unwrap();
        assert!(b < a);
        assert_eq!(text.matches("fn execute_compiled_sql_de089b8b(").count(), 1);
    }

    #[test]
    fn test_custom_function_name() {
        let store = store_of(&[("SELECT 1", "")]);
        let table = DispatchTable::from_store(&store);
        let options = EmitOptions::new(Dialect::C).with_function_name("bakedSql");
        let text = table.render(&options);
        assert!(text.contains("static int bakedSql_5b90eb0b("));
        assert!(text.contains("case 0x5b90eb0bu: return bakedSql_5b90eb0b(pParse, zSql, pzErrMsg);"));
    }

    #[test]
    fn test_emit_writes_rendered_text() {
        let store = store_of(&[("SELECT 1", "    one();\n")]);
        let table = DispatchTable::from_store(&store);
        let options = EmitOptions::default();
        let mut out = Vec::new();
        let written = emit(&table, &options, &mut out).unwrap();
        assert_eq!(written, out.len());
        assert_eq!(String::from_utf8(out).unwrap(), table.render(&options));
    }
}
