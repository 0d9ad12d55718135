//! Target dialects for emitted code.
//!
//! A dialect knows how to spell the pieces of a dispatch table in one
//! target language: the per-bucket routines, the hashing entry routine,
//! the empty stub, and the fragment the SQLite oracle produces for a
//! prepared program.
//!
//! | Dialect | Entry signature |
//! |---------|-----------------|
//! | `c`     | `SQLITE_PRIVATE int NAME(Parse *pParse, const char *zSql, char **pzErrMsg)` |
//! | `rust`  | `pub fn NAME(sql: &str, program: &mut Vec<VdbeOp>) -> bool` |
//!
//! The C dialect is meant to be appended to the SQLite amalgamation
//! (`sqlite3.c`), which already provides `u32`, `Parse`, `Vdbe` and the
//! `OP_*` constants. The Rust dialect expects [`VdbeOp`] in scope, or any
//! type with the same `new`, `with_int` and `with_text` constructors.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::escape::{escape_str, EscapePolicy, NumericEscape};
use crate::hash::QueryHash;
use crate::oracle::{VdbeOp, P4};
use crate::store::Entry;

/// Target language of the generated dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// C, appended to the SQLite amalgamation
    #[default]
    C,
    /// Rust
    Rust,
}

impl Dialect {
    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::C => "c",
            Dialect::Rust => "rust",
        }
    }

    /// Entry routine name used when none is configured.
    pub fn default_function_name(&self) -> &'static str {
        match self {
            Dialect::C => "sqlite3ExecuteCompiledSql",
            Dialect::Rust => "execute_compiled_sql",
        }
    }

    /// Escaping policy for query literals in this dialect.
    pub fn escape_policy(&self, strict: bool) -> EscapePolicy {
        if !strict {
            return EscapePolicy::Minimal;
        }
        match self {
            Dialect::C => EscapePolicy::Strict(NumericEscape::Octal),
            Dialect::Rust => EscapePolicy::Strict(NumericEscape::Hex),
        }
    }

    /// Name of the routine handling one bucket.
    pub fn bucket_function_name(&self, function_name: &str, hash: QueryHash) -> String {
        format!("{function_name}_{hash}")
    }

    /// Comment line opening the emitted table.
    pub fn header(&self, entries: usize, buckets: usize) -> String {
        let text = format!("Generated by sqlbake: {entries} queries in {buckets} buckets.");
        match self {
            Dialect::C => format!("/* {text} */\n"),
            Dialect::Rust => format!("// {text}\n"),
        }
    }

    /// Routine matching every entry of one bucket by exact comparison.
    pub fn bucket_routine(
        &self,
        function_name: &str,
        hash: QueryHash,
        entries: &[&Entry],
        policy: EscapePolicy,
    ) -> String {
        let name = self.bucket_function_name(function_name, hash);
        let mut out = String::new();
        match self {
            Dialect::C => {
                out.push_str(&format!(
                    "static int {name}(Parse *pParse, const char *zSql, char **pzErrMsg){{\n"
                ));
                out.push_str("  (void)pzErrMsg;\n");
                for entry in entries {
                    let literal = escape_str(&entry.original, policy);
                    out.push_str(&format!("  if( strcmp(zSql, \"{literal}\")==0 ){{\n"));
                    push_fragment(&mut out, entry.fragment.as_str());
                    out.push_str("    pParse->zTail = zSql+strlen(zSql);\n");
                    out.push_str("    return 1;\n");
                    out.push_str("  }\n");
                }
                out.push_str("  return 0;\n");
                out.push_str("}\n");
            }
            Dialect::Rust => {
                out.push_str("#[allow(unused_variables)]\n");
                out.push_str(&format!(
                    "fn {name}(sql: &str, program: &mut Vec<VdbeOp>) -> bool {{\n"
                ));
                for entry in entries {
                    let literal = escape_str(&entry.original, policy);
                    out.push_str(&format!("    if sql == \"{literal}\" {{\n"));
                    push_fragment(&mut out, entry.fragment.as_str());
                    out.push_str("        return true;\n");
                    out.push_str("    }\n");
                }
                out.push_str("    false\n");
                out.push_str("}\n");
            }
        }
        out
    }

    /// Routine hashing the runtime query and switching to its bucket.
    pub fn entry_routine(&self, function_name: &str, hashes: &[QueryHash]) -> String {
        let mut out = String::new();
        match self {
            Dialect::C => {
                out.push_str(&format!(
                    "SQLITE_PRIVATE int {function_name}(Parse *pParse, const char *zSql, char **pzErrMsg){{\n"
                ));
                out.push_str("  u32 h = 0;\n");
                out.push_str("  const unsigned char *z = (const unsigned char*)zSql;\n");
                out.push_str("  while( *z ){\n");
                out.push_str("    h ^= *z++;\n");
                out.push_str("    h += (h<<1) + (h<<4) + (h<<7) + (h<<8) + (h<<24);\n");
                out.push_str("  }\n");
                out.push_str("  switch( h ){\n");
                for &hash in hashes {
                    let bucket = self.bucket_function_name(function_name, hash);
                    out.push_str(&format!(
                        "    case 0x{hash}u: return {bucket}(pParse, zSql, pzErrMsg);\n"
                    ));
                }
                out.push_str("    default: break;\n");
                out.push_str("  }\n");
                out.push_str("  return 0; /* SQL is not compiled */\n");
                out.push_str("}\n");
            }
            Dialect::Rust => {
                out.push_str(&format!(
                    "pub fn {function_name}(sql: &str, program: &mut Vec<VdbeOp>) -> bool {{\n"
                ));
                out.push_str("    let mut h: u32 = 0;\n");
                out.push_str("    for &b in sql.as_bytes() {\n");
                out.push_str("        h ^= u32::from(b);\n");
                out.push_str("        h = h\n");
                out.push_str("            .wrapping_add(h << 1)\n");
                out.push_str("            .wrapping_add(h << 4)\n");
                out.push_str("            .wrapping_add(h << 7)\n");
                out.push_str("            .wrapping_add(h << 8)\n");
                out.push_str("            .wrapping_add(h << 24);\n");
                out.push_str("    }\n");
                out.push_str("    match h {\n");
                for &hash in hashes {
                    let bucket = self.bucket_function_name(function_name, hash);
                    out.push_str(&format!("        0x{hash} => {bucket}(sql, program),\n"));
                }
                out.push_str("        _ => false,\n");
                out.push_str("    }\n");
                out.push_str("}\n");
            }
        }
        out
    }

    /// Entry routine recognizing nothing.
    pub fn stub_routine(&self, function_name: &str) -> String {
        match self {
            Dialect::C => format!(
                "SQLITE_PRIVATE int {function_name}(Parse *pParse, const char *zSql, char **pzErrMsg){{\n  return 0;\n}}\n"
            ),
            Dialect::Rust => format!(
                "pub fn {function_name}(_sql: &str, _program: &mut Vec<VdbeOp>) -> bool {{\n    false\n}}\n"
            ),
        }
    }

    /// Fragment that rebuilds a prepared program at runtime.
    pub fn program_fragment(&self, ops: &[VdbeOp], policy: EscapePolicy) -> String {
        let mut out = String::new();
        if ops.is_empty() {
            return out;
        }
        match self {
            Dialect::C => {
                out.push_str("    {\n");
                out.push_str("      Vdbe *v = sqlite3GetVdbe(pParse);\n");
                out.push_str("      if( v==0 ) return 0;\n");
                for op in ops {
                    let args = format!("OP_{}, {}, {}, {}", op.opcode, op.p1, op.p2, op.p3);
                    let line = match &op.p4 {
                        None => format!("sqlite3VdbeAddOp3(v, {args});"),
                        Some(P4::Int(value)) => format!("sqlite3VdbeAddOp4Int(v, {args}, {value});"),
                        Some(P4::Text(text)) => format!(
                            "sqlite3VdbeAddOp4(v, {args}, \"{}\", P4_STATIC);",
                            escape_str(text, policy)
                        ),
                    };
                    out.push_str(&format!("      {line}\n"));
                    if op.p5 != 0 {
                        out.push_str(&format!("      sqlite3VdbeChangeP5(v, {});\n", op.p5));
                    }
                }
                out.push_str("    }\n");
            }
            Dialect::Rust => {
                out.push_str("        program.extend_from_slice(&[\n");
                for op in ops {
                    let p4 = match &op.p4 {
                        None => String::new(),
                        Some(P4::Int(value)) => format!(".with_int({value})"),
                        Some(P4::Text(text)) => {
                            format!(".with_text(\"{}\")", escape_str(text, policy))
                        }
                    };
                    out.push_str(&format!(
                        "            VdbeOp::new(\"{}\", {}, {}, {}, {}){p4},\n",
                        op.opcode, op.p1, op.p2, op.p3, op.p5
                    ));
                }
                out.push_str("        ]);\n");
            }
        }
        out
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "c" => Ok(Dialect::C),
            "rust" | "rs" => Ok(Dialect::Rust),
            other => Err(format!("unknown dialect '{other}' (expected 'c' or 'rust')")),
        }
    }
}

/// Returns true if `name` can be used as a routine name in every dialect.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while", "_Alignas", "_Alignof", "_Atomic",
    "_Bool", "_Complex", "_Generic", "_Imaginary", "_Noreturn", "_Static_assert",
    "_Thread_local",
];

const RUST_KEYWORDS: &[&str] = &[
    "_", "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final",
    "macro", "override", "priv", "try", "typeof", "unsized", "virtual", "yield",
];

impl Dialect {
    /// Returns true if `name` is a reserved word of this dialect.
    pub fn is_reserved(&self, name: &str) -> bool {
        let keywords = match self {
            Dialect::C => C_KEYWORDS,
            Dialect::Rust => RUST_KEYWORDS,
        };
        keywords.contains(&name)
    }
}

fn push_fragment(out: &mut String, fragment: &str) {
    out.push_str(fragment);
    if !fragment.is_empty() && !fragment.ends_with('\n') {
        out.push('\n');
    }
}
