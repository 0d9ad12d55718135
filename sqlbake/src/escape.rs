//! String literal escaping for generated code.
//!
//! Queries are embedded in the emitted dispatch code as quoted literals
//! inside exact-match comparisons. The minimal policy rewrites only `"`,
//! `\`, newline and tab; every other byte is copied through. Both target
//! dialects accept the four two-character escapes it produces.

/// How numeric escapes are spelled by [`EscapePolicy::Strict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericEscape {
    /// `\ooo`, always three digits so a following digit is never absorbed.
    Octal,
    /// `\xNN`, two digits.
    Hex,
}

/// Which bytes are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscapePolicy {
    /// Quote, backslash, newline and tab only.
    #[default]
    Minimal,
    /// Minimal, plus every other control byte (`0x00..=0x1f`, `0x7f`).
    Strict(NumericEscape),
}

/// Escapes `input` under the minimal policy.
pub fn escape(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    escape_into(input, EscapePolicy::Minimal, &mut out);
    out
}

/// Escapes `input` into a `String`.
///
/// Only ASCII bytes are ever rewritten, so valid UTF-8 stays valid.
pub fn escape_str(input: &str, policy: EscapePolicy) -> String {
    let mut out = Vec::new();
    escape_into(input.as_bytes(), policy, &mut out);
    match String::from_utf8(out) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Appends the escaped form of `input` to `out`.
pub fn escape_into(input: &[u8], policy: EscapePolicy, out: &mut Vec<u8>) {
    let worst = match policy {
        EscapePolicy::Minimal => 2,
        EscapePolicy::Strict(_) => 4,
    };
    out.reserve(input.len() * worst);

    for &byte in input {
        match byte {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x00..=0x1f | 0x7f => match policy {
                EscapePolicy::Minimal => out.push(byte),
                EscapePolicy::Strict(NumericEscape::Octal) => {
                    out.extend_from_slice(format!("\\{byte:03o}").as_bytes())
                }
                EscapePolicy::Strict(NumericEscape::Hex) => {
                    out.extend_from_slice(format!("\\x{byte:02x}").as_bytes())
                }
            },
            _ => out.push(byte),
        }
    }
}
