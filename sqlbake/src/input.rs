//! Query input.
//!
//! Queries read from a stream are separated by blank lines. A query may
//! span several lines; the newline ending its last line is stripped.

use std::io::BufRead;

use thiserror::Error;

/// Errors reading queries.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("query is not valid UTF-8: {lossy:?}")]
    NotUtf8 { lossy: String },
}

impl InputError {
    /// Returns true if reading cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, InputError::Io(_))
    }
}

/// Converts raw query bytes to text.
pub fn query_from_bytes(bytes: Vec<u8>) -> Result<String, InputError> {
    String::from_utf8(bytes).map_err(|e| InputError::NotUtf8 {
        lossy: String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

/// Iterator over blank-line-separated query blocks.
pub struct QueryBlocks<R> {
    reader: R,
    done: bool,
}

impl<R: BufRead> QueryBlocks<R> {
    /// Reads blocks from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }

    fn next_block(&mut self) -> Result<Option<Vec<u8>>, std::io::Error> {
        let mut block = Vec::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            if self.reader.read_until(b'\n', &mut line)? == 0 {
                self.done = true;
                return Ok(if block.is_empty() {
                    None
                } else {
                    Some(strip_newline(block))
                });
            }
            if is_blank(&line) {
                if block.is_empty() {
                    continue;
                }
                return Ok(Some(strip_newline(block)));
            }
            block.extend_from_slice(&line);
        }
    }
}

impl<R: BufRead> Iterator for QueryBlocks<R> {
    type Item = Result<String, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_block() {
            Ok(Some(bytes)) => Some(query_from_bytes(bytes)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(InputError::Io(e)))
            }
        }
    }
}

fn is_blank(line: &[u8]) -> bool {
    matches!(line, b"\n" | b"\r\n")
}

fn strip_newline(mut block: Vec<u8>) -> Vec<u8> {
    if block.last() == Some(&b'\n') {
        block.pop();
        if block.last() == Some(&b'\r') {
            block.pop();
        }
    }
    block
}
