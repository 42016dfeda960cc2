//! Forward-only traversal of a baseline emission file.
//!
//! The pemtim and calpuff grammars interleave records whose length
//! depends on earlier content, so the rewriters walk the line list with
//! an explicit cursor; running past the end of the file surfaces as an
//! error naming the record kind that was expected there.

use metemis_core::errors::{MetemisError, MetemisResult};

pub struct LineCursor<'a> {
    lines: &'a [String],
    pos: usize,
}

impl<'a> LineCursor<'a> {
    pub fn new(lines: &'a [String]) -> Self {
        LineCursor { lines, pos: 0 }
    }

    /// 1-based number of the next line to be consumed.
    pub fn lineno(&self) -> usize {
        self.pos + 1
    }

    /// Consume one line, or fail naming the expected record kind.
    pub fn take(&mut self, expected: &str) -> MetemisResult<&'a str> {
        let line = self
            .lines
            .get(self.pos)
            .ok_or_else(|| MetemisError::UnexpectedEof {
                line: self.pos + 1,
                expected: expected.to_string(),
            })?;
        self.pos += 1;
        Ok(line)
    }

    /// Look at the next line without consuming it.
    pub fn peek(&self, expected: &str) -> MetemisResult<&'a str> {
        self.lines
            .get(self.pos)
            .map(String::as_str)
            .ok_or_else(|| MetemisError::UnexpectedEof {
                line: self.pos + 1,
                expected: expected.to_string(),
            })
    }

    /// Everything left, consuming the cursor.
    pub fn rest(&mut self) -> &'a [String] {
        let rest = &self.lines[self.pos..];
        self.pos = self.lines.len();
        rest
    }
}

/// The `index`-th '#'-separated field of a record.
pub fn hash_field(line: &str, index: usize, lineno: usize) -> MetemisResult<&str> {
    line.split('#')
        .nth(index)
        .ok_or_else(|| MetemisError::BadRecord {
            line: lineno,
            details: format!("record has no '#' field {index}: '{line}'"),
        })
}

pub fn parse_int(field: &str, lineno: usize, what: &str) -> MetemisResult<i64> {
    field.trim().parse().map_err(|_| MetemisError::BadRecord {
        line: lineno,
        details: format!("invalid {what} '{}'", field.trim()),
    })
}

/// Counts are unsigned by grammar, so a negative token is a bad record
/// rather than a value to cast.
pub fn parse_usize(field: &str, lineno: usize, what: &str) -> MetemisResult<usize> {
    field.trim().parse().map_err(|_| MetemisError::BadRecord {
        line: lineno,
        details: format!("invalid {what} '{}'", field.trim()),
    })
}

pub fn parse_float(field: &str, lineno: usize, what: &str) -> MetemisResult<f64> {
    field.trim().parse().map_err(|_| MetemisError::BadRecord {
        line: lineno,
        details: format!("invalid {what} '{}'", field.trim()),
    })
}

/// The whitespace tokens of `line` made of digits only, in order.
pub fn digit_tokens(line: &str) -> Vec<i64> {
    line.split_whitespace()
        .filter(|token| token.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|token| token.parse().ok())
        .collect()
}
