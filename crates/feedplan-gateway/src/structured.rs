//! Recovering typed values from free-form model output.
//!
//! Providers often wrap JSON in prose or Markdown fences. [`parse_structured_output`]
//! tries a fixed chain of strategies and stops at the first one that yields a
//! value of the requested shape:
//!
//! 1. the whole (trimmed) text as JSON;
//! 2. each fenced code block, in order;
//! 3. each balanced `{...}` / `[...]` span, in order of its opening bracket.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::error::Category;

use crate::error::ParseError;

static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("valid regex")
});

/// Parses `raw` into `T` using the fallback chain described in the module docs.
///
/// # Errors
///
/// - [`ParseError::Empty`] if `raw` is blank.
/// - [`ParseError::Shape`] if JSON was found but none of it matched `T`.
/// - [`ParseError::NoJson`] if no candidate was even syntactically JSON.
pub fn parse_structured_output<T: DeserializeOwned>(raw: &str) -> Result<T, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut shape_error = None;

    let candidates = std::iter::once(trimmed)
        .chain(fenced_blocks(trimmed))
        .chain(balanced_spans(trimmed));

    for candidate in candidates {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Ok(value),
            Err(e) if e.classify() == Category::Data => {
                shape_error.get_or_insert(e);
            }
            Err(_) => {}
        }
    }

    Err(shape_error.map_or(ParseError::NoJson, ParseError::Shape))
}

fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    FENCED_BLOCK_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

/// Yields every balanced bracket span, skipping brackets inside JSON strings.
fn balanced_spans(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .filter_map(move |(start, _)| {
            matching_close(&text[start..]).map(|len| &text[start..start + len])
        })
}

/// Byte length of the balanced span starting at the first char of `text`.
fn matching_close(text: &str) -> Option<usize> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}
