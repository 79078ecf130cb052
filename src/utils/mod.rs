pub mod set;

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

pub use set::IntSet;

/// Configuration errors. All of them are raised before any network activity.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid number '{value}'")]
    InvalidNumber { value: String },

    #[error("invalid range '{value}'")]
    InvalidRange { value: String },

    #[error("invalid range given: {value} (start is greater than end)")]
    InvertedRange { value: String },

    #[error("range '{value}' expands to more than {max} values")]
    RangeTooLarge { value: String, max: u64 },

    #[error("status-codes ({allow:?}) and status-codes-blacklist ({deny:?}) are both set - please set only one. status-codes-blacklist is set by default so you might want to disable it by supplying an empty string")]
    ConflictingStatusSets { allow: String, deny: String },

    #[error("status-codes and status-codes-blacklist are both not set, please set one")]
    MissingStatusSet,

    #[error("invalid extensions '{value}': {reason}")]
    InvalidExtensions { value: String, reason: String },

    #[error("invalid header '{value}', expected 'Key: Value'")]
    InvalidHeader { value: String },

    #[error("invalid duration '{value}', expected e.g. 250ms, 2s or 1m")]
    InvalidDuration { value: String },

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("either the url flag or the list flag is required")]
    MissingTarget,

    #[error("cannot use both the url and list flags")]
    ConflictingTargets,

    #[error("invalid thread count {value}, expected at least 1")]
    InvalidThreads { value: usize },
}

/// Parses a comma separated extension list. Leading dots are stripped and
/// duplicates (case-insensitive) dropped while keeping the first spelling.
pub fn parse_extensions_csv(value: &str) -> Result<Vec<String>, ParseError> {
    let mut out: Vec<String> = Vec::new();
    merge_extensions(&mut out, value.split(','))?;
    Ok(out)
}

/// Parses the contents of an extensions file, one extension per line.
pub fn parse_extension_lines(contents: &str) -> Result<Vec<String>, ParseError> {
    let mut out: Vec<String> = Vec::new();
    merge_extensions(&mut out, contents.lines())?;
    Ok(out)
}

/// Appends `items` to `into`, skipping blanks and entries already present.
pub fn merge_extensions<'a, I>(into: &mut Vec<String>, items: I) -> Result<(), ParseError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: HashSet<String> = into.iter().map(|e| e.to_ascii_lowercase()).collect();
    for part in items {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        let cleaned = item.trim_start_matches('.');
        if cleaned.is_empty() {
            continue;
        }
        if cleaned.contains('/') || cleaned.chars().any(char::is_whitespace) {
            return Err(ParseError::InvalidExtensions {
                value: item.to_string(),
                reason: "extensions may not contain '/' or whitespace".to_string(),
            });
        }
        if seen.insert(cleaned.to_ascii_lowercase()) {
            into.push(cleaned.to_string());
        }
    }
    Ok(())
}

/// Splits a `Key: Value` header line.
pub fn parse_header(raw: &str) -> Result<(String, String), ParseError> {
    let invalid = || ParseError::InvalidHeader {
        value: raw.to_string(),
    };
    let (key, value) = raw.split_once(':').ok_or_else(invalid)?;
    let key = key.trim();
    if key.is_empty() {
        return Err(invalid());
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Parses `250ms`, `2s`, `1m` or a bare number of milliseconds.
pub fn parse_duration(raw: &str) -> Result<Duration, ParseError> {
    let value = raw.trim();
    let invalid = || ParseError::InvalidDuration {
        value: raw.to_string(),
    };
    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => value.split_at(idx),
        None => (value, "ms"),
    };
    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount.saturating_mul(60))),
        _ => Err(invalid()),
    }
}

/// Trims a wordlist or target-list line; blank lines yield `None`.
pub fn clean_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Reads a newline-delimited file, dropping blank lines and surrounding
/// whitespace.
pub async fn read_clean_lines(path: &str) -> std::io::Result<Vec<String>> {
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if let Some(line) = clean_line(&line) {
            out.push(line);
        }
    }
    Ok(out)
}

/// Whether the last path segment of `word` carries a file extension.
pub fn has_extension(word: &str) -> bool {
    let last = word
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    match last.rfind('.') {
        Some(0) | None => false,
        Some(idx) => idx + 1 < last.len(),
    }
}
