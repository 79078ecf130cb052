use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use super::ParseError;

/// Upper bound on the number of values a single `start-end` token may expand to.
pub const MAX_RANGE_SPAN: u64 = 1_000_000;

/// A set of non-negative integers that parses and renders range expressions
/// such as `200,300-302,404`. Used for status codes and content lengths.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntSet {
    items: HashSet<u64>,
}

impl IntSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from a comma separated expression. An empty expression
    /// yields an empty set.
    pub fn parse(expr: &str) -> Result<Self, ParseError> {
        let mut set = Self::new();
        set.add(expr)?;
        Ok(set)
    }

    /// Adds every value of `expr` to the set. Either all tokens are added or,
    /// on a parse error, none are.
    pub fn add(&mut self, expr: &str) -> Result<(), ParseError> {
        let mut pending: Vec<(u64, u64)> = Vec::new();
        for raw in expr.split(',') {
            let item = raw.trim();
            if item.is_empty() {
                continue;
            }
            match item.split_once('-') {
                Some((start, end)) => {
                    let start = parse_bound(start, item)?;
                    let end = parse_bound(end, item)?;
                    if start > end {
                        return Err(ParseError::InvertedRange {
                            value: item.to_string(),
                        });
                    }
                    if end - start >= MAX_RANGE_SPAN {
                        return Err(ParseError::RangeTooLarge {
                            value: item.to_string(),
                            max: MAX_RANGE_SPAN,
                        });
                    }
                    pending.push((start, end));
                }
                None => {
                    let value = item.parse::<u64>().map_err(|_| ParseError::InvalidNumber {
                        value: item.to_string(),
                    })?;
                    pending.push((value, value));
                }
            }
        }
        for (start, end) in pending {
            self.items.extend(start..=end);
        }
        Ok(())
    }

    pub fn insert(&mut self, value: u64) -> bool {
        self.items.insert(value)
    }

    pub fn contains(&self, value: u64) -> bool {
        self.items.contains(&value)
    }

    /// Merges all values of `other` into this set.
    pub fn add_range(&mut self, other: &IntSet) {
        self.items.extend(other.items.iter().copied());
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn sorted(&self) -> Vec<u64> {
        let mut out: Vec<u64> = self.items.iter().copied().collect();
        out.sort_unstable();
        out
    }

    /// Renders the set in ascending order, collapsing consecutive runs into
    /// `start-end` notation.
    pub fn to_compressed_string(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut values = self.sorted().into_iter();
        if let Some(first) = values.next() {
            let (mut start, mut prev) = (first, first);
            for value in values {
                if value == prev + 1 {
                    prev = value;
                    continue;
                }
                parts.push(render_run(start, prev));
                start = value;
                prev = value;
            }
            parts.push(render_run(start, prev));
        }
        parts.join(",")
    }
}

fn parse_bound(raw: &str, item: &str) -> Result<u64, ParseError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.contains('-') {
        return Err(ParseError::InvalidRange {
            value: item.to_string(),
        });
    }
    raw.parse::<u64>().map_err(|_| ParseError::InvalidRange {
        value: item.to_string(),
    })
}

fn render_run(start: u64, end: u64) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}-{end}")
    }
}

impl fmt::Display for IntSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_compressed_string())
    }
}

impl FromStr for IntSet {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromIterator<u64> for IntSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
