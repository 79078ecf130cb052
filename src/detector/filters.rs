use crate::utils::{IntSet, ParseError};

/// Which status codes count as "exists".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusGate {
    Allow(IntSet),
    Deny(IntSet),
}

impl StatusGate {
    pub fn admits(&self, status: u16) -> bool {
        match self {
            StatusGate::Allow(set) => set.contains(u64::from(status)),
            StatusGate::Deny(set) => !set.contains(u64::from(status)),
        }
    }
}

/// Decides whether a probe outcome is reported. The length exclusion is
/// checked first and overrides the status gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterPipeline {
    status: StatusGate,
    exclude_length: IntSet,
}

impl FilterPipeline {
    /// Exactly one of `allow` and `deny` must be non-empty.
    pub fn new(allow: IntSet, deny: IntSet, exclude_length: IntSet) -> Result<Self, ParseError> {
        let status = match (allow.is_empty(), deny.is_empty()) {
            (false, false) => {
                return Err(ParseError::ConflictingStatusSets {
                    allow: allow.to_compressed_string(),
                    deny: deny.to_compressed_string(),
                })
            }
            (true, true) => return Err(ParseError::MissingStatusSet),
            (false, true) => StatusGate::Allow(allow),
            (true, false) => StatusGate::Deny(deny),
        };
        Ok(Self {
            status,
            exclude_length,
        })
    }

    pub fn admits(&self, status: u16, length: u64) -> bool {
        if self.exclude_length.contains(length) {
            return false;
        }
        self.status.admits(status)
    }

    pub fn status_gate(&self) -> &StatusGate {
        &self.status
    }

    pub fn excluded_lengths(&self) -> &IntSet {
        &self.exclude_length
    }

    pub(crate) fn exclude_length(&mut self, length: u64) -> bool {
        self.exclude_length.insert(length)
    }
}
