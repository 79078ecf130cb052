//! Wildcard detection.
//!
//! Before the scan starts the target is asked for paths that cannot exist.
//! The synthetic segments are expanded like real words. If every request of
//! one candidate form (bare, `.ext` or `/`) comes back with the same status
//! and length, and that response would be reported as a hit, the server
//! answers everything of that form
//! with "exists" and the scan would only produce noise. Depending on the
//! configuration the observed length is then excluded, the scan is forced
//! through, or the run is aborted with a [`WildcardError`].

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::distr::{Alphanumeric, SampleString};
use reqwest::Url;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::expand_candidates;
use super::filters::FilterPipeline;
use super::response::{candidate_url, fetch_outcome, ProbeError, ProbeOutcome, RequestSettings};
use crate::progress::Progress;

/// Number of synthetic probes issued when auto-calibration is enabled.
pub const AUTOCALIBRATE_PROBES: usize = 3;

pub const DEFAULT_SEGMENT_LEN: usize = 24;

/// Supplies path segments that are not expected to exist on the target.
pub trait PathSource: Send + Sync + fmt::Debug {
    fn next_segment(&self) -> String;
}

/// Random alphanumeric segments.
#[derive(Clone, Debug)]
pub struct RandomPathSource {
    len: usize,
}

impl RandomPathSource {
    pub fn new(len: usize) -> Self {
        Self {
            len: len.clamp(8, 64),
        }
    }
}

impl Default for RandomPathSource {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_LEN)
    }
}

impl PathSource for RandomPathSource {
    fn next_segment(&self) -> String {
        Alphanumeric.sample_string(&mut rand::rng(), self.len)
    }
}

/// Hands out a fixed list of segments in order, cycling when exhausted.
#[derive(Debug)]
pub struct FixedPathSource {
    segments: Vec<String>,
    next: AtomicUsize,
}

impl FixedPathSource {
    /// Segment used when `new` is given an empty list.
    pub const FALLBACK_SEGMENT: &'static str = "calibration";

    /// An empty `segments` list is replaced by [`Self::FALLBACK_SEGMENT`].
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            segments.push(Self::FALLBACK_SEGMENT.to_string());
        }
        Self {
            segments,
            next: AtomicUsize::new(0),
        }
    }
}

impl PathSource for FixedPathSource {
    fn next_segment(&self) -> String {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.segments.len();
        self.segments[idx].clone()
    }
}

fn redirect_note(location: &Option<String>) -> String {
    match location {
        Some(location) => format!(" (redirect to {location})"),
        None => String::new(),
    }
}

/// The target answered requests for non-existent paths as if they existed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("the server returns a status code that matches the provided options for non existing urls. {url} => {status}{} (Length: {length})", redirect_note(.location))]
pub struct WildcardError {
    pub url: String,
    pub status: u16,
    pub length: u64,
    pub location: Option<String>,
}

impl From<&ProbeOutcome> for WildcardError {
    fn from(outcome: &ProbeOutcome) -> Self {
        Self {
            url: outcome.url.to_string(),
            status: outcome.status,
            length: outcome.length,
            location: outcome.location.clone(),
        }
    }
}

/// Responses observed for synthetic paths.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CalibrationSignature {
    samples: Vec<ProbeOutcome>,
}

impl CalibrationSignature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: ProbeOutcome) {
        self.samples.push(outcome);
    }

    pub fn samples(&self) -> &[ProbeOutcome] {
        &self.samples
    }

    pub fn pairs(&self) -> Vec<(u16, u64)> {
        self.samples.iter().map(|s| (s.status, s.length)).collect()
    }

    /// The first sample, if all samples share status and length.
    pub fn uniform(&self) -> Option<&ProbeOutcome> {
        let first = self.samples.first()?;
        self.samples
            .iter()
            .all(|s| s.status == first.status && s.length == first.length)
            .then_some(first)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationVerdict {
    NotWildcard,
    /// Wildcard found and its length added to the exclusion set.
    LengthExcluded { status: u16, length: u64 },
    /// Wildcard found but ignored because of `force`.
    Forced { status: u16, length: u64 },
}

/// Applies the wildcard policy to an observed signature. Disagreeing samples
/// are treated as a well-behaved server.
pub fn decide(
    signature: &CalibrationSignature,
    filter: &mut FilterPipeline,
    autocalibrate: bool,
    force: bool,
) -> Result<CalibrationVerdict, WildcardError> {
    let Some(sample) = signature.uniform() else {
        return Ok(CalibrationVerdict::NotWildcard);
    };
    if !filter.admits(sample.status, sample.length) {
        return Ok(CalibrationVerdict::NotWildcard);
    }
    let (status, length) = (sample.status, sample.length);
    if autocalibrate {
        filter.exclude_length(length);
        info!(status, length, "wildcard response detected, excluding its length");
        return Ok(CalibrationVerdict::LengthExcluded { status, length });
    }
    if force {
        warn!(status, length, "wildcard response detected, continuing because of force");
        return Ok(CalibrationVerdict::Forced { status, length });
    }
    Err(WildcardError::from(sample))
}

/// Issues the synthetic probes for one target.
pub struct Calibrator<'a> {
    pub client: &'a reqwest::Client,
    pub settings: &'a RequestSettings,
    pub base: &'a Url,
    pub extensions: &'a [String],
    pub add_slash: bool,
}

impl Calibrator<'_> {
    /// Expands every synthetic segment like a real word and returns one
    /// signature per candidate form: bare, each extension, then `/`.
    pub async fn sample(
        &self,
        paths: &dyn PathSource,
        probes: usize,
        cancel: &CancellationToken,
        progress: &Progress,
    ) -> Result<Vec<CalibrationSignature>, ProbeError> {
        let mut signatures: Vec<CalibrationSignature> = Vec::new();
        for _ in 0..probes {
            let segment = paths.next_segment();
            let forms = expand_candidates(&segment, self.extensions, self.add_slash);
            if signatures.len() < forms.len() {
                signatures.resize_with(forms.len(), CalibrationSignature::new);
            }
            for (form, entity) in forms.iter().enumerate() {
                let url = candidate_url(self.base, entity)?;
                let outcome = fetch_outcome(self.client, self.settings, &url, cancel).await?;
                progress.record_request();
                signatures[form].record(outcome);
            }
        }
        Ok(signatures)
    }
}
