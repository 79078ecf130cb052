pub mod calibration;
pub mod filters;
pub mod response;

use async_trait::async_trait;
use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::plugin::ScanPlugin;
use crate::progress::{Finding, MessageLevel, Progress};
use crate::runner::{Options, ScanError};
use crate::utils::{self, IntSet, ParseError};

use calibration::{
    decide, Calibrator, CalibrationVerdict, PathSource, RandomPathSource, AUTOCALIBRATE_PROBES,
};
use filters::FilterPipeline;
use response::{candidate_url, fetch_outcome, ProbeError, ProbeOutcome, RequestSettings};

/// Suffixes appended to a found word when looking for backup copies.
pub const BACKUP_SUFFIXES: &[&str] = &["~", ".bak", ".bak2", ".old", ".1"];

/// Options of the directory mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirOptions {
    pub extensions: Vec<String>,
    pub status_codes: IntSet,
    pub status_codes_blacklist: IntSet,
    pub exclude_length: IntSet,
    pub add_slash: bool,
    pub expanded: bool,
    pub discover_backup: bool,
    pub autocalibrate: bool,
    pub force: bool,
}

impl Default for DirOptions {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            status_codes: IntSet::new(),
            status_codes_blacklist: [404].into_iter().collect(),
            exclude_length: IntSet::new(),
            add_slash: false,
            expanded: false,
            discover_backup: false,
            autocalibrate: false,
            force: false,
        }
    }
}

/// The bare word, one entry per extension, then `word/` if requested.
pub fn expand_candidates(word: &str, extensions: &[String], add_slash: bool) -> Vec<String> {
    let mut out = Vec::with_capacity(extensions.len() + 2);
    out.push(word.to_string());
    out.extend(extensions.iter().map(|ext| format!("{word}.{ext}")));
    if add_slash && !word.ends_with('/') {
        out.push(format!("{word}/"));
    }
    out
}

/// Backup names for `word`: the fixed suffixes plus a vim swap file next to it.
pub fn backup_candidates(word: &str) -> Vec<String> {
    let word = word.trim_end_matches('/');
    let mut out: Vec<String> = BACKUP_SUFFIXES
        .iter()
        .map(|suffix| format!("{word}{suffix}"))
        .collect();
    let swap = match word.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/.{name}.swp"),
        None => format!(".{word}.swp"),
    };
    out.push(swap);
    out
}

/// Directory and file brute forcing against a single target.
pub struct DirPlugin {
    target: Url,
    client: reqwest::Client,
    settings: RequestSettings,
    options: DirOptions,
    filter: FilterPipeline,
    paths: Box<dyn PathSource>,
}

impl DirPlugin {
    /// `target` should already be normalised (see `runner::normalize_target`).
    /// Fails if the status sets are misconfigured.
    pub fn new(
        global: &Options,
        options: DirOptions,
        target: Url,
        client: reqwest::Client,
    ) -> Result<Self, ParseError> {
        let filter = FilterPipeline::new(
            options.status_codes.clone(),
            options.status_codes_blacklist.clone(),
            options.exclude_length.clone(),
        )?;
        Ok(Self {
            target,
            client,
            settings: RequestSettings::from_options(global),
            options,
            filter,
            paths: Box::new(RandomPathSource::default()),
        })
    }

    /// Replaces the generator of non-existent paths used for calibration.
    pub fn with_path_source(mut self, paths: impl PathSource + 'static) -> Self {
        self.paths = Box::new(paths);
        self
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn options(&self) -> &DirOptions {
        &self.options
    }

    pub fn filter(&self) -> &FilterPipeline {
        &self.filter
    }

    fn finding(&self, entity: &str, outcome: ProbeOutcome) -> Finding {
        let entity = if self.options.expanded {
            outcome.url.to_string()
        } else {
            format!("/{}", entity.trim_start_matches('/'))
        };
        Finding {
            entity,
            status: Some(outcome.status),
            length: Some(outcome.length),
            redirect: outcome.location,
        }
    }

    async fn probe(
        &self,
        cancel: &CancellationToken,
        entity: &str,
        progress: &Progress,
    ) -> Result<Option<Finding>, ScanError> {
        let url = candidate_url(&self.target, entity)?;
        let outcome = fetch_outcome(&self.client, &self.settings, &url, cancel).await?;
        progress.record_request();
        if !self.filter.admits(outcome.status, outcome.length) {
            return Ok(None);
        }
        Ok(Some(self.finding(entity, outcome)))
    }

    /// Probes one candidate of a word. A failed request is reported and the
    /// remaining candidates still run; only cancellation and fatal errors
    /// end the word.
    async fn probe_into(
        &self,
        cancel: &CancellationToken,
        entity: &str,
        progress: &Progress,
        findings: &mut Vec<Finding>,
    ) -> Result<(), ScanError> {
        match self.probe(cancel, entity, progress).await {
            Ok(Some(finding)) => findings.push(finding),
            Ok(None) => {}
            Err(e) if !e.is_fatal() && !cancel.is_cancelled() => {
                debug!(url = %self.target, entity, "candidate failed: {e}");
                progress.error(e).await;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn check_liveness(
        &self,
        cancel: &CancellationToken,
        progress: &Progress,
    ) -> Result<(), ScanError> {
        match fetch_outcome(&self.client, &self.settings, &self.target, cancel).await {
            Ok(outcome) => {
                progress.record_request();
                debug!(url = %self.target, status = outcome.status, "target is reachable");
                Ok(())
            }
            Err(ProbeError::Cancelled) => Err(ProbeError::Cancelled.into()),
            Err(e) if self.options.force => {
                warn!(url = %self.target, "target liveness check failed: {e}");
                progress.message(MessageLevel::Warn, e.to_string()).await;
                Ok(())
            }
            Err(e) => Err(ScanError::Unreachable {
                url: self.target.to_string(),
                source: e,
            }),
        }
    }
}

#[async_trait]
impl ScanPlugin for DirPlugin {
    fn name(&self) -> &str {
        "dir"
    }

    fn requests_per_word(&self) -> usize {
        1 + self.options.extensions.len() + usize::from(self.options.add_slash)
    }

    async fn pre_run(
        &mut self,
        cancel: &CancellationToken,
        progress: &Progress,
    ) -> Result<(), ScanError> {
        self.check_liveness(cancel, progress).await?;

        let probes = if self.options.autocalibrate {
            AUTOCALIBRATE_PROBES
        } else {
            1
        };
        let calibrator = Calibrator {
            client: &self.client,
            settings: &self.settings,
            base: &self.target,
            extensions: &self.options.extensions,
            add_slash: self.options.add_slash,
        };
        let signatures = match calibrator
            .sample(self.paths.as_ref(), probes, cancel, progress)
            .await
        {
            Ok(signatures) => signatures,
            Err(ProbeError::Cancelled) => return Err(ProbeError::Cancelled.into()),
            Err(e) if self.options.force => {
                warn!(url = %self.target, "wildcard check failed: {e}");
                progress.message(MessageLevel::Warn, e.to_string()).await;
                return Ok(());
            }
            Err(e) => {
                return Err(ScanError::Unreachable {
                    url: self.target.to_string(),
                    source: e,
                })
            }
        };

        for signature in signatures.iter() {
            debug!(url = %self.target, samples = ?signature.pairs(), "calibration finished");
            let verdict = decide(
                signature,
                &mut self.filter,
                self.options.autocalibrate,
                self.options.force,
            )?;
            match verdict {
                CalibrationVerdict::NotWildcard => {}
                CalibrationVerdict::LengthExcluded { status, length } => {
                    progress
                        .message(
                            MessageLevel::Info,
                            format!(
                                "wildcard response found ({status}, length {length}), excluding length {length}"
                            ),
                        )
                        .await;
                }
                CalibrationVerdict::Forced { status, length } => {
                    progress
                        .message(
                            MessageLevel::Warn,
                            format!(
                                "wildcard response found ({status}, length {length}), continuing because of force"
                            ),
                        )
                        .await;
                }
            }
        }
        Ok(())
    }

    async fn process_word(
        &self,
        cancel: &CancellationToken,
        word: &str,
        progress: &Progress,
    ) -> Result<Vec<Finding>, ScanError> {
        let mut findings = Vec::new();
        for entity in expand_candidates(word, &self.options.extensions, self.options.add_slash) {
            self.probe_into(cancel, &entity, progress, &mut findings).await?;
        }

        if self.options.discover_backup && !findings.is_empty() && !utils::has_extension(word) {
            for entity in backup_candidates(word) {
                self.probe_into(cancel, &entity, progress, &mut findings).await?;
            }
        }
        Ok(findings)
    }
}
