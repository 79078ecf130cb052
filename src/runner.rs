use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, Url};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::detector::calibration::WildcardError;
use crate::detector::filters::FilterPipeline;
use crate::detector::response::{build_client, ProbeError};
use crate::detector::{DirOptions, DirPlugin};
use crate::progress::{Progress, ProgressEvent};
use crate::scheduler::{ScanState, Scheduler};
use crate::utils::{self, ParseError};

pub const DEFAULT_USER_AGENT: &str = concat!("dirbust/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WordlistSource {
    FilePath(String),
    Inline(Vec<String>),
}

/// Settings shared by every target of a run.
#[derive(Clone, Debug)]
pub struct Options {
    pub targets: Vec<String>,
    pub wordlist: WordlistSource,
    pub threads: usize,
    pub timeout: Duration,
    pub no_tls_validation: bool,
    pub user_agent: String,
    pub headers: Vec<(String, String)>,
    pub cookies: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub proxy: Option<String>,
    pub delay: Option<Duration>,
    /// Extra attempts for requests that timed out.
    pub retry_attempts: usize,
    pub method: Method,
    pub output_append: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            wordlist: WordlistSource::Inline(Vec::new()),
            threads: 10,
            timeout: Duration::from_secs(10),
            no_tls_validation: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: Vec::new(),
            cookies: None,
            username: None,
            password: None,
            proxy: None,
            delay: None,
            retry_attempts: 3,
            method: Method::GET,
            output_append: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Wildcard(#[from] WildcardError),

    #[error("unable to connect to {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: ProbeError,
    },

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to setup proxy: {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read wordlist: {path}: {source}")]
    WordlistRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("wordlist {path} contains no words")]
    EmptyWordlist { path: String },

    #[error("task join failed: {source}")]
    TaskJoin {
        #[source]
        source: tokio::task::JoinError,
    },
}

impl ScanError {
    /// Whether the error ends the scan of the current target. Failures of a
    /// single probe are reported and the word is skipped; everything else,
    /// including a failed liveness check, stops the target.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ScanError::Probe(ProbeError::Transport { .. } | ProbeError::InvalidUrl { .. })
        )
    }
}

/// Parses a target, prefixing `http://` when no scheme is given and making
/// sure the path ends with `/` so candidates are joined below it.
pub fn normalize_target(raw: &str) -> Result<Url, ParseError> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| ParseError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    if trimmed.is_empty() {
        return Err(invalid("empty url"));
    }
    let lower = trimmed.to_ascii_lowercase();
    let with_scheme = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_fragment(None);
    Ok(url)
}

/// Loads the wordlist, dropping blank lines and surrounding whitespace.
pub async fn load_words(source: &WordlistSource) -> Result<Vec<String>, ScanError> {
    let (words, label) = match source {
        WordlistSource::Inline(items) => (
            items.iter().filter_map(|w| utils::clean_line(w)).collect::<Vec<_>>(),
            "<inline>".to_string(),
        ),
        WordlistSource::FilePath(path) => {
            let words = utils::read_clean_lines(path)
                .await
                .map_err(|e| ScanError::WordlistRead {
                    path: path.clone(),
                    source: e,
                })?;
            (words, path.clone())
        }
    };
    if words.is_empty() {
        return Err(ScanError::EmptyWordlist { path: label });
    }
    Ok(words)
}

#[derive(Debug)]
pub struct TargetReport {
    pub target: String,
    pub outcome: Result<ScanState, ScanError>,
    pub requests: u64,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct RunSummary {
    pub started_at: Instant,
    pub elapsed: Duration,
    pub words: usize,
    pub reports: Vec<TargetReport>,
}

impl RunSummary {
    pub fn failures(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_err()).count()
    }

    pub fn cancelled(&self) -> bool {
        self.reports
            .iter()
            .any(|r| matches!(r.outcome, Ok(ScanState::Cancelled)))
    }
}

/// Runs the directory mode against every configured target, one after the
/// other.
#[derive(Debug)]
pub struct Runner {
    options: Options,
    dir: DirOptions,
    targets: Vec<Url>,
    client: reqwest::Client,
}

impl Runner {
    /// Validates the configuration and builds the shared HTTP client. No
    /// request is issued here.
    pub fn new(options: Options, mut dir: DirOptions) -> Result<Self, ScanError> {
        if options.threads == 0 {
            return Err(ParseError::InvalidThreads {
                value: options.threads,
            }
            .into());
        }
        if options.targets.is_empty() {
            return Err(ParseError::MissingTarget.into());
        }
        let targets = options
            .targets
            .iter()
            .map(|t| normalize_target(t))
            .collect::<Result<Vec<_>, _>>()?;

        FilterPipeline::new(
            dir.status_codes.clone(),
            dir.status_codes_blacklist.clone(),
            dir.exclude_length.clone(),
        )?;

        // results of several targets must stay attributable
        if targets.len() > 1 {
            dir.expanded = true;
        }

        let client = build_client(&options)?;
        Ok(Self {
            options,
            dir,
            targets,
            client,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn dir_options(&self) -> &DirOptions {
        &self.dir
    }

    pub fn targets(&self) -> &[Url] {
        &self.targets
    }

    /// Calibrates and scans a single target.
    pub async fn run_target(
        &self,
        target: &Url,
        words: Vec<String>,
        progress: Arc<Progress>,
        cancel: &CancellationToken,
    ) -> Result<ScanState, ScanError> {
        let plugin = DirPlugin::new(
            &self.options,
            self.dir.clone(),
            target.clone(),
            self.client.clone(),
        )?;
        progress.started(target.as_str(), words.len() as u64).await;
        let scheduler = Scheduler::new(self.options.threads, self.options.delay);
        scheduler.run(plugin, words, progress, cancel).await
    }

    /// Scans all targets, streaming events into `tx`.
    ///
    /// With a single target its fatal error is returned. With several targets
    /// a fatal error is recorded in the summary and the next target is
    /// scanned.
    pub async fn run(
        &self,
        tx: mpsc::Sender<ProgressEvent>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, ScanError> {
        let started_at = Instant::now();
        let words = load_words(&self.options.wordlist).await?;
        let multi = self.targets.len() > 1;

        let mut reports = Vec::with_capacity(self.targets.len());
        for target in self.targets.iter() {
            if cancel.is_cancelled() {
                break;
            }
            let progress = Arc::new(Progress::new(tx.clone()));
            let target_started = Instant::now();
            info!(target = %target, words = words.len(), "starting scan");

            let outcome = match self
                .run_target(target, words.clone(), progress.clone(), cancel)
                .await
            {
                Err(e) if !multi => return Err(e),
                outcome => outcome,
            };
            if let Err(e) = &outcome {
                warn!(target = %target, "scan failed: {e}");
            }
            reports.push(TargetReport {
                target: target.to_string(),
                outcome,
                requests: progress.requests_issued(),
                elapsed: target_started.elapsed(),
            });
        }

        Ok(RunSummary {
            started_at,
            elapsed: started_at.elapsed(),
            words: words.len(),
            reports,
        })
    }
}
