use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::runner::ScanError;

/// An accepted probe outcome as shown to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// `/path` or the full URL in expanded mode.
    pub entity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Warn,
}

#[derive(Debug)]
pub enum ProgressEvent {
    /// Scanning of `target` begins with `words` wordlist entries.
    Started { target: String, words: u64 },
    /// One word finished, accepted or not.
    Tick,
    Result(Finding),
    /// A per-word failure that did not stop the scan.
    Error(ScanError),
    Message(MessageLevel, String),
}

/// The sending half of the progress channel plus the counters workers bump
/// concurrently. Shared between workers behind an `Arc`.
#[derive(Debug)]
pub struct Progress {
    tx: mpsc::Sender<ProgressEvent>,
    words_done: AtomicU64,
    requests_issued: AtomicU64,
}

impl Progress {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            tx,
            words_done: AtomicU64::new(0),
            requests_issued: AtomicU64::new(0),
        }
    }

    /// Builds a progress handle together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    // a dropped consumer is ignored
    async fn send(&self, event: ProgressEvent) {
        let _ = self.tx.send(event).await;
    }

    pub async fn started(&self, target: &str, words: u64) {
        self.send(ProgressEvent::Started {
            target: target.to_string(),
            words,
        })
        .await;
    }

    pub async fn tick(&self) {
        self.words_done.fetch_add(1, Ordering::Relaxed);
        self.send(ProgressEvent::Tick).await;
    }

    pub async fn result(&self, finding: Finding) {
        self.send(ProgressEvent::Result(finding)).await;
    }

    pub async fn error(&self, err: ScanError) {
        self.send(ProgressEvent::Error(err)).await;
    }

    pub async fn message(&self, level: MessageLevel, text: impl Into<String>) {
        self.send(ProgressEvent::Message(level, text.into())).await;
    }

    pub fn record_request(&self) {
        self.requests_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn words_done(&self) -> u64 {
        self.words_done.load(Ordering::Relaxed)
    }

    pub fn requests_issued(&self) -> u64 {
        self.requests_issued.load(Ordering::Relaxed)
    }
}
