use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::plugin::ScanPlugin;
use crate::progress::Progress;
use crate::runner::ScanError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    PreRunning,
    Scanning,
    Completed,
    Failed,
    Cancelled,
}

impl ScanState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScanState::Completed | ScanState::Failed | ScanState::Cancelled
        )
    }
}

/// Drives a plugin over a wordlist with a fixed number of workers.
///
/// Words are handed out from a single queue in wordlist order, so every word
/// is processed exactly once no matter how many workers pull from it.
/// Results may still arrive out of order.
#[derive(Debug)]
pub struct Scheduler {
    threads: usize,
    delay: Option<Duration>,
    state: watch::Sender<ScanState>,
}

impl Scheduler {
    pub fn new(threads: usize, delay: Option<Duration>) -> Self {
        let (state, _) = watch::channel(ScanState::Idle);
        Self {
            threads: threads.max(1),
            delay: delay.filter(|d| !d.is_zero()),
            state,
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanState> {
        self.state.subscribe()
    }

    fn transition(&self, next: ScanState) {
        let prev = self.state.send_replace(next);
        debug!(?prev, ?next, "scan state");
    }

    /// Runs `pre_run` once and then every word through `process_word`.
    ///
    /// Returns `Completed` or `Cancelled`; a failed pre-run or a fatal worker
    /// error is returned as `Err` and leaves the scheduler in `Failed`.
    pub async fn run<P>(
        &self,
        mut plugin: P,
        words: Vec<String>,
        progress: Arc<Progress>,
        cancel: &CancellationToken,
    ) -> Result<ScanState, ScanError>
    where
        P: ScanPlugin + 'static,
    {
        self.transition(ScanState::PreRunning);
        if let Err(e) = plugin.pre_run(cancel, &progress).await {
            if cancel.is_cancelled() {
                self.transition(ScanState::Cancelled);
                return Ok(ScanState::Cancelled);
            }
            self.transition(ScanState::Failed);
            return Err(e);
        }
        if cancel.is_cancelled() {
            self.transition(ScanState::Cancelled);
            return Ok(ScanState::Cancelled);
        }

        // setup is finished, from here on the plugin is only read
        let plugin = Arc::new(plugin);
        self.transition(ScanState::Scanning);

        let run_token = cancel.child_token();
        let (word_tx, word_rx) = mpsc::channel::<String>(self.threads);
        let word_rx = Arc::new(Mutex::new(word_rx));

        let feeder = task::spawn({
            let token = run_token.clone();
            async move {
                for word in words {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        sent = word_tx.send(word) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        });

        let mut workers: FuturesUnordered<_> = (0..self.threads)
            .map(|id| {
                task::spawn(worker(
                    id,
                    plugin.clone(),
                    word_rx.clone(),
                    progress.clone(),
                    run_token.clone(),
                    self.delay,
                ))
            })
            .collect();
        drop(word_rx);

        let mut fatal: Option<ScanError> = None;
        while let Some(joined) = workers.next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    run_token.cancel();
                    fatal.get_or_insert(ScanError::TaskJoin { source: e });
                }
            }
        }
        if let Err(e) = feeder.await {
            fatal.get_or_insert(ScanError::TaskJoin { source: e });
        }

        if let Some(e) = fatal {
            self.transition(ScanState::Failed);
            return Err(e);
        }
        if cancel.is_cancelled() {
            self.transition(ScanState::Cancelled);
            return Ok(ScanState::Cancelled);
        }
        self.transition(ScanState::Completed);
        Ok(ScanState::Completed)
    }
}

async fn worker<P>(
    id: usize,
    plugin: Arc<P>,
    words: Arc<Mutex<mpsc::Receiver<String>>>,
    progress: Arc<Progress>,
    token: CancellationToken,
    delay: Option<Duration>,
) -> Result<(), ScanError>
where
    P: ScanPlugin + ?Sized,
{
    loop {
        let next = {
            let mut rx = words.lock().await;
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                word = rx.recv() => word,
            }
        };
        let Some(word) = next else {
            debug!(worker = id, "worker finished");
            return Ok(());
        };

        if let Some(delay) = delay {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match plugin.process_word(&token, &word, &progress).await {
            Ok(findings) => {
                for finding in findings {
                    progress.result(finding).await;
                }
            }
            // interrupted by cancellation, the word does not count
            Err(_) if token.is_cancelled() => return Ok(()),
            Err(e) if e.is_fatal() => {
                debug!(worker = id, %word, "fatal error, stopping the scan");
                token.cancel();
                return Err(e);
            }
            Err(e) => progress.error(e).await,
        }
        progress.tick().await;
    }
}
