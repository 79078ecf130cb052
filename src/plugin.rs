use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::progress::{Finding, Progress};
use crate::runner::ScanError;

/// A scan mode. The scheduler calls `pre_run` once, then shares the plugin
/// between workers and calls `process_word` once per wordlist entry.
///
/// `pre_run` takes `&mut self` so that any setup-time mutation (such as
/// calibration adding exclusions) is finished before the plugin is shared.
/// `process_word` only gets `&self` and must be safe to run concurrently.
#[async_trait]
pub trait ScanPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Requests a single word turns into, used for progress estimates.
    fn requests_per_word(&self) -> usize {
        1
    }

    async fn pre_run(
        &mut self,
        cancel: &CancellationToken,
        progress: &Progress,
    ) -> Result<(), ScanError>;

    /// Returns the accepted findings for `word`; an empty vector means the
    /// word was probed and filtered out.
    async fn process_word(
        &self,
        cancel: &CancellationToken,
        word: &str,
        progress: &Progress,
    ) -> Result<Vec<Finding>, ScanError>;
}
