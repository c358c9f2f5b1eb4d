use crate::deconvolve::DeconvolutionResult;
use crate::task::{JobId, Progress, TaskOrchestrator};

use color_eyre::eyre::{Report, Result};
use log::debug;
use std::time::Duration;

/// Waits for a job by polling its progress, with an optional backoff.
///
/// Polling only reads, the job runs the same whether or not anyone waits.
#[derive(Clone, Debug, PartialEq)]
pub struct Poller {
    pub interval: Duration,
    /// Factor applied to the interval after each poll, 1.0 keeps it fixed.
    pub backoff: f64,
    pub max_interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Poller { interval: Duration::from_secs(2), backoff: 1.0, max_interval: Duration::from_secs(30) }
    }
}

impl Poller {
    pub fn new() -> Self {
        Poller::default()
    }

    /// Interval to wait after one of `interval`.
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use vasco::task::Poller;
    ///
    /// let poller = Poller { backoff: 2.0, max_interval: Duration::from_secs(5), ..Default::default() };
    /// assert_eq!(poller.next_interval(Duration::from_secs(2)), Duration::from_secs(4));
    /// assert_eq!(poller.next_interval(Duration::from_secs(4)), Duration::from_secs(5));
    ///
    /// // intervals too large to represent are capped
    /// let poller = Poller { backoff: f64::INFINITY, ..poller };
    /// assert_eq!(poller.next_interval(Duration::from_secs(2)), Duration::from_secs(5));
    /// ```
    pub fn next_interval(&self, interval: Duration) -> Duration {
        let next = interval.as_secs_f64() * self.backoff.max(1.0);
        Duration::try_from_secs_f64(next).unwrap_or(self.max_interval).min(self.max_interval)
    }

    /// Poll until the job finishes, calling `on_progress` whenever the record changes.
    pub async fn wait<F>(
        &self,
        orchestrator: &TaskOrchestrator,
        id: &JobId,
        mut on_progress: F,
    ) -> Result<DeconvolutionResult, Report>
    where
        F: FnMut(&Progress),
    {
        let mut interval = self.interval;
        let mut last: Option<Progress> = None;

        loop {
            let ready = orchestrator.ready(id).await?;

            match orchestrator.poll(id).await {
                Ok(progress) if last.as_ref() != Some(&progress) => {
                    on_progress(&progress);
                    last = Some(progress);
                }
                Ok(_) => {}
                // an expired record does not end the wait, the job state does
                Err(e) => debug!("No progress for job {id}: {e}"),
            }

            if ready {
                let result = orchestrator.get_result(id).await?;
                return Ok(result);
            }

            tokio::time::sleep(interval).await;
            interval = self.next_interval(interval);
        }
    }
}
