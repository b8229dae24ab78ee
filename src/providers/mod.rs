pub mod codebuild;
pub mod github;
pub mod jenkins;

use async_trait::async_trait;
use chrono::Utc;
use log::info;

use crate::error::Result;
use crate::models::{CollectedLog, Finished, Label, Outcome, ProviderKind, RunStatus};
use crate::output::OutputLayout;
use crate::poll::PollOutcome;

/// One CI system's trigger/poll/fetch/classify protocol.
///
/// Each implementation keeps its own status vocabulary and maps it to
/// [`RunStatus`] before anything leaves `poll`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// What `trigger` hands to `poll` to find the run again.
    type Handle: Send + Sync;
    /// Terminal run data `fetch` needs to locate the log.
    type Run: Send + Sync;

    fn kind(&self) -> ProviderKind;

    async fn trigger(&self, iteration: u32) -> Result<Self::Handle>;

    async fn poll(&self, handle: &Self::Handle) -> Result<PollOutcome<Finished<Self::Run>>>;

    /// `Ok(None)` means the run finished but no log could be located.
    async fn fetch(&self, run: &Self::Run) -> Result<Option<Vec<u8>>>;

    fn classify(&self, content: &[u8]) -> Label;
}

/// Object-safe view of a [`Provider`] so the driver can hold all three in one list.
#[async_trait]
pub trait Collector: Send + Sync {
    fn provider(&self) -> ProviderKind;

    async fn collect(
        &self,
        iteration: u32,
        layout: &OutputLayout,
        include_failed: bool,
    ) -> Result<Outcome>;
}

#[async_trait]
impl<P> Collector for P
where
    P: Provider,
{
    fn provider(&self) -> ProviderKind {
        self.kind()
    }

    async fn collect(
        &self,
        iteration: u32,
        layout: &OutputLayout,
        include_failed: bool,
    ) -> Result<Outcome> {
        let handle = self.trigger(iteration).await?;
        info!("{} run {iteration} triggered", self.kind());

        let finished = match self.poll(&handle).await? {
            PollOutcome::Ready(finished) => finished,
            PollOutcome::TimedOut { attempts } => return Ok(Outcome::TimedOut { attempts }),
        };

        if finished.status == RunStatus::Failed && !include_failed {
            return Ok(Outcome::Failed {
                status: finished.native_status,
            });
        }

        let Some(content) = self.fetch(&finished.run).await? else {
            return Ok(Outcome::NoLogs);
        };

        let label = self.classify(&content);
        let path = layout.write(&CollectedLog {
            provider: self.kind(),
            iteration,
            label,
            content,
            collected_at: Utc::now(),
        })?;

        Ok(Outcome::Collected { path, label })
    }
}
