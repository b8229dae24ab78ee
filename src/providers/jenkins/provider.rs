use async_trait::async_trait;
use log::{debug, info};

use super::client::{BuildInfoDto, JenkinsClient};
use crate::classify::Marker;
use crate::error::Result;
use crate::models::{Finished, Label, ProviderKind, RunStatus};
use crate::poll::{PollOutcome, PollPolicy};
use crate::providers::Provider;

/// Build parameter carrying the iteration index.
pub const RUN_ID_PARAM: &str = "RUN_ID";

/// Number the triggered build gets, read from `nextBuildNumber` before the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JenkinsRunHandle {
    pub build: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JenkinsBuild {
    pub number: u64,
}

pub struct JenkinsProvider {
    client: JenkinsClient,
    job: String,
    send_params: bool,
    marker: Marker,
    policy: PollPolicy,
}

impl BuildInfoDto {
    fn run_status(&self) -> RunStatus {
        if self.building {
            return RunStatus::Pending;
        }
        match self.result.as_deref() {
            Some("SUCCESS") => RunStatus::Succeeded,
            Some(_) => RunStatus::Failed,
            // Finished builds always carry a result; a missing one is still settling.
            None => RunStatus::Pending,
        }
    }
}

impl JenkinsProvider {
    pub fn new(
        client: JenkinsClient,
        job: String,
        send_params: bool,
        marker: Marker,
        policy: PollPolicy,
    ) -> Self {
        Self {
            client,
            job,
            send_params,
            marker,
            policy,
        }
    }
}

#[async_trait]
impl Provider for JenkinsProvider {
    type Handle = JenkinsRunHandle;
    type Run = JenkinsBuild;

    fn kind(&self) -> ProviderKind {
        ProviderKind::Jenkins
    }

    async fn trigger(&self, iteration: u32) -> Result<JenkinsRunHandle> {
        let build = self.client.job_builds(&self.job).await?.next;

        let params = if self.send_params {
            vec![(RUN_ID_PARAM, iteration.to_string())]
        } else {
            Vec::new()
        };
        self.client.trigger_build(&self.job, &params).await?;
        info!(
            "Queued Jenkins job {} for iteration {iteration} (expecting build #{build})",
            self.job
        );

        Ok(JenkinsRunHandle { build })
    }

    async fn poll(
        &self,
        handle: &JenkinsRunHandle,
    ) -> Result<PollOutcome<Finished<JenkinsBuild>>> {
        let number = handle.build;

        self.policy
            .run(|attempt| async move {
                let builds = self.client.job_builds(&self.job).await?;
                if builds.last.map_or(true, |last| last < number) {
                    debug!("Attempt {attempt}: build #{number} still queued");
                    return Ok(None);
                }

                let Some(build) = self.client.build_info(&self.job, number).await? else {
                    debug!("Attempt {attempt}: build #{number} has no info yet");
                    return Ok(None);
                };

                let status = build.run_status();
                if !status.is_terminal() {
                    debug!("Attempt {attempt}: build #{number} is running");
                    return Ok(None);
                }

                let result = build.result.unwrap_or_default();
                info!("Jenkins build #{number} finished with {result}");
                Ok(Some(Finished {
                    run: JenkinsBuild { number },
                    status,
                    native_status: result,
                }))
            })
            .await
    }

    async fn fetch(&self, build: &JenkinsBuild) -> Result<Option<Vec<u8>>> {
        let console = self.client.console_text(&self.job, build.number).await?;
        Ok(Some(console.into_bytes()))
    }

    fn classify(&self, content: &[u8]) -> Label {
        self.marker.classify(content)
    }
}
