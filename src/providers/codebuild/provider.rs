use std::io::Read;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use log::{debug, info, warn};

use super::client::{BuildSnapshot, CodeBuildApi, LogStream};
use crate::classify::Marker;
use crate::error::{CollectorError, Result};
use crate::models::{Finished, Label, ProviderKind, RunStatus};
use crate::poll::{PollOutcome, PollPolicy};
use crate::providers::Provider;

const SUCCEEDED: &str = "SUCCEEDED";
const FAILED_STATUSES: [&str; 4] = ["FAILED", "FAULT", "TIMED_OUT", "STOPPED"];

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Upper bound on `GetLogEvents` pages read for one build.
const MAX_LOG_PAGES: usize = 1000;

#[derive(Debug, Clone)]
pub struct CodeBuildRunHandle {
    pub build_id: String,
}

pub struct CodeBuildProvider<A> {
    api: A,
    project: String,
    marker: Marker,
    policy: PollPolicy,
}

fn run_status(status: &str) -> RunStatus {
    if status == SUCCEEDED {
        RunStatus::Succeeded
    } else if FAILED_STATUSES.contains(&status) {
        RunStatus::Failed
    } else {
        RunStatus::Pending
    }
}

/// Splits an S3 log location into bucket and key.
pub fn parse_s3_location(location: &str) -> Result<(String, String)> {
    let path = location
        .strip_prefix("s3://")
        .or_else(|| location.strip_prefix("arn:aws:s3:::"))
        .unwrap_or(location);

    match path.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((bucket.to_string(), key.to_string()))
        }
        _ => Err(CollectorError::Api(format!(
            "Unrecognised S3 log location '{location}'"
        ))),
    }
}

fn maybe_gunzip(content: Vec<u8>) -> Result<Vec<u8>> {
    if !content.starts_with(&GZIP_MAGIC) {
        return Ok(content);
    }

    let mut inflated = Vec::new();
    GzDecoder::new(content.as_slice()).read_to_end(&mut inflated)?;
    Ok(inflated)
}

impl<A: CodeBuildApi> CodeBuildProvider<A> {
    pub fn new(api: A, project: String, marker: Marker, policy: PollPolicy) -> Self {
        Self {
            api,
            project,
            marker,
            policy,
        }
    }

    async fn read_log_stream(&self, stream: &LogStream) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        let mut token: Option<String> = None;

        for _ in 0..MAX_LOG_PAGES {
            let page = self.api.log_events(stream, token.as_deref()).await?;

            for message in page.messages {
                content.extend_from_slice(message.as_bytes());
                content.push(b'\n');
            }

            // Pages may be empty mid-stream; only an unchanged forward token marks the end.
            if page.next_token.is_none() || page.next_token == token {
                break;
            }
            token = page.next_token;
        }

        Ok(content)
    }
}

#[async_trait]
impl<A: CodeBuildApi> Provider for CodeBuildProvider<A> {
    type Handle = CodeBuildRunHandle;
    type Run = BuildSnapshot;

    fn kind(&self) -> ProviderKind {
        ProviderKind::CodeBuild
    }

    async fn trigger(&self, iteration: u32) -> Result<CodeBuildRunHandle> {
        let build_id = self.api.start_build(&self.project).await?;
        info!(
            "Started CodeBuild build {build_id} of {} for iteration {iteration}",
            self.project
        );

        Ok(CodeBuildRunHandle { build_id })
    }

    async fn poll(
        &self,
        handle: &CodeBuildRunHandle,
    ) -> Result<PollOutcome<Finished<BuildSnapshot>>> {
        self.policy
            .run(|attempt| async move {
                let Some(build) = self.api.build(&handle.build_id).await? else {
                    debug!("Attempt {attempt}: build {} not reported yet", handle.build_id);
                    return Ok(None);
                };

                let status = run_status(&build.status);
                if !status.is_terminal() {
                    debug!("Attempt {attempt}: build {} is {}", build.id, build.status);
                    return Ok(None);
                }

                info!("Build {} finished with {}", build.id, build.status);
                Ok(Some(Finished {
                    native_status: build.status.clone(),
                    status,
                    run: build,
                }))
            })
            .await
    }

    async fn fetch(&self, build: &BuildSnapshot) -> Result<Option<Vec<u8>>> {
        if let Some(stream) = &build.cloudwatch {
            debug!("Reading {}/{} from CloudWatch Logs", stream.group, stream.stream);
            return self.read_log_stream(stream).await.map(Some);
        }

        if let Some(location) = &build.s3_location {
            let (bucket, key) = parse_s3_location(location)?;
            debug!("Reading s3://{bucket}/{key}");
            let content = self.api.object(&bucket, &key).await?;
            return maybe_gunzip(content).map(Some);
        }

        warn!("Build {} has neither CloudWatch nor S3 logs", build.id);
        Ok(None)
    }

    fn classify(&self, content: &[u8]) -> Label {
        self.marker.classify(content)
    }
}
