use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_codebuild::error::DisplayErrorContext;
use aws_sdk_codebuild::types::LogsLocation;

use crate::error::{CollectorError, Result};

/// CloudWatch Logs location of a build's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStream {
    pub group: String,
    pub stream: String,
}

/// The fields of a `BatchGetBuilds` entry the collector uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSnapshot {
    pub id: String,
    pub status: String,
    pub cloudwatch: Option<LogStream>,
    /// S3 log object, as `s3://bucket/key`, `arn:aws:s3:::bucket/key` or `bucket/key`.
    pub s3_location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogEventsPage {
    pub messages: Vec<String>,
    pub next_token: Option<String>,
}

/// The CodeBuild, CloudWatch Logs and S3 calls needed to run and read a build.
#[async_trait]
pub trait CodeBuildApi: Send + Sync {
    /// Starts a build of `project` and returns its id.
    async fn start_build(&self, project: &str) -> Result<String>;

    /// `None` while CodeBuild does not report the build yet.
    async fn build(&self, id: &str) -> Result<Option<BuildSnapshot>>;

    async fn log_events(
        &self,
        stream: &LogStream,
        next_token: Option<&str>,
    ) -> Result<LogEventsPage>;

    async fn object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

pub struct AwsCodeBuild {
    codebuild: aws_sdk_codebuild::Client,
    logs: aws_sdk_cloudwatchlogs::Client,
    s3: aws_sdk_s3::Client,
}

impl AwsCodeBuild {
    /// Builds clients from the standard AWS environment (profile, region, credentials).
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;

        Self {
            codebuild: aws_sdk_codebuild::Client::new(&config),
            logs: aws_sdk_cloudwatchlogs::Client::new(&config),
            s3: aws_sdk_s3::Client::new(&config),
        }
    }
}

fn aws_error<E: std::error::Error>(operation: &str, error: E) -> CollectorError {
    CollectorError::Aws(format!("{operation} failed: {}", DisplayErrorContext(error)))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// CloudWatch stream and S3 object of a build's logs.
///
/// Only `s3LogsArn` names the build's own object; the project's `s3Logs.location`
/// is a bucket/prefix setting shared by every build.
fn log_sources(logs: Option<&LogsLocation>) -> (Option<LogStream>, Option<String>) {
    let Some(logs) = logs else {
        return (None, None);
    };

    let cloudwatch = non_empty(logs.group_name()).zip(non_empty(logs.stream_name()));
    let cloudwatch = cloudwatch.map(|(group, stream)| LogStream { group, stream });

    (cloudwatch, non_empty(logs.s3_logs_arn()))
}

#[async_trait]
impl CodeBuildApi for AwsCodeBuild {
    async fn start_build(&self, project: &str) -> Result<String> {
        let output = self
            .codebuild
            .start_build()
            .project_name(project)
            .send()
            .await
            .map_err(|e| aws_error("StartBuild", e))?;

        output
            .build_value()
            .and_then(|build| build.id())
            .map(str::to_string)
            .ok_or_else(|| CollectorError::Aws("StartBuild returned no build id".to_string()))
    }

    async fn build(&self, id: &str) -> Result<Option<BuildSnapshot>> {
        let output = self
            .codebuild
            .batch_get_builds()
            .ids(id)
            .send()
            .await
            .map_err(|e| aws_error("BatchGetBuilds", e))?;

        let Some(build) = output.builds().first() else {
            return Ok(None);
        };

        let (cloudwatch, s3_location) = log_sources(build.logs());

        Ok(Some(BuildSnapshot {
            id: id.to_string(),
            status: build
                .build_status()
                .map(|status| status.as_str().to_string())
                .unwrap_or_default(),
            cloudwatch,
            s3_location,
        }))
    }

    async fn log_events(
        &self,
        stream: &LogStream,
        next_token: Option<&str>,
    ) -> Result<LogEventsPage> {
        let output = self
            .logs
            .get_log_events()
            .log_group_name(&stream.group)
            .log_stream_name(&stream.stream)
            .start_from_head(true)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| aws_error("GetLogEvents", e))?;

        Ok(LogEventsPage {
            messages: output
                .events()
                .iter()
                .filter_map(|event| event.message().map(str::to_string))
                .collect(),
            next_token: output.next_forward_token().map(str::to_string),
        })
    }

    async fn object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let output = self
            .s3
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| aws_error("GetObject", e))?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| aws_error("GetObject body", e))?;
        Ok(body.into_bytes().to_vec())
    }
}
