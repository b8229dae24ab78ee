use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser};
use log::{debug, info};

use crate::auth::Token;
use crate::classify::{Marker, DEFAULT_ROLLBACK_MARKER};
use crate::driver::Session;
use crate::error::CollectorError;
use crate::models::ProviderKind;
use crate::output::{OutputLayout, DEFAULT_OUTDIR};
use crate::poll::PollPolicy;
use crate::providers::codebuild::{AwsCodeBuild, CodeBuildProvider};
use crate::providers::github::{
    GitHubClient, GitHubProvider, DEFAULT_API_URL, DEFAULT_REF, DEFAULT_WORKFLOW,
};
use crate::providers::jenkins::{JenkinsClient, JenkinsProvider};
use crate::providers::Collector;

#[derive(Parser)]
#[command(name = "ci-runlog")]
#[command(
    author,
    version,
    about = "Trigger CI/CD runs and collect their deploy/rollback logs",
    long_about = None
)]
pub struct Cli {
    /// Number of runs per provider
    #[arg(short = 'n', long, default_value_t = 10)]
    runs: u32,

    /// Directory to save all logs
    #[arg(short, long, default_value = DEFAULT_OUTDIR)]
    outdir: PathBuf,

    /// Also collect logs of runs that finished unsuccessfully
    #[arg(long, default_value_t = false)]
    include_failed: bool,

    #[command(flatten)]
    polling: PollingArgs,

    #[command(flatten)]
    github: GitHubArgs,

    #[command(flatten)]
    codebuild: CodeBuildArgs,

    #[command(flatten)]
    jenkins: JenkinsArgs,
}

#[derive(Args)]
struct PollingArgs {
    /// Seconds between status polls
    #[arg(long, default_value_t = 10)]
    poll_interval: u64,

    /// Status polls before a run is reported as timed out
    #[arg(long, default_value_t = 60)]
    max_polls: u32,

    /// Seconds to wait between iterations
    #[arg(long, default_value_t = 5)]
    pause: u64,
}

#[derive(Args)]
struct GitHubArgs {
    /// GitHub API token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Token,

    /// Repository in owner/repo form
    #[arg(long, env = "GITHUB_REPO")]
    github_repo: String,

    /// Workflow file name (or id) to dispatch
    #[arg(long, env = "GITHUB_WORKFLOW", default_value = DEFAULT_WORKFLOW)]
    github_workflow: String,

    /// Branch the workflow runs on
    #[arg(long, env = "GITHUB_REF_NAME", default_value = DEFAULT_REF)]
    github_ref: String,

    /// GitHub API base URL (GitHub Enterprise: https://host/api/v3)
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    github_api_url: String,

    /// Rollback marker pattern for workflow logs
    #[arg(long, default_value = DEFAULT_ROLLBACK_MARKER)]
    github_marker: String,
}

#[derive(Args)]
struct CodeBuildArgs {
    /// CodeBuild project name
    #[arg(long, env = "CODEBUILD_PROJECT")]
    codebuild_project: String,

    /// Rollback marker pattern for build logs
    #[arg(long, default_value = DEFAULT_ROLLBACK_MARKER)]
    codebuild_marker: String,
}

#[derive(Args)]
struct JenkinsArgs {
    /// Jenkins server URL
    #[arg(long, env = "JENKINS_URL")]
    jenkins_url: String,

    /// Jenkins user name
    #[arg(long, env = "JENKINS_USER")]
    jenkins_user: String,

    /// Jenkins API token
    #[arg(long, env = "JENKINS_TOKEN", hide_env_values = true)]
    jenkins_token: Token,

    /// Job name, folders separated by '/'
    #[arg(long, env = "JENKINS_JOB")]
    jenkins_job: String,

    /// Fetch a CSRF crumb before triggering (off: crumb checks are skipped)
    #[arg(long, default_value_t = false)]
    jenkins_crumb: bool,

    /// Trigger with /build instead of /buildWithParameters?RUN_ID=<n>
    #[arg(long, default_value_t = false)]
    jenkins_no_params: bool,

    /// Rollback marker pattern for console output
    #[arg(long, default_value = DEFAULT_ROLLBACK_MARKER)]
    jenkins_marker: String,
}

fn marker(provider: ProviderKind, pattern: &str) -> std::result::Result<Marker, CollectorError> {
    let marker = Marker::new(pattern)?;
    debug!("{provider} rollback marker: {}", marker.as_str());
    Ok(marker)
}

fn require(value: &str, name: &str) -> std::result::Result<(), CollectorError> {
    if value.trim().is_empty() {
        return Err(CollectorError::Config(format!("{name} must not be empty")));
    }
    Ok(())
}

impl Cli {
    fn validate(&self) -> std::result::Result<(), CollectorError> {
        if self.github.github_token.is_empty() {
            return Err(CollectorError::Config("GITHUB_TOKEN must not be empty".into()));
        }
        if self.jenkins.jenkins_token.is_empty() {
            return Err(CollectorError::Config("JENKINS_TOKEN must not be empty".into()));
        }
        require(&self.codebuild.codebuild_project, "CODEBUILD_PROJECT")?;
        require(&self.jenkins.jenkins_url, "JENKINS_URL")?;
        require(&self.jenkins.jenkins_user, "JENKINS_USER")?;
        require(&self.jenkins.jenkins_job, "JENKINS_JOB")?;
        Ok(())
    }

    fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.polling.poll_interval),
            self.polling.max_polls,
        )
    }

    async fn collectors(&self) -> Result<Vec<Box<dyn Collector>>> {
        let policy = self.poll_policy();
        let pause = Duration::from_secs(self.polling.pause);

        let github = GitHubProvider::new(
            GitHubClient::new(
                &self.github.github_api_url,
                &self.github.github_repo,
                self.github.github_token.clone(),
            )?,
            self.github.github_workflow.clone(),
            self.github.github_ref.clone(),
            marker(ProviderKind::GitHub, &self.github.github_marker)?,
            policy,
            pause,
        );

        let codebuild = CodeBuildProvider::new(
            AwsCodeBuild::from_env().await,
            self.codebuild.codebuild_project.clone(),
            marker(ProviderKind::CodeBuild, &self.codebuild.codebuild_marker)?,
            policy,
        );

        let jenkins = JenkinsProvider::new(
            JenkinsClient::new(
                &self.jenkins.jenkins_url,
                self.jenkins.jenkins_user.clone(),
                self.jenkins.jenkins_token.clone(),
                !self.jenkins.jenkins_crumb,
            )?,
            self.jenkins.jenkins_job.clone(),
            !self.jenkins.jenkins_no_params,
            marker(ProviderKind::Jenkins, &self.jenkins.jenkins_marker)?,
            policy,
        );

        Ok(vec![Box::new(github), Box::new(codebuild), Box::new(jenkins)])
    }

    pub async fn execute(&self) -> Result<()> {
        self.validate()?;

        info!(
            "Collecting {} runs per provider into {}",
            self.runs,
            self.outdir.display()
        );

        let session = Session::new(self.collectors().await?, OutputLayout::new(&self.outdir))
            .with_pause(Duration::from_secs(self.polling.pause))
            .include_failed(self.include_failed);

        let summary = session.run(self.runs).await?;
        summary.print();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const BASE: [&str; 12] = [
        "--github-token=ghp_x",
        "--github-repo=acme/app",
        "--codebuild-project=deployer",
        "--jenkins-url=https://jenkins.example.com",
        "--jenkins-user=deployer",
        "--jenkins-token=11f0",
        "--jenkins-job=deploy",
        "--github-api-url=https://api.github.com",
        "--github-workflow=ci-cd.yml",
        "--github-ref=main",
        "--poll-interval=10",
        "--max-polls=60",
    ];

    /// Parses the base arguments with `overrides` replacing flags of the same name.
    fn parse(overrides: &[&str]) -> std::result::Result<Cli, clap::Error> {
        let flag = |arg: &str| arg.split('=').next().unwrap_or(arg).to_string();
        let overridden: Vec<String> = overrides.iter().map(|a| flag(a)).collect();

        let args = std::iter::once("ci-runlog")
            .chain(BASE.iter().copied().filter(|a| !overridden.contains(&flag(a))))
            .chain(overrides.iter().copied());
        Cli::try_parse_from(args)
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]).unwrap();

        assert_eq!(cli.runs, 10);
        assert_eq!(cli.outdir, PathBuf::from("ci-logs"));
        assert!(!cli.include_failed);
        assert_eq!(cli.polling.pause, 5);
        assert!(!cli.jenkins.jenkins_crumb);
        assert_eq!(cli.jenkins.jenkins_marker, DEFAULT_ROLLBACK_MARKER);
        assert_eq!(cli.poll_policy(), PollPolicy::default());
    }

    #[test]
    fn test_short_flags() {
        let cli = parse(&["-n", "3", "-o", "out"]).unwrap();

        assert_eq!(cli.runs, 3);
        assert_eq!(cli.outdir, PathBuf::from("out"));
    }

    #[test]
    fn test_negative_runs_are_rejected() {
        assert!(parse(&["--runs=-1"]).is_err());
    }

    #[test]
    fn test_blank_token_fails_validation() {
        let cli = parse(&["--jenkins-token=  "]).unwrap();

        assert!(matches!(cli.validate(), Err(CollectorError::Config(_))));
    }

    #[test]
    fn test_valid_arguments_pass_validation() {
        let cli = parse(&["--jenkins-crumb", "--include-failed"]).unwrap();

        assert!(cli.validate().is_ok());
        assert!(cli.jenkins.jenkins_crumb);
        assert!(cli.include_failed);
    }
}
