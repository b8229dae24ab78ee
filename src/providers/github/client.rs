use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::Token;
use crate::error::{CollectorError, Result};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DISPATCH_EVENT: &str = "workflow_dispatch";

const RUNS_PER_PAGE: u32 = 100;

pub struct GitHubClient {
    client: Client,
    repo_url: Url,
    token: Token,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WorkflowRunDto {
    pub id: u64,
    pub event: String,
    pub status: Option<String>,
    pub conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRunsPage {
    workflow_runs: Vec<WorkflowRunDto>,
}

#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    #[serde(rename = "ref")]
    ref_: &'a str,
    inputs: &'a serde_json::Map<String, serde_json::Value>,
}

/// Checks an `owner/repo` slug.
pub fn validate_repo(repo: &str) -> Result<()> {
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(())
        }
        _ => Err(CollectorError::Config(format!(
            "GitHub repository must be in owner/repo form, got '{repo}'"
        ))),
    }
}

impl GitHubClient {
    pub fn new(api_url: &str, repo: &str, token: Token) -> Result<Self> {
        validate_repo(repo)?;

        let client = Client::builder()
            .user_agent(concat!("ci-runlog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CollectorError::Config(format!("Failed to create HTTP client: {e}")))?;

        let repo_url = Url::parse(&format!("{}/", api_url.trim_end_matches('/')))
            .map_err(|e| CollectorError::Config(format!("Invalid GitHub API URL: {e}")))?
            .join(&format!("repos/{repo}/"))
            .map_err(|e| CollectorError::Config(format!("Invalid repository URL: {e}")))?;

        Ok(Self {
            client,
            repo_url,
            token,
        })
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(self.token.as_str())
            .header(ACCEPT, "application/vnd.github+json")
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.repo_url
            .join(path)
            .map_err(|e| CollectorError::Config(format!("Invalid GitHub URL '{path}': {e}")))
    }

    /// Fires a `workflow_dispatch` event. GitHub answers 204 without a run id.
    pub async fn dispatch_workflow(
        &self,
        workflow: &str,
        git_ref: &str,
        inputs: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let url = self.join(&format!("actions/workflows/{workflow}/dispatches"))?;
        let body = DispatchRequest {
            ref_: git_ref,
            inputs,
        };

        let response = self
            .auth_request(self.client.post(url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollectorError::Api(format!(
                "Failed to dispatch workflow {workflow}: {status} - {body}"
            )));
        }

        Ok(())
    }

    /// Lists the most recent dispatch-triggered runs of a workflow on a branch.
    pub async fn list_workflow_runs(
        &self,
        workflow: &str,
        branch: &str,
    ) -> Result<Vec<WorkflowRunDto>> {
        let url = self.join(&format!("actions/workflows/{workflow}/runs"))?;
        let per_page = RUNS_PER_PAGE.to_string();

        let request = self.client.get(url).query(&[
            ("branch", branch),
            ("event", DISPATCH_EVENT),
            ("per_page", per_page.as_str()),
        ]);

        let response = self
            .auth_request(request)
            .send()
            .await?
            .error_for_status()?;
        let page = response.json::<WorkflowRunsPage>().await?;
        Ok(page.workflow_runs)
    }

    /// Downloads the zip archive holding every job log of a run.
    pub async fn download_run_logs(&self, run_id: u64) -> Result<Vec<u8>> {
        let url = self.join(&format!("actions/runs/{run_id}/logs"))?;

        let response = self
            .auth_request(self.client.get(url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}
