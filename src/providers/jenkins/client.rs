use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::auth::Token;
use crate::error::{CollectorError, Result};

pub struct JenkinsClient {
    client: Client,
    base_url: Url,
    user: String,
    token: Token,
    skip_crumb: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobInfoDto {
    #[serde(default)]
    last_build: Option<BuildRefDto>,
    #[serde(default)]
    next_build_number: Option<u64>,
}

/// Build numbering of a job at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobBuilds {
    /// `None` if the job never ran (or every build was deleted).
    pub last: Option<u64>,
    /// Number the next queued build will get.
    pub next: u64,
}

#[derive(Debug, Deserialize)]
struct BuildRefDto {
    number: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BuildInfoDto {
    pub number: u64,
    #[serde(default)]
    pub building: bool,
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrumbDto {
    crumb: String,
    crumb_request_field: String,
}

/// `folder/job` -> `job/folder/job/job/`
fn job_path(job: &str) -> String {
    let mut path = String::new();
    for segment in job.split('/').filter(|s| !s.is_empty()) {
        path.push_str("job/");
        path.push_str(segment);
        path.push('/');
    }
    path
}

impl JenkinsClient {
    /// `skip_crumb` leaves CSRF crumbs out of every request; API-token
    /// authenticated calls are exempt from crumb checks on current Jenkins.
    pub fn new(base_url: &str, user: String, token: Token, skip_crumb: bool) -> Result<Self> {
        // Crumbs are bound to the session that requested them.
        let client = Client::builder()
            .user_agent(concat!("ci-runlog/", env!("CARGO_PKG_VERSION")))
            .cookie_store(true)
            .build()
            .map_err(|e| CollectorError::Config(format!("Failed to create HTTP client: {e}")))?;

        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .map_err(|e| CollectorError::Config(format!("Invalid Jenkins URL: {e}")))?;

        Ok(Self {
            client,
            base_url,
            user,
            token,
            skip_crumb,
        })
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(&self.user, Some(self.token.as_str()))
    }

    fn job_url(&self, job: &str, path: &str) -> Result<Url> {
        self.base_url
            .join(&format!("{}{path}", job_path(job)))
            .map_err(|e| CollectorError::Config(format!("Invalid URL for job {job}: {e}")))
    }

    async fn crumb(&self) -> Result<Option<CrumbDto>> {
        if self.skip_crumb {
            return Ok(None);
        }

        let url = self
            .base_url
            .join("crumbIssuer/api/json")
            .map_err(|e| CollectorError::Config(format!("Invalid crumb issuer URL: {e}")))?;
        let response = self.auth_request(self.client.get(url)).send().await?;

        // No crumb issuer means CSRF protection is off.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let crumb = response.error_for_status()?.json::<CrumbDto>().await?;
        Ok(Some(crumb))
    }

    /// Queues a build. Empty `params` uses the plain `build` endpoint.
    pub async fn trigger_build(&self, job: &str, params: &[(&str, String)]) -> Result<()> {
        let url = if params.is_empty() {
            self.job_url(job, "build")?
        } else {
            self.job_url(job, "buildWithParameters")?
        };

        let mut request = self.auth_request(self.client.post(url)).query(params);
        if let Some(crumb) = self.crumb().await? {
            request = request.header(crumb.crumb_request_field, crumb.crumb);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollectorError::Api(format!(
                "Failed to trigger Jenkins job {job}: {status} - {body}"
            )));
        }

        Ok(())
    }

    /// Last and next build numbers. `nextBuildNumber` keeps counting past
    /// deleted builds, so it is the number the next trigger will get.
    pub async fn job_builds(&self, job: &str) -> Result<JobBuilds> {
        let url = self.job_url(job, "api/json")?;

        let response = self
            .auth_request(self.client.get(url))
            .query(&[("tree", "lastBuild[number],nextBuildNumber")])
            .send()
            .await?
            .error_for_status()?;
        let info = response.json::<JobInfoDto>().await?;

        let last = info.last_build.map(|build| build.number);
        Ok(JobBuilds {
            last,
            next: info
                .next_build_number
                .unwrap_or_else(|| last.unwrap_or(0) + 1),
        })
    }

    /// `None` while the build is still queued and has no page yet.
    pub async fn build_info(&self, job: &str, number: u64) -> Result<Option<BuildInfoDto>> {
        let url = self.job_url(job, &format!("{number}/api/json"))?;

        let response = self
            .auth_request(self.client.get(url))
            .query(&[("tree", "number,building,result")])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let build = response.error_for_status()?.json::<BuildInfoDto>().await?;
        Ok(Some(build))
    }

    pub async fn console_text(&self, job: &str, number: u64) -> Result<String> {
        let url = self.job_url(job, &format!("{number}/consoleText"))?;

        let response = self
            .auth_request(self.client.get(url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}
