use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};

use super::client::{GitHubClient, WorkflowRunDto, DISPATCH_EVENT};
use crate::archive::first_log_member;
use crate::classify::Marker;
use crate::error::Result;
use crate::models::{Finished, Label, ProviderKind, RunStatus};
use crate::poll::{PollOutcome, PollPolicy};
use crate::providers::Provider;

pub const DEFAULT_WORKFLOW: &str = "ci-cd.yml";
pub const DEFAULT_REF: &str = "main";
/// Workflow input carrying the iteration index.
pub const RUN_ID_INPUT: &str = "run_id";

/// Runs that existed right before the dispatch; the dispatched run is the one
/// that shows up afterwards.
#[derive(Debug, Clone)]
pub struct GitHubRunHandle {
    pub known_runs: HashSet<u64>,
}

pub struct GitHubProvider {
    client: GitHubClient,
    workflow: String,
    git_ref: String,
    marker: Marker,
    policy: PollPolicy,
    settle: Duration,
}

impl WorkflowRunDto {
    fn run_status(&self) -> RunStatus {
        match (self.status.as_deref(), self.conclusion.as_deref()) {
            (Some("completed"), Some("success")) => RunStatus::Succeeded,
            (Some("completed"), _) => RunStatus::Failed,
            _ => RunStatus::Pending,
        }
    }

    fn native_status(&self) -> String {
        match &self.conclusion {
            Some(conclusion) => conclusion.clone(),
            None => self.status.clone().unwrap_or_default(),
        }
    }
}

/// Picks the dispatch-triggered run that is missing from `known_runs`.
///
/// If several new runs are listed the oldest (lowest id) wins.
pub fn find_new_run<'a>(
    known_runs: &HashSet<u64>,
    runs: &'a [WorkflowRunDto],
) -> Option<&'a WorkflowRunDto> {
    runs.iter()
        .filter(|run| run.event == DISPATCH_EVENT && !known_runs.contains(&run.id))
        .min_by_key(|run| run.id)
}

impl GitHubProvider {
    pub fn new(
        client: GitHubClient,
        workflow: String,
        git_ref: String,
        marker: Marker,
        policy: PollPolicy,
        settle: Duration,
    ) -> Self {
        Self {
            client,
            workflow,
            git_ref,
            marker,
            policy,
            settle,
        }
    }
}

#[async_trait]
impl Provider for GitHubProvider {
    type Handle = GitHubRunHandle;
    type Run = WorkflowRunDto;

    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    async fn trigger(&self, iteration: u32) -> Result<GitHubRunHandle> {
        let known_runs: HashSet<u64> = self
            .client
            .list_workflow_runs(&self.workflow, &self.git_ref)
            .await?
            .into_iter()
            .map(|run| run.id)
            .collect();
        debug!(
            "{} existing {} runs before dispatch",
            known_runs.len(),
            self.workflow
        );

        let mut inputs = serde_json::Map::new();
        inputs.insert(
            RUN_ID_INPUT.to_string(),
            serde_json::Value::from(iteration.to_string()),
        );
        self.client
            .dispatch_workflow(&self.workflow, &self.git_ref, &inputs)
            .await?;
        info!(
            "Dispatched {} on {} for iteration {iteration}",
            self.workflow, self.git_ref
        );

        // The new run is not listed immediately after the dispatch call returns.
        tokio::time::sleep(self.settle).await;

        Ok(GitHubRunHandle { known_runs })
    }

    async fn poll(
        &self,
        handle: &GitHubRunHandle,
    ) -> Result<PollOutcome<Finished<WorkflowRunDto>>> {
        self.policy
            .run(|attempt| async move {
                let runs = self
                    .client
                    .list_workflow_runs(&self.workflow, &self.git_ref)
                    .await?;

                let Some(run) = find_new_run(&handle.known_runs, &runs) else {
                    debug!("Attempt {attempt}: dispatched run not listed yet");
                    return Ok(None);
                };

                let status = run.run_status();
                if !status.is_terminal() {
                    debug!(
                        "Attempt {attempt}: run {} is {}",
                        run.id,
                        run.status.as_deref().unwrap_or("unknown")
                    );
                    return Ok(None);
                }

                info!("Workflow run {} completed ({})", run.id, run.native_status());
                Ok(Some(Finished {
                    run: run.clone(),
                    status,
                    native_status: run.native_status(),
                }))
            })
            .await
    }

    async fn fetch(&self, run: &WorkflowRunDto) -> Result<Option<Vec<u8>>> {
        let archive = self.client.download_run_logs(run.id).await?;
        let log = first_log_member(&archive)?;

        if log.is_none() {
            warn!("Log archive of workflow run {} holds no .txt/.log file", run.id);
        }
        Ok(log)
    }

    fn classify(&self, content: &[u8]) -> Label {
        self.marker.classify(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::build_zip;
    use crate::auth::Token;
    use crate::models::Outcome;
    use crate::output::OutputLayout;
    use crate::providers::Collector;
    use mockito::Matcher;

    fn run(id: u64, event: &str, status: &str, conclusion: Option<&str>) -> WorkflowRunDto {
        WorkflowRunDto {
            id,
            event: event.to_string(),
            status: Some(status.to_string()),
            conclusion: conclusion.map(str::to_string),
        }
    }

    fn provider(server: &mockito::Server, max_attempts: u32) -> GitHubProvider {
        let client = GitHubClient::new(&server.url(), "acme/app", Token::from("t")).unwrap();
        GitHubProvider::new(
            client,
            DEFAULT_WORKFLOW.to_string(),
            DEFAULT_REF.to_string(),
            Marker::default(),
            PollPolicy::new(Duration::ZERO, max_attempts),
            Duration::ZERO,
        )
    }

    const RUNS_PATH: &str = "/repos/acme/app/actions/workflows/ci-cd.yml/runs";

    #[test]
    fn test_find_new_run_selects_the_unseen_run() {
        let known: HashSet<u64> = [1, 2].into_iter().collect();
        let runs = vec![
            run(3, "workflow_dispatch", "queued", None),
            run(2, "workflow_dispatch", "completed", Some("success")),
            run(1, "workflow_dispatch", "completed", Some("success")),
        ];

        let found = find_new_run(&known, &runs).unwrap();

        assert_eq!(found.id, 3);
    }

    #[test]
    fn test_find_new_run_ignores_other_events() {
        let known: HashSet<u64> = [1].into_iter().collect();
        let runs = vec![run(5, "push", "completed", Some("success"))];

        assert!(find_new_run(&known, &runs).is_none());
    }

    #[test]
    fn test_find_new_run_prefers_oldest_new_run() {
        let known = HashSet::new();
        let runs = vec![
            run(9, "workflow_dispatch", "queued", None),
            run(7, "workflow_dispatch", "in_progress", None),
        ];

        assert_eq!(find_new_run(&known, &runs).unwrap().id, 7);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            run(1, "workflow_dispatch", "completed", Some("success")).run_status(),
            RunStatus::Succeeded
        );
        assert_eq!(
            run(1, "workflow_dispatch", "completed", Some("cancelled")).run_status(),
            RunStatus::Failed
        );
        assert_eq!(
            run(1, "workflow_dispatch", "in_progress", None).run_status(),
            RunStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_poll_returns_completed_new_run() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", RUNS_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"workflow_runs":[
                    {"id":3,"event":"workflow_dispatch","status":"completed","conclusion":"success"},
                    {"id":2,"event":"workflow_dispatch","status":"completed","conclusion":"failure"},
                    {"id":1,"event":"workflow_dispatch","status":"completed","conclusion":"success"}
                ]}"#,
            )
            .create_async()
            .await;
        let handle = GitHubRunHandle {
            known_runs: [1, 2].into_iter().collect(),
        };

        let outcome = provider(&server, 5).poll(&handle).await.unwrap();

        match outcome {
            PollOutcome::Ready(finished) => {
                assert_eq!(finished.run.id, 3);
                assert_eq!(finished.status, RunStatus::Succeeded);
            }
            other => panic!("expected a finished run, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_poll_times_out_when_no_new_run_appears() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", RUNS_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"workflow_runs":[
                    {"id":1,"event":"workflow_dispatch","status":"completed","conclusion":"success"}
                ]}"#,
            )
            .expect(4)
            .create_async()
            .await;
        let handle = GitHubRunHandle {
            known_runs: [1].into_iter().collect(),
        };

        let outcome = provider(&server, 4).poll(&handle).await.unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 4 });
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_collect_writes_extracted_log() {
        let mut server = mockito::Server::new_async().await;
        // Snapshot and polls both see run 10 completed; run 9 existed before.
        server
            .mock("GET", RUNS_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"workflow_runs":[
                    {"id":9,"event":"workflow_dispatch","status":"completed","conclusion":"success"}
                ]}"#,
            )
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", RUNS_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"workflow_runs":[
                    {"id":10,"event":"workflow_dispatch","status":"completed","conclusion":"success"},
                    {"id":9,"event":"workflow_dispatch","status":"completed","conclusion":"success"}
                ]}"#,
            )
            .create_async()
            .await;
        server
            .mock("POST", "/repos/acme/app/actions/workflows/ci-cd.yml/dispatches")
            .with_status(204)
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/app/actions/runs/10/logs")
            .with_status(200)
            .with_body(build_zip(&[("0_deploy.txt", "Rollback took 14s\n")]))
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(tmp.path());
        layout.prepare(&[ProviderKind::GitHub]).unwrap();

        let outcome = provider(&server, 3).collect(1, &layout, false).await.unwrap();

        let expected = layout.log_path(ProviderKind::GitHub, Label::Rollback, 1);
        assert_eq!(
            outcome,
            Outcome::Collected {
                path: expected.clone(),
                label: Label::Rollback
            }
        );
        assert_eq!(
            std::fs::read_to_string(expected).unwrap(),
            "Rollback took 14s\n"
        );
    }

    #[tokio::test]
    async fn test_fetch_without_log_member_reports_no_logs() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/app/actions/runs/4/logs")
            .with_status(200)
            .with_body(build_zip(&[("summary.json", "{}")]))
            .create_async()
            .await;

        let log = provider(&server, 1)
            .fetch(&run(4, "workflow_dispatch", "completed", Some("success")))
            .await
            .unwrap();

        assert!(log.is_none());
    }
}
