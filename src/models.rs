use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    GitHub,
    CodeBuild,
    Jenkins,
}

impl ProviderKind {
    /// Collection order used by the driver.
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::GitHub,
        ProviderKind::CodeBuild,
        ProviderKind::Jenkins,
    ];

    /// Directory and file-name prefix used for this provider's logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github",
            ProviderKind::CodeBuild => "codebuild",
            ProviderKind::Jenkins => "jenkins",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::GitHub => "GitHub",
            ProviderKind::CodeBuild => "CodeBuild",
            ProviderKind::Jenkins => "Jenkins",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Deploy,
    Rollback,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Deploy => "deploy",
            Label::Rollback => "rollback",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider status normalized to what the driver cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Pending)
    }
}

/// A run that reached a terminal state, carrying whatever the provider
/// needs to fetch its log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished<R> {
    pub run: R,
    pub status: RunStatus,
    /// Status as reported by the provider, e.g. `FAULT` or `UNSTABLE`.
    pub native_status: String,
}

#[derive(Debug)]
pub struct CollectedLog {
    pub provider: ProviderKind,
    pub iteration: u32,
    pub label: Label,
    pub content: Vec<u8>,
    pub collected_at: DateTime<Utc>,
}

/// Result of one trigger/poll/fetch/classify attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Collected { path: PathBuf, label: Label },
    TimedOut { attempts: u32 },
    Failed { status: String },
    NoLogs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_names_are_directory_safe() {
        let names: Vec<&str> = ProviderKind::ALL.iter().map(|p| p.as_str()).collect();

        assert_eq!(names, vec!["github", "codebuild", "jenkins"]);
    }

    #[test]
    fn test_label_display() {
        assert_eq!(Label::Deploy.to_string(), "deploy");
        assert_eq!(Label::Rollback.to_string(), "rollback");
    }

    #[test]
    fn test_only_pending_is_not_terminal() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }
}
