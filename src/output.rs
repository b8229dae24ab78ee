use std::fs;
use std::path::PathBuf;

use log::{debug, info};

use crate::error::Result;
use crate::models::{CollectedLog, Label, ProviderKind};

pub const DEFAULT_OUTDIR: &str = "ci-logs";

/// `<root>/<provider>/<provider>-<label>-<iteration>.log`
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn provider_dir(&self, provider: ProviderKind) -> PathBuf {
        self.root.join(provider.as_str())
    }

    pub fn log_path(&self, provider: ProviderKind, label: Label, iteration: u32) -> PathBuf {
        self.provider_dir(provider)
            .join(format!("{}-{}-{}.log", provider.as_str(), label, iteration))
    }

    /// Wipes and recreates the directory of every given provider.
    pub fn prepare(&self, providers: &[ProviderKind]) -> Result<()> {
        for &provider in providers {
            let dir = self.provider_dir(provider);
            if dir.exists() {
                debug!("Removing stale output directory {}", dir.display());
                fs::remove_dir_all(&dir)?;
            }
            fs::create_dir_all(&dir)?;
        }

        info!("Output directories ready under {}", self.root.display());
        Ok(())
    }

    pub fn write(&self, log: &CollectedLog) -> Result<PathBuf> {
        let path = self.log_path(log.provider, log.label, log.iteration);
        fs::write(&path, &log.content)?;

        info!(
            "{} run {} written to {} ({} bytes, collected {})",
            log.provider,
            log.iteration,
            path.display(),
            log.content.len(),
            log.collected_at.to_rfc3339()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn collected(provider: ProviderKind, label: Label, iteration: u32) -> CollectedLog {
        CollectedLog {
            provider,
            iteration,
            label,
            content: b"line1\n".to_vec(),
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn test_log_path_layout() {
        let layout = OutputLayout::new("ci-logs");

        let path = layout.log_path(ProviderKind::Jenkins, Label::Rollback, 7);

        assert_eq!(path, PathBuf::from("ci-logs/jenkins/jenkins-rollback-7.log"));
    }

    #[test]
    fn test_prepare_creates_provider_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(tmp.path());

        layout.prepare(&ProviderKind::ALL).unwrap();

        for provider in ProviderKind::ALL {
            assert!(layout.provider_dir(provider).is_dir());
        }
    }

    #[test]
    fn test_prepare_removes_stale_files() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(tmp.path());
        layout.prepare(&[ProviderKind::GitHub]).unwrap();
        let stale = layout.provider_dir(ProviderKind::GitHub).join("github-deploy-99.log");
        fs::write(&stale, "old").unwrap();

        layout.prepare(&[ProviderKind::GitHub]).unwrap();

        assert!(!stale.exists());
        assert_eq!(
            fs::read_dir(layout.provider_dir(ProviderKind::GitHub))
                .unwrap()
                .count(),
            0
        );
    }

    #[test]
    fn test_prepare_leaves_unrelated_directories_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let notes = tmp.path().join("notes.txt");
        fs::write(&notes, "keep me").unwrap();
        let layout = OutputLayout::new(tmp.path());

        layout.prepare(&ProviderKind::ALL).unwrap();

        assert!(notes.exists());
    }

    #[test]
    fn test_write_uses_label_and_iteration() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(tmp.path());
        layout.prepare(&[ProviderKind::CodeBuild]).unwrap();

        let path = layout
            .write(&collected(ProviderKind::CodeBuild, Label::Deploy, 3))
            .unwrap();

        assert!(path.ends_with("codebuild/codebuild-deploy-3.log"));
        assert_eq!(fs::read(path).unwrap(), b"line1\n");
    }
}
