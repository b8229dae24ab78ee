use std::time::Duration;

use indexmap::IndexMap;
use log::{info, warn};

use crate::error::Result;
use crate::models::{Label, Outcome, ProviderKind};
use crate::output::OutputLayout;
use crate::providers::Collector;

pub const DEFAULT_PAUSE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub collected: u32,
    pub rollbacks: u32,
    pub timed_out: u32,
    pub failed: u32,
    pub no_logs: u32,
}

impl Tally {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Collected { label, .. } => {
                self.collected += 1;
                if *label == Label::Rollback {
                    self.rollbacks += 1;
                }
            }
            Outcome::TimedOut { .. } => self.timed_out += 1,
            Outcome::Failed { .. } => self.failed += 1,
            Outcome::NoLogs => self.no_logs += 1,
        }
    }
}

/// Per-provider outcome counts, in collection order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub providers: IndexMap<ProviderKind, Tally>,
}

impl Summary {
    pub fn print(&self) {
        println!("\n=== Summary ===");
        for (provider, tally) in &self.providers {
            println!(
                "{:<10} {} collected ({} rollback), {} timed out, {} failed, {} without logs",
                provider.as_str(),
                tally.collected,
                tally.rollbacks,
                tally.timed_out,
                tally.failed,
                tally.no_logs
            );
        }
    }
}

/// Stderr line for a reported, non-fatal outcome. Collected runs have none.
fn warning(provider: ProviderKind, iteration: u32, outcome: &Outcome) -> Option<String> {
    match outcome {
        Outcome::Collected { .. } => None,
        Outcome::TimedOut { attempts } => Some(format!(
            "⏰ {provider} run {iteration} timeout after {attempts} polls"
        )),
        Outcome::Failed { status } => Some(format!(
            "⚠️ {provider} run {iteration} finished with {status}, log not collected"
        )),
        Outcome::NoLogs => Some(format!("⚠️ {provider} run {iteration}: no logs found")),
    }
}

fn report(provider: ProviderKind, iteration: u32, outcome: &Outcome) {
    if let Outcome::Collected { path, label } = outcome {
        println!("{provider} run {iteration}: {label} -> {}", path.display());
    }

    if let Some(message) = warning(provider, iteration, outcome) {
        warn!("{message}");
        eprintln!("{message}");
    }
}

/// Runs every collector once per iteration, one at a time.
pub struct Session {
    collectors: Vec<Box<dyn Collector>>,
    layout: OutputLayout,
    pause: Duration,
    include_failed: bool,
}

impl Session {
    pub fn new(collectors: Vec<Box<dyn Collector>>, layout: OutputLayout) -> Self {
        Self {
            collectors,
            layout,
            pause: DEFAULT_PAUSE,
            include_failed: false,
        }
    }

    #[must_use]
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    #[must_use]
    pub fn include_failed(mut self, include_failed: bool) -> Self {
        self.include_failed = include_failed;
        self
    }

    /// Runs `runs` iterations. Only hard errors (a rejected trigger, a broken
    /// provider call, an unwritable output directory) end the session early.
    pub async fn run(&self, runs: u32) -> Result<Summary> {
        let providers: Vec<ProviderKind> = self.collectors.iter().map(|c| c.provider()).collect();
        self.layout.prepare(&providers)?;

        let mut summary = Summary {
            providers: providers.iter().map(|&p| (p, Tally::default())).collect(),
        };

        for iteration in 1..=runs {
            println!("\n=== Run {iteration}/{runs} ===");

            for collector in &self.collectors {
                let provider = collector.provider();
                let outcome = collector
                    .collect(iteration, &self.layout, self.include_failed)
                    .await?;

                report(provider, iteration, &outcome);
                summary.providers.entry(provider).or_default().record(&outcome);
            }

            if iteration < runs {
                tokio::time::sleep(self.pause).await;
            }
        }

        info!(
            "Collection session finished: {runs} iterations across {} providers",
            providers.len()
        );
        Ok(summary)
    }
}
