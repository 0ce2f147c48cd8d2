//! Background sweep loop

use crate::policy::EvictionPolicy;
use crate::scan::scan_files;
use crate::types::{SweepReport, Totals};
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const GIB: f64 = (1024 * 1024 * 1024) as f64;
const MIB: f64 = (1024 * 1024) as f64;

/// Keeps one directory tree under an [`EvictionPolicy`]
#[derive(Debug, Clone)]
pub struct Janitor {
    root: PathBuf,
    policy: EvictionPolicy,
    interval: Duration,
}

impl Janitor {
    pub fn new(root: PathBuf, policy: EvictionPolicy, interval: Duration) -> Self {
        Self {
            root,
            policy,
            interval,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    /// Run one sweep synchronously.
    ///
    /// Blocks on filesystem syscalls; call from a blocking context.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::empty(self.root.clone());

        if !self.root.exists() {
            debug!(root = ?self.root, "Storage root does not exist yet, skipping sweep");
            report.root_missing = true;
            return report;
        }

        let scan = scan_files(&self.root);
        report.scanned = scan.files.len();
        report.skipped = scan.skipped;

        let totals = Totals::of(&scan.files);
        debug!(
            root = ?self.root,
            files = totals.files,
            total_gb = totals.bytes as f64 / GIB,
            "Scanned storage root"
        );

        if self.policy.is_satisfied(&totals) {
            report.remaining = totals;
            report.finished_at = Utc::now();
            return report;
        }

        let mut plan = self.policy.plan(scan.files);
        while let Some(file) = plan.next_victim() {
            match std::fs::remove_file(&file.path) {
                Ok(()) => {
                    report.deleted += 1;
                    report.reclaimed_bytes += file.size;
                    plan.removed(&file);
                    info!(
                        path = ?file.path,
                        size_mb = file.size as f64 / MIB,
                        modified = %chrono::DateTime::<Utc>::from(file.modified).format("%Y-%m-%d %H:%M:%S"),
                        "Evicted file"
                    );
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    // Someone else removed it between scan and delete
                    plan.removed(&file);
                }
                Err(e) => {
                    warn!(path = ?file.path, error = %e, "Failed to delete file");
                    report.delete_failures += 1;
                }
            }
        }

        let totals = plan.totals();
        report.remaining = totals;
        report.within_budget = self.policy.is_satisfied(&totals);
        report.finished_at = Utc::now();

        info!(
            root = ?self.root,
            deleted = report.deleted,
            freed_gb = report.reclaimed_bytes as f64 / GIB,
            remaining_files = totals.files,
            remaining_gb = totals.bytes as f64 / GIB,
            within_budget = report.within_budget,
            "Sweep complete"
        );
        if !report.within_budget {
            warn!(root = ?self.root, "Storage still over budget after sweep");
        }

        report
    }

    /// Spawn the sweep loop on the current tokio runtime.
    ///
    /// The first sweep runs immediately, then once per interval. Ticks missed
    /// while a sweep is still running are dropped.
    pub fn start(self) -> JanitorHandle {
        info!(
            root = ?self.root,
            ceilings = ?self.policy.ceilings(),
            interval_secs = self.interval.as_secs(),
            "Starting janitor"
        );

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let reports = ReportSlot::new(self.root.clone());
        let slot = reports.clone();
        let janitor = Arc::new(self);

        let task = tokio::spawn(async move {
            let mut ticker = interval(janitor.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {}
                }

                let worker = Arc::clone(&janitor);
                match tokio::task::spawn_blocking(move || worker.sweep()).await {
                    Ok(report) => *slot.latest.write().await = Some(report),
                    Err(e) => error!(root = ?janitor.root, error = %e, "Sweep task failed"),
                }
            }

            debug!(root = ?janitor.root, "Janitor stopped");
        });

        JanitorHandle {
            shutdown: shutdown_tx,
            task,
            reports,
        }
    }
}

/// Shared view of a janitor's most recent sweep
#[derive(Debug, Clone)]
pub struct ReportSlot {
    root: PathBuf,
    latest: Arc<RwLock<Option<SweepReport>>>,
}

impl ReportSlot {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn latest(&self) -> Option<SweepReport> {
        self.latest.read().await.clone()
    }
}

/// Handle to a running janitor loop
///
/// Dropping the handle also ends the loop after the current sweep.
#[derive(Debug)]
pub struct JanitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    reports: ReportSlot,
}

impl JanitorHandle {
    /// The report of the most recent completed sweep
    pub async fn last_report(&self) -> Option<SweepReport> {
        self.reports.latest().await
    }

    /// A cloneable reader for the sweep reports, usable after the handle moves
    pub fn reports(&self) -> ReportSlot {
        self.reports.clone()
    }

    /// Stop the loop and wait for an in-progress sweep to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Janitor task panicked");
        }
    }
}
