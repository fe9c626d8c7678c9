//! Refresh pipeline orchestration.
//!
//! A run walks `Scanning → Deriving → (per project: Storing → GitHub? →
//! Enriching?)` and ends in exactly one terminal event: `done`, `cancelled`
//! or `pipeline_error`. Progress events are dropped when the subscriber lags;
//! the terminal event waits for room. Scan and derive run once for the whole batch; a failure
//! there is fatal. Per-project failures are isolated: a store failure skips
//! that project, an enrichment failure is recorded and the batch continues.
//!
//! Cancellation is cooperative. The token is checked before each project's
//! store step and before each enrichment call; an in-flight GitHub lookup or
//! enrichment races the token (and enrichment a per-call timeout), and the losing call is dropped (which
//! kills its subprocess or aborts its request). Work committed for earlier
//! projects is kept.

pub mod events;
pub mod guard;
pub mod sink;
pub mod store;

pub use events::{PipelineEvent, RunSummary, Step};
pub use guard::{RunGuard, RunPermit};
pub use sink::EventSink;
pub use store::ProjectStore;

use chrono::{DateTime, Utc};
use serde_json::json;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::{DerivedRecord, GitHubRecord, ScanRecord, UpsertProject};
use crate::enrich::{EnrichError, Enricher, EnrichmentInput};
use crate::error::{Error, Result};
use crate::github::{parse_owner_repo, GitHubData, GitHubSource};
use crate::scan::{content_hash, FactRecord, Scanner};
use crate::scoring::{score, Scored};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Tunables for a refresh.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on one enrichment call.
    pub enrich_timeout: Duration,
    /// Replace metadata fields with enrichment suggestions instead of
    /// filling only empty ones.
    pub overwrite_metadata: bool,
    /// A run guard older than this is taken over.
    pub stale_after: Duration,
    pub activity_retention_days: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enrich_timeout: Duration::from_secs(180),
            overwrite_metadata: false,
            stale_after: Duration::from_secs(600),
            activity_retention_days: 90,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enrich_timeout: config.llm_timeout(),
            overwrite_metadata: config.llm.overwrite_metadata,
            stale_after: config.stale_run_after(),
            activity_retention_days: config.pipeline.activity_retention_days,
        }
    }
}

/// Per-run options chosen by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Store scan and scores only, even when an enricher is configured.
    pub skip_enrichment: bool,
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    Cancelled(RunSummary),
}

impl RunOutcome {
    pub fn summary(&self) -> &RunSummary {
        match self {
            Self::Completed(summary) | Self::Cancelled(summary) => summary,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Position of the current project in the run.
#[derive(Debug, Clone, Copy)]
struct Progress {
    index: usize,
    total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LlmResult {
    Succeeded,
    Failed,
    Skipped,
}

impl LlmResult {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Coordinates scanner, scoring, persistence and enrichment for one run at a time.
pub struct Orchestrator {
    scanner: Arc<dyn Scanner>,
    store: Arc<dyn ProjectStore>,
    enricher: Option<Arc<dyn Enricher>>,
    github: Option<Arc<dyn GitHubSource>>,
    config: PipelineConfig,
    guard: RunGuard,
}

impl Orchestrator {
    pub fn new(
        scanner: Arc<dyn Scanner>,
        store: Arc<dyn ProjectStore>,
        enricher: Option<Arc<dyn Enricher>>,
        config: PipelineConfig,
    ) -> Self {
        let guard = RunGuard::new(config.stale_after);
        Self {
            scanner,
            store,
            enricher,
            github: None,
            config,
            guard,
        }
    }

    /// Collect repository data from `source` for projects on GitHub.
    pub fn with_github(mut self, source: Arc<dyn GitHubSource>) -> Self {
        self.github = Some(source);
        self
    }

    /// Name of the configured enrichment backend.
    pub fn enricher_name(&self) -> Option<&str> {
        self.enricher.as_deref().map(|e| e.name())
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    pub fn running_since(&self) -> Option<DateTime<Utc>> {
        self.guard.running_since()
    }

    /// Claim the run guard without starting, so a transport can reject a
    /// concurrent request before opening a stream.
    pub fn try_begin(&self) -> Result<RunPermit> {
        self.guard.try_acquire()
    }

    /// Acquire the guard and run. Fails with `Error::AlreadyRunning`, and
    /// emits nothing, when another run holds it.
    pub async fn run(
        &self,
        sink: EventSink,
        cancel: CancellationToken,
        options: RunOptions,
    ) -> Result<RunOutcome> {
        let permit = self.try_begin()?;
        self.run_with_permit(permit, sink, cancel, options).await
    }

    /// Run while holding `permit`; the guard is released when this returns.
    pub async fn run_with_permit(
        &self,
        permit: RunPermit,
        sink: EventSink,
        cancel: CancellationToken,
        options: RunOptions,
    ) -> Result<RunOutcome> {
        let started = Instant::now();
        info!("Refresh started (generation {})", permit.generation());

        match self.execute(&sink, &cancel, options, started).await {
            Ok(outcome) => {
                match &outcome {
                    RunOutcome::Completed(summary) => {
                        info!(
                            "Refresh complete: {} projects, {} enriched, {} failed, {} skipped in {}ms",
                            summary.project_count,
                            summary.llm_succeeded,
                            summary.llm_failed,
                            summary.llm_skipped,
                            summary.duration_ms
                        );
                        sink.emit_terminal(PipelineEvent::Done(summary.clone())).await;
                    }
                    RunOutcome::Cancelled(summary) => {
                        info!(
                            "Refresh cancelled after {}/{} projects",
                            summary.completed, summary.project_count
                        );
                        sink.emit_terminal(PipelineEvent::Cancelled {
                            project_count: summary.project_count,
                            completed: summary.completed,
                        })
                        .await;
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                error!("Refresh failed: {}", e);
                sink.emit_terminal(PipelineEvent::PipelineError {
                    error: e.to_string(),
                })
                .await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        sink: &EventSink,
        cancel: &CancellationToken,
        options: RunOptions,
        started: Instant,
    ) -> Result<RunOutcome> {
        let mut summary = RunSummary::default();

        // Scanning
        sink.emit(PipelineEvent::ScanStart);
        let scanner = Arc::clone(&self.scanner);
        let facts = tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .map_err(|e| Error::pipeline(format!("scan task failed: {}", e)))??;
        validate_scan(&facts)?;
        summary.project_count = facts.len();
        sink.emit(PipelineEvent::ScanComplete {
            project_count: facts.len(),
        });

        // Deriving
        sink.emit(PipelineEvent::DeriveStart);
        let scored: Vec<Option<Scored>> = facts
            .iter()
            .map(|fact| fact.is_scoreable().then(|| score(fact)))
            .collect();
        sink.emit(PipelineEvent::DeriveComplete);

        let order = processing_order(&facts, &self.store.last_touched()?);

        let present: Vec<String> = facts.iter().map(|f| f.path_hash.clone()).collect();
        let report = self.store.reconcile_pruned(&present, now_millis())?;
        summary.pruned = report.pruned;
        summary.restored = report.restored;

        let enricher = if options.skip_enrichment {
            None
        } else {
            self.enricher.as_ref()
        };
        let github = match &self.github {
            Some(source) if source.is_available().await => Some(source.as_ref()),
            Some(_) => {
                info!("gh is unavailable or not logged in, skipping GitHub data");
                None
            }
            None => None,
        };

        let total = order.len();
        let mut cancelled = false;
        for (index, &i) in order.iter().enumerate() {
            // Lets a subscriber polled on this task drain between projects.
            tokio::task::yield_now().await;
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let fact = &facts[i];
            let scored = scored[i].as_ref();

            sink.emit(PipelineEvent::ProjectStart {
                name: fact.name.clone(),
                index,
                total,
                step: Step::Store,
            });

            let scanned_at = now_millis();
            if let Err(e) = self.store_project(fact, scored, scanned_at) {
                warn!("Failed to store {}: {}", fact.name, e);
                summary.store_failed += 1;
                sink.emit(PipelineEvent::ProjectError {
                    name: fact.name.clone(),
                    step: Step::Store,
                    error: e.to_string(),
                });
                continue;
            }
            summary.completed += 1;
            sink.emit(PipelineEvent::ProjectComplete {
                name: fact.name.clone(),
                step: Step::Store,
                detail: Some(json!({
                    "status": scored.map(|s| s.status),
                    "healthScore": scored.map(|s| s.health),
                })),
            });

            let github_data = match github {
                Some(source) => self.collect_github(source, fact, cancel).await,
                None => None,
            };

            let llm_result = match (enricher, scored) {
                (Some(enricher), Some(scored)) if !cancel.is_cancelled() => {
                    let progress = Progress { index, total };
                    self.enrich_project(enricher.as_ref(), fact, scored, github_data, progress, sink, cancel)
                        .await
                }
                _ => LlmResult::Skipped,
            };
            match llm_result {
                LlmResult::Succeeded => summary.llm_succeeded += 1,
                LlmResult::Failed => {
                    summary.llm_failed += 1;
                    summary.llm_failed_names.push(fact.name.clone());
                }
                LlmResult::Skipped => summary.llm_skipped += 1,
            }

            let kind = if llm_result == LlmResult::Skipped { "scan" } else { "scan+llm" };
            let payload = json!({
                "scannedAt": scanned_at,
                "status": scored.map(|s| s.status),
                "healthScore": scored.map(|s| s.health),
                "llmResult": llm_result.as_str(),
            });
            if let Err(e) = self.store.append_activity(&fact.path_hash, kind, &payload, now_millis()) {
                warn!("Failed to log activity for {}: {}", fact.name, e);
            }
        }

        let cutoff = now_millis() - i64::from(self.config.activity_retention_days) * DAY_MS;
        match self.store.purge_activity_before(cutoff) {
            Ok(0) => {}
            Ok(n) => debug!("Purged {} old activity records", n),
            Err(e) => warn!("Activity cleanup failed: {}", e),
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        Ok(if cancelled {
            RunOutcome::Cancelled(summary)
        } else {
            RunOutcome::Completed(summary)
        })
    }

    /// Commit Project, Scan and Derived for one fact. An unscoreable fact
    /// clears any Derived row left by an earlier run.
    fn store_project(&self, fact: &FactRecord, scored: Option<&Scored>, now: i64) -> Result<()> {
        let raw_json = serde_json::to_string(fact)?;
        let scan = ScanRecord {
            project_id: fact.path_hash.clone(),
            raw_json_hash: content_hash(&raw_json),
            raw_json,
            scanned_at: now,
        };
        let last_touched_at = fact
            .last_commit_date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.timestamp_millis());

        let project = UpsertProject {
            id: fact.path_hash.clone(),
            name: fact.name.clone(),
            path_display: fact.path.clone(),
            last_touched_at,
        };
        let derived = scored.map(|scored| DerivedRecord::from_scored(fact, scored, now));
        self.store
            .store_scan_result(&project, &scan, derived.as_ref(), now)
    }

    /// Fetch and store GitHub data for a project with a github.com remote.
    /// Failures are logged and skipped; the previous row is kept.
    async fn collect_github(
        &self,
        source: &dyn GitHubSource,
        fact: &FactRecord,
        cancel: &CancellationToken,
    ) -> Option<GitHubData> {
        let repo = fact.remote_url.as_deref().and_then(parse_owner_repo)?;
        let data = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            data = source.fetch(&repo) => data,
        };
        let Some(data) = data else {
            warn!("GitHub lookup failed for {} ({})", fact.name, repo);
            return None;
        };
        let record = GitHubRecord::from_data(&fact.path_hash, &data, now_millis());
        if let Err(e) = self.store.upsert_github(&record) {
            warn!("Failed to store GitHub data for {}: {}", fact.name, e);
        }
        Some(data)
    }

    #[allow(clippy::too_many_arguments)]
    async fn enrich_project(
        &self,
        enricher: &dyn Enricher,
        fact: &FactRecord,
        scored: &Scored,
        github: Option<GitHubData>,
        progress: Progress,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> LlmResult {
        sink.emit(PipelineEvent::ProjectStart {
            name: fact.name.clone(),
            index: progress.index,
            total: progress.total,
            step: Step::Llm,
        });

        let previous_summary = self
            .store
            .previous_summary(&fact.path_hash)
            .unwrap_or_else(|e| {
                warn!("Could not read previous summary for {}: {}", fact.name, e);
                None
            });
        let input = EnrichmentInput {
            fact: fact.clone(),
            scored: scored.clone(),
            previous_summary,
            github,
        };

        let call_started = Instant::now();
        let timeout = self.config.enrich_timeout;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EnrichError::Cancelled),
            outcome = tokio::time::timeout(timeout, enricher.enrich(&input)) => {
                outcome.unwrap_or(Err(EnrichError::Timeout(timeout.as_secs())))
            }
        };

        let enrichment = match result {
            Ok(enrichment) => enrichment,
            Err(e) => {
                self.fail_enrichment(fact, &e.to_string(), sink);
                return LlmResult::Failed;
            }
        };

        let now = now_millis();
        let record = enrichment.to_record(&fact.path_hash, now);
        if let Err(e) = self.store.upsert_enrichment(&record, now) {
            self.fail_enrichment(fact, &e.to_string(), sink);
            return LlmResult::Failed;
        }
        if let Err(e) = self.store.fill_metadata(
            &fact.path_hash,
            &enrichment.metadata_fill(),
            self.config.overwrite_metadata,
            now,
        ) {
            warn!("Metadata fill failed for {}: {}", fact.name, e);
        }

        sink.emit(PipelineEvent::ProjectComplete {
            name: fact.name.clone(),
            step: Step::Llm,
            detail: Some(json!({
                "summary": record.summary,
                "nextAction": record.next_action,
                "phase": record.phase,
                "durationMs": call_started.elapsed().as_millis() as u64,
            })),
        });
        LlmResult::Succeeded
    }

    fn fail_enrichment(&self, fact: &FactRecord, message: &str, sink: &EventSink) {
        warn!("Enrichment failed for {}: {}", fact.name, message);
        if let Err(e) = self
            .store
            .record_enrichment_error(&fact.path_hash, message, now_millis())
        {
            warn!("Could not record enrichment error for {}: {}", fact.name, e);
        }
        sink.emit(PipelineEvent::ProjectError {
            name: fact.name.clone(),
            step: Step::Llm,
            error: message.to_string(),
        });
    }
}

/// Reject scan output that would make project ids ambiguous.
fn validate_scan(facts: &[FactRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(facts.len());
    for (i, fact) in facts.iter().enumerate() {
        if fact.path_hash.is_empty() {
            return Err(Error::scan(format!("projects[{}] has no path hash", i)));
        }
        if !seen.insert(fact.path_hash.as_str()) {
            return Err(Error::scan(format!(
                "duplicate path hash {} ({})",
                fact.path_hash, fact.path
            )));
        }
    }
    Ok(())
}

/// Indices of `facts` ordered most recently touched first; projects never
/// touched come last, ties broken by name.
fn processing_order(facts: &[FactRecord], last_touched: &HashMap<String, i64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..facts.len()).collect();
    order.sort_by(|&a, &b| {
        let ta = last_touched.get(&facts[a].path_hash);
        let tb = last_touched.get(&facts[b].path_hash);
        let by_touch = match (ta, tb) {
            (Some(ta), Some(tb)) => tb.cmp(ta),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_touch.then_with(|| {
            facts[a]
                .name
                .to_lowercase()
                .cmp(&facts[b].name.to_lowercase())
                .then_with(|| facts[a].name.cmp(&facts[b].name))
        })
    });
    order
}
