//! Batch analysis orchestration
//!
//! One background task drives a batch end to end:
//!
//! 1. Stage 1 researches every company on a bounded pool.
//! 2. Newly discovered PE firms are merged into the known-firm registry,
//!    once, before anything else happens.
//! 3. Stage 2 researches the portfolio of every distinct PE owner.
//! 4. Cross-referencing corrects companies that a portfolio lists but whose
//!    own analysis missed the PE link.
//! 5. The report is persisted and the history entry completed.
//!
//! Cancellation is cooperative. The batch token is checked before each
//! completed result is consumed and between stages; a cancelled batch writes
//! no report and leaves the registry and history untouched.

use crate::company::{report_name_for, BatchStatus, CompanyRecord, HistoryEntry, PeFirmProfile, Report};
use crate::config::AnalysisConfig;
use crate::known_firms;
use crate::reconcile;
use crate::research::{ClientFactory, ResearchClient, ResearchError};
use crate::store::{self, StateStore, StoreError};
use crate::task_registry::{BatchPhase, TaskGuard, TaskRegistry};
use chrono::{Local, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Gemini API Key is not configured. Please set it in settings.")]
    MissingCredential,

    #[error("Failed to create research client: {0}")]
    Client(ResearchError),

    #[error("Failed to record the batch in history: {0}")]
    Store(#[from] StoreError),
}

/// Returned to the submitter as soon as the batch is accepted
#[derive(Debug, Clone, Serialize)]
pub struct BatchTicket {
    pub report_id: Uuid,
    pub report_name: String,
}

#[derive(Debug)]
pub enum BatchOutcome {
    Completed(Report),
    Cancelled,
}

/// Status of a batch as seen by a poller
#[derive(Debug, Clone, Serialize)]
pub struct BatchStatusView {
    pub status: BatchStatus,
    pub phase: Option<BatchPhase>,
    pub active: bool,
}

/// Inputs of one batch captured at submission time
struct BatchPlan {
    id: Uuid,
    name: String,
    companies: Vec<String>,
    source_file: Option<String>,
    known_firms: Vec<String>,
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn StateStore>,
    clients: ClientFactory,
    tasks: TaskRegistry,
    settings: AnalysisConfig,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn StateStore>, clients: ClientFactory, tasks: TaskRegistry, settings: AnalysisConfig) -> Self {
        Self {
            store,
            clients,
            tasks,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// Accept a batch and start it in the background.
    ///
    /// A missing credential is rejected before anything is written or
    /// spawned. Otherwise a Pending history entry is recorded first, so
    /// pollers can see the batch immediately.
    pub async fn submit(
        &self,
        companies: Vec<String>,
        source_file: Option<String>,
        api_key: Option<&str>,
    ) -> Result<(BatchTicket, JoinHandle<Result<BatchOutcome, StoreError>>), SubmitError> {
        let api_key = api_key.map(str::trim).filter(|k| !k.is_empty()).ok_or_else(|| {
            error!("Gemini API Key is not configured");
            SubmitError::MissingCredential
        })?;
        let client = (self.clients)(api_key).map_err(|e| match e {
            ResearchError::MissingApiKey => SubmitError::MissingCredential,
            other => SubmitError::Client(other),
        })?;

        let id = Uuid::new_v4();
        let name = report_name_for(Local::now());
        let pending = HistoryEntry::pending(id, &name, companies.len(), source_file.clone());
        let known_firms = store::blocking(&self.store, move |store| {
            store.update_history(&mut |history| history.insert(0, pending.clone()))?;
            Ok(store.load_known_firms())
        })
        .await?;

        let plan = BatchPlan {
            id,
            name: name.clone(),
            companies,
            source_file,
            known_firms,
        };
        let guard = self.tasks.register(id);
        let orchestrator = self.clone();
        let handle = tokio::spawn(async move {
            let result = orchestrator.run(plan, guard, client).await;
            if let Err(e) = &result {
                error!("Batch {} failed to persist its results: {}", id, e);
            }
            result
        });

        info!("Background analysis started for report ID: {}", id);
        Ok((BatchTicket { report_id: id, report_name: name }, handle))
    }

    /// Cancel the batch if it is still running, wait the grace period, then
    /// remove its artifacts. Returns false if nothing was known about it.
    pub async fn delete_batch(&self, id: Uuid) -> Result<bool, StoreError> {
        if self.tasks.cancel(id) {
            info!("Waiting {:?} for batch {} to stop before deleting", self.settings.cancel_grace(), id);
            sleep(self.settings.cancel_grace()).await;
        }
        store::blocking(&self.store, move |store| store.remove_batch(id)).await
    }

    pub async fn status(&self, id: Uuid) -> Result<Option<BatchStatusView>, StoreError> {
        let phase = self.tasks.phase(id);
        let entry = store::blocking(&self.store, move |store| {
            Ok(store.load_history().into_iter().find(|e| e.id == id))
        })
        .await?;
        Ok(match (entry, phase) {
            (Some(entry), phase) => Some(BatchStatusView {
                status: entry.status,
                phase,
                active: phase.is_some(),
            }),
            (None, Some(phase)) => Some(BatchStatusView {
                status: BatchStatus::Pending,
                phase: Some(phase),
                active: true,
            }),
            (None, None) => None,
        })
    }

    async fn run(
        &self,
        plan: BatchPlan,
        guard: TaskGuard,
        client: Arc<dyn ResearchClient>,
    ) -> Result<BatchOutcome, StoreError> {
        let token = guard.token().clone();
        let started = Instant::now();
        let start_time = Utc::now();
        info!("Background analysis for report ID {} started with {} companies", plan.id, plan.companies.len());

        guard.set_phase(BatchPhase::Stage1);
        let stage1_client = client.clone();
        let stage1 = self
            .fan_out(
                plan.companies.clone(),
                &token,
                move |name| {
                    let client = stage1_client.clone();
                    async move {
                        match client.analyze_company(&name).await {
                            Ok(record) => record,
                            Err(e) => {
                                warn!("Error analyzing {}: {}", name, e);
                                CompanyRecord::failed(name, format!("An unexpected error occurred during analysis: {}", e))
                            }
                        }
                    }
                },
                |name, message| CompanyRecord::failed(name, message),
            )
            .await;
        let Some(mut companies) = stage1 else {
            return Ok(cancelled(&guard));
        };
        companies.iter_mut().for_each(CompanyRecord::heal);

        if token.is_cancelled() {
            return Ok(cancelled(&guard));
        }
        let discovered = known_firms::new_discoveries(&plan.known_firms, &companies);
        if !discovered.is_empty() {
            if let Err(e) = store::blocking(&self.store, move |store| store.merge_known_firms(&discovered)).await {
                error!("Failed to persist newly discovered PE firms: {}", e);
            }
        }

        if token.is_cancelled() {
            return Ok(cancelled(&guard));
        }
        let owners = known_firms::owner_names(&companies);
        let mut pe_insights = BTreeMap::new();
        if owners.is_empty() {
            info!("No PE owners found for report ID {}; skipping portfolio research", plan.id);
        } else {
            guard.set_phase(BatchPhase::Stage2);
            let stage2_client = client.clone();
            let stage2 = self
                .fan_out(
                    owners,
                    &token,
                    move |name| {
                        let client = stage2_client.clone();
                        async move {
                            match client.research_pe_firm(&name).await {
                                Ok(profile) => profile,
                                Err(e) => {
                                    warn!("Error researching {}: {}", name, e);
                                    PeFirmProfile::failed(name, format!("An unexpected error occurred during PE research: {}", e))
                                }
                            }
                        }
                    },
                    |name, message| PeFirmProfile::failed(name, message),
                )
                .await;
            let Some(profiles) = stage2 else {
                return Ok(cancelled(&guard));
            };
            pe_insights = profiles.into_iter().map(|p| (p.name.clone(), p)).collect();
        }

        if token.is_cancelled() {
            return Ok(cancelled(&guard));
        }
        guard.set_phase(BatchPhase::Reconciling);
        reconcile::cross_reference(&mut companies, &pe_insights);

        let duration_seconds = started.elapsed().as_secs_f64();
        let report = Report {
            report_id: plan.id,
            report_name: plan.name.clone(),
            status: BatchStatus::Completed,
            companies,
            pe_insights,
            source_file: plan.source_file.clone(),
            start_time,
            end_time: Utc::now(),
            duration_seconds,
        };
        let saved = report.clone();
        let report_path = store::blocking(&self.store, move |store| store.save_report(&saved)).await?;
        self.complete_history(&plan, &report, report_path.to_string_lossy().into_owned())
            .await?;

        guard.set_phase(BatchPhase::Completed);
        info!(
            "Report '{}' (ID: {}) analysis completed in {:.1}s",
            report.report_name, report.report_id, duration_seconds
        );
        Ok(BatchOutcome::Completed(report))
    }

    /// Update the batch's history entry in place, inserting one if it has gone missing.
    async fn complete_history(&self, plan: &BatchPlan, report: &Report, report_path: String) -> Result<(), StoreError> {
        let completed = HistoryEntry {
            id: plan.id,
            name: plan.name.clone(),
            date: report.start_time,
            status: BatchStatus::Completed,
            num_companies: plan.companies.len(),
            file_path: Some(report_path),
            source_file: plan.source_file.clone(),
            completed_at: Some(report.end_time),
            duration_seconds: Some(report.duration_seconds),
        };
        store::blocking(&self.store, move |store| {
            store.update_history(&mut |history| {
                if let Some(entry) = history.iter_mut().find(|e| e.id == completed.id) {
                    entry.status = BatchStatus::Completed;
                    entry.file_path = completed.file_path.clone();
                    entry.completed_at = completed.completed_at;
                    entry.duration_seconds = completed.duration_seconds;
                } else {
                    warn!("Report ID {} not found in history after completion. Adding new entry.", completed.id);
                    history.insert(0, completed.clone());
                }
            })
        })
        .await
    }

    /// Run `work` once per item on a pool of `concurrency` tasks, staggering
    /// submissions, and collect results in completion order.
    ///
    /// Returns None as soon as `token` is cancelled. Tasks still waiting for
    /// a pool slot then skip their work; tasks already running finish and
    /// their results are dropped. A task that panics becomes `on_panic(item, message)`.
    async fn fan_out<T, F, Fut, P>(
        &self,
        items: Vec<String>,
        token: &CancellationToken,
        work: F,
        on_panic: P,
    ) -> Option<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(String) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        P: Fn(String, String) -> T,
    {
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let total = items.len();
        let mut running = FuturesUnordered::new();

        for (index, item) in items.into_iter().enumerate() {
            if token.is_cancelled() {
                return None;
            }

            let task = work(item.clone());
            let permits = semaphore.clone();
            let task_token = token.clone();
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                if task_token.is_cancelled() {
                    return None;
                }
                Some(task.await)
            });
            running.push(async move { (item, handle.await) });

            if index + 1 < total && !self.settings.submit_delay().is_zero() {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return None,
                    _ = sleep(self.settings.submit_delay()) => {}
                }
            }
        }

        let mut results = Vec::with_capacity(total);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return None,
                next = running.next() => match next {
                    None => break,
                    Some((item, joined)) => match joined {
                        Ok(Some(result)) => results.push(result),
                        Ok(None) => {}
                        Err(e) => {
                            error!("Research task for {} failed: {}", item, e);
                            results.push(on_panic(item, format!("Research task failed: {}", e)));
                        }
                    },
                },
            }
        }
        Some(results)
    }
}

fn cancelled(guard: &TaskGuard) -> BatchOutcome {
    guard.set_phase(BatchPhase::Cancelled);
    info!("Batch {} was cancelled; no report written", guard.id());
    BatchOutcome::Cancelled
}
