use crate::ancestor::AncestorResolver;
use crate::dirs::{DatabaseDirResolver, FIT_DB_FILE};
use crate::error::{CascadeError, Result};
use crate::graph::JobGraph;
use crate::job::{Job, JobId, JobResults, JobStatus, MAX_FIT_ERRORS};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What the external fitting engine reports for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitOutcome {
    pub success: bool,
    pub error_count: u32,
    pub message: Option<String>,
}

impl FitOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            error_count: 0,
            message: None,
        }
    }

    pub fn failure(error_count: u32, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_count,
            message: Some(message.into()),
        }
    }
}

/// Boundary to the external fitting engine.
///
/// The engine owns the database under `fit_dir`; the scheduler treats the
/// call as an opaque blocking operation with a success/failure return.
/// `input_dir` is the artifact of the completed parent, or of the nearest
/// usable ancestor when the parent's fit is unusable; None when the
/// lineage is exhausted.
#[async_trait]
pub trait FitEngine: Send + Sync {
    async fn fit(&self, job: &Job, fit_dir: &Path, input_dir: Option<&Path>)
        -> Result<FitOutcome>;
}

/// How a job's fit input was obtained, for end-of-run reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fallback {
    /// The job's own artifact is usable
    NotNeeded,
    /// A usable fit was found this many hops up the ancestry
    Ancestor { hops: usize },
    /// The walk reached the top of the lineage without a usable fit
    Exhausted,
}

/// Per-job line of the end-of-run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub job_name: String,
    pub status: String,
    pub error: Option<String>,
    /// For failed jobs: how far up the ancestry a usable fallback exists
    pub fallback: Option<Fallback>,
}

/// Aggregate outcome of a cascade run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub rows: Vec<JobReport>,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Runs the job graph under a bounded worker pool.
///
/// A job becomes eligible once its parent's outcome is recorded; sibling
/// jobs have no ordering guarantee. A fit failure is recorded but does
/// not skip the failed job's children (best-effort cascade): each child
/// consults the ancestor fallback for its input instead.
pub struct ParallelExecutor {
    engine: Arc<dyn FitEngine>,
    max_workers: usize,
}

impl ParallelExecutor {
    pub fn new(engine: Arc<dyn FitEngine>, max_workers: usize) -> Self {
        Self {
            engine,
            max_workers: max_workers.max(1),
        }
    }

    /// Execute every job reachable from `start_job_id`.
    ///
    /// With `skip_start` the start job is treated as already satisfied
    /// and only its descendants run.
    pub async fn run(
        &self,
        graph: &JobGraph,
        dirs: &DatabaseDirResolver<'_>,
        start_job_id: JobId,
        skip_start: bool,
        results: &JobResults,
    ) -> Result<RunReport> {
        let start_time = Instant::now();
        let start_job = graph.get(start_job_id)?;
        info!(
            start = %start_job.job_name,
            skip_start,
            max_workers = self.max_workers,
            "cascade run starting"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut ready: VecDeque<JobId> = VecDeque::new();
        let mut in_flight: FuturesUnordered<JoinHandle<JobId>> = FuturesUnordered::new();

        if skip_start {
            let start_dir = dirs.resolve(start_job.fit_node_id, start_job.split_reference_id)?;
            results.mark_satisfied(&start_job.job_name, start_dir.join(FIT_DB_FILE));
            ready.extend(graph.children_of(start_job_id)?);
        } else {
            ready.push_back(start_job_id);
        }

        loop {
            while let Some(job_id) = ready.pop_front() {
                if let Some(task) = self.dispatch(graph, dirs, job_id, results, &semaphore)? {
                    in_flight.push(task);
                }
                // A job that failed at dispatch never spawns; its subtree
                // is dropped (structural failure is fatal per subtree).
            }
            match in_flight.next().await {
                None => break,
                Some(Ok(finished_job_id)) => {
                    ready.extend(graph.children_of(finished_job_id)?);
                }
                Some(Err(join_err)) => {
                    error!(error = %join_err, "fit task panicked");
                    return Err(CascadeError::FitExecutionFailed(format!(
                        "fit task panicked: {}",
                        join_err
                    )));
                }
            }
        }

        let report = self.build_report(graph, dirs, results, start_time.elapsed().as_millis() as u64);
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "cascade run finished"
        );
        Ok(report)
    }

    /// Resolve a job's artifact and input paths and spawn its fit task.
    ///
    /// Returns None when the job cannot be dispatched at all (its path is
    /// unresolvable); the failure is recorded and the caller drops the
    /// subtree.
    fn dispatch(
        &self,
        graph: &JobGraph,
        dirs: &DatabaseDirResolver<'_>,
        job_id: JobId,
        results: &JobResults,
        semaphore: &Arc<Semaphore>,
    ) -> Result<Option<JoinHandle<JobId>>> {
        let job = graph.get(job_id)?.clone();
        results.insert_pending(&job.job_name);

        let fit_dir = match dirs.resolve(job.fit_node_id, job.split_reference_id) {
            Ok(dir) => dir,
            Err(err) => {
                error!(job = %job.job_name, error = %err, "artifact path unresolvable");
                results.mark_failed(&job.job_name, &err.to_string(), MAX_FIT_ERRORS)?;
                return Ok(None);
            }
        };

        // Input comes from the parent's lineage; the parent's outcome is
        // already recorded, so the fallback walk is settled here.
        let input_dir: Option<PathBuf> = match job.parent_job_id {
            None => None,
            Some(parent_job_id) => {
                let fallback =
                    AncestorResolver::new(graph, dirs).resolve(parent_job_id, results)?;
                if fallback.is_exhausted() {
                    warn!(
                        job = %job.job_name,
                        "no usable ancestor fit; running without input artifact"
                    );
                }
                fallback.ancestor_dir
            }
        };

        let engine = Arc::clone(&self.engine);
        let results = results.clone();
        let semaphore = Arc::clone(semaphore);

        Ok(Some(tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(closed) => {
                    // The pool lives for the whole run; reaching this
                    // records the job as failed rather than panicking.
                    error!(job = %job.job_name, error = %closed, "worker pool closed");
                    if let Err(err) =
                        results.mark_failed(&job.job_name, "worker pool closed", MAX_FIT_ERRORS)
                    {
                        error!(job = %job.job_name, error = %err, "result state violation");
                    }
                    return job.job_id;
                }
            };
            let worker_id = format!("worker-{}", Uuid::new_v4());

            if let Err(err) =
                results.mark_running(&job.job_name, &worker_id, fit_dir.join(FIT_DB_FILE))
            {
                error!(job = %job.job_name, error = %err, "result state violation");
                return job.job_id;
            }
            info!(job = %job.job_name, worker = %worker_id, "fit started");

            match engine.fit(&job, &fit_dir, input_dir.as_deref()).await {
                Ok(outcome) if outcome.success => {
                    info!(job = %job.job_name, "fit succeeded");
                    if let Err(err) = results.mark_succeeded(&job.job_name) {
                        error!(job = %job.job_name, error = %err, "result state violation");
                    }
                }
                Ok(outcome) => {
                    let message = outcome
                        .message
                        .unwrap_or_else(|| "fit reported failure".to_string());
                    warn!(
                        job = %job.job_name,
                        error_count = outcome.error_count,
                        "fit failed: {}", message
                    );
                    if let Err(err) =
                        results.mark_failed(&job.job_name, &message, outcome.error_count)
                    {
                        error!(job = %job.job_name, error = %err, "result state violation");
                    }
                }
                Err(err) => {
                    warn!(job = %job.job_name, error = %err, "fit engine error");
                    if let Err(err) =
                        results.mark_failed(&job.job_name, &err.to_string(), MAX_FIT_ERRORS)
                    {
                        error!(job = %job.job_name, error = %err, "result state violation");
                    }
                }
            }
            job.job_id
        })))
    }

    /// Per-job report rows, in graph order; failed jobs additionally get
    /// the depth of their usable fallback.
    fn build_report(
        &self,
        graph: &JobGraph,
        dirs: &DatabaseDirResolver<'_>,
        results: &JobResults,
        duration_ms: u64,
    ) -> RunReport {
        let mut report = RunReport {
            duration_ms,
            ..Default::default()
        };

        for job in graph.jobs() {
            let Some(result) = results.get(&job.job_name) else {
                // never scheduled (outside the start subtree, or dropped
                // after a structural failure)
                continue;
            };
            let (error, fallback) = match &result.status {
                JobStatus::Succeeded { .. } => {
                    report.succeeded += 1;
                    (None, None)
                }
                JobStatus::Failed { error, .. } => {
                    report.failed += 1;
                    let fallback = AncestorResolver::new(graph, dirs)
                        .resolve(job.job_id, results)
                        .map(|fit| match fit.hops {
                            Some(0) => Fallback::NotNeeded,
                            Some(hops) => Fallback::Ancestor { hops },
                            None => Fallback::Exhausted,
                        })
                        .unwrap_or(Fallback::Exhausted);
                    (Some(error.clone()), Some(fallback))
                }
                _ => (None, None),
            };
            report.rows.push(JobReport {
                job_id: job.job_id,
                job_name: job.job_name.clone(),
                status: result.status.state_name().to_string(),
                error,
                fallback,
            });
        }
        report
    }
}
