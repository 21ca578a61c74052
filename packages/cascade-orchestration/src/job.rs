use crate::error::{CascadeError, Result};
use crate::tree::{NodeId, SplitReferenceId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Job identifier (row index into the job graph)
pub type JobId = usize;

/// Recorded fit errors at or above this count make a result unusable as
/// a fallback data source.
pub const MAX_FIT_ERRORS: u32 = 2;

/// One scheduled fit task, identified by its (node, reference) pair.
///
/// The job at job_id 0 is the externally supplied starting point; it has
/// no parent and represents a precondition already satisfied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub fit_node_id: NodeId,
    pub split_reference_id: Option<SplitReferenceId>,
    pub parent_job_id: Option<JobId>,
    pub job_name: String,
}

/// Job outcome state (one transition from pending to a terminal state)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobStatus {
    Pending {
        queued_at: DateTime<Utc>,
    },
    Running {
        started_at: DateTime<Utc>,
        worker_id: String,
    },
    Succeeded {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        duration_ms: u64,
    },
    Failed {
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        error: String,
        error_count: u32,
    },
}

impl JobStatus {
    pub fn state_name(&self) -> &'static str {
        match self {
            JobStatus::Pending { .. } => "pending",
            JobStatus::Running { .. } => "running",
            JobStatus::Succeeded { .. } => "succeeded",
            JobStatus::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded { .. } | JobStatus::Failed { .. }
        )
    }

    pub fn error_count(&self) -> u32 {
        match self {
            JobStatus::Failed { error_count, .. } => *error_count,
            _ => 0,
        }
    }
}

/// Per-job result: outcome state plus the artifact location once resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub status: JobStatus,
    /// Engine state file for this job, set when the job is dispatched
    pub artifact: Option<PathBuf>,
}

impl JobResult {
    /// A result can seed a descendant fit when its artifact exists and
    /// the recorded error count is below [`MAX_FIT_ERRORS`].
    pub fn is_usable(&self) -> bool {
        self.artifact.is_some() && self.status.error_count() < MAX_FIT_ERRORS
    }
}

/// Shared result map, keyed by job_name.
///
/// The job graph and the node tables are read-only during a run; this map
/// is the only mutable shared structure. Each entry is written to its
/// terminal state exactly once, by the worker that completes the job.
#[derive(Debug, Clone, Default)]
pub struct JobResults {
    inner: Arc<DashMap<String, JobResult>>,
}

impl JobResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job the executor has been told about.
    pub fn insert_pending(&self, job_name: &str) {
        self.inner.entry(job_name.to_string()).or_insert(JobResult {
            status: JobStatus::Pending {
                queued_at: Utc::now(),
            },
            artifact: None,
        });
    }

    /// Transition: pending -> running, recording the worker identity and
    /// the artifact location the engine will write to.
    pub fn mark_running(&self, job_name: &str, worker_id: &str, artifact: PathBuf) -> Result<()> {
        self.transition(job_name, "running", |result| match result.status {
            JobStatus::Pending { .. } => {
                result.status = JobStatus::Running {
                    started_at: Utc::now(),
                    worker_id: worker_id.to_string(),
                };
                result.artifact = Some(artifact);
                Ok(())
            }
            _ => Err(()),
        })
    }

    /// Transition: running -> succeeded.
    pub fn mark_succeeded(&self, job_name: &str) -> Result<()> {
        self.transition(job_name, "succeeded", |result| match result.status {
            JobStatus::Running { started_at, .. } => {
                let now = Utc::now();
                result.status = JobStatus::Succeeded {
                    started_at,
                    completed_at: now,
                    duration_ms: elapsed_ms(started_at, now),
                };
                Ok(())
            }
            _ => Err(()),
        })
    }

    /// Transition: pending or running -> failed.
    ///
    /// Pending is allowed so a job whose artifact path cannot even be
    /// resolved still reaches a terminal state.
    pub fn mark_failed(&self, job_name: &str, error: &str, error_count: u32) -> Result<()> {
        self.transition(job_name, "failed", |result| match result.status {
            JobStatus::Running { started_at, .. } => {
                result.status = JobStatus::Failed {
                    started_at,
                    failed_at: Utc::now(),
                    error: error.to_string(),
                    error_count,
                };
                Ok(())
            }
            JobStatus::Pending { queued_at } => {
                result.status = JobStatus::Failed {
                    started_at: queued_at,
                    failed_at: Utc::now(),
                    error: error.to_string(),
                    error_count,
                };
                Ok(())
            }
            _ => Err(()),
        })
    }

    /// Record an already-satisfied job (the skipped start job).
    pub fn mark_satisfied(&self, job_name: &str, artifact: PathBuf) {
        let now = Utc::now();
        self.inner.insert(
            job_name.to_string(),
            JobResult {
                status: JobStatus::Succeeded {
                    started_at: now,
                    completed_at: now,
                    duration_ms: 0,
                },
                artifact: Some(artifact),
            },
        );
    }

    pub fn get(&self, job_name: &str) -> Option<JobResult> {
        self.inner.get(job_name).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn transition<F>(&self, job_name: &str, to: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut JobResult) -> std::result::Result<(), ()>,
    {
        let mut entry = self
            .inner
            .get_mut(job_name)
            .ok_or_else(|| CascadeError::JobNotFound(job_name.to_string()))?;
        let from = entry.status.state_name();
        apply(entry.value_mut()).map_err(|_| CascadeError::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Wall-clock interval in milliseconds; zero when the clock stepped
/// backwards between the two readings.
fn elapsed_ms(started: DateTime<Utc>, ended: DateTime<Utc>) -> u64 {
    (ended - started).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_pending_to_running_to_succeeded() {
        let results = JobResults::new();
        results.insert_pending("Global.Both");
        results
            .mark_running("Global.Both", "worker-1", PathBuf::from("Global/fit.db"))
            .unwrap();
        results.mark_succeeded("Global.Both").unwrap();

        let result = results.get("Global.Both").unwrap();
        assert!(matches!(result.status, JobStatus::Succeeded { .. }));
        assert!(result.is_usable());
    }

    #[test]
    fn test_terminal_state_written_once() {
        let results = JobResults::new();
        results.insert_pending("A.Female");
        results
            .mark_running("A.Female", "worker-1", PathBuf::from("A/fit.db"))
            .unwrap();
        results.mark_failed("A.Female", "optimizer diverged", 1).unwrap();

        // Second terminal write is a state machine violation
        let result = results.mark_succeeded("A.Female");
        assert!(matches!(
            result,
            Err(CascadeError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_failed_below_threshold_is_usable() {
        let results = JobResults::new();
        results.insert_pending("B.Male");
        results
            .mark_running("B.Male", "worker-1", PathBuf::from("B/fit.db"))
            .unwrap();
        results.mark_failed("B.Male", "one warning", 1).unwrap();

        assert!(results.get("B.Male").unwrap().is_usable());
    }

    #[test]
    fn test_failed_at_threshold_is_not_usable() {
        let results = JobResults::new();
        results.insert_pending("B.Male");
        results
            .mark_running("B.Male", "worker-1", PathBuf::from("B/fit.db"))
            .unwrap();
        results.mark_failed("B.Male", "diverged", MAX_FIT_ERRORS).unwrap();

        assert!(!results.get("B.Male").unwrap().is_usable());
    }

    #[test]
    fn test_pending_without_artifact_is_not_usable() {
        let results = JobResults::new();
        results.insert_pending("C");
        assert!(!results.get("C").unwrap().is_usable());
    }

    #[test]
    fn test_mark_failed_from_pending() {
        let results = JobResults::new();
        results.insert_pending("C");
        results.mark_failed("C", "unresolvable path", 1).unwrap();
        let result = results.get("C").unwrap();
        assert!(matches!(result.status, JobStatus::Failed { .. }));
        assert!(!result.is_usable());
    }

    #[test]
    fn test_elapsed_ms_clamps_backwards_clock() {
        let now = Utc::now();
        assert_eq!(elapsed_ms(now, now - Duration::seconds(3)), 0);
        assert_eq!(elapsed_ms(now, now + Duration::milliseconds(250)), 250);
    }

    #[test]
    fn test_unknown_job_name() {
        let results = JobResults::new();
        assert!(matches!(
            results.mark_succeeded("missing"),
            Err(CascadeError::JobNotFound(_))
        ));
    }
}
