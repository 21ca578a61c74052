use crate::error::{CascadeError, Result};
use crate::job::{Job, JobId};
use crate::tree::{NodeId, NodeSplitSet, NodeTree, SplitReferenceId, SplitReferenceTable};
use std::collections::HashSet;
use tracing::info;

/// Immutable forest of dependent fit jobs.
///
/// Append-only during construction, frozen afterwards. Parent links are
/// integer references into the same table; for every job the parent's
/// job_id is strictly smaller, so forward iteration visits parents first.
#[derive(Debug, Clone)]
pub struct JobGraph {
    jobs: Vec<Job>,
    children: Vec<Vec<JobId>>,
    goal_node_set: HashSet<NodeId>,
}

impl JobGraph {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, job_id: JobId) -> Result<&Job> {
        self.jobs
            .get(job_id)
            .ok_or_else(|| CascadeError::JobNotFound(format!("job_id {}", job_id)))
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn children_of(&self, job_id: JobId) -> Result<&[JobId]> {
        self.get(job_id)?;
        Ok(&self.children[job_id])
    }

    /// Job id for a (node, reference) pair; unique across the graph.
    pub fn job_id_of(
        &self,
        fit_node_id: NodeId,
        split_reference_id: Option<SplitReferenceId>,
    ) -> Option<JobId> {
        self.jobs
            .iter()
            .find(|job| {
                job.fit_node_id == fit_node_id && job.split_reference_id == split_reference_id
            })
            .map(|job| job.job_id)
    }

    /// Jobs whose node is in the goal set.
    ///
    /// Construction expands every node that has children, regardless of
    /// the goal set; this is the caller-side filter that decides which
    /// jobs count as final.
    pub fn goal_jobs(&self) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|job| self.goal_node_set.contains(&job.fit_node_id))
            .map(|job| job.job_id)
            .collect()
    }
}

/// Builds the job graph by breadth-first expansion from a start job.
pub struct JobGraphBuilder<'a> {
    tree: &'a NodeTree,
    references: &'a SplitReferenceTable,
    split_points: &'a NodeSplitSet,
}

impl<'a> JobGraphBuilder<'a> {
    pub fn new(
        tree: &'a NodeTree,
        references: &'a SplitReferenceTable,
        split_points: &'a NodeSplitSet,
    ) -> Self {
        Self {
            tree,
            references,
            split_points,
        }
    }

    /// Expand the full forest of jobs reachable from the start pair.
    ///
    /// The start job gets job_id 0 and no parent. For each job popped from
    /// the frontier the shift set is appended: at a split point whose
    /// lineage has not split yet, one job per non-root reference at the
    /// same node; otherwise one job per child node carrying the current
    /// reference. Reference expansion takes priority, so a job is never
    /// both split and descended in the same step.
    pub fn build(
        &self,
        start_node_id: NodeId,
        start_reference_id: Option<SplitReferenceId>,
        goal_node_set: &HashSet<NodeId>,
    ) -> Result<JobGraph> {
        self.check_consistency(start_node_id, start_reference_id, goal_node_set)?;

        let mut jobs = vec![Job {
            job_id: 0,
            fit_node_id: start_node_id,
            split_reference_id: start_reference_id,
            parent_job_id: None,
            job_name: self.job_name(start_node_id, start_reference_id)?,
        }];
        let mut seen: HashSet<(NodeId, Option<SplitReferenceId>)> =
            HashSet::from([(start_node_id, start_reference_id)]);

        let mut job_id = 0;
        while job_id < jobs.len() {
            let fit_node_id = jobs[job_id].fit_node_id;
            let fit_reference_id = jobs[job_id].split_reference_id;

            for (shift_node_id, shift_reference_id) in
                self.shift_set(fit_node_id, fit_reference_id)?
            {
                if !seen.insert((shift_node_id, shift_reference_id)) {
                    return Err(CascadeError::structural(format!(
                        "duplicate job for node {} reference {:?}",
                        self.tree.name(shift_node_id)?,
                        shift_reference_id
                    )));
                }
                let shift_job_id = jobs.len();
                jobs.push(Job {
                    job_id: shift_job_id,
                    fit_node_id: shift_node_id,
                    split_reference_id: shift_reference_id,
                    parent_job_id: Some(job_id),
                    job_name: self.job_name(shift_node_id, shift_reference_id)?,
                });
            }
            job_id += 1;
        }

        let mut children = vec![Vec::new(); jobs.len()];
        for job in &jobs {
            if let Some(parent) = job.parent_job_id {
                children[parent].push(job.job_id);
            }
        }

        info!(
            jobs = jobs.len(),
            start = %jobs[0].job_name,
            "job graph constructed"
        );

        Ok(JobGraph {
            jobs,
            children,
            goal_node_set: goal_node_set.clone(),
        })
    }

    /// Direct dependents of a (node, reference) fit.
    fn shift_set(
        &self,
        fit_node_id: NodeId,
        fit_reference_id: Option<SplitReferenceId>,
    ) -> Result<Vec<(NodeId, Option<SplitReferenceId>)>> {
        let root_reference = self.references.root_reference();
        let already_split = fit_reference_id != root_reference;

        let mut shift = Vec::new();
        if self.split_points.contains(fit_node_id) && !already_split {
            // One-time transition from unsplit to split evaluation: every
            // non-root reference at the same node.
            for reference in self.references.iter() {
                if Some(reference.split_reference_id) != root_reference {
                    shift.push((fit_node_id, Some(reference.split_reference_id)));
                }
            }
        } else {
            for &child in self.tree.children(fit_node_id)? {
                shift.push((child, fit_reference_id));
            }
        }
        Ok(shift)
    }

    fn job_name(
        &self,
        fit_node_id: NodeId,
        fit_reference_id: Option<SplitReferenceId>,
    ) -> Result<String> {
        let node_name = self.tree.name(fit_node_id)?;
        Ok(match fit_reference_id {
            Some(reference_id) => {
                format!("{}.{}", node_name, self.references.name(reference_id)?)
            }
            None => node_name.to_string(),
        })
    }

    fn check_consistency(
        &self,
        start_node_id: NodeId,
        start_reference_id: Option<SplitReferenceId>,
        goal_node_set: &HashSet<NodeId>,
    ) -> Result<()> {
        self.tree.get(start_node_id)?;
        for &goal in goal_node_set {
            self.tree.get(goal)?;
        }
        match (self.references.is_empty(), start_reference_id) {
            (true, Some(reference_id)) => {
                return Err(CascadeError::config(format!(
                    "start reference {} given but the split reference table is empty",
                    reference_id
                )));
            }
            (false, None) => {
                return Err(CascadeError::config(
                    "split reference table is not empty but no start reference was given",
                ));
            }
            (true, None) => {
                if !self.split_points.is_empty() {
                    return Err(CascadeError::config(
                        "node split set is not empty but the split reference table is",
                    ));
                }
            }
            (false, Some(reference_id)) => {
                self.references.get(reference_id)?;
            }
        }
        Ok(())
    }
}
