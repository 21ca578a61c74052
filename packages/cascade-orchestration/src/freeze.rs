use crate::error::{CascadeError, Result};
use crate::graph::JobGraph;
use crate::tree::{NodeId, SplitReferenceId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Covariate multiplier identifier
pub type MulcovId = usize;

/// Externally supplied instruction: hold a covariate multiplier fixed
/// starting at the named job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreezeDirective {
    pub fit_node_id: NodeId,
    pub split_reference_id: Option<SplitReferenceId>,
    pub mulcov_id: MulcovId,
}

/// Which value a frozen multiplier is held at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreezeValue {
    /// The directive names the fit job itself
    Posterior,
    /// The directive names a strict ancestor of the fit job
    Prior,
}

/// Computes which covariate multipliers are frozen for a given fit, and
/// at which value.
pub struct FreezePolicyResolver<'a> {
    graph: &'a JobGraph,
}

impl<'a> FreezePolicyResolver<'a> {
    pub fn new(graph: &'a JobGraph) -> Self {
        Self { graph }
    }

    /// For each directive, walk the ancestor chain starting at the fit
    /// job: an exact match at the fit job freezes at the posterior, a
    /// match at a strict ancestor freezes at the prior. When several
    /// directives target the same multiplier at different depths of the
    /// chain, the nearest match wins.
    pub fn resolve(
        &self,
        fit_node_id: NodeId,
        fit_split_reference_id: Option<SplitReferenceId>,
        directives: &[FreezeDirective],
    ) -> Result<HashMap<MulcovId, FreezeValue>> {
        let fit_job_id = self
            .graph
            .job_id_of(fit_node_id, fit_split_reference_id)
            .ok_or_else(|| {
                CascadeError::JobNotFound(format!(
                    "no job for node {} reference {:?}",
                    fit_node_id, fit_split_reference_id
                ))
            })?;

        // mulcov_id -> (depth of nearest match so far, value)
        let mut nearest: HashMap<MulcovId, (usize, FreezeValue)> = HashMap::new();

        for directive in directives {
            let mut job_id = Some(fit_job_id);
            let mut depth = 0usize;
            while let Some(current) = job_id {
                let job = self.graph.get(current)?;
                if job.fit_node_id == directive.fit_node_id
                    && job.split_reference_id == directive.split_reference_id
                {
                    let value = if current == fit_job_id {
                        FreezeValue::Posterior
                    } else {
                        FreezeValue::Prior
                    };
                    match nearest.get(&directive.mulcov_id) {
                        Some((best_depth, _)) if *best_depth <= depth => {}
                        _ => {
                            nearest.insert(directive.mulcov_id, (depth, value));
                        }
                    }
                    // The chain is a simple path: one match per directive.
                    break;
                }
                job_id = job.parent_job_id;
                depth += 1;
            }
        }

        Ok(nearest
            .into_iter()
            .map(|(mulcov_id, (_, value))| (mulcov_id, value))
            .collect())
    }
}
