use crate::config::CascadeOptions;
use crate::dirs::DatabaseDirResolver;
use crate::error::{CascadeError, Result};
use crate::executor::{FitEngine, ParallelExecutor, RunReport};
use crate::graph::{JobGraph, JobGraphBuilder};
use crate::job::JobResults;
use crate::tree::{NodeId, NodeSplitSet, NodeTree, SplitReferenceId, SplitReferenceTable};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Run the whole cascade starting at the configured root node.
///
/// Resolves the configured start pair, builds the job graph, executes it
/// under the configured worker count and returns the graph together with
/// the end-of-run report. The start job itself is executed (it is the
/// root fit, nothing precedes it).
pub async fn cascade_root_node(
    tree: &NodeTree,
    references: &SplitReferenceTable,
    split_points: &NodeSplitSet,
    options: &CascadeOptions,
    goal_node_set: &HashSet<NodeId>,
    engine: Arc<dyn FitEngine>,
) -> Result<(JobGraph, RunReport)> {
    let root_node_id = tree.node_id_by_name(&options.root_node_name)?;
    let start_reference_id = start_reference(references, options)?;

    info!(
        root = %options.root_node_name,
        max_workers = options.max_number_cpu,
        "starting cascade from root node"
    );

    let graph = JobGraphBuilder::new(tree, references, split_points).build(
        root_node_id,
        start_reference_id,
        goal_node_set,
    )?;
    let dirs = DatabaseDirResolver::new(tree, references, split_points);
    let results = JobResults::new();
    let executor = ParallelExecutor::new(engine, options.max_number_cpu);
    let report = executor.run(&graph, &dirs, 0, false, &results).await?;
    Ok((graph, report))
}

/// The configured root split reference must agree with the table's
/// designated root reference.
fn start_reference(
    references: &SplitReferenceTable,
    options: &CascadeOptions,
) -> Result<Option<SplitReferenceId>> {
    match (&options.root_split_reference_name, references.root_reference()) {
        (None, None) => Ok(None),
        (Some(name), None) => Err(CascadeError::config(format!(
            "root_split_reference_name {} configured but the split reference table is empty",
            name
        ))),
        (None, Some(_)) => Err(CascadeError::config(
            "split reference table is not empty but root_split_reference_name is not configured",
        )),
        (Some(name), Some(root_id)) => {
            if references.name(root_id)? != name {
                return Err(CascadeError::config(format!(
                    "root_split_reference_name {} does not match the table's root reference {}",
                    name,
                    references.name(root_id)?
                )));
            }
            Ok(Some(root_id))
        }
    }
}
