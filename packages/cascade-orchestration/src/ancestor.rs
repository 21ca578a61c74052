use crate::dirs::DatabaseDirResolver;
use crate::error::Result;
use crate::graph::JobGraph;
use crate::job::{JobId, JobResults};
use std::path::PathBuf;
use tracing::debug;

/// Outcome of an ancestor-fallback walk for one predicted job.
#[derive(Debug, Clone, PartialEq)]
pub struct AncestorFit {
    /// Directory of the job the prediction is for
    pub predict_dir: PathBuf,
    /// Directory of the nearest usable fit, None when the walk reached
    /// the top of the lineage without finding one
    pub ancestor_dir: Option<PathBuf>,
    /// Hops from the predict job to the usable fit (0 = the job itself),
    /// None when the lineage is exhausted
    pub hops: Option<usize>,
}

impl AncestorFit {
    pub fn is_exhausted(&self) -> bool {
        self.ancestor_dir.is_none()
    }
}

/// Finds the nearest ancestor whose fit can stand in for a job whose own
/// artifact is missing or failed.
pub struct AncestorResolver<'a> {
    graph: &'a JobGraph,
    dirs: &'a DatabaseDirResolver<'a>,
}

impl<'a> AncestorResolver<'a> {
    pub fn new(graph: &'a JobGraph, dirs: &'a DatabaseDirResolver<'a>) -> Self {
        Self { graph, dirs }
    }

    /// Walk parent links from the predict job toward job 0.
    ///
    /// A job is usable when its recorded artifact exists and its error
    /// count is below the threshold. The predict job itself is tested
    /// first (zero-hop case). When a non-None ancestor directory is
    /// returned it is a strict prefix of the predict directory.
    pub fn resolve(&self, predict_job_id: JobId, results: &JobResults) -> Result<AncestorFit> {
        let predict_job = self.graph.get(predict_job_id)?;
        let predict_dir = self
            .dirs
            .resolve(predict_job.fit_node_id, predict_job.split_reference_id)?;

        if self.is_usable(results, &predict_job.job_name) {
            return Ok(AncestorFit {
                ancestor_dir: Some(predict_dir.clone()),
                predict_dir,
                hops: Some(0),
            });
        }

        let mut job_id = predict_job_id;
        let mut hops = 0;
        loop {
            match self.graph.get(job_id)?.parent_job_id {
                None => {
                    debug!(job = %predict_job.job_name, "no usable ancestor in lineage");
                    return Ok(AncestorFit {
                        predict_dir,
                        ancestor_dir: None,
                        hops: None,
                    });
                }
                Some(parent_job_id) => {
                    job_id = parent_job_id;
                    hops += 1;
                }
            }
            let ancestor = self.graph.get(job_id)?;
            if self.is_usable(results, &ancestor.job_name) {
                let ancestor_dir = self
                    .dirs
                    .resolve(ancestor.fit_node_id, ancestor.split_reference_id)?;
                debug_assert!(predict_dir.starts_with(&ancestor_dir));
                return Ok(AncestorFit {
                    predict_dir,
                    ancestor_dir: Some(ancestor_dir),
                    hops: Some(hops),
                });
            }
        }
    }

    fn is_usable(&self, results: &JobResults, job_name: &str) -> bool {
        results
            .get(job_name)
            .map(|result| result.is_usable())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::JobGraphBuilder;
    use crate::job::MAX_FIT_ERRORS;
    use crate::tree::{Node, NodeSplitSet, NodeTree, SplitReferenceTable};
    use std::collections::HashSet;

    fn chain_tree() -> NodeTree {
        NodeTree::new(vec![
            Node {
                node_id: 0,
                name: "root".to_string(),
                parent_id: None,
            },
            Node {
                node_id: 1,
                name: "A".to_string(),
                parent_id: Some(0),
            },
            Node {
                node_id: 2,
                name: "A1".to_string(),
                parent_id: Some(1),
            },
        ])
        .unwrap()
    }

    struct Fixture {
        tree: NodeTree,
        references: SplitReferenceTable,
        split_points: NodeSplitSet,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tree: chain_tree(),
                references: SplitReferenceTable::empty(),
                split_points: NodeSplitSet::empty(),
            }
        }

        fn graph(&self) -> JobGraph {
            JobGraphBuilder::new(&self.tree, &self.references, &self.split_points)
                .build(0, None, &HashSet::new())
                .unwrap()
        }

        fn dirs(&self) -> DatabaseDirResolver<'_> {
            DatabaseDirResolver::new(&self.tree, &self.references, &self.split_points)
        }
    }

    fn settled(results: &JobResults, job_name: &str, artifact: &str, error_count: u32) {
        results.insert_pending(job_name);
        results
            .mark_running(job_name, "worker-test", artifact.into())
            .unwrap();
        if error_count == 0 {
            results.mark_succeeded(job_name).unwrap();
        } else {
            results.mark_failed(job_name, "fit error", error_count).unwrap();
        }
    }

    #[test]
    fn test_zero_hop_when_own_fit_usable() {
        let fixture = Fixture::new();
        let graph = fixture.graph();
        let dirs = fixture.dirs();
        let resolver = AncestorResolver::new(&graph, &dirs);

        let results = JobResults::new();
        settled(&results, "A1", "root/A/A1/fit.db", 0);

        let job_id = graph.job_id_of(2, None).unwrap();
        let fit = resolver.resolve(job_id, &results).unwrap();
        assert_eq!(fit.predict_dir, PathBuf::from("root/A/A1"));
        assert_eq!(fit.ancestor_dir, Some(PathBuf::from("root/A/A1")));
        assert_eq!(fit.hops, Some(0));
    }

    #[test]
    fn test_walks_to_nearest_usable_ancestor() {
        let fixture = Fixture::new();
        let graph = fixture.graph();
        let dirs = fixture.dirs();
        let resolver = AncestorResolver::new(&graph, &dirs);

        let results = JobResults::new();
        settled(&results, "root", "root/fit.db", 0);
        settled(&results, "A", "root/A/fit.db", MAX_FIT_ERRORS + 1);
        settled(&results, "A1", "root/A/A1/fit.db", MAX_FIT_ERRORS);

        let job_id = graph.job_id_of(2, None).unwrap();
        let fit = resolver.resolve(job_id, &results).unwrap();
        assert_eq!(fit.ancestor_dir, Some(PathBuf::from("root")));
        assert_eq!(fit.hops, Some(2));
        assert!(fit.predict_dir.starts_with(fit.ancestor_dir.as_ref().unwrap()));
    }

    #[test]
    fn test_failed_below_threshold_counts_as_usable() {
        let fixture = Fixture::new();
        let graph = fixture.graph();
        let dirs = fixture.dirs();
        let resolver = AncestorResolver::new(&graph, &dirs);

        let results = JobResults::new();
        settled(&results, "A", "root/A/fit.db", 1);
        settled(&results, "A1", "root/A/A1/fit.db", MAX_FIT_ERRORS);

        let job_id = graph.job_id_of(2, None).unwrap();
        let fit = resolver.resolve(job_id, &results).unwrap();
        assert_eq!(fit.ancestor_dir, Some(PathBuf::from("root/A")));
        assert_eq!(fit.hops, Some(1));
    }

    #[test]
    fn test_exhausted_lineage_returns_none() {
        let fixture = Fixture::new();
        let graph = fixture.graph();
        let dirs = fixture.dirs();
        let resolver = AncestorResolver::new(&graph, &dirs);

        // Nothing ran at all: no artifacts anywhere.
        let results = JobResults::new();
        let job_id = graph.job_id_of(2, None).unwrap();
        let fit = resolver.resolve(job_id, &results).unwrap();
        assert_eq!(fit.predict_dir, PathBuf::from("root/A/A1"));
        assert_eq!(fit.ancestor_dir, None);
        assert_eq!(fit.hops, None);
        assert!(fit.is_exhausted());
    }
}
