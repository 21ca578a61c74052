use crate::error::{CascadeError, Result};
use crate::tree::{NodeId, NodeSplitSet, NodeTree, SplitReferenceId, SplitReferenceTable};
use std::path::PathBuf;

/// Fixed name of the engine state file inside a job's directory.
pub const FIT_DB_FILE: &str = "fit.db";

/// Maps a (node, reference) pair to its canonical artifact directory,
/// relative to the results root.
///
/// Pure function of the node tree, split reference table and split point
/// set: distinct pairs never collide, and a child job's path is always
/// its parent's path plus one segment.
pub struct DatabaseDirResolver<'a> {
    tree: &'a NodeTree,
    references: &'a SplitReferenceTable,
    split_points: &'a NodeSplitSet,
}

impl<'a> DatabaseDirResolver<'a> {
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

    /// Walk from the fit node up to the tree root.
    ///
    /// At each step: if the carried reference differs from the root
    /// reference and the current node is a split point, emit the fit
    /// reference's name and reset the carried reference (exactly one
    /// split boundary is crossed per lineage); otherwise emit the node's
    /// name and move to its parent. Segments are emitted leaf-first and
    /// reversed.
    pub fn resolve(
        &self,
        fit_node_id: NodeId,
        fit_reference_id: Option<SplitReferenceId>,
    ) -> Result<PathBuf> {
        let root_reference = self.references.root_reference();
        match (self.references.is_empty(), fit_reference_id) {
            (true, Some(reference_id)) => {
                return Err(CascadeError::structural(format!(
                    "reference {} given but the split reference table is empty",
                    reference_id
                )));
            }
            (false, None) => {
                return Err(CascadeError::structural(
                    "split reference table is not empty but the fit carries no reference",
                ));
            }
            _ => {}
        }
        let fit_reference_name = match fit_reference_id {
            Some(reference_id) => Some(self.references.name(reference_id)?.to_string()),
            None => None,
        };

        let mut segments: Vec<String> = Vec::new();
        let mut node_id = Some(fit_node_id);
        let mut reference_id = fit_reference_id;

        while let Some(current) = node_id {
            let split = reference_id != root_reference && self.split_points.contains(current);
            if split {
                // reference name is always present here: reference_id can
                // only differ from the root when the table is non-empty
                segments.push(fit_reference_name.clone().unwrap_or_default());
                reference_id = root_reference;
            } else {
                segments.push(self.tree.name(current)?.to_string());
                node_id = self.tree.parent(current)?;
            }
        }

        if reference_id != root_reference {
            // No split point on the lineage absorbed the non-root
            // reference; the pair cannot be placed.
            return Err(CascadeError::structural(format!(
                "no split point above node {} for reference {}",
                self.tree.name(fit_node_id)?,
                fit_reference_name.unwrap_or_default()
            )));
        }

        Ok(segments.iter().rev().collect())
    }
}
