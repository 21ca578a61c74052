use crate::error::{CascadeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Node identifier (row index into the node table)
pub type NodeId = usize;

/// Split reference identifier (row index into the split reference table)
pub type SplitReferenceId = usize;

/// One region in the hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: NodeId,
    pub name: String,
    pub parent_id: Option<NodeId>,
}

/// Immutable region hierarchy with parent links and a children index
#[derive(Debug, Clone)]
pub struct NodeTree {
    nodes: Vec<Node>,
    children: Vec<Vec<NodeId>>,
    root: NodeId,
}

impl NodeTree {
    /// Build the tree from its node table, validating the parent links.
    ///
    /// Requires exactly one root (parent_id = None), node_id equal to the
    /// row index, unique node names, and an acyclic parent chain for
    /// every node. Name uniqueness is what lets the artifact directory
    /// scheme map distinct jobs to distinct paths.
    pub fn new(nodes: Vec<Node>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(CascadeError::config("node table is empty"));
        }

        let mut root: Option<NodeId> = None;
        let mut names: HashSet<&str> = HashSet::new();
        for (index, node) in nodes.iter().enumerate() {
            if !names.insert(&node.name) {
                return Err(CascadeError::config(format!(
                    "duplicate node name {}",
                    node.name
                )));
            }
            if node.node_id != index {
                return Err(CascadeError::config(format!(
                    "node_id {} does not match its row index {}",
                    node.node_id, index
                )));
            }
            match node.parent_id {
                None => {
                    if root.is_some() {
                        return Err(CascadeError::config(format!(
                            "multiple root nodes: {} and {}",
                            nodes[root.unwrap()].name, node.name
                        )));
                    }
                    root = Some(index);
                }
                Some(parent) => {
                    if parent >= nodes.len() {
                        return Err(CascadeError::config(format!(
                            "node {} has out of range parent_id {}",
                            node.name, parent
                        )));
                    }
                    if parent == index {
                        return Err(CascadeError::config(format!(
                            "node {} is its own parent",
                            node.name
                        )));
                    }
                }
            }
        }
        let root =
            root.ok_or_else(|| CascadeError::config("node table has no root node"))?;

        // Every parent chain must terminate at the root.
        for node in &nodes {
            let mut current = node.parent_id;
            let mut steps = 0;
            while let Some(parent) = current {
                steps += 1;
                if steps > nodes.len() {
                    return Err(CascadeError::config(format!(
                        "parent chain of node {} contains a cycle",
                        node.name
                    )));
                }
                current = nodes[parent].parent_id;
            }
        }

        let mut children = vec![Vec::new(); nodes.len()];
        for node in &nodes {
            if let Some(parent) = node.parent_id {
                children[parent].push(node.node_id);
            }
        }

        Ok(Self {
            nodes,
            children,
            root,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, node_id: NodeId) -> Result<&Node> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| CascadeError::NodeNotFound(format!("node_id {}", node_id)))
    }

    pub fn name(&self, node_id: NodeId) -> Result<&str> {
        Ok(&self.get(node_id)?.name)
    }

    pub fn parent(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(node_id)?.parent_id)
    }

    pub fn children(&self, node_id: NodeId) -> Result<&[NodeId]> {
        self.get(node_id)?;
        Ok(&self.children[node_id])
    }

    /// Look a node up by name, as option tables refer to nodes by name.
    pub fn node_id_by_name(&self, name: &str) -> Result<NodeId> {
        self.nodes
            .iter()
            .find(|node| node.name == name)
            .map(|node| node.node_id)
            .ok_or_else(|| CascadeError::NodeNotFound(name.to_string()))
    }
}

/// One alternative reference value a fit can be evaluated against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitReference {
    pub split_reference_id: SplitReferenceId,
    pub name: String,
    pub value: f64,
}

/// Ordered split reference table with its designated root reference.
///
/// An empty table means splitting is not used at all; in that case there
/// is no root reference and jobs carry no reference id.
#[derive(Debug, Clone)]
pub struct SplitReferenceTable {
    rows: Vec<SplitReference>,
    root: Option<SplitReferenceId>,
}

impl SplitReferenceTable {
    /// A non-empty table must designate its root reference by name.
    pub fn new(rows: Vec<SplitReference>, root_name: Option<&str>) -> Result<Self> {
        for (index, row) in rows.iter().enumerate() {
            if row.split_reference_id != index {
                return Err(CascadeError::config(format!(
                    "split_reference_id {} does not match its row index {}",
                    row.split_reference_id, index
                )));
            }
        }
        let root = match (rows.is_empty(), root_name) {
            (true, None) => None,
            (true, Some(name)) => {
                return Err(CascadeError::config(format!(
                    "root split reference {} given but the split reference table is empty",
                    name
                )));
            }
            (false, None) => {
                return Err(CascadeError::config(
                    "split reference table is not empty but no root split reference is designated",
                ));
            }
            (false, Some(name)) => Some(
                rows.iter()
                    .find(|row| row.name == name)
                    .map(|row| row.split_reference_id)
                    .ok_or_else(|| CascadeError::ReferenceNotFound(name.to_string()))?,
            ),
        };
        Ok(Self { rows, root })
    }

    /// Table with no references (splitting disabled).
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            root: None,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn root_reference(&self) -> Option<SplitReferenceId> {
        self.root
    }

    pub fn get(&self, id: SplitReferenceId) -> Result<&SplitReference> {
        self.rows
            .get(id)
            .ok_or_else(|| CascadeError::ReferenceNotFound(format!("split_reference_id {}", id)))
    }

    pub fn name(&self, id: SplitReferenceId) -> Result<&str> {
        Ok(&self.get(id)?.name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SplitReference> {
        self.rows.iter()
    }
}

/// Nodes at which the cascade transitions from the root reference to
/// evaluating every other reference value independently
#[derive(Debug, Clone, Default)]
pub struct NodeSplitSet {
    set: HashSet<NodeId>,
}

impl NodeSplitSet {
    /// A split point with fewer than two children is degenerate: there is
    /// nothing downstream to evaluate per reference. Split points must
    /// also form an antichain in the tree, so every lineage crosses at
    /// most one split boundary.
    pub fn new(node_ids: impl IntoIterator<Item = NodeId>, tree: &NodeTree) -> Result<Self> {
        let mut set = HashSet::new();
        for node_id in node_ids {
            let children = tree.children(node_id)?;
            if children.len() < 2 {
                return Err(CascadeError::config(format!(
                    "split point {} has {} children; at least two are required",
                    tree.name(node_id)?,
                    children.len()
                )));
            }
            set.insert(node_id);
        }
        for &node_id in &set {
            let mut current = tree.parent(node_id)?;
            while let Some(ancestor) = current {
                if set.contains(&ancestor) {
                    return Err(CascadeError::config(format!(
                        "split point {} is an ancestor of split point {}",
                        tree.name(ancestor)?,
                        tree.name(node_id)?
                    )));
                }
                current = tree.parent(ancestor)?;
            }
        }
        Ok(Self { set })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.set.contains(&node_id)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
