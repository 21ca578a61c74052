/*
 * Cascade Orchestration - Dependent Statistical-Fit Scheduling
 *
 * Drives a cascade of fit jobs over a hierarchical region tree, where
 * each region's result seeds and constrains its children.
 *
 * Architecture:
 * - Node tree + split reference tables (immutable after load)
 * - Job graph (append-only arena, BFS construction)
 * - Deterministic artifact directory scheme
 * - Ancestor fallback for failed fits
 * - Covariate freeze propagation
 * - Bounded-concurrency executor over an external fitting engine
 */

// Public modules
pub mod ancestor;
pub mod cascade;
pub mod config;
pub mod dirs;
pub mod error;
pub mod executor;
pub mod freeze;
pub mod graph;
pub mod job;
pub mod tree;

// Re-exports
pub use ancestor::{AncestorFit, AncestorResolver};
pub use cascade::cascade_root_node;
pub use config::CascadeOptions;
pub use dirs::{DatabaseDirResolver, FIT_DB_FILE};
pub use error::{CascadeError, Result};
pub use executor::{Fallback, FitEngine, FitOutcome, JobReport, ParallelExecutor, RunReport};
pub use freeze::{FreezeDirective, FreezePolicyResolver, FreezeValue, MulcovId};
pub use graph::{JobGraph, JobGraphBuilder};
pub use job::{Job, JobId, JobResult, JobResults, JobStatus, MAX_FIT_ERRORS};
pub use tree::{
    Node, NodeId, NodeSplitSet, NodeTree, SplitReference, SplitReferenceId, SplitReferenceTable,
};
