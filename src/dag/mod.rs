// ABOUTME: Dependency graph construction and cycle detection for plans
// ABOUTME: Exports adjacency building and Kahn-based topological ordering

pub mod graph;

pub use graph::{build_adjacency, topological_order, DagIndex};
