//! Source file ordering.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};

use petgraph::Direction;
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};

/// Orders source files so that each file follows the files it depends on.
pub trait DependencyResolver: Send + Sync {
    /// `known_pairs` holds `(file, depends_on)` pairs.
    fn resolve(&self, files: &[PathBuf], known_pairs: &[(PathBuf, PathBuf)]) -> Result<Vec<PathBuf>>;
}

/// Graph-based resolver.
///
/// Among files with no ordering constraint between them the input order is
/// kept, so an empty pair list returns `files` unchanged. A file listed more
/// than once is kept at its first position.
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphResolver;

impl GraphResolver {
    fn build_graph(
        files: &[PathBuf],
        known_pairs: &[(PathBuf, PathBuf)],
    ) -> Result<DiGraph<usize, ()>> {
        let mut graph = DiGraph::with_capacity(files.len(), known_pairs.len());
        let mut nodes: FxHashMap<&Path, NodeIndex> = FxHashMap::default();
        for (index, file) in files.iter().enumerate() {
            let node = graph.add_node(index);
            nodes.entry(file.as_path()).or_insert(node);
        }

        let lookup = |path: &Path| {
            nodes.get(path).copied().ok_or_else(|| {
                Error::Config(format!(
                    "dependency names `{}' which is not a source file",
                    path.display()
                ))
            })
        };

        for (file, depends_on) in known_pairs {
            let dependent = lookup(file)?;
            let dependency = lookup(depends_on)?;
            // Edge from dependency to dependent: the dependency comes first.
            graph.update_edge(dependency, dependent, ());
        }
        Ok(graph)
    }

    fn detect_cycles(graph: &DiGraph<usize, ()>, files: &[PathBuf]) -> Result<()> {
        for scc in kosaraju_scc(graph) {
            let cyclic = scc.len() > 1 || graph.contains_edge(scc[0], scc[0]);
            if cyclic {
                let mut names: Vec<String> = scc
                    .iter()
                    .map(|&n| files[graph[n]].display().to_string())
                    .collect();
                names.sort();
                return Err(Error::CyclicDependency(names.join(" → ")));
            }
        }
        Ok(())
    }
}

impl DependencyResolver for GraphResolver {
    fn resolve(&self, files: &[PathBuf], known_pairs: &[(PathBuf, PathBuf)]) -> Result<Vec<PathBuf>> {
        let mut seen = FxHashSet::default();
        let files: Vec<PathBuf> = files
            .iter()
            .filter(|file| {
                let first = seen.insert(file.as_path());
                if !first {
                    tracing::debug!("Ignoring duplicate source {}", file.display());
                }
                first
            })
            .cloned()
            .collect();

        let graph = Self::build_graph(&files, known_pairs)?;
        Self::detect_cycles(&graph, &files)?;

        let mut in_degree: Vec<usize> = graph
            .node_indices()
            .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();

        // Ready nodes, lowest input position first.
        let mut ready: BinaryHeap<Reverse<usize>> = graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .map(|n| Reverse(n.index()))
            .collect();

        let mut order = Vec::with_capacity(files.len());
        while let Some(Reverse(index)) = ready.pop() {
            let node = NodeIndex::new(index);
            order.push(files[graph[node]].clone());
            for next in graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.push(Reverse(next.index()));
                }
            }
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    fn pair(file: &str, dep: &str) -> (PathBuf, PathBuf) {
        (PathBuf::from(file), PathBuf::from(dep))
    }

    #[test]
    fn test_no_pairs_keeps_order() {
        let files = paths(&["c.rb", "a.rb", "b.rb"]);
        assert_eq!(GraphResolver.resolve(&files, &[]).unwrap(), files);
    }

    #[test]
    fn test_dependency_moves_first() {
        let files = paths(&["main.rb", "util.rb", "other.rb"]);
        let order = GraphResolver
            .resolve(&files, &[pair("main.rb", "util.rb")])
            .unwrap();
        assert_eq!(order, paths(&["util.rb", "main.rb", "other.rb"]));
    }

    #[test]
    fn test_chain() {
        let files = paths(&["a.rb", "b.rb", "c.rb"]);
        let order = GraphResolver
            .resolve(&files, &[pair("a.rb", "b.rb"), pair("b.rb", "c.rb")])
            .unwrap();
        assert_eq!(order, paths(&["c.rb", "b.rb", "a.rb"]));
    }

    #[test]
    fn test_cycle_detected() {
        let files = paths(&["a.rb", "b.rb"]);
        let err = GraphResolver
            .resolve(&files, &[pair("a.rb", "b.rb"), pair("b.rb", "a.rb")])
            .unwrap_err();
        assert!(matches!(err, Error::CyclicDependency(_)));

        let err = GraphResolver
            .resolve(&files, &[pair("a.rb", "a.rb")])
            .unwrap_err();
        assert!(matches!(err, Error::CyclicDependency(_)));
    }

    #[test]
    fn test_duplicate_files_kept_once() {
        let files = paths(&["a.rb", "b.rb", "a.rb"]);
        let order = GraphResolver
            .resolve(&files, &[pair("a.rb", "b.rb")])
            .unwrap();
        assert_eq!(order, paths(&["b.rb", "a.rb"]));

        let order = GraphResolver.resolve(&files, &[]).unwrap();
        assert_eq!(order, paths(&["a.rb", "b.rb"]));
    }

    #[test]
    fn test_unknown_file_rejected() {
        let files = paths(&["a.rb"]);
        let err = GraphResolver
            .resolve(&files, &[pair("a.rb", "missing.rb")])
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
