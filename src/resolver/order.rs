//! Fixed-point level ordering.
//!
//! Both the dependency database and the build database order their items
//! so that whatever an item depends on comes first. Every node starts with
//! an initial level; a node whose dependency has the same or a higher level
//! is raised to one above it. This repeats until nothing changes.
//!
//! On an acyclic graph the loop settles after at most `node_count` passes.
//! A cycle keeps raising levels forever, so the loop stops after
//! `node_count + 1` passes and the strongly connected components that
//! caused it are reported in a [`CycleWarning`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

/// A level sort that did not converge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleWarning {
    /// What was being sorted, e.g. "dependency".
    pub context: String,
    /// Each cycle as a list of node labels.
    pub cycles: Vec<Vec<String>>,
}

impl fmt::Display for CycleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sort did not converge", self.context)?;
        for cycle in &self.cycles {
            write!(f, "; cycle: {}", cycle.join(" -> "))?;
        }
        Ok(())
    }
}

/// Levels after settling, plus a warning if the loop was cut short.
#[derive(Debug, Clone)]
pub struct Settled<N> {
    pub levels: HashMap<N, i64>,
    pub cycle: Option<CycleWarning>,
}

impl<N: Eq + Hash> Settled<N> {
    pub fn level(&self, node: &N) -> i64 {
        self.levels.get(node).copied().unwrap_or_default()
    }
}

/// Raise levels until every node sits above its dependencies.
///
/// `nodes` gives each node with its initial level. Dependencies that are
/// not among `nodes` are ignored when `external_level` is `None`, otherwise
/// they count with that fixed level.
pub fn settle_levels<N, L>(
    context: &str,
    nodes: &[(N, i64)],
    deps: &BTreeMap<N, BTreeSet<N>>,
    external_level: Option<i64>,
    label: L,
) -> Settled<N>
where
    N: Ord + Hash + Clone,
    L: Fn(&N) -> String,
{
    let mut levels: HashMap<N, i64> = nodes.iter().cloned().collect();
    let passes = nodes.len() + 1;

    for _ in 0..passes {
        let mut changes = false;
        for (node, _) in nodes {
            let Some(node_deps) = deps.get(node) else {
                continue;
            };
            let max_dep = node_deps
                .iter()
                .filter_map(|d| levels.get(d).copied().or(external_level))
                .max();
            let Some(max_dep) = max_dep else {
                continue;
            };
            let current = levels.get(node).copied().unwrap_or_default();
            if max_dep >= current {
                levels.insert(node.clone(), max_dep + 1);
                changes = true;
            }
        }
        if !changes {
            return Settled {
                levels,
                cycle: None,
            };
        }
    }

    let warning = CycleWarning {
        context: context.to_string(),
        cycles: find_cycles(nodes, deps, &label),
    };
    tracing::warn!("{}", warning);
    Settled {
        levels,
        cycle: Some(warning),
    }
}

/// Strongly connected components with more than one node, or a self edge.
pub fn find_cycles<N, L>(nodes: &[(N, i64)], deps: &BTreeMap<N, BTreeSet<N>>, label: L) -> Vec<Vec<String>>
where
    N: Ord + Hash + Clone,
    L: Fn(&N) -> String,
{
    let mut graph: DiGraph<N, ()> = DiGraph::new();
    let mut index: HashMap<N, NodeIndex> = HashMap::new();
    for (node, _) in nodes {
        index
            .entry(node.clone())
            .or_insert_with(|| graph.add_node(node.clone()));
    }
    for (node, _) in nodes {
        let Some(node_deps) = deps.get(node) else {
            continue;
        };
        for dep in node_deps {
            if let (Some(&from), Some(&to)) = (index.get(node), index.get(dep)) {
                if !graph.contains_edge(from, to) {
                    graph.add_edge(from, to, ());
                }
            }
        }
    }

    let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .map(|scc| {
            let mut names: Vec<String> = scc.iter().map(|&n| label(&graph[n])).collect();
            names.sort();
            names
        })
        .collect();
    cycles.sort();
    cycles
}
