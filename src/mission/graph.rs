use std::collections::{BTreeMap, HashSet};

/// Detects a cycle in a task dependency graph using DFS. Returns the cycle
/// path when one exists. Iteration over a BTreeMap keeps the result
/// deterministic for a given graph.
pub(crate) fn detect_cycle(dependencies: &BTreeMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for node in dependencies.keys() {
        if dfs_cycle(node, dependencies, &mut visited, &mut rec_stack, &mut path) {
            return Some(path);
        }
    }

    None
}

fn dfs_cycle(
    node: &str,
    graph: &BTreeMap<String, Vec<String>>,
    visited: &mut HashSet<String>,
    rec_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> bool {
    if rec_stack.contains(node) {
        path.push(node.to_string());
        return true;
    }

    if visited.contains(node) {
        return false;
    }

    visited.insert(node.to_string());
    rec_stack.insert(node.to_string());
    path.push(node.to_string());

    if let Some(deps) = graph.get(node) {
        for dep in deps {
            if dfs_cycle(dep, graph, visited, rec_stack, path) {
                return true;
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(n, deps)| {
                (
                    n.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn diamond_has_no_cycle() {
        let deps = graph(&[
            ("t-001", &[]),
            ("t-002", &["t-001"]),
            ("t-003", &["t-001"]),
            ("t-004", &["t-002", "t-003"]),
        ]);
        assert!(detect_cycle(&deps).is_none());
    }

    #[test]
    fn two_node_cycle_is_found() {
        let deps = graph(&[("t-001", &["t-002"]), ("t-002", &["t-001"])]);
        let cycle = detect_cycle(&deps).unwrap();
        assert!(cycle.len() >= 2);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let deps = graph(&[("t-001", &["t-001"])]);
        assert!(detect_cycle(&deps).is_some());
    }
}
