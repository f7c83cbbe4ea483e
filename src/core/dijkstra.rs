use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::warn;

use crate::error::OptimizerError;

/// Adjacency-map road graph: node -> neighbour -> non-negative weight.
pub type Graph = HashMap<String, HashMap<String, f64>>;

/// Entry for a single node in an all-pairs result. `path` is `None` and
/// `distance` is infinite when the target is unreachable from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct PathEntry {
    pub path: Option<Vec<String>>,
    pub distance: f64,
}

/// Min-heap entry ordered by cumulative distance. `BinaryHeap` is a
/// max-heap, so the ordering is reversed here.
#[derive(Debug)]
struct HeapEntry {
    dist: f64,
    node: String,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist.total_cmp(&other.dist).is_eq()
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.dist.total_cmp(&self.dist)
    }
}

/// The optimizer relies on non-negativity for correctness, so any negative
/// weight fails the whole call before traversal starts.
fn validate_non_negative(graph: &Graph) -> Result<(), OptimizerError> {
    for (src, neighbours) in graph {
        for (dest, weight) in neighbours {
            if *weight < 0.0 {
                return Err(OptimizerError::NegativeWeight {
                    from: src.clone(),
                    to: dest.clone(),
                    weight: *weight,
                });
            }
        }
    }
    Ok(())
}

fn reconstruct(previous: &HashMap<String, String>, start: &str, end: &str) -> Vec<String> {
    let mut path = vec![end.to_string()];
    let mut current = end;
    while current != start {
        current = &previous[current];
        path.push(current.to_string());
    }
    path.reverse();
    path
}

/// Shortest path between two nodes. Returns `Ok(None)` when either node is
/// unknown or the target is unreachable; `start == end` yields
/// `([start], 0.0)`.
pub fn shortest_path(
    graph: &Graph,
    start: &str,
    end: &str,
) -> Result<Option<(Vec<String>, f64)>, OptimizerError> {
    validate_non_negative(graph)?;

    if !graph.contains_key(start) || !graph.contains_key(end) {
        warn!("Start node '{}' or end node '{}' not in graph", start, end);
        return Ok(None);
    }

    let mut heap = BinaryHeap::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut previous: HashMap<String, String> = HashMap::new();
    let mut tentative: HashMap<String, f64> = HashMap::new();

    tentative.insert(start.to_string(), 0.0);
    heap.push(HeapEntry {
        dist: 0.0,
        node: start.to_string(),
    });

    while let Some(HeapEntry { dist, node }) = heap.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }

        if node == end {
            return Ok(Some((reconstruct(&previous, start, end), dist)));
        }

        if let Some(neighbours) = graph.get(&node) {
            for (neighbour, weight) in neighbours {
                if visited.contains(neighbour) {
                    continue;
                }
                let alt = dist + weight;
                if alt < tentative.get(neighbour).copied().unwrap_or(f64::INFINITY) {
                    tentative.insert(neighbour.clone(), alt);
                    previous.insert(neighbour.clone(), node.clone());
                    heap.push(HeapEntry {
                        dist: alt,
                        node: neighbour.clone(),
                    });
                }
            }
        }
    }

    warn!("No path found from '{}' to '{}'", start, end);
    Ok(None)
}

/// All-pairs shortest paths over the supplied node list. Relaxation is
/// restricted to the listed nodes, mirroring single-pair results for the
/// same inputs.
pub fn all_shortest_paths(
    graph: &Graph,
    nodes: &[String],
) -> Result<HashMap<String, HashMap<String, PathEntry>>, OptimizerError> {
    validate_non_negative(graph)?;

    let mut result = HashMap::with_capacity(nodes.len());
    let node_set: HashSet<&str> = nodes.iter().map(String::as_str).collect();

    for start in nodes {
        let mut distances: HashMap<&str, f64> = nodes
            .iter()
            .map(|n| (n.as_str(), f64::INFINITY))
            .collect();
        let mut previous: HashMap<String, String> = HashMap::new();
        distances.insert(start.as_str(), 0.0);

        let mut heap = BinaryHeap::new();
        heap.push(HeapEntry {
            dist: 0.0,
            node: start.clone(),
        });

        while let Some(HeapEntry { dist, node }) = heap.pop() {
            let Some(neighbours) = graph.get(&node) else {
                continue;
            };
            for (neighbour, weight) in neighbours {
                if !node_set.contains(neighbour.as_str()) {
                    continue;
                }
                let alt = dist + weight;
                if alt < distances[neighbour.as_str()] {
                    distances.insert(neighbour.as_str(), alt);
                    previous.insert(neighbour.clone(), node.clone());
                    heap.push(HeapEntry {
                        dist: alt,
                        node: neighbour.clone(),
                    });
                }
            }
        }

        let mut per_target = HashMap::with_capacity(nodes.len());
        for end in nodes {
            let distance = distances[end.as_str()];
            if distance.is_infinite() {
                per_target.insert(
                    end.clone(),
                    PathEntry {
                        path: None,
                        distance: f64::INFINITY,
                    },
                );
            } else {
                per_target.insert(
                    end.clone(),
                    PathEntry {
                        path: Some(reconstruct(&previous, start, end)),
                        distance,
                    },
                );
            }
        }
        result.insert(start.clone(), per_target);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &str, f64)]) -> Graph {
        let mut graph: Graph = HashMap::new();
        for (from, to, weight) in edges {
            graph
                .entry(from.to_string())
                .or_default()
                .insert(to.to_string(), *weight);
            graph.entry(to.to_string()).or_default();
        }
        graph
    }

    #[test]
    fn finds_shortest_route_over_intermediate_node() {
        let g = graph(&[("a", "b", 1.0), ("b", "c", 1.0), ("a", "c", 5.0)]);
        let (path, dist) = shortest_path(&g, "a", "c").unwrap().unwrap();
        assert_eq!(path, vec!["a", "b", "c"]);
        assert_eq!(dist, 2.0);
    }

    #[test]
    fn self_path_is_trivial() {
        let g = graph(&[("a", "b", 1.0)]);
        let (path, dist) = shortest_path(&g, "a", "a").unwrap().unwrap();
        assert_eq!(path, vec!["a"]);
        assert_eq!(dist, 0.0);
    }

    #[test]
    fn unknown_nodes_yield_none() {
        let g = graph(&[("a", "b", 1.0)]);
        assert_eq!(shortest_path(&g, "a", "zz").unwrap(), None);
        assert_eq!(shortest_path(&g, "zz", "a").unwrap(), None);
    }

    #[test]
    fn disconnected_components_yield_none() {
        let g = graph(&[("a", "b", 1.0), ("c", "d", 1.0)]);
        assert_eq!(shortest_path(&g, "a", "d").unwrap(), None);
    }

    #[test]
    fn negative_weight_is_rejected_before_traversal() {
        let g = graph(&[("a", "b", 1.0), ("b", "c", -0.5)]);
        let err = shortest_path(&g, "a", "c").unwrap_err();
        assert!(matches!(err, OptimizerError::NegativeWeight { .. }));

        let err = all_shortest_paths(&g, &["a".into(), "b".into()]).unwrap_err();
        assert!(matches!(err, OptimizerError::NegativeWeight { .. }));
    }

    #[test]
    fn runs_are_idempotent() {
        let g = graph(&[
            ("a", "b", 2.0),
            ("b", "c", 2.0),
            ("a", "c", 3.5),
            ("c", "a", 3.5),
        ]);
        let first = shortest_path(&g, "a", "c").unwrap();
        let second = shortest_path(&g, "a", "c").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn all_pairs_matches_single_pair() {
        let g = graph(&[
            ("a", "b", 1.0),
            ("b", "c", 1.0),
            ("a", "c", 5.0),
            ("c", "a", 1.0),
        ]);
        let nodes: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let all = all_shortest_paths(&g, &nodes).unwrap();

        let entry = &all["a"]["c"];
        assert_eq!(entry.path.as_deref(), Some(&["a", "b", "c"].map(String::from)[..]));
        assert_eq!(entry.distance, 2.0);

        assert_eq!(all["a"]["a"].distance, 0.0);
        assert_eq!(all["a"]["a"].path.as_deref(), Some(&["a".to_string()][..]));

        // b has no outgoing edge to a, and nothing reaches it backwards.
        assert_eq!(all["b"]["a"].path, Some(vec!["b".to_string(), "c".to_string(), "a".to_string()]));
    }

    #[test]
    fn all_pairs_marks_unreachable_targets() {
        let g = graph(&[("a", "b", 1.0)]);
        let nodes: Vec<String> = vec!["a".into(), "b".into()];
        let all = all_shortest_paths(&g, &nodes).unwrap();
        assert_eq!(all["b"]["a"].path, None);
        assert!(all["b"]["a"].distance.is_infinite());
    }
}
