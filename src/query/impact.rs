// File-level change impact analysis

use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;

use crate::oracle::{ConsequenceOracle, OracleSummary};
use crate::store::db::FactStore;
use crate::store::GraphEdge;

/// Classification of one impacted file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactKind {
    Changed,
    Direct,
    Transitive,
}

impl ImpactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactKind::Changed => "changed",
            ImpactKind::Direct => "direct",
            ImpactKind::Transitive => "transitive",
        }
    }
}

/// Where an impact entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImpactSource {
    #[serde(rename = "changed")]
    Changed,
    #[serde(rename = "graph")]
    Graph,
    #[serde(rename = "world_model")]
    WorldModel,
    #[serde(rename = "graph+world_model")]
    GraphAndWorldModel,
}

impl ImpactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactSource::Changed => "changed",
            ImpactSource::Graph => "graph",
            ImpactSource::WorldModel => "world_model",
            ImpactSource::GraphAndWorldModel => "graph+world_model",
        }
    }
}

/// One impacted file with its distance-derived confidence. Query-time
/// only; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ImpactEntry {
    pub file_path: String,
    pub distance: usize,
    pub impact_kind: ImpactKind,
    pub confidence: f64,
    pub source: ImpactSource,
}

/// Full result of one impact query
#[derive(Debug, Clone, Serialize)]
pub struct ImpactReport {
    pub changed_files: Vec<String>,
    pub impacted: Vec<ImpactEntry>,
    pub direct_count: usize,
    pub transitive_count: usize,
    pub max_depth: usize,
    pub oracle: OracleSummary,
}

/// Impact analyzer over the persisted edge set
pub struct ImpactAnalyzer<'a> {
    store: &'a FactStore,
    project_root: &'a Path,
}

impl<'a> ImpactAnalyzer<'a> {
    pub fn new(store: &'a FactStore, project_root: &'a Path) -> Self {
        Self { store, project_root }
    }

    /// Compute direct and transitive impact for a set of changed files.
    ///
    /// Oracle failures never fail the query; they degrade it to pure-graph
    /// results with the reason recorded in the summary.
    pub fn impact_for_files(
        &self,
        changed_files: &[String],
        max_depth: usize,
        oracle: Option<&dyn ConsequenceOracle>,
    ) -> Result<ImpactReport> {
        let indexed: BTreeSet<String> =
            self.store.file_metadata()?.into_keys().collect();
        let changed = self.normalize_changed(changed_files, &indexed);

        let edges = self.store.list_edges()?;
        let reverse = reverse_adjacency(&edges);
        let distance = bfs_distances(&changed, &reverse, max_depth);
        let graph_distance = distance.clone();

        let mut distance = distance;
        let mut summary = OracleSummary::disabled();
        let mut predicted_strength: HashMap<String, f64> = HashMap::new();

        if let Some(oracle) = oracle {
            summary.enabled = true;
            'query: for file_path in &changed {
                let subject = format!("file:{}", file_path);
                match oracle.predict_consequence(&subject) {
                    Ok(predictions) => {
                        for prediction in predictions {
                            let Some(path) = prediction.effect_key.strip_prefix("file:") else {
                                continue;
                            };
                            if !indexed.contains(path) {
                                continue;
                            }
                            let strength = prediction.strength.clamp(0.0, 1.0);
                            let entry =
                                predicted_strength.entry(path.to_string()).or_insert(0.0);
                            if strength > *entry {
                                *entry = strength;
                            }
                        }
                    }
                    Err(err) => {
                        summary.error = Some(err.to_string());
                        break 'query;
                    }
                }
            }

            // Predictions unknown to the graph enter as direct impact;
            // graph-reached files keep their graph distance.
            for path in predicted_strength.keys() {
                distance.entry(path.clone()).or_insert(1);
            }
            summary.predicted_files = {
                let mut files: Vec<String> = predicted_strength.keys().cloned().collect();
                files.sort();
                files
            };
        }

        let mut ordered: Vec<(String, usize)> = distance.into_iter().collect();
        ordered.sort_by(|a, b| (a.1, &a.0).cmp(&(b.1, &b.0)));

        let mut impacted = Vec::with_capacity(ordered.len());
        for (file_path, dist) in ordered {
            let (impact_kind, mut confidence) = classify(dist);

            let from_graph = graph_distance.contains_key(&file_path);
            let predicted = predicted_strength.get(&file_path).copied();
            let source = if dist == 0 {
                ImpactSource::Changed
            } else if from_graph && predicted.is_some() {
                confidence = confidence.max(round3(predicted.unwrap_or(0.0)));
                ImpactSource::GraphAndWorldModel
            } else if let Some(strength) = predicted {
                confidence = round3(strength);
                ImpactSource::WorldModel
            } else {
                ImpactSource::Graph
            };

            impacted.push(ImpactEntry {
                file_path,
                distance: dist,
                impact_kind,
                confidence,
                source,
            });
        }

        let direct_count = impacted
            .iter()
            .filter(|e| e.impact_kind == ImpactKind::Direct)
            .count();
        let transitive_count = impacted
            .iter()
            .filter(|e| e.impact_kind == ImpactKind::Transitive)
            .count();

        Ok(ImpactReport {
            changed_files: changed,
            impacted,
            direct_count,
            transitive_count,
            max_depth,
            oracle: summary,
        })
    }

    /// Map input tokens to known indexed paths; unresolvable inputs are
    /// dropped, the rest deduplicated and sorted.
    fn normalize_changed(&self, inputs: &[String], indexed: &BTreeSet<String>) -> Vec<String> {
        let mut out: BTreeSet<String> = BTreeSet::new();
        for item in inputs {
            let norm = item.replace('\\', "/").trim().to_string();
            if indexed.contains(&norm) {
                out.insert(norm);
                continue;
            }
            let candidate = Path::new(&norm);
            if candidate.is_absolute() {
                if let Ok(rel) = candidate.strip_prefix(self.project_root) {
                    let rel: Vec<String> = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    let rel = rel.join("/");
                    if indexed.contains(&rel) {
                        out.insert(rel);
                    }
                }
            }
        }
        out.into_iter().collect()
    }
}

/// For every edge `src -> dst`, record `src` as a reverse neighbor of
/// `dst`: the files affected when `dst` changes.
fn reverse_adjacency(edges: &[GraphEdge]) -> HashMap<String, Vec<String>> {
    let mut reverse: HashMap<String, Vec<String>> = HashMap::new();
    for edge in edges {
        reverse
            .entry(edge.dst_file.clone())
            .or_default()
            .push(edge.src_file.clone());
    }
    reverse
}

/// Plain multi-source BFS: first-seen distance wins, no relaxation.
/// Neighbors are pushed only while the popped node is below `max_depth`.
fn bfs_distances(
    seeds: &[String],
    reverse: &HashMap<String, Vec<String>>,
    max_depth: usize,
) -> HashMap<String, usize> {
    let mut distance: HashMap<String, usize> = HashMap::new();
    let mut frontier: VecDeque<String> = VecDeque::new();

    for seed in seeds {
        distance.insert(seed.clone(), 0);
        frontier.push_back(seed.clone());
    }

    while let Some(current) = frontier.pop_front() {
        let current_dist = distance[&current];
        if current_dist >= max_depth {
            continue;
        }
        if let Some(dependents) = reverse.get(&current) {
            for dependent in dependents {
                if !distance.contains_key(dependent) {
                    distance.insert(dependent.clone(), current_dist + 1);
                    frontier.push_back(dependent.clone());
                }
            }
        }
    }

    distance
}

/// Distance to (kind, confidence): 0 is the change itself, 1 is direct,
/// beyond that confidence decays toward a 0.25 floor.
fn classify(distance: usize) -> (ImpactKind, f64) {
    match distance {
        0 => (ImpactKind::Changed, 1.0),
        1 => (ImpactKind::Direct, 0.85),
        d => (ImpactKind::Transitive, round3(0.75 / d as f64).max(0.25)),
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EdgeType;
    use proptest::prelude::*;

    fn edge(src: &str, dst: &str, edge_type: EdgeType) -> GraphEdge {
        GraphEdge {
            src_file: src.to_string(),
            dst_file: dst.to_string(),
            weight: edge_type.weight(),
            edge_type,
        }
    }

    #[test]
    fn test_bfs_first_seen_distance_wins() {
        // a -> b -> c and a -> c: c reaches a at distance 1 via the
        // direct edge, not 2 via b.
        let edges = vec![
            edge("a.py", "b.py", EdgeType::Import),
            edge("b.py", "c.py", EdgeType::Import),
            edge("a.py", "c.py", EdgeType::Import),
        ];
        let reverse = reverse_adjacency(&edges);
        let distance = bfs_distances(&["c.py".to_string()], &reverse, 8);

        assert_eq!(distance["c.py"], 0);
        assert_eq!(distance["b.py"], 1);
        assert_eq!(distance["a.py"], 1);
    }

    #[test]
    fn test_bfs_respects_max_depth() {
        let edges = vec![
            edge("b.py", "a.py", EdgeType::Import),
            edge("c.py", "b.py", EdgeType::Import),
            edge("d.py", "c.py", EdgeType::Import),
        ];
        let reverse = reverse_adjacency(&edges);
        let distance = bfs_distances(&["a.py".to_string()], &reverse, 2);

        assert_eq!(distance.get("b.py"), Some(&1));
        assert_eq!(distance.get("c.py"), Some(&2));
        assert_eq!(distance.get("d.py"), None);
    }

    #[test]
    fn test_bfs_handles_cycles() {
        let edges = vec![
            edge("a.py", "b.py", EdgeType::Import),
            edge("b.py", "a.py", EdgeType::Import),
        ];
        let reverse = reverse_adjacency(&edges);
        let distance = bfs_distances(&["a.py".to_string()], &reverse, 8);

        assert_eq!(distance["a.py"], 0);
        assert_eq!(distance["b.py"], 1);
    }

    #[test]
    fn test_classify_constants() {
        assert_eq!(classify(0), (ImpactKind::Changed, 1.0));
        assert_eq!(classify(1), (ImpactKind::Direct, 0.85));
        assert_eq!(classify(2), (ImpactKind::Transitive, 0.375));
        assert_eq!(classify(3), (ImpactKind::Transitive, 0.25));
        // Floor holds at large depths
        assert_eq!(classify(50), (ImpactKind::Transitive, 0.25));
    }

    proptest! {
        #[test]
        fn prop_confidence_monotone_and_bounded(distances in proptest::collection::vec(0usize..200, 1..64)) {
            let mut sorted = distances.clone();
            sorted.sort_unstable();

            let mut previous: Option<(usize, f64)> = None;
            for d in sorted {
                let (_, confidence) = classify(d);
                prop_assert!((0.0..=1.0).contains(&confidence));
                if d == 0 {
                    prop_assert_eq!(confidence, 1.0);
                }
                if d == 1 {
                    prop_assert_eq!(confidence, 0.85);
                }
                if let Some((prev_d, prev_c)) = previous {
                    if prev_d >= 1 {
                        prop_assert!(confidence <= prev_c);
                    }
                }
                previous = Some((d, confidence));
            }
        }

        #[test]
        fn prop_bfs_distances_bounded_by_max_depth(
            raw_edges in proptest::collection::vec((0u8..10, 0u8..10), 0..40),
            max_depth in 1usize..6,
        ) {
            let edges: Vec<GraphEdge> = raw_edges
                .iter()
                .map(|(s, d)| edge(&format!("f{}.py", s), &format!("f{}.py", d), EdgeType::Import))
                .collect();
            let reverse = reverse_adjacency(&edges);
            let distance = bfs_distances(&["f0.py".to_string()], &reverse, max_depth);

            prop_assert_eq!(distance.get("f0.py"), Some(&0));
            for (_, d) in &distance {
                prop_assert!(*d <= max_depth);
            }
        }
    }
}
