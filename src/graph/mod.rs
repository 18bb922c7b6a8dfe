// Derived dependency graph construction

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::store::{EdgeType, GraphEdge, RawCall, RawImport};

/// Rebuild the complete edge set from the current raw facts.
///
/// The result replaces the stored edge table wholesale on every refresh;
/// there is no incremental patching, so a deleted or renamed file can never
/// leave a stale edge behind. Deduplicated by (src, dst, type), self-edges
/// discarded, sorted for deterministic output.
pub fn rebuild_edges(
    project_root: &Path,
    imports: &[RawImport],
    calls: &[RawCall],
    symbol_owners: &HashMap<String, BTreeSet<String>>,
) -> Vec<GraphEdge> {
    let mut keys: BTreeSet<(String, String, EdgeType)> = BTreeSet::new();

    for import in imports {
        if let Some(dst) = resolve_import_to_file(project_root, &import.module_name) {
            if dst != import.file_path {
                keys.insert((import.file_path.clone(), dst, EdgeType::Import));
            }
        }
    }

    // Name-only matching: every file defining the callee name becomes a
    // candidate destination. Recall over precision; the lower call weight
    // carries the uncertainty.
    for call in calls {
        if let Some(owners) = symbol_owners.get(&call.callee_name) {
            for dst in owners {
                if dst != &call.file_path {
                    keys.insert((call.file_path.clone(), dst.clone(), EdgeType::Call));
                }
            }
        }
    }

    keys.into_iter()
        .map(|(src_file, dst_file, edge_type)| GraphEdge {
            src_file,
            dst_file,
            weight: edge_type.weight(),
            edge_type,
        })
        .collect()
}

/// Resolve a dotted module name to a project-local file.
///
/// Probes `<root>/a/b.py` then `<root>/a/b/__init__.py`; anything else is
/// an external import and yields no edge.
pub fn resolve_import_to_file(root: &Path, module_name: &str) -> Option<String> {
    if module_name.is_empty() {
        return None;
    }
    let rel = module_name.split('.').collect::<Vec<_>>().join("/");

    let module_file = root.join(format!("{}.py", rel));
    if module_file.is_file() {
        return Some(format!("{}.py", rel));
    }

    let package_init = root.join(&rel).join("__init__.py");
    if package_init.is_file() {
        return Some(format!("{}/__init__.py", rel));
    }

    None
}
