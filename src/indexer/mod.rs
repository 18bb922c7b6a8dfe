// Incremental indexing and refresh orchestration

pub mod parser;
pub mod scanner;

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::graph;
use crate::oracle::ConsequenceOracle;
use crate::query::impact::{ImpactAnalyzer, ImpactReport};
use crate::store::db::FactStore;
use crate::store::IndexCounts;
use parser::PythonParser;

/// Aggregate counters for one refresh pass
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStats {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_deleted: usize,
    pub parse_errors: usize,
    pub symbols_total: usize,
    pub edges_total: usize,
    pub elapsed_ms: u64,
}

/// The indexing and impact engine for one project.
///
/// Synchronous by design: a refresh or impact call fully completes,
/// including all storage transactions, before returning.
pub struct ImpactEngine {
    project_root: PathBuf,
    config: Config,
    store: FactStore,
    parser: PythonParser,
    oracle: Option<Box<dyn ConsequenceOracle>>,
}

impl ImpactEngine {
    /// Open (or create) the engine for a project root
    pub fn open(project_root: impl AsRef<Path>, config: Config) -> Result<Self> {
        let project_root = project_root
            .as_ref()
            .canonicalize()
            .with_context(|| {
                format!("Failed to resolve project root: {}", project_root.as_ref().display())
            })?;

        let db_path = project_root.join(".impactgraph").join("state.db");
        let store = FactStore::open(&db_path)
            .with_context(|| format!("Failed to open fact store: {}", db_path.display()))?;

        Ok(Self {
            project_root,
            config,
            store,
            parser: PythonParser::new(),
            oracle: None,
        })
    }

    /// Attach a predictive oracle; without one, impact queries are
    /// graph-only.
    pub fn with_oracle(mut self, oracle: Box<dyn ConsequenceOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn store(&self) -> &FactStore {
        &self.store
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Run one incremental indexing pass followed by a full graph rebuild.
    ///
    /// Idempotent: with no filesystem changes a second run re-indexes
    /// nothing and skips every scanned file.
    pub fn refresh_index(&self) -> Result<RefreshStats> {
        let started = Instant::now();

        let previous = self.store.file_metadata()?;
        let files = scanner::enumerate_files(&self.project_root, &self.config.indexing.exclude);

        let mut current: BTreeMap<String, PathBuf> = BTreeMap::new();
        for path in files {
            if let Some(rel) = scanner::relative_posix(&path, &self.project_root) {
                current.insert(rel, path);
            }
        }

        // Files that vanished from the tree take all their facts and any
        // edge touching them along.
        let mut stale: Vec<&String> =
            previous.keys().filter(|path| !current.contains_key(*path)).collect();
        stale.sort();
        let files_deleted = stale.len();
        for path in stale {
            debug!("Removing deleted file from index: {}", path);
            self.store.delete_file(path)?;
        }

        let files_scanned = current.len();
        let mut files_indexed = 0;
        let mut files_skipped = 0;
        let mut parse_errors = 0;

        for (rel, path) in &current {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read source file: {}", path.display()))?;
            let content_hash = scanner::hash_bytes(&bytes);
            let mtime = scanner::mtime_seconds(path)
                .with_context(|| format!("Failed to stat source file: {}", path.display()))?;

            if !scanner::should_reparse(previous.get(rel), &content_hash, mtime) {
                files_skipped += 1;
                continue;
            }

            let source = String::from_utf8_lossy(&bytes);
            let outcome = self.parser.parse(rel, &source);
            let indexed_at = chrono::Utc::now().timestamp();

            self.store.upsert_file(
                rel,
                &content_hash,
                mtime,
                indexed_at,
                outcome.parse_error.as_deref(),
            )?;
            self.store
                .replace_file_facts(rel, &outcome.symbols, &outcome.imports, &outcome.calls)?;

            files_indexed += 1;
            if let Some(error) = &outcome.parse_error {
                warn!("Parse failure in {}: {}", rel, error);
                parse_errors += 1;
            }
        }

        // The edge table is a derived snapshot: recomputed from the full
        // current fact set and swapped wholesale, never patched.
        let edges = graph::rebuild_edges(
            &self.project_root,
            &self.store.list_imports()?,
            &self.store.list_calls()?,
            &self.store.symbol_owners_by_name()?,
        );
        self.store.replace_edges(&edges)?;

        let counts = self.store.counts()?;
        let stats = RefreshStats {
            files_scanned,
            files_indexed,
            files_skipped,
            files_deleted,
            parse_errors,
            symbols_total: counts.symbols,
            edges_total: edges.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            "Refresh complete: {} scanned, {} indexed, {} skipped, {} deleted, {} edges in {}ms",
            stats.files_scanned,
            stats.files_indexed,
            stats.files_skipped,
            stats.files_deleted,
            stats.edges_total,
            stats.elapsed_ms
        );
        Ok(stats)
    }

    /// Answer "what else is affected if these files change?"
    pub fn impact_for_files(&self, changed_files: &[String], max_depth: usize) -> Result<ImpactReport> {
        let analyzer = ImpactAnalyzer::new(&self.store, &self.project_root);

        let oracle = if self.config.oracle.enabled {
            self.oracle.as_deref()
        } else {
            None
        };

        let mut report = analyzer.impact_for_files(changed_files, max_depth, oracle)?;
        if !self.config.oracle.enabled && self.oracle.is_some() {
            report.oracle.error = Some("disabled by config".to_string());
        }
        Ok(report)
    }

    /// Persistent index counters
    pub fn index_stats(&self) -> Result<IndexCounts> {
        Ok(self.store.counts()?)
    }

    /// Release the storage handle
    pub fn close(self) {}
}
