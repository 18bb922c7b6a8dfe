use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::schema::init_schema;
use super::{EdgeType, FileMeta, GraphEdge, IndexCounts, RawCall, RawImport, SymbolKind, SymbolRecord};

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Storage failures are their own taxonomy class: fatal to the current
/// operation, but committed transactions stay intact.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Transactional store for indexed-file metadata, per-file facts, and the
/// derived edge set. Every mutating operation is a single transaction.
#[derive(Clone)]
pub struct FactStore {
    pool: ConnectionPool,
    db_path: PathBuf,
}

impl FactStore {
    /// Create or open a store at the given database path
    pub fn open(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        debug!("Opening fact store at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(&db_path).with_init(|conn| {
            conn.query_row("PRAGMA journal_mode=WAL", [], |_row| Ok(()))?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(4).build(manager)?;

        {
            let conn = pool.get()?;
            init_schema(&conn)?;
        }

        Ok(Self { pool, db_path })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> StoreResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Snapshot of indexed-file metadata keyed by path, for skip decisions
    pub fn file_metadata(&self) -> StoreResult<HashMap<String, FileMeta>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_path, content_hash, mtime, parse_error FROM indexed_files",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                FileMeta {
                    content_hash: row.get(1)?,
                    mtime: row.get(2)?,
                    parse_error: row.get(3)?,
                },
            ))
        })?;

        let mut out = HashMap::new();
        for row in rows {
            let (path, meta) = row?;
            out.insert(path, meta);
        }
        Ok(out)
    }

    /// Insert or update one file's metadata, keyed by path
    pub fn upsert_file(
        &self,
        file_path: &str,
        content_hash: &str,
        mtime: f64,
        indexed_at: i64,
        parse_error: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO indexed_files (file_path, content_hash, mtime, indexed_at, parse_error)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(file_path) DO UPDATE SET
                 content_hash = excluded.content_hash,
                 mtime = excluded.mtime,
                 indexed_at = excluded.indexed_at,
                 parse_error = excluded.parse_error",
            params![file_path, content_hash, mtime, indexed_at, parse_error],
        )?;
        Ok(())
    }

    /// Atomically replace all symbols/imports/calls for one file
    pub fn replace_file_facts(
        &self,
        file_path: &str,
        symbols: &[SymbolRecord],
        imports: &[String],
        calls: &[RawCall],
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM symbols WHERE file_path = ?1", [file_path])?;
        tx.execute("DELETE FROM imports WHERE file_path = ?1", [file_path])?;
        tx.execute("DELETE FROM calls WHERE file_path = ?1", [file_path])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO symbols
                     (file_path, symbol_name, qualified_name, kind, start_line, end_line, signature)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for symbol in symbols {
                stmt.execute(params![
                    file_path,
                    symbol.name,
                    symbol.qualified_name,
                    symbol.kind.as_str(),
                    symbol.start_line,
                    symbol.end_line,
                    symbol.signature,
                ])?;
            }

            let mut stmt =
                tx.prepare("INSERT INTO imports (file_path, module_name) VALUES (?1, ?2)")?;
            for module in imports {
                stmt.execute(params![file_path, module])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO calls (file_path, caller_qualified_name, callee_name)
                 VALUES (?1, ?2, ?3)",
            )?;
            for call in calls {
                stmt.execute(params![file_path, call.caller_qualified_name, call.callee_name])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Remove one file plus its facts and any edge touching it
    pub fn delete_file(&self, file_path: &str) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM indexed_files WHERE file_path = ?1", [file_path])?;
        tx.execute("DELETE FROM symbols WHERE file_path = ?1", [file_path])?;
        tx.execute("DELETE FROM imports WHERE file_path = ?1", [file_path])?;
        tx.execute("DELETE FROM calls WHERE file_path = ?1", [file_path])?;
        tx.execute(
            "DELETE FROM edges WHERE src_file = ?1 OR dst_file = ?1",
            [file_path],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Atomically replace the complete edge set (full swap, never a merge)
    pub fn replace_edges(&self, edges: &[GraphEdge]) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM edges", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO edges (src_file, dst_file, edge_type, weight)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for edge in edges {
                stmt.execute(params![
                    edge.src_file,
                    edge.dst_file,
                    edge.edge_type.as_str(),
                    edge.weight,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn list_imports(&self) -> StoreResult<Vec<RawImport>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT file_path, module_name FROM imports")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RawImport {
                    file_path: row.get(0)?,
                    module_name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_calls(&self) -> StoreResult<Vec<RawCall>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT file_path, caller_qualified_name, callee_name FROM calls")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RawCall {
                    file_path: row.get(0)?,
                    caller_qualified_name: row.get(1)?,
                    callee_name: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_symbols(&self) -> StoreResult<Vec<SymbolRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_path, symbol_name, qualified_name, kind, start_line, end_line, signature
             FROM symbols",
        )?;
        let rows = stmt
            .query_map([], row_to_symbol)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Map each symbol name to the set of files defining it
    pub fn symbol_owners_by_name(&self) -> StoreResult<HashMap<String, BTreeSet<String>>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT symbol_name, file_path FROM symbols")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out: HashMap<String, BTreeSet<String>> = HashMap::new();
        for row in rows {
            let (name, path) = row?;
            out.entry(name).or_default().insert(path);
        }
        Ok(out)
    }

    pub fn list_edges(&self) -> StoreResult<Vec<GraphEdge>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT src_file, dst_file, edge_type, weight FROM edges")?;
        let rows = stmt
            .query_map([], row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Persistent record counts across all five tables
    pub fn counts(&self) -> StoreResult<IndexCounts> {
        let conn = self.conn()?;
        let count = |sql: &str| -> rusqlite::Result<usize> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0)).map(|n| n as usize)
        };

        Ok(IndexCounts {
            files: count("SELECT COUNT(*) FROM indexed_files")?,
            symbols: count("SELECT COUNT(*) FROM symbols")?,
            imports: count("SELECT COUNT(*) FROM imports")?,
            calls: count("SELECT COUNT(*) FROM calls")?,
            edges: count("SELECT COUNT(*) FROM edges")?,
            parse_errors: count(
                "SELECT COUNT(*) FROM indexed_files WHERE parse_error IS NOT NULL",
            )?,
        })
    }
}

fn row_to_symbol(row: &Row) -> rusqlite::Result<SymbolRecord> {
    let kind_str: String = row.get(3)?;
    let kind = SymbolKind::parse(&kind_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(SymbolRecord {
        file_path: row.get(0)?,
        name: row.get(1)?,
        qualified_name: row.get(2)?,
        kind,
        start_line: row.get::<_, i64>(4)? as u32,
        end_line: row.get::<_, i64>(5)? as u32,
        signature: row.get(6)?,
    })
}

fn row_to_edge(row: &Row) -> rusqlite::Result<GraphEdge> {
    let type_str: String = row.get(2)?;
    let edge_type = EdgeType::parse(&type_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(GraphEdge {
        src_file: row.get(0)?,
        dst_file: row.get(1)?,
        edge_type,
        weight: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_symbol(name: &str) -> SymbolRecord {
        SymbolRecord {
            file_path: "pkg/mod.py".to_string(),
            name: name.to_string(),
            qualified_name: name.to_string(),
            kind: SymbolKind::Function,
            start_line: 1,
            end_line: 2,
            signature: format!("def {}()", name),
        }
    }

    #[test]
    fn test_open_creates_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("state.db");

        let _store = FactStore::open(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_upsert_and_metadata_snapshot() {
        let dir = tempdir().unwrap();
        let store = FactStore::open(dir.path().join("state.db")).unwrap();

        store.upsert_file("a.py", "hash-1", 10.5, 1_700_000_000, None).unwrap();
        store.upsert_file("a.py", "hash-2", 11.5, 1_700_000_100, Some("boom")).unwrap();

        let meta = store.file_metadata().unwrap();
        assert_eq!(meta.len(), 1);
        let a = &meta["a.py"];
        assert_eq!(a.content_hash, "hash-2");
        assert_eq!(a.mtime, 11.5);
        assert_eq!(a.parse_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_replace_file_facts_is_a_full_swap() {
        let dir = tempdir().unwrap();
        let store = FactStore::open(dir.path().join("state.db")).unwrap();
        store.upsert_file("pkg/mod.py", "h", 1.0, 0, None).unwrap();

        let call = RawCall {
            file_path: "pkg/mod.py".to_string(),
            caller_qualified_name: "<module>".to_string(),
            callee_name: "foo".to_string(),
        };
        store
            .replace_file_facts(
                "pkg/mod.py",
                &[sample_symbol("foo"), sample_symbol("bar")],
                &["os".to_string(), "pkg.util".to_string()],
                &[call],
            )
            .unwrap();

        // Second replace wipes the first set entirely
        store
            .replace_file_facts("pkg/mod.py", &[sample_symbol("baz")], &[], &[])
            .unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts.symbols, 1);
        assert_eq!(counts.imports, 0);
        assert_eq!(counts.calls, 0);

        let symbols = store.list_symbols().unwrap();
        assert_eq!(symbols[0].name, "baz");
    }

    #[test]
    fn test_delete_file_removes_facts_and_edges() {
        let dir = tempdir().unwrap();
        let store = FactStore::open(dir.path().join("state.db")).unwrap();

        store.upsert_file("a.py", "h1", 1.0, 0, None).unwrap();
        store.upsert_file("b.py", "h2", 1.0, 0, None).unwrap();
        store
            .replace_file_facts("a.py", &[sample_symbol("f")], &["b".to_string()], &[])
            .unwrap();
        store
            .replace_edges(&[
                GraphEdge {
                    src_file: "a.py".to_string(),
                    dst_file: "b.py".to_string(),
                    edge_type: EdgeType::Import,
                    weight: 1.0,
                },
                GraphEdge {
                    src_file: "b.py".to_string(),
                    dst_file: "a.py".to_string(),
                    edge_type: EdgeType::Call,
                    weight: 0.7,
                },
            ])
            .unwrap();

        store.delete_file("a.py").unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts.files, 1);
        assert_eq!(counts.symbols, 0);
        assert_eq!(counts.imports, 0);
        // Both directions referencing the deleted file are gone
        assert_eq!(counts.edges, 0);
    }

    #[test]
    fn test_replace_edges_discards_previous_set() {
        let dir = tempdir().unwrap();
        let store = FactStore::open(dir.path().join("state.db")).unwrap();

        let edge = |src: &str, dst: &str| GraphEdge {
            src_file: src.to_string(),
            dst_file: dst.to_string(),
            edge_type: EdgeType::Import,
            weight: 1.0,
        };

        store.replace_edges(&[edge("a.py", "b.py"), edge("b.py", "c.py")]).unwrap();
        store.replace_edges(&[edge("c.py", "a.py")]).unwrap();

        let edges = store.list_edges().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].src_file, "c.py");
        assert_eq!(edges[0].dst_file, "a.py");
    }

    #[test]
    fn test_symbol_owners_by_name() {
        let dir = tempdir().unwrap();
        let store = FactStore::open(dir.path().join("state.db")).unwrap();

        let mut foo_in_b = sample_symbol("foo");
        foo_in_b.file_path = "b.py".to_string();
        store.upsert_file("a.py", "h", 1.0, 0, None).unwrap();
        store.upsert_file("b.py", "h", 1.0, 0, None).unwrap();
        store.replace_file_facts("a.py", &[sample_symbol("foo")], &[], &[]).unwrap();
        store.replace_file_facts("b.py", &[foo_in_b], &[], &[]).unwrap();

        let owners = store.symbol_owners_by_name().unwrap();
        let files = owners.get("foo").unwrap();
        assert!(files.contains("a.py"));
        assert!(files.contains("b.py"));
    }

    #[test]
    fn test_counts_tracks_parse_errors() {
        let dir = tempdir().unwrap();
        let store = FactStore::open(dir.path().join("state.db")).unwrap();

        store.upsert_file("good.py", "h1", 1.0, 0, None).unwrap();
        store.upsert_file("bad.py", "h2", 1.0, 0, Some("syntax error at line 1")).unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts.files, 2);
        assert_eq!(counts.parse_errors, 1);
    }
}
