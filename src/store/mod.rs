// Fact storage and schema

pub mod db;
pub mod schema;

use serde::{Deserialize, Serialize};

/// Metadata snapshot for one indexed file, keyed by project-relative path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMeta {
    pub content_hash: String,
    pub mtime: f64,
    pub parse_error: Option<String>,
}

/// Symbol kinds extracted from Python sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Function,
    AsyncFunction,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Function => "function",
            SymbolKind::AsyncFunction => "async_function",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "class" => Ok(SymbolKind::Class),
            "function" => Ok(SymbolKind::Function),
            "async_function" => Ok(SymbolKind::AsyncFunction),
            _ => anyhow::bail!("Unknown symbol kind: {}", s),
        }
    }
}

/// One class/function definition owned by a file.
///
/// The whole set for a file is replaced on every re-parse; rows never
/// outlive their owning `indexed_files` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub file_path: String,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub start_line: u32,
    pub end_line: u32,
    /// Rendered for display only; never consulted by graph logic.
    pub signature: String,
}

/// One module name imported by a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawImport {
    pub file_path: String,
    pub module_name: String,
}

/// One call site: unqualified callee name plus the dotted caller scope
/// (`<module>` for top-level calls).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCall {
    pub file_path: String,
    pub caller_qualified_name: String,
    pub callee_name: String,
}

/// Edge kinds in the derived file dependency graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    Import,
    Call,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Import => "import",
            EdgeType::Call => "call",
        }
    }

    /// Call edges come from name-only matching and carry lower confidence.
    pub fn weight(&self) -> f64 {
        match self {
            EdgeType::Import => 1.0,
            EdgeType::Call => 0.7,
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "import" => Ok(EdgeType::Import),
            "call" => Ok(EdgeType::Call),
            _ => anyhow::bail!("Unknown edge type: {}", s),
        }
    }
}

/// Derived file-to-file dependency edge, unique per (src, dst, type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub src_file: String,
    pub dst_file: String,
    pub edge_type: EdgeType,
    pub weight: f64,
}

/// Persistent index counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexCounts {
    pub files: usize,
    pub symbols: usize,
    pub imports: usize,
    pub calls: usize,
    pub edges: usize,
    pub parse_errors: usize,
}
