// Python source parsing

use tree_sitter::{Node, Parser as TreeParser, Tree};

use crate::store::{RawCall, SymbolKind, SymbolRecord};

/// Everything extracted from one file. A parse failure yields empty fact
/// lists plus a non-empty `parse_error`; it is a normal outcome for the
/// caller, never an abort.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub symbols: Vec<SymbolRecord>,
    pub imports: Vec<String>,
    pub calls: Vec<RawCall>,
    pub parse_error: Option<String>,
}

impl ParseOutcome {
    fn failed(message: String) -> Self {
        Self {
            parse_error: Some(message),
            ..Default::default()
        }
    }
}

/// Python parser using tree-sitter
pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse one file's text into symbols, imports, and call references.
    ///
    /// `file_path` is the project-relative path recorded on each fact.
    pub fn parse(&self, file_path: &str, source: &str) -> ParseOutcome {
        let tree = match self.parse_tree(source) {
            Ok(tree) => tree,
            Err(message) => return ParseOutcome::failed(message),
        };

        let root = tree.root_node();
        if root.has_error() {
            let line = first_error_line(root).unwrap_or(1);
            return ParseOutcome::failed(format!("syntax error at line {}", line));
        }

        let mut outcome = ParseOutcome::default();
        self.walk(root, source, file_path, &[], &mut outcome);

        outcome.imports.sort();
        outcome.imports.dedup();
        outcome
    }

    fn parse_tree(&self, source: &str) -> Result<Tree, String> {
        let mut parser = TreeParser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| format!("failed to load Python grammar: {}", e))?;

        parser
            .parse(source, None)
            .ok_or_else(|| "parser produced no syntax tree".to_string())
    }

    fn walk(
        &self,
        node: Node,
        source: &str,
        file_path: &str,
        scope_stack: &[String],
        outcome: &mut ParseOutcome,
    ) {
        match node.kind() {
            "class_definition" => {
                if let Some(symbol) = self.extract_class(node, source, file_path, scope_stack) {
                    outcome.symbols.push(symbol);
                }
            }
            "function_definition" => {
                if let Some(symbol) = self.extract_function(node, source, file_path, scope_stack) {
                    outcome.symbols.push(symbol);
                }
            }
            "import_statement" => {
                outcome.imports.extend(self.import_targets(node, source));
            }
            "import_from_statement" => {
                self.extract_from_import(node, source, outcome);
            }
            "call" => {
                if let Some(call) = self.extract_call(node, source, file_path, scope_stack) {
                    outcome.calls.push(call);
                }
            }
            _ => {}
        }

        // Entering a definition extends a fresh scope vector for the
        // children; siblings keep seeing the enclosing scope untouched.
        let mut entered: Option<Vec<String>> = None;
        if let "class_definition" | "function_definition" = node.kind() {
            if let Some(name) = self.node_text(node.child_by_field_name("name"), source) {
                let mut next = scope_stack.to_vec();
                next.push(name);
                entered = Some(next);
            }
        }
        let child_scope = entered.as_deref().unwrap_or(scope_stack);

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child, source, file_path, child_scope, outcome);
        }
    }

    fn extract_class(
        &self,
        node: Node,
        source: &str,
        file_path: &str,
        scope_stack: &[String],
    ) -> Option<SymbolRecord> {
        let name = self.node_text(node.child_by_field_name("name"), source)?;
        let qualified_name = qualify(scope_stack, &name);

        let bases = self.node_text(node.child_by_field_name("superclasses"), source);
        let signature = match bases.as_deref() {
            Some(bases) if bases != "()" => format!("class {}{}", name, bases),
            _ => format!("class {}", name),
        };

        Some(SymbolRecord {
            file_path: file_path.to_string(),
            name,
            qualified_name,
            kind: SymbolKind::Class,
            start_line: node.start_position().row as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
            signature,
        })
    }

    fn extract_function(
        &self,
        node: Node,
        source: &str,
        file_path: &str,
        scope_stack: &[String],
    ) -> Option<SymbolRecord> {
        let name = self.node_text(node.child_by_field_name("name"), source)?;
        let qualified_name = qualify(scope_stack, &name);

        let is_async = node.child(0).is_some_and(|c| c.kind() == "async");
        let kind = if is_async {
            SymbolKind::AsyncFunction
        } else {
            SymbolKind::Function
        };

        let params = self
            .node_text(node.child_by_field_name("parameters"), source)
            .unwrap_or_else(|| "()".to_string());
        let returns = self
            .node_text(node.child_by_field_name("return_type"), source)
            .map(|r| format!(" -> {}", r))
            .unwrap_or_default();
        let prefix = if is_async { "async def" } else { "def" };
        let signature = format!("{} {}{}{}", prefix, name, params, returns);

        Some(SymbolRecord {
            file_path: file_path.to_string(),
            name,
            qualified_name,
            kind,
            start_line: node.start_position().row as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
            signature,
        })
    }

    /// Imported names of an import statement: the `dotted_name` or the
    /// target of an `aliased_import`, one entry per listed name.
    fn import_targets(&self, node: Node, source: &str) -> Vec<String> {
        let mut cursor = node.walk();
        node.children_by_field_name("name", &mut cursor)
            .filter_map(|child| {
                let target = if child.kind() == "aliased_import" {
                    child.child_by_field_name("name")
                } else {
                    Some(child)
                };
                self.node_text(target, source)
            })
            .collect()
    }

    fn extract_from_import(&self, node: Node, source: &str, outcome: &mut ParseOutcome) {
        // Relative imports contribute with their leading dots stripped;
        // `from . import x` leaves an empty module and records `x` alone.
        let module = self
            .node_text(node.child_by_field_name("module_name"), source)
            .map(|m| m.trim_start_matches('.').to_string())
            .unwrap_or_default();

        let mut cursor = node.walk();
        let wildcard = node
            .children(&mut cursor)
            .any(|child| child.kind() == "wildcard_import");
        if wildcard {
            if !module.is_empty() {
                outcome.imports.push(module);
            }
            return;
        }

        for name in self.import_targets(node, source) {
            if module.is_empty() {
                outcome.imports.push(name);
            } else {
                outcome.imports.push(format!("{}.{}", module, name));
            }
        }
    }

    fn extract_call(
        &self,
        node: Node,
        source: &str,
        file_path: &str,
        scope_stack: &[String],
    ) -> Option<RawCall> {
        let function = node.child_by_field_name("function")?;
        let callee_name = match function.kind() {
            "identifier" => self.node_text(Some(function), source)?,
            // Attribute calls keep only the final segment; binding the
            // receiver is out of scope for name-based resolution.
            "attribute" => self.node_text(function.child_by_field_name("attribute"), source)?,
            _ => return None,
        };

        let caller_qualified_name = if scope_stack.is_empty() {
            "<module>".to_string()
        } else {
            scope_stack.join(".")
        };

        Some(RawCall {
            file_path: file_path.to_string(),
            caller_qualified_name,
            callee_name,
        })
    }

    fn node_text(&self, node: Option<Node>, source: &str) -> Option<String> {
        node.map(|n| source[n.byte_range()].to_string())
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

fn qualify(scope_stack: &[String], name: &str) -> String {
    if scope_stack.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope_stack.join("."), name)
    }
}

/// Line (1-based) of the first ERROR or MISSING node under `node`
fn first_error_line(node: Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(line) = first_error_line(child) {
            return Some(line);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParseOutcome {
        PythonParser::new().parse("mod.py", source)
    }

    #[test]
    fn test_extracts_functions_and_classes() {
        let outcome = parse(
            "class Outer:\n    def method(self):\n        return 1\n\ndef top():\n    pass\n",
        );

        assert!(outcome.parse_error.is_none());
        let quals: Vec<&str> = outcome
            .symbols
            .iter()
            .map(|s| s.qualified_name.as_str())
            .collect();
        assert_eq!(quals, vec!["Outer", "Outer.method", "top"]);

        let outer = &outcome.symbols[0];
        assert_eq!(outer.kind, SymbolKind::Class);
        assert_eq!(outer.start_line, 1);

        let method = &outcome.symbols[1];
        assert_eq!(method.kind, SymbolKind::Function);
        assert_eq!(method.signature, "def method(self)");
    }

    #[test]
    fn test_async_function_kind() {
        let outcome = parse("async def fetch(url):\n    return url\n");

        assert_eq!(outcome.symbols.len(), 1);
        assert_eq!(outcome.symbols[0].kind, SymbolKind::AsyncFunction);
        assert_eq!(outcome.symbols[0].signature, "async def fetch(url)");
    }

    #[test]
    fn test_nested_function_qualified_names() {
        let outcome = parse("def outer():\n    def inner():\n        pass\n");

        let quals: Vec<&str> = outcome
            .symbols
            .iter()
            .map(|s| s.qualified_name.as_str())
            .collect();
        assert_eq!(quals, vec!["outer", "outer.inner"]);
    }

    #[test]
    fn test_import_forms() {
        let outcome = parse(
            "import os\nimport a.b\nimport x as y\nfrom pkg.sub import thing\nfrom pkg import *\nfrom . import sibling\n",
        );

        // Deduplicated and sorted
        assert_eq!(
            outcome.imports,
            vec!["a.b", "os", "pkg", "pkg.sub.thing", "sibling", "x"]
        );
    }

    #[test]
    fn test_relative_import_strips_dots() {
        let outcome = parse("from ..core import engine\n");
        assert_eq!(outcome.imports, vec!["core.engine"]);
    }

    #[test]
    fn test_calls_record_scope_and_callee() {
        let outcome = parse(
            "helper()\n\ndef run():\n    obj.flush()\n\nclass Job:\n    def work(self):\n        run()\n",
        );

        let calls: Vec<(&str, &str)> = outcome
            .calls
            .iter()
            .map(|c| (c.caller_qualified_name.as_str(), c.callee_name.as_str()))
            .collect();
        assert_eq!(
            calls,
            vec![
                ("<module>", "helper"),
                ("run", "flush"),
                ("Job.work", "run"),
            ]
        );
    }

    #[test]
    fn test_syntax_error_yields_empty_facts() {
        let outcome = parse("def broken(:\n    return 0\n");

        assert!(outcome.parse_error.is_some());
        assert!(outcome.parse_error.as_deref().unwrap().contains("syntax error"));
        assert!(outcome.symbols.is_empty());
        assert!(outcome.imports.is_empty());
        assert!(outcome.calls.is_empty());
    }

    #[test]
    fn test_class_signature_includes_bases() {
        let outcome = parse("class Child(Base, mixin.Other):\n    pass\n");

        assert_eq!(outcome.symbols[0].signature, "class Child(Base, mixin.Other)");
    }
}
