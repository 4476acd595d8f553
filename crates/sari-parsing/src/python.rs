//! Python handler: full AST traversal via tree-sitter-python, recovering
//! class/function/method symbols with qualnames, docstrings, decorator
//! metadata (including HTTP-path annotations for common web decorators),
//! and `calls` relations from in-scope `Call` nodes.

use crate::handler::{LanguageHandler, ParseOutput, RawRelation, RawSymbol};
use regex::Regex;
use sari_model::{RelType, SymbolKind};
use tree_sitter::{Node, Parser};

/// Recognized Flask/FastAPI/Django-style route decorators:
/// `@app.route("/x")`, `@app.get("/x")`, `@router.post("/x")`.
const HTTP_METHODS: &[&str] = &["get", "post", "put", "patch", "delete", "route"];

pub struct PythonHandler;

impl PythonHandler {
    fn language() -> tree_sitter::Language {
        tree_sitter_python::language()
    }

    fn docstring_of<'a>(&self, body: Node<'a>, source: &'a str) -> Option<String> {
        let mut cursor = body.walk();
        let first_stmt = body.children(&mut cursor).find(|n| n.kind() == "expression_statement")?;
        let string_node = first_stmt.child(0)?;
        if string_node.kind() != "string" {
            return None;
        }
        string_node
            .utf8_text(source.as_bytes())
            .ok()
            .map(|s| s.trim_matches(['"', '\''].as_ref()).trim().to_string())
    }

    fn api_info(&self, decorators: &[String]) -> Option<serde_json::Value> {
        let call_re = Regex::new(r#"^@?([\w.]+)\(\s*["']([^"']+)["']"#).ok()?;
        for dec in decorators {
            if let Some(caps) = call_re.captures(dec) {
                let callee = &caps[1];
                let path = &caps[2];
                let method = callee.rsplit('.').next().unwrap_or("route").to_ascii_lowercase();
                if HTTP_METHODS.contains(&method.as_str()) {
                    let http_method = if method == "route" { "GET".to_string() } else { method.to_ascii_uppercase() };
                    return Some(serde_json::json!({"http_method": http_method, "http_path": path}));
                }
            }
        }
        None
    }

    fn decorators_of(&self, decorated: Node, source: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut cursor = decorated.walk();
        for child in decorated.children(&mut cursor) {
            if child.kind() == "decorator" {
                if let Ok(text) = child.utf8_text(source.as_bytes()) {
                    out.push(text.trim().to_string());
                }
            }
        }
        out
    }

    fn walk(
        &self,
        node: Node,
        source: &str,
        parent: Option<String>,
        parent_path: Option<String>,
        out: &mut ParseOutput,
    ) {
        let kind = node.kind();

        match kind {
            "function_definition" | "class_definition" => {
                let name = node
                    .child_by_field_name("name")
                    .and_then(|n| n.utf8_text(source.as_bytes()).ok())
                    .unwrap_or("")
                    .to_string();
                if name.is_empty() {
                    return;
                }
                let symbol_kind = if kind == "class_definition" {
                    SymbolKind::Class
                } else {
                    SymbolKind::Function
                };
                let start = node.start_position().row as u32 + 1;
                let end = node.end_position().row as u32 + 1;
                let content = node.utf8_text(source.as_bytes()).ok().map(|s| s.to_string());
                let doc = node
                    .child_by_field_name("body")
                    .and_then(|body| self.docstring_of(body, source));

                let mut decorators = Vec::new();
                if let Some(parent_node) = node.parent() {
                    if parent_node.kind() == "decorated_definition" {
                        decorators = self.decorators_of(parent_node, source);
                    }
                }
                let mut meta = serde_json::json!({});
                if !decorators.is_empty() {
                    meta["decorators"] = serde_json::json!(decorators);
                }
                if let Some(api) = self.api_info(&decorators) {
                    meta["api_info"] = api;
                }

                if kind == "class_definition" {
                    if let Some(superclasses) = node.child_by_field_name("superclasses") {
                        if let Ok(text) = superclasses.utf8_text(source.as_bytes()) {
                            for base in text.trim_matches(['(', ')'].as_ref()).split(',') {
                                let base = base.trim();
                                if !base.is_empty() {
                                    out.relations.push(RawRelation {
                                        from_symbol: name.clone(),
                                        to_symbol: base.to_string(),
                                        rel_type: RelType::Extends,
                                        line: Some(start),
                                        meta: serde_json::json!({}),
                                    });
                                }
                            }
                        }
                    }
                }

                let qualified = match &parent_path {
                    Some(p) => format!("{p}.{name}"),
                    None => name.clone(),
                };

                out.symbols.push(RawSymbol {
                    name: name.clone(),
                    kind: symbol_kind,
                    line: start,
                    end_line: end,
                    content,
                    parent: parent.clone(),
                    parent_path: parent_path.clone(),
                    doc,
                    meta,
                });

                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    self.walk(child, source, Some(name.clone()), Some(qualified.clone()), out);
                }
                return;
            }
            "call" => {
                if let Some(caller) = &parent {
                    if let Some(func_node) = node.child_by_field_name("function") {
                        if let Ok(callee) = func_node.utf8_text(source.as_bytes()) {
                            out.relations.push(RawRelation {
                                from_symbol: caller.clone(),
                                to_symbol: callee.to_string(),
                                rel_type: RelType::Calls,
                                line: Some(node.start_position().row as u32 + 1),
                                meta: serde_json::json!({}),
                            });
                        }
                    }
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child, source, parent.clone(), parent_path.clone(), out);
        }
    }
}

impl LanguageHandler for PythonHandler {
    fn parse(&self, content: &str) -> ParseOutput {
        let mut out = ParseOutput::default();
        let mut parser = Parser::new();
        if parser.set_language(Self::language()).is_err() {
            return out;
        }
        let Some(tree) = parser.parse(content, None) else {
            return out;
        };
        self.walk(tree.root_node(), content, None, None, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_docstring_and_method() {
        let src = "class Foo:\n    \"\"\"A thing.\"\"\"\n    def bar(self):\n        return 1\n";
        let output = PythonHandler.parse(src);
        let foo = output.symbols.iter().find(|s| s.name == "Foo").unwrap();
        assert_eq!(foo.doc.as_deref(), Some("A thing."));
        let bar = output.symbols.iter().find(|s| s.name == "bar").unwrap();
        assert_eq!(bar.parent.as_deref(), Some("Foo"));
    }

    #[test]
    fn recognizes_flask_route_decorator() {
        let src = "@app.route(\"/health\", methods=[\"GET\"])\ndef health():\n    return \"ok\"\n";
        let output = PythonHandler.parse(src);
        let health = output.symbols.iter().find(|s| s.name == "health").unwrap();
        assert_eq!(health.meta["api_info"]["http_path"], "/health");
    }

    #[test]
    fn extracts_base_class_relation() {
        let src = "class Base:\n    pass\nclass Child(Base):\n    pass\n";
        let output = PythonHandler.parse(src);
        assert!(output
            .relations
            .iter()
            .any(|r| r.from_symbol == "Child" && r.to_symbol == "Base"));
    }

    #[test]
    fn extracts_call_relation_within_function() {
        let src = "def outer():\n    helper()\n";
        let output = PythonHandler.parse(src);
        assert!(output
            .relations
            .iter()
            .any(|r| r.from_symbol == "outer" && r.to_symbol == "helper" && r.rel_type == RelType::Calls));
    }
}
