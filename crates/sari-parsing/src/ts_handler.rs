//! Tree-sitter-backed handler: a single data-driven walker parametrized by a
//! per-language table of which node kinds are symbols and which are
//! class-like (and therefore searched for `extends`/`implements` clauses).
//! One generic walker rather than one bespoke recursive descent per
//! language; each handler returns `(kind, name, meta, is_valid)`.

use crate::handler::{LanguageHandler, ParseOutput, RawRelation, RawSymbol};
use crate::lang::{normalize_kind, Language};
use sari_model::RelType;
use tree_sitter::{Node, Parser, Tree};

/// Node kinds that introduce a symbol, and which of those are class-like
/// (eligible for inheritance-relation extraction).
pub struct LangSpec {
    pub language: Language,
    pub ts_language: tree_sitter::Language,
    pub symbol_node_kinds: &'static [&'static str],
    pub class_like_kinds: &'static [&'static str],
    pub call_node_kind: &'static str,
    pub superclass_field: &'static str,
}

pub fn python_spec() -> LangSpec {
    LangSpec {
        language: Language::Python,
        ts_language: tree_sitter_python::language(),
        symbol_node_kinds: &["function_definition", "class_definition"],
        class_like_kinds: &["class_definition"],
        call_node_kind: "call",
        superclass_field: "superclasses",
    }
}

pub fn java_spec() -> LangSpec {
    LangSpec {
        language: Language::Java,
        ts_language: tree_sitter_java::language(),
        symbol_node_kinds: &[
            "method_declaration",
            "constructor_declaration",
            "class_declaration",
            "record_declaration",
            "interface_declaration",
            "enum_declaration",
            "field_declaration",
        ],
        class_like_kinds: &[
            "class_declaration",
            "record_declaration",
            "interface_declaration",
        ],
        call_node_kind: "method_invocation",
        superclass_field: "superclass",
    }
}

pub fn javascript_spec() -> LangSpec {
    LangSpec {
        language: Language::JavaScript,
        ts_language: tree_sitter_javascript::language(),
        symbol_node_kinds: &["function_declaration", "method_definition", "class_declaration"],
        class_like_kinds: &["class_declaration"],
        call_node_kind: "call_expression",
        superclass_field: "superclass",
    }
}

pub fn typescript_spec() -> LangSpec {
    LangSpec {
        language: Language::TypeScript,
        ts_language: tree_sitter_typescript::language_typescript(),
        symbol_node_kinds: &[
            "function_declaration",
            "method_definition",
            "class_declaration",
            "interface_declaration",
            "enum_declaration",
        ],
        class_like_kinds: &["class_declaration", "interface_declaration"],
        call_node_kind: "call_expression",
        superclass_field: "superclass",
    }
}

pub fn rust_spec() -> LangSpec {
    LangSpec {
        language: Language::Rust,
        ts_language: tree_sitter_rust::language(),
        symbol_node_kinds: &[
            "function_item",
            "struct_item",
            "enum_item",
            "trait_item",
            "impl_item",
            "mod_item",
            "const_item",
        ],
        class_like_kinds: &["struct_item", "impl_item", "trait_item"],
        call_node_kind: "call_expression",
        superclass_field: "trait",
    }
}

pub fn go_spec() -> LangSpec {
    LangSpec {
        language: Language::Go,
        ts_language: tree_sitter_go::language(),
        symbol_node_kinds: &["function_declaration", "method_declaration", "type_declaration"],
        class_like_kinds: &["type_declaration"],
        call_node_kind: "call_expression",
        superclass_field: "",
    }
}

pub struct TreeSitterHandler {
    spec: LangSpec,
}

impl TreeSitterHandler {
    pub fn new(spec: LangSpec) -> Self {
        TreeSitterHandler { spec }
    }

    fn parse_tree(&self, content: &str) -> Option<Tree> {
        let mut parser = Parser::new();
        parser.set_language(self.spec.ts_language).ok()?;
        parser.parse(content, None)
    }

    fn node_name<'a>(&self, node: Node<'a>, source: &'a str) -> Option<&'a str> {
        node.child_by_field_name("name")
            .and_then(|n| n.utf8_text(source.as_bytes()).ok())
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
        let is_symbol = self.spec.symbol_node_kinds.contains(&kind);

        let mut next_parent = parent.clone();
        let mut next_parent_path = parent_path.clone();

        if is_symbol {
            if let Some(name) = self.node_name(node, source) {
                let normalized = normalize_kind(self.spec.language, kind);
                let start = node.start_position().row as u32 + 1;
                let end = node.end_position().row as u32 + 1;
                let content = node.utf8_text(source.as_bytes()).ok().map(|s| s.to_string());

                if self.spec.class_like_kinds.contains(&kind) {
                    if let Some(super_field) = node.child_by_field_name(self.spec.superclass_field) {
                        if let Ok(text) = super_field.utf8_text(source.as_bytes()) {
                            for base in text.split(|c: char| c == ',' || c == '(' || c == ')' || c.is_whitespace()) {
                                let base = base.trim_matches([':', '&', '\'', '"'].as_ref());
                                if !base.is_empty() && base != "extends" && base != "implements" {
                                    out.relations.push(RawRelation {
                                        from_symbol: name.to_string(),
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
                    None => name.to_string(),
                };

                out.symbols.push(RawSymbol {
                    name: name.to_string(),
                    kind: normalized,
                    line: start,
                    end_line: end,
                    content,
                    parent: parent.clone(),
                    parent_path: parent_path.clone(),
                    doc: None,
                    meta: serde_json::json!({}),
                });
                next_parent = Some(name.to_string());
                next_parent_path = Some(qualified);
            }
        } else if kind == self.spec.call_node_kind {
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

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child, source, next_parent.clone(), next_parent_path.clone(), out);
        }
    }
}

impl LanguageHandler for TreeSitterHandler {
    fn parse(&self, content: &str) -> ParseOutput {
        let mut out = ParseOutput::default();
        let Some(tree) = self.parse_tree(content) else {
            return out;
        };
        self.walk(tree.root_node(), content, None, None, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sari_model::SymbolKind;

    #[test]
    fn python_handler_extracts_class_and_method() {
        let handler = TreeSitterHandler::new(python_spec());
        let src = "class Foo:\n    def bar(self):\n        return 1\n";
        let output = handler.parse(src);
        let names: Vec<&str> = output.symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"Foo"));
        assert!(names.contains(&"bar"));
        let bar = output.symbols.iter().find(|s| s.name == "bar").unwrap();
        assert_eq!(bar.parent.as_deref(), Some("Foo"));
        assert_eq!(bar.kind, SymbolKind::Function);
    }

    #[test]
    fn python_handler_extracts_base_class_relation() {
        let handler = TreeSitterHandler::new(python_spec());
        let src = "class Base:\n    pass\nclass Child(Base):\n    pass\n";
        let output = handler.parse(src);
        assert!(output
            .relations
            .iter()
            .any(|r| r.from_symbol == "Child" && r.to_symbol == "Base" && r.rel_type == RelType::Extends));
    }

    #[test]
    fn rust_handler_extracts_function() {
        let handler = TreeSitterHandler::new(rust_spec());
        let src = "fn add(a: i32, b: i32) -> i32 { a + b }\n";
        let output = handler.parse(src);
        assert_eq!(output.symbols.len(), 1);
        assert_eq!(output.symbols[0].name, "add");
    }
}
