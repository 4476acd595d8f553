//! Handler contract: each handler returns `(kind, name, meta, is_valid)` for
//! symbol nodes and an optional API-info extractor for framework-aware
//! metadata. Handlers for class-like constructs extract inheritance into
//! relations.

use sari_model::{RelType, Relation, Symbol, SymbolKind};

/// One symbol recovered from a parse, before `symbol_id`/`qualname` are
/// finalized by the registry (which needs the full file's symbol tree to
/// build qualnames and sort order).
#[derive(Debug, Clone)]
pub struct RawSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub line: u32,
    pub end_line: u32,
    pub content: Option<String>,
    /// Immediate enclosing symbol's bare name, for display/storage.
    pub parent: Option<String>,
    /// Immediate enclosing symbol's full dotted qualname, tracked by the
    /// handler during its own tree walk. Unambiguous even when a nested
    /// symbol reuses an ancestor's name, unlike reconstructing the chain
    /// from `parent` alone after the fact.
    pub parent_path: Option<String>,
    pub doc: Option<String>,
    pub meta: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct RawRelation {
    pub from_symbol: String,
    pub to_symbol: String,
    pub rel_type: RelType,
    pub line: Option<u32>,
    pub meta: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub symbols: Vec<RawSymbol>,
    pub relations: Vec<RawRelation>,
}

pub trait LanguageHandler: Send + Sync {
    fn parse(&self, content: &str) -> ParseOutput;
}

/// Finalize a handler's raw output into persistable `Symbol`/`Relation`
/// rows: compute qualnames, deterministic `symbol_id`s, and sort by
/// `(start_line, class-before-member, name)`.
///
/// Qualnames are built from `raw.parent_path`, the full dotted chain each
/// handler tracks during its own tree walk, not by re-matching `raw.parent`
/// names against siblings after the fact — a nested symbol reusing an
/// ancestor's bare name would otherwise collide with it.
pub fn finalize(db_path: &str, root_id: &str, output: ParseOutput) -> (Vec<Symbol>, Vec<Relation>) {
    let mut symbols: Vec<Symbol> = Vec::with_capacity(output.symbols.len());

    for raw in &output.symbols {
        let qualname = match &raw.parent_path {
            Some(parent_path) => format!("{parent_path}.{}", raw.name),
            None => raw.name.clone(),
        };

        let symbol_id = sari_model::compute_symbol_id(db_path, raw.kind, &qualname);
        symbols.push(Symbol {
            symbol_id,
            db_path: db_path.to_string(),
            root_id: root_id.to_string(),
            name: raw.name.clone(),
            kind: raw.kind,
            line: raw.line,
            end_line: raw.end_line,
            content: raw.content.clone(),
            parent: raw.parent.clone(),
            qualname,
            meta: raw.meta.clone(),
            doc: raw.doc.clone(),
            importance_score: 0.0,
        });
    }

    symbols.sort_by(|a, b| {
        a.line
            .cmp(&b.line)
            .then_with(|| class_rank(a.kind).cmp(&class_rank(b.kind)))
            .then_with(|| a.name.cmp(&b.name))
    });

    let relations = output
        .relations
        .into_iter()
        .map(|r| Relation {
            from_path: db_path.to_string(),
            from_root_id: root_id.to_string(),
            from_symbol: r.from_symbol.clone(),
            from_symbol_id: None,
            to_path: db_path.to_string(),
            to_root_id: root_id.to_string(),
            to_symbol: r.to_symbol.clone(),
            to_symbol_id: None,
            rel_type: r.rel_type,
            line: r.line,
            meta: r.meta,
        })
        .collect();

    (symbols, relations)
}

/// Classes sort before their members at the same line.
fn class_rank(kind: SymbolKind) -> u8 {
    match kind {
        SymbolKind::Class | SymbolKind::Interface | SymbolKind::Enum | SymbolKind::Module => 0,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_builds_dotted_qualname_for_methods() {
        let output = ParseOutput {
            symbols: vec![
                RawSymbol {
                    name: "Foo".into(),
                    kind: SymbolKind::Class,
                    line: 1,
                    end_line: 10,
                    content: None,
                    parent: None,
                    parent_path: None,
                    doc: None,
                    meta: serde_json::json!({}),
                },
                RawSymbol {
                    name: "bar".into(),
                    kind: SymbolKind::Method,
                    line: 2,
                    end_line: 3,
                    content: None,
                    parent: Some("Foo".into()),
                    parent_path: Some("Foo".into()),
                    doc: None,
                    meta: serde_json::json!({}),
                },
            ],
            relations: vec![],
        };
        let (symbols, _) = finalize("r1/a.py", "r1", output);
        let method = symbols.iter().find(|s| s.name == "bar").unwrap();
        assert_eq!(method.qualname, "Foo.bar");
    }

    #[test]
    fn finalize_orders_class_before_member_at_same_line() {
        let output = ParseOutput {
            symbols: vec![
                RawSymbol {
                    name: "bar".into(),
                    kind: SymbolKind::Method,
                    line: 1,
                    end_line: 1,
                    content: None,
                    parent: None,
                    parent_path: None,
                    doc: None,
                    meta: serde_json::json!({}),
                },
                RawSymbol {
                    name: "Foo".into(),
                    kind: SymbolKind::Class,
                    line: 1,
                    end_line: 1,
                    content: None,
                    parent: None,
                    parent_path: None,
                    doc: None,
                    meta: serde_json::json!({}),
                },
            ],
            relations: vec![],
        };
        let (symbols, _) = finalize("r1/a.py", "r1", output);
        assert_eq!(symbols[0].name, "Foo");
        assert_eq!(symbols[1].name, "bar");
    }

    /// A nested class reuses its enclosing module-level symbol's own name
    /// ("Foo" contains a nested "Foo"), followed by a later sibling at the
    /// outer scope. The inner "Foo" must not clobber the outer one's
    /// qualname for the later sibling to resolve against.
    #[test]
    fn finalize_handles_nested_name_reuse_without_clobbering_sibling_qualname() {
        let output = ParseOutput {
            symbols: vec![
                RawSymbol {
                    name: "Foo".into(),
                    kind: SymbolKind::Class,
                    line: 1,
                    end_line: 20,
                    content: None,
                    parent: None,
                    parent_path: None,
                    doc: None,
                    meta: serde_json::json!({}),
                },
                RawSymbol {
                    name: "Foo".into(),
                    kind: SymbolKind::Class,
                    line: 2,
                    end_line: 5,
                    content: None,
                    parent: Some("Foo".into()),
                    parent_path: Some("Foo".into()),
                    doc: None,
                    meta: serde_json::json!({}),
                },
                RawSymbol {
                    name: "inner_method".into(),
                    kind: SymbolKind::Method,
                    line: 3,
                    end_line: 4,
                    content: None,
                    parent: Some("Foo".into()),
                    parent_path: Some("Foo.Foo".into()),
                    doc: None,
                    meta: serde_json::json!({}),
                },
                RawSymbol {
                    name: "sibling".into(),
                    kind: SymbolKind::Method,
                    line: 10,
                    end_line: 11,
                    content: None,
                    parent: Some("Foo".into()),
                    parent_path: Some("Foo".into()),
                    doc: None,
                    meta: serde_json::json!({}),
                },
            ],
            relations: vec![],
        };
        let (symbols, _) = finalize("r1/a.py", "r1", output);
        let inner_method = symbols.iter().find(|s| s.name == "inner_method").unwrap();
        assert_eq!(inner_method.qualname, "Foo.Foo.inner_method");
        let sibling = symbols.iter().find(|s| s.name == "sibling").unwrap();
        assert_eq!(sibling.qualname, "Foo.sibling");
    }
}
