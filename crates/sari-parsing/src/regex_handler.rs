//! Regex fallback handler for languages with no tree-sitter grammar wired
//! into this stack: Kotlin, C/C++, Ruby, PHP, YAML, SQL, HCL, Bash, XML,
//! Markdown, Dockerfile, and anything else falling through to
//! `Language::Generic`. Coarse symbol recovery via line-oriented pattern
//! matching: one declarative table of `(SymbolKind, Regex)` pairs, applied
//! line by line, rather than a real parser.

use crate::handler::{LanguageHandler, ParseOutput, RawSymbol};
use once_cell::sync::Lazy;
use regex::Regex;
use sari_model::SymbolKind;

struct LinePattern {
    kind: SymbolKind,
    regex: Regex,
}

static PATTERNS: Lazy<Vec<LinePattern>> = Lazy::new(|| {
    vec![
        // Kotlin / C# / Java-ish
        LinePattern {
            kind: SymbolKind::Class,
            regex: Regex::new(r"^\s*(?:public\s+|private\s+|internal\s+|data\s+|sealed\s+|abstract\s+)*class\s+(\w+)").unwrap(),
        },
        LinePattern {
            kind: SymbolKind::Interface,
            regex: Regex::new(r"^\s*(?:public\s+|private\s+)*interface\s+(\w+)").unwrap(),
        },
        LinePattern {
            kind: SymbolKind::Function,
            regex: Regex::new(r"^\s*(?:public\s+|private\s+|internal\s+|suspend\s+|static\s+)*fun\s+(\w+)\s*\(").unwrap(),
        },
        // C / C++
        LinePattern {
            kind: SymbolKind::Function,
            regex: Regex::new(r"^[\w:<>,\*\s&]+\b(\w+)\s*\([^;{=]*\)\s*\{?\s*$").unwrap(),
        },
        // Ruby
        LinePattern {
            kind: SymbolKind::Class,
            regex: Regex::new(r"^\s*class\s+(\w+)").unwrap(),
        },
        LinePattern {
            kind: SymbolKind::Method,
            regex: Regex::new(r"^\s*def\s+(\w+)").unwrap(),
        },
        // PHP
        LinePattern {
            kind: SymbolKind::Function,
            regex: Regex::new(r"^\s*(?:public\s+|private\s+|protected\s+|static\s+)*function\s+(\w+)\s*\(").unwrap(),
        },
        // SQL
        LinePattern {
            kind: SymbolKind::Class,
            regex: Regex::new(r"(?i)^\s*create\s+table\s+(?:if\s+not\s+exists\s+)?[`\"]?(\w+)").unwrap(),
        },
        // HCL / Terraform
        LinePattern {
            kind: SymbolKind::Class,
            regex: Regex::new(r#"^\s*resource\s+"[\w.]+"\s+"(\w+)""#).unwrap(),
        },
        // Bash
        LinePattern {
            kind: SymbolKind::Function,
            regex: Regex::new(r"^\s*(?:function\s+)?(\w+)\s*\(\)\s*\{?\s*$").unwrap(),
        },
        // Dockerfile (stage names, treated as modules)
        LinePattern {
            kind: SymbolKind::Module,
            regex: Regex::new(r"(?i)^\s*FROM\s+\S+\s+AS\s+(\w+)").unwrap(),
        },
        // Markdown headings
        LinePattern {
            kind: SymbolKind::Module,
            regex: Regex::new(r"^#{1,6}\s+(.+?)\s*$").unwrap(),
        },
    ]
});

pub struct RegexHandler;

impl LanguageHandler for RegexHandler {
    fn parse(&self, content: &str) -> ParseOutput {
        let mut out = ParseOutput::default();
        for (idx, line) in content.lines().enumerate() {
            for pattern in PATTERNS.iter() {
                if let Some(caps) = pattern.regex.captures(line) {
                    let Some(name) = caps.get(1) else { continue };
                    let line_no = idx as u32 + 1;
                    out.symbols.push(RawSymbol {
                        name: name.as_str().trim().to_string(),
                        kind: pattern.kind,
                        line: line_no,
                        end_line: line_no,
                        content: Some(line.to_string()),
                        parent: None,
                        parent_path: None,
                        doc: None,
                        meta: serde_json::json!({}),
                    });
                    break;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_kotlin_class_and_function() {
        let src = "class Greeter {\n    fun hello() {\n        println(\"hi\")\n    }\n}\n";
        let output = RegexHandler.parse(src);
        let names: Vec<&str> = output.symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"Greeter"));
        assert!(names.contains(&"hello"));
    }

    #[test]
    fn recognizes_ruby_def() {
        let src = "class Widget\n  def render\n    true\n  end\nend\n";
        let output = RegexHandler.parse(src);
        assert!(output.symbols.iter().any(|s| s.name == "render" && s.kind == SymbolKind::Method));
    }

    #[test]
    fn recognizes_sql_create_table() {
        let src = "CREATE TABLE IF NOT EXISTS users (\n  id INTEGER PRIMARY KEY\n);\n";
        let output = RegexHandler.parse(src);
        assert!(output.symbols.iter().any(|s| s.name == "users"));
    }

    #[test]
    fn unmatched_lines_produce_no_symbols() {
        let src = "just some plain text\nwith no recognizable structure\n";
        let output = RegexHandler.parse(src);
        assert!(output.symbols.is_empty());
    }
}
