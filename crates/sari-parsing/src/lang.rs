//! Extension-to-language mapping and cross-language kind normalization: a
//! per-extension map collapses language-specific kinds into a stable
//! cross-language vocabulary.

use sari_model::SymbolKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Java,
    JavaScript,
    TypeScript,
    Rust,
    Go,
    /// Languages handled by the regex fallback: Kotlin, C/C++, Ruby, PHP,
    /// YAML, SQL, HCL, Bash, XML, Markdown, Dockerfile, and anything else
    /// with no tree-sitter grammar wired in.
    Generic,
}

pub fn language_for_extension(ext: &str) -> Language {
    match ext.to_ascii_lowercase().as_str() {
        "py" | "pyi" => Language::Python,
        "java" => Language::Java,
        "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
        "ts" | "tsx" => Language::TypeScript,
        "rs" => Language::Rust,
        "go" => Language::Go,
        _ => Language::Generic,
    }
}

/// Collapse a raw, language-specific node/keyword name into the stable
/// cross-language `SymbolKind` vocabulary.
pub fn normalize_kind(language: Language, raw_kind: &str) -> SymbolKind {
    match (language, raw_kind) {
        (Language::Python, "function_definition") => SymbolKind::Function,
        (Language::Python, "class_definition") => SymbolKind::Class,

        (Language::Java, "method_declaration") => SymbolKind::Method,
        (Language::Java, "constructor_declaration") => SymbolKind::Method,
        (Language::Java, "class_declaration") => SymbolKind::Class,
        // Java records collapse into the same bucket as classes.
        (Language::Java, "record_declaration") => SymbolKind::Class,
        (Language::Java, "interface_declaration") => SymbolKind::Interface,
        (Language::Java, "enum_declaration") => SymbolKind::Enum,
        (Language::Java, "field_declaration") => SymbolKind::Field,

        (Language::JavaScript, "function_declaration") => SymbolKind::Function,
        (Language::JavaScript, "method_definition") => SymbolKind::Method,
        (Language::JavaScript, "class_declaration") => SymbolKind::Class,
        (Language::JavaScript, "lexical_declaration") => SymbolKind::Variable,

        (Language::TypeScript, "function_declaration") => SymbolKind::Function,
        (Language::TypeScript, "method_definition") => SymbolKind::Method,
        (Language::TypeScript, "class_declaration") => SymbolKind::Class,
        (Language::TypeScript, "interface_declaration") => SymbolKind::Interface,
        (Language::TypeScript, "enum_declaration") => SymbolKind::Enum,

        (Language::Rust, "function_item") => SymbolKind::Function,
        (Language::Rust, "struct_item") => SymbolKind::Class,
        (Language::Rust, "enum_item") => SymbolKind::Enum,
        (Language::Rust, "trait_item") => SymbolKind::Interface,
        (Language::Rust, "impl_item") => SymbolKind::Class,
        (Language::Rust, "mod_item") => SymbolKind::Module,
        (Language::Rust, "const_item") => SymbolKind::Constant,

        (Language::Go, "function_declaration") => SymbolKind::Function,
        (Language::Go, "method_declaration") => SymbolKind::Method,
        (Language::Go, "type_declaration") => SymbolKind::Class,

        _ => SymbolKind::Function,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_maps_case_insensitively() {
        assert_eq!(language_for_extension("PY"), Language::Python);
        assert_eq!(language_for_extension("tsx"), Language::TypeScript);
    }

    #[test]
    fn unknown_extension_is_generic() {
        assert_eq!(language_for_extension("kt"), Language::Generic);
        assert_eq!(language_for_extension("yaml"), Language::Generic);
    }

    #[test]
    fn java_record_collapses_to_class() {
        assert_eq!(
            normalize_kind(Language::Java, "record_declaration"),
            SymbolKind::Class
        );
    }
}
