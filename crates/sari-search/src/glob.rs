//! Glob-to-SQL-LIKE translation for path-pattern and exclude-pattern
//! filters, and wildcard escaping for free-text substring queries.

/// Translate a shell-style glob (`*`, `?`) into a SQL `LIKE` pattern using
/// `\` as the escape character, escaping any literal `%`, `_`, or `\` first.
pub fn glob_to_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '%' => out.push_str("\\%"),
            '_' => out.push_str("\\_"),
            '*' => out.push('%'),
            '?' => out.push('_'),
            other => out.push(other),
        }
    }
    out
}

/// Escape a free-text query for safe use inside a `LIKE ... ESCAPE '\'`
/// clause, without interpreting `*`/`?` as wildcards.
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '%' => out.push_str("\\%"),
            '_' => out.push_str("\\_"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_star_becomes_percent() {
        assert_eq!(glob_to_like("src/*.rs"), "src/%.rs");
    }

    #[test]
    fn glob_question_mark_becomes_underscore() {
        assert_eq!(glob_to_like("a?.txt"), "a_.txt");
    }

    #[test]
    fn literal_percent_is_escaped() {
        assert_eq!(glob_to_like("100%done"), "100\\%done");
    }

    #[test]
    fn escape_like_preserves_wildcards_as_literals() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
    }
}
