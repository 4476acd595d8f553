//! Per-file classification table: decides whether a file is dropped,
//! recorded as a metadata-only row, sampled, or fully parsed, based on size
//! limits, binary/minified detection, and include/exclude patterns.

use globset::GlobSet;
use sari_model::{AstStatus, ParseStatus, Reason};
use sari_model::config::{SizeProfile, Utf8DecodePolicy};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

const SAMPLE_BYTES: usize = 8192;
const MINIFIED_AVG_LINE_LEN: usize = 300;

#[derive(Debug, Clone, Copy)]
pub struct SizeLimits {
    pub max_file_bytes: u64,
    pub parse_limit: u64,
    pub ast_limit: u64,
}

/// `max_file_bytes` is a hard outer cap, not independently configurable;
/// it scales with the size profile the way `parse_limit`/`ast_limit` do.
pub fn size_limits_for(profile: SizeProfile, max_parse_bytes: u64, max_ast_bytes: u64) -> SizeLimits {
    let max_file_bytes = match profile {
        SizeProfile::Default => 100 * 1024 * 1024,
        SizeProfile::Heavy => 250 * 1024 * 1024,
    };
    SizeLimits {
        max_file_bytes,
        parse_limit: max_parse_bytes,
        ast_limit: max_ast_bytes,
    }
}

pub fn sample_head_tail(path: &Path, size: u64) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut head = vec![0u8; SAMPLE_BYTES.min(size as usize)];
    file.read_exact(&mut head)?;
    if size as usize <= SAMPLE_BYTES {
        return Ok(head);
    }
    let tail_start = size.saturating_sub(SAMPLE_BYTES as u64);
    file.seek(SeekFrom::Start(tail_start))?;
    let mut tail = vec![0u8; SAMPLE_BYTES];
    file.read_exact(&mut tail)?;
    head.extend_from_slice(&tail);
    Ok(head)
}

pub fn printable_ratio(sample: &[u8], policy: Utf8DecodePolicy) -> f64 {
    if sample.is_empty() {
        return 1.0;
    }
    if sample.contains(&0u8) {
        return 0.0;
    }
    let text = match policy {
        Utf8DecodePolicy::Strict => match std::str::from_utf8(sample) {
            Ok(t) => t.to_string(),
            Err(_) => return 0.0,
        },
        Utf8DecodePolicy::Lossy => String::from_utf8_lossy(sample).into_owned(),
    };
    let total = text.chars().count().max(1);
    let printable = text
        .chars()
        .filter(|c| matches!(c, '\t' | '\n' | '\r') || !c.is_control())
        .count();
    printable as f64 / total as f64
}

pub fn is_minified(sample_text: &str) -> bool {
    let lines: Vec<&str> = sample_text.lines().collect();
    if lines.is_empty() {
        return false;
    }
    let total_len: usize = lines.iter().map(|l| l.len()).sum();
    (total_len / lines.len().max(1)) > MINIFIED_AVG_LINE_LEN
}

fn decode(bytes: &[u8], policy: Utf8DecodePolicy) -> Option<String> {
    match policy {
        Utf8DecodePolicy::Strict => std::str::from_utf8(bytes).ok().map(|s| s.to_string()),
        Utf8DecodePolicy::Lossy => Some(String::from_utf8_lossy(bytes).into_owned()),
    }
}

#[derive(Debug, Clone)]
pub struct ClassifyResult {
    pub parse_status: ParseStatus,
    pub parse_reason: Reason,
    pub ast_status: AstStatus,
    pub ast_reason: Reason,
    pub is_binary: bool,
    pub is_minified: bool,
    pub sampled: bool,
    /// `None` for metadata-only rows (excluded, too-large, binary, minified,
    /// empty-after-decode); `Some` otherwise, truncated to the sample for
    /// `sampled` rows.
    pub content: Option<String>,
}

fn metadata_only(reason: Reason, is_binary: bool, is_minified: bool) -> ClassifyResult {
    ClassifyResult {
        parse_status: ParseStatus::Skipped,
        parse_reason: reason,
        ast_status: AstStatus::None,
        ast_reason: Reason::None,
        is_binary,
        is_minified,
        sampled: false,
        content: None,
    }
}

#[allow(clippy::too_many_arguments)]
pub fn classify_file(
    path: &Path,
    rel_path: &str,
    size: u64,
    include: Option<&GlobSet>,
    exclude: Option<&GlobSet>,
    limits: SizeLimits,
    decode_policy: Utf8DecodePolicy,
    sampling_enabled: bool,
) -> std::io::Result<Option<ClassifyResult>> {
    if let Some(include) = include {
        if !include.is_match(rel_path) {
            return Ok(None);
        }
    }
    if let Some(exclude) = exclude {
        if exclude.is_match(rel_path) {
            return Ok(Some(metadata_only(Reason::Excluded, false, false)));
        }
    }
    if size > limits.max_file_bytes {
        return Ok(Some(metadata_only(Reason::TooLarge, false, false)));
    }

    let sample = sample_head_tail(path, size)?;
    let ratio = printable_ratio(&sample, decode_policy);
    if sample.contains(&0u8) || ratio < 0.8 {
        return Ok(Some(metadata_only(Reason::Binary, true, false)));
    }
    let sample_text = decode(&sample, decode_policy).unwrap_or_default();
    let name_suggests_minified = rel_path.contains(".min.");
    if name_suggests_minified || is_minified(&sample_text) {
        return Ok(Some(metadata_only(Reason::Minified, false, true)));
    }

    if size > limits.parse_limit {
        if !sampling_enabled {
            return Ok(Some(metadata_only(Reason::TooLarge, false, false)));
        }
        return Ok(Some(ClassifyResult {
            parse_status: ParseStatus::Skipped,
            parse_reason: Reason::Sampled,
            ast_status: AstStatus::None,
            ast_reason: Reason::None,
            is_binary: false,
            is_minified: false,
            sampled: true,
            content: Some(sample_text),
        }));
    }

    let full_bytes = std::fs::read(path)?;
    let content = decode(&full_bytes, decode_policy).unwrap_or_default();
    if content.trim().is_empty() {
        return Ok(Some(metadata_only(Reason::NoParse, false, false)));
    }

    let ast_status = if size > limits.ast_limit {
        AstStatus::Skipped
    } else {
        AstStatus::Ok
    };
    let ast_reason = if size > limits.ast_limit { Reason::TooLarge } else { Reason::None };

    Ok(Some(ClassifyResult {
        parse_status: ParseStatus::Ok,
        parse_reason: Reason::None,
        ast_status,
        ast_reason,
        is_binary: false,
        is_minified: false,
        sampled: false,
        content: Some(content),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use std::io::Write;

    fn limits() -> SizeLimits {
        size_limits_for(SizeProfile::Default, 2 * 1024 * 1024, 1024 * 1024)
    }

    #[test]
    fn small_text_file_is_parsed() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "fn main() {{}}").unwrap();
        let size = std::fs::metadata(file.path()).unwrap().len();
        let result = classify_file(
            file.path(),
            "main.rs",
            size,
            None,
            None,
            limits(),
            Utf8DecodePolicy::Lossy,
            true,
        )
        .unwrap()
        .unwrap();
        assert_eq!(result.parse_status, ParseStatus::Ok);
        assert_eq!(result.content.as_deref(), Some("fn main() {}"));
    }

    #[test]
    fn binary_content_is_flagged() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0u8, 1, 2, 3, 4]).unwrap();
        let size = std::fs::metadata(file.path()).unwrap().len();
        let result = classify_file(
            file.path(),
            "blob.bin",
            size,
            None,
            None,
            limits(),
            Utf8DecodePolicy::Lossy,
            true,
        )
        .unwrap()
        .unwrap();
        assert!(result.is_binary);
        assert_eq!(result.parse_reason, Reason::Binary);
    }

    #[test]
    fn empty_file_is_no_parse() {
        let file = NamedTempFile::new().unwrap();
        let result = classify_file(
            file.path(),
            "empty.txt",
            0,
            None,
            None,
            limits(),
            Utf8DecodePolicy::Lossy,
            true,
        )
        .unwrap()
        .unwrap();
        assert_eq!(result.parse_reason, Reason::NoParse);
    }

    #[test]
    fn excluded_path_produces_metadata_only_row() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "secret").unwrap();
        let size = std::fs::metadata(file.path()).unwrap().len();
        let mut builder = globset::GlobSetBuilder::new();
        builder.add(globset::Glob::new("*.secret").unwrap());
        let exclude = builder.build().unwrap();
        let result = classify_file(
            file.path(),
            "x.secret",
            size,
            None,
            Some(&exclude),
            limits(),
            Utf8DecodePolicy::Lossy,
            true,
        )
        .unwrap()
        .unwrap();
        assert_eq!(result.parse_reason, Reason::Excluded);
        assert!(result.content.is_none());
    }

    #[test]
    fn not_in_include_set_is_dropped() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "x").unwrap();
        let size = std::fs::metadata(file.path()).unwrap().len();
        let mut builder = globset::GlobSetBuilder::new();
        builder.add(globset::Glob::new("*.rs").unwrap());
        let include = builder.build().unwrap();
        let result = classify_file(
            file.path(),
            "notes.txt",
            size,
            Some(&include),
            None,
            limits(),
            Utf8DecodePolicy::Lossy,
            true,
        )
        .unwrap();
        assert!(result.is_none());
    }
}
