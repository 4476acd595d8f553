//! SQLite keyword-search backend (the always-available mode): a dynamic
//! `WHERE` clause built from the filter set (repo, root_ids, file_types,
//! path_pattern, exclude_patterns), importance-ranked via a left-joined
//! `MAX(symbols.importance_score)` per path, snippet extraction around the
//! first case-insensitive match, and an optional exact `COUNT(*)` total.

use crate::error::Result;
use crate::glob::{escape_like, glob_to_like};
use crate::types::{SearchHit, SearchOptions, SearchResult, TotalMode};
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;

const SNIPPET_RADIUS: usize = 120;

struct WhereClause {
    sql: String,
    params: Vec<SqlValue>,
}

fn build_where(opts: &SearchOptions) -> WhereClause {
    let mut conditions = vec!["f.deleted_ts = 0".to_string()];
    let mut params: Vec<SqlValue> = Vec::new();

    let like_query = format!("%{}%", escape_like(&opts.query));
    conditions.push("(f.path LIKE ?1 ESCAPE '\\' OR f.rel_path LIKE ?1 ESCAPE '\\' OR f.fts_content LIKE ?1 ESCAPE '\\')".to_string());
    params.push(SqlValue::Text(like_query));

    if let Some(repo) = &opts.repo {
        conditions.push(format!("f.repo = ?{}", params.len() + 1));
        params.push(SqlValue::Text(repo.clone()));
    }

    if !opts.root_ids.is_empty() {
        let mut placeholders = Vec::with_capacity(opts.root_ids.len());
        for root_id in &opts.root_ids {
            params.push(SqlValue::Text(root_id.clone()));
            placeholders.push(format!("?{}", params.len()));
        }
        conditions.push(format!("f.root_id IN ({})", placeholders.join(",")));
    }

    if !opts.file_types.is_empty() {
        let mut type_clauses = Vec::new();
        for file_type in &opts.file_types {
            type_clauses.push(format!("LOWER(f.path) LIKE ?{}", params.len() + 1));
            params.push(SqlValue::Text(format!("%.{}", file_type.to_ascii_lowercase())));
        }
        conditions.push(format!("({})", type_clauses.join(" OR ")));
    }

    if let Some(pattern) = &opts.path_pattern {
        if !pattern.is_empty() {
            let like = glob_to_like(pattern);
            let idx1 = params.len() + 1;
            params.push(SqlValue::Text(like.clone()));
            let idx2 = params.len() + 1;
            params.push(SqlValue::Text(like.clone()));
            let idx3 = params.len() + 1;
            params.push(SqlValue::Text(like));
            conditions.push(format!(
                "(f.rel_path LIKE ?{idx1} ESCAPE '\\' OR f.path LIKE ?{idx2} ESCAPE '\\' OR \
                 (CASE WHEN instr(f.rel_path, '/') > 0 \
                  THEN substr(f.rel_path, instr(f.rel_path, '/') + 1) \
                  ELSE f.rel_path END) LIKE ?{idx3} ESCAPE '\\')"
            ));
        }
    }

    for pattern in &opts.exclude_patterns {
        let excluded = glob_to_like(pattern);
        let idx1 = params.len() + 1;
        params.push(SqlValue::Text(excluded.clone()));
        let idx2 = params.len() + 1;
        params.push(SqlValue::Text(excluded));
        conditions.push(format!(
            "f.rel_path NOT LIKE ?{idx1} ESCAPE '\\' AND f.path NOT LIKE ?{idx2} ESCAPE '\\'"
        ));
    }

    WhereClause {
        sql: conditions.join(" AND "),
        params,
    }
}

fn extract_snippet(fts_content: &str, query: &str) -> (String, u32) {
    if fts_content.is_empty() || query.is_empty() {
        return (String::new(), 0);
    }
    let lower = fts_content.to_lowercase();
    let q_lower = query.to_lowercase();
    let match_count = lower.matches(&q_lower).count() as u32;
    let Some(byte_idx) = lower.find(&q_lower) else {
        return (String::new(), match_count);
    };
    let start = byte_idx.saturating_sub(SNIPPET_RADIUS);
    let end = (byte_idx + q_lower.len() + SNIPPET_RADIUS).min(fts_content.len());
    let start = floor_char_boundary(fts_content, start);
    let end = floor_char_boundary(fts_content, end);
    (fts_content[start..end].to_string(), match_count)
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

pub fn search(conn: &Connection, opts: &SearchOptions) -> Result<SearchResult> {
    let query = opts.query.trim();
    if query.is_empty() {
        return Ok(SearchResult {
            hits: Vec::new(),
            total: 0,
            total_mode: opts.total_mode,
        });
    }

    let where_clause = build_where(opts);
    let select_sql = format!(
        "SELECT f.path, f.repo, f.mtime, f.size, f.fts_content, \
         IFNULL(smax.importance, 0.0) as importance \
         FROM files f \
         LEFT JOIN (SELECT path, MAX(importance_score) AS importance FROM symbols GROUP BY path) smax \
         ON smax.path = f.path \
         WHERE {} ORDER BY importance DESC, f.mtime DESC LIMIT ?{} OFFSET ?{}",
        where_clause.sql,
        where_clause.params.len() + 1,
        where_clause.params.len() + 2
    );

    let mut stmt = conn.prepare(&select_sql)?;
    let mut all_params: Vec<&dyn rusqlite::ToSql> =
        where_clause.params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
    let limit = opts.limit as i64;
    let offset = opts.offset as i64;
    all_params.push(&limit);
    all_params.push(&offset);

    let rows = stmt.query_map(all_params.as_slice(), |row| {
        let path: String = row.get(0)?;
        let repo: String = row.get(1)?;
        let mtime: i64 = row.get(2)?;
        let size: i64 = row.get(3)?;
        let fts_content: String = row.get(4)?;
        let importance: f64 = row.get(5)?;
        Ok((path, repo, mtime, size, fts_content, importance))
    })?;

    let mut hits = Vec::new();
    for row in rows {
        let (path, repo, mtime, size, fts_content, importance) = row?;
        let (snippet, match_count) = extract_snippet(&fts_content, query);
        let file_type = path.rsplit_once('.').map(|(_, ext)| ext.to_string()).unwrap_or_default();
        hits.push(SearchHit {
            repo,
            path,
            score: 1.0 + importance,
            snippet,
            mtime,
            size,
            match_count: match_count.max(1),
            file_type,
            hit_reason: format!("Keyword (importance={:.1})", importance),
        });
    }

    let total = if matches!(opts.total_mode, TotalMode::Exact) {
        let count_sql = format!("SELECT COUNT(1) FROM files f WHERE {}", where_clause.sql);
        let mut count_stmt = conn.prepare(&count_sql)?;
        let count_params: Vec<&dyn rusqlite::ToSql> =
            where_clause.params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        count_stmt.query_row(count_params.as_slice(), |row| row.get::<_, i64>(0))? as usize
    } else {
        hits.len()
    };

    Ok(SearchResult {
        hits,
        total,
        total_mode: opts.total_mode,
    })
}

pub fn repo_candidates(
    conn: &Connection,
    q: &str,
    limit: usize,
    root_ids: &[String],
) -> Result<Vec<crate::types::RepoCandidate>> {
    if q.is_empty() {
        return Ok(Vec::new());
    }
    let like_query = format!("%{}%", escape_like(q));
    let mut sql = "SELECT repo, COUNT(*) AS score FROM files WHERE deleted_ts = 0 \
                   AND (path LIKE ?1 ESCAPE '\\' OR rel_path LIKE ?1 ESCAPE '\\')"
        .to_string();
    let mut params: Vec<SqlValue> = vec![SqlValue::Text(like_query)];

    if !root_ids.is_empty() {
        let placeholders: Vec<String> = root_ids
            .iter()
            .map(|r| {
                params.push(SqlValue::Text(r.clone()));
                format!("?{}", params.len())
            })
            .collect();
        sql.push_str(&format!(" AND root_id IN ({})", placeholders.join(",")));
    }
    sql.push_str(&format!(" GROUP BY repo ORDER BY score DESC LIMIT ?{}", params.len() + 1));
    params.push(SqlValue::Integer(limit as i64));

    let mut stmt = conn.prepare(&sql)?;
    let bound: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
    let rows = stmt.query_map(bound.as_slice(), |row| {
        Ok(crate::types::RepoCandidate {
            repo: row.get(0)?,
            score: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sari_storage::store;

    fn seed(conn: &Connection) {
        conn.execute(
            "INSERT INTO files (path, rel_path, root_id, repo, mtime, size, content, hash, fts_content, last_seen_ts, deleted_ts, parse_status, parse_reason, ast_status, ast_reason, is_binary, is_minified, metadata_json) \
             VALUES ('r1/a.py', 'a.py', 'r1', 'demo', 100, 10, '', 'h1', 'def handle_request(): pass', 100, 0, 'ok', 'none', 'ok', 'none', 0, 0, '{}')",
            [],
        ).unwrap();
    }

    #[test]
    fn finds_matching_file_by_content() {
        let conn = store::open_in_memory().unwrap();
        seed(&conn);
        let opts = SearchOptions::new("handle_request");
        let result = search(&conn, &opts).unwrap();
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].path, "r1/a.py");
    }

    #[test]
    fn empty_query_returns_no_hits() {
        let conn = store::open_in_memory().unwrap();
        seed(&conn);
        let opts = SearchOptions::new("");
        let result = search(&conn, &opts).unwrap();
        assert!(result.hits.is_empty());
    }

    #[test]
    fn repo_candidates_ranks_by_match_count() {
        let conn = store::open_in_memory().unwrap();
        seed(&conn);
        let candidates = repo_candidates(&conn, "a.py", 5, &[]).unwrap();
        assert_eq!(candidates[0].repo, "demo");
    }
}
