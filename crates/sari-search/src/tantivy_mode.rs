//! Embedded (Tantivy) search backend.
//!
//! `Index` + `IndexWriter` behind a `Mutex`, `doc!`-built documents,
//! `QueryParser::for_index` over the searchable text fields, `TopDocs`
//! collector. The per-file document shape is `doc_id, path, repo, root_id,
//! rel_path, path_text, body_text, preview, mtime, size`.

use crate::error::{Result, SearchError};
use crate::normalize::{normalize, truncate_head_tail};
use crate::types::{SearchHit, SearchOptions, SearchResult, TotalMode};
use std::path::Path;
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, TextFieldIndexing, TextOptions, Value, FAST, STORED, STRING, TEXT};
use tantivy::{doc, DateTime, Index, IndexWriter, TantivyDocument, Term};

pub const DEFAULT_MAX_DOC_BYTES: usize = 64 * 1024;
pub const DEFAULT_PREVIEW_BYTES: usize = 240;

#[derive(Debug, Clone, Copy)]
pub struct DocFields {
    pub doc_id: Field,
    pub path: Field,
    pub repo: Field,
    pub root_id: Field,
    pub rel_path: Field,
    pub path_text: Field,
    pub body_text: Field,
    pub preview: Field,
    pub mtime: Field,
    pub size: Field,
    pub indexed_at: Field,
}

fn keyword_options() -> TextOptions {
    TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("raw")
                .set_index_option(tantivy::schema::IndexRecordOption::Basic),
        )
        .set_stored()
}

pub fn build_schema() -> (Schema, DocFields) {
    let mut builder = Schema::builder();
    let doc_id = builder.add_text_field("doc_id", STRING | STORED);
    let path = builder.add_text_field("path", keyword_options());
    let repo = builder.add_text_field("repo", keyword_options());
    let root_id = builder.add_text_field("root_id", keyword_options());
    let rel_path = builder.add_text_field("rel_path", keyword_options());
    let path_text = builder.add_text_field("path_text", TEXT);
    let body_text = builder.add_text_field("body_text", TEXT);
    let preview = builder.add_text_field("preview", STORED);
    let mtime = builder.add_i64_field("mtime", STORED | FAST);
    let size = builder.add_i64_field("size", STORED | FAST);
    let indexed_at = builder.add_date_field("indexed_at", STORED);
    let schema = builder.build();
    (
        schema,
        DocFields {
            doc_id,
            path,
            repo,
            root_id,
            rel_path,
            path_text,
            body_text,
            preview,
            mtime,
            size,
            indexed_at,
        },
    )
}

pub struct EmbeddedDoc {
    pub doc_id: String,
    pub path: String,
    pub repo: String,
    pub root_id: String,
    pub rel_path: String,
    pub body: String,
    pub mtime: i64,
    pub size: i64,
}

pub struct EmbeddedIndex {
    index: Index,
    writer: Mutex<IndexWriter>,
    fields: DocFields,
    max_doc_bytes: usize,
    preview_bytes: usize,
}

impl EmbeddedIndex {
    pub fn open_or_create(dir: &Path) -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = if dir.exists() {
            Index::open_in_dir(dir).map_err(|e| SearchError::Engine(e.to_string()))?
        } else {
            std::fs::create_dir_all(dir).map_err(|e| SearchError::Engine(e.to_string()))?;
            Index::create_in_dir(dir, schema).map_err(|e| SearchError::Engine(e.to_string()))?
        };
        let writer = index
            .writer(50_000_000)
            .map_err(|e| SearchError::Engine(e.to_string()))?;
        Ok(EmbeddedIndex {
            index,
            writer: Mutex::new(writer),
            fields,
            max_doc_bytes: DEFAULT_MAX_DOC_BYTES,
            preview_bytes: DEFAULT_PREVIEW_BYTES,
        })
    }

    pub fn with_budgets(mut self, max_doc_bytes: usize, preview_bytes: usize) -> Self {
        self.max_doc_bytes = max_doc_bytes;
        self.preview_bytes = preview_bytes;
        self
    }

    fn build_document(&self, entry: &EmbeddedDoc) -> TantivyDocument {
        let body = truncate_head_tail(&normalize(&entry.body), self.max_doc_bytes);
        let preview = truncate_head_tail(&entry.body, self.preview_bytes);
        let path_text = normalize(&entry.rel_path);
        let timestamp = DateTime::from_timestamp_secs(entry.mtime.max(0));
        doc!(
            self.fields.doc_id => entry.doc_id.clone(),
            self.fields.path => entry.path.clone(),
            self.fields.repo => entry.repo.clone(),
            self.fields.root_id => entry.root_id.clone(),
            self.fields.rel_path => entry.rel_path.clone(),
            self.fields.path_text => path_text,
            self.fields.body_text => body,
            self.fields.preview => preview,
            self.fields.mtime => entry.mtime,
            self.fields.size => entry.size,
            self.fields.indexed_at => timestamp,
        )
    }

    pub fn upsert_documents(&self, docs: &[EmbeddedDoc]) -> Result<()> {
        let mut writer = self.writer.lock().expect("tantivy writer mutex poisoned");
        for entry in docs {
            let term = Term::from_field_text(self.fields.doc_id, &entry.doc_id);
            writer.delete_term(term);
            let document = self.build_document(entry);
            writer
                .add_document(document)
                .map_err(|e| SearchError::Engine(e.to_string()))?;
        }
        writer.commit().map_err(|e| SearchError::Engine(e.to_string()))?;
        Ok(())
    }

    /// Wipes every document from this root's index, for a full rebuild from
    /// the source of truth.
    pub fn clear(&self) -> Result<()> {
        let mut writer = self.writer.lock().expect("tantivy writer mutex poisoned");
        writer
            .delete_all_documents()
            .map_err(|e| SearchError::Engine(e.to_string()))?;
        writer.commit().map_err(|e| SearchError::Engine(e.to_string()))?;
        Ok(())
    }

    pub fn delete_documents(&self, doc_ids: &[String]) -> Result<()> {
        let mut writer = self.writer.lock().expect("tantivy writer mutex poisoned");
        for doc_id in doc_ids {
            writer.delete_term(Term::from_field_text(self.fields.doc_id, doc_id));
        }
        writer.commit().map_err(|e| SearchError::Engine(e.to_string()))?;
        Ok(())
    }

    pub fn search(&self, opts: &SearchOptions) -> Result<SearchResult> {
        let query = opts.query.trim();
        if query.is_empty() {
            return Ok(SearchResult {
                hits: Vec::new(),
                total: 0,
                total_mode: opts.total_mode,
            });
        }
        let reader = self.index.reader().map_err(|e| SearchError::Engine(e.to_string()))?;
        let searcher = reader.searcher();
        let query_parser = QueryParser::for_index(
            &self.index,
            vec![
                self.fields.body_text,
                self.fields.path_text,
                self.fields.preview,
            ],
        );
        let normalized_query = normalize(query);
        let parsed = query_parser
            .parse_query(&normalized_query)
            .map_err(|e| SearchError::InvalidQuery(e.to_string()))?;

        let limit = opts.limit.max(1) + opts.offset;
        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(limit))
            .map_err(|e| SearchError::Engine(e.to_string()))?;

        let mut hits = Vec::new();
        for (score, address) in top_docs.into_iter().skip(opts.offset) {
            let document: TantivyDocument =
                searcher.doc(address).map_err(|e| SearchError::Engine(e.to_string()))?;
            let path = text_field(&document, self.fields.path);
            let repo = text_field(&document, self.fields.repo);
            let preview = text_field(&document, self.fields.preview);
            let mtime = i64_field(&document, self.fields.mtime);
            let size = i64_field(&document, self.fields.size);

            if let Some(repo_filter) = &opts.repo {
                if &repo != repo_filter {
                    continue;
                }
            }
            if !opts.root_ids.is_empty() {
                let root_id = text_field(&document, self.fields.root_id);
                if !opts.root_ids.contains(&root_id) {
                    continue;
                }
            }

            let file_type = path.rsplit_once('.').map(|(_, ext)| ext.to_string()).unwrap_or_default();
            hits.push(SearchHit {
                repo,
                path,
                score: score as f64,
                snippet: preview,
                mtime,
                size,
                match_count: 1,
                file_type,
                hit_reason: "Embedded (bm25)".to_string(),
            });
        }

        let total = hits.len();
        Ok(SearchResult {
            hits,
            total,
            total_mode: match opts.total_mode {
                TotalMode::Exact => TotalMode::Estimated,
                TotalMode::Estimated => TotalMode::Estimated,
            },
        })
    }
}

fn text_field(document: &TantivyDocument, field: Field) -> String {
    document
        .get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn i64_field(document: &TantivyDocument, field: Field) -> i64 {
    document.get_first(field).and_then(|v| v.as_i64()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn indexes_and_finds_document() {
        let dir = TempDir::new().unwrap();
        let index = EmbeddedIndex::open_or_create(dir.path()).unwrap();
        index
            .upsert_documents(&[EmbeddedDoc {
                doc_id: "r1/a.py".to_string(),
                path: "r1/a.py".to_string(),
                repo: "demo".to_string(),
                root_id: "r1".to_string(),
                rel_path: "a.py".to_string(),
                body: "def handle_request(): pass".to_string(),
                mtime: 100,
                size: 20,
            }])
            .unwrap();
        let result = index.search(&SearchOptions::new("handle_request")).unwrap();
        assert_eq!(result.hits.len(), 1);
    }

    #[test]
    fn delete_removes_document() {
        let dir = TempDir::new().unwrap();
        let index = EmbeddedIndex::open_or_create(dir.path()).unwrap();
        index
            .upsert_documents(&[EmbeddedDoc {
                doc_id: "r1/a.py".to_string(),
                path: "r1/a.py".to_string(),
                repo: "demo".to_string(),
                root_id: "r1".to_string(),
                rel_path: "a.py".to_string(),
                body: "def handle_request(): pass".to_string(),
                mtime: 100,
                size: 20,
            }])
            .unwrap();
        index.delete_documents(&["r1/a.py".to_string()]).unwrap();
        let result = index.search(&SearchOptions::new("handle_request")).unwrap();
        assert!(result.hits.is_empty());
    }
}
