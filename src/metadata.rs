//! Document and question history in SQLite.
//!
//! | Operation | Behaviour |
//! |-----------|-----------|
//! | [`create_document`](MetadataStore::create_document) | Upsert by filename, refreshing the upload time |
//! | [`get_document`](MetadataStore::get_document) | Look up one document |
//! | [`add_question`](MetadataStore::add_question) | Append a Q/A pair; the document must exist |
//! | [`list_questions`](MetadataStore::list_questions) | Q/A pairs of a document, oldest first |
//! | [`delete_questions`](MetadataStore::delete_questions) | Remove all Q/A pairs of a document |

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::migrate;
use crate::models::{DocumentRecord, QuestionRecord};

#[derive(Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    /// Open (creating if needed) and migrate the database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn create_document(&self, filename: &str) -> Result<DocumentRecord> {
        let now = Utc::now().timestamp();
        let row = sqlx::query(
            r#"
            INSERT INTO documents (filename, uploaded_at) VALUES (?, ?)
            ON CONFLICT(filename) DO UPDATE SET uploaded_at = excluded.uploaded_at
            RETURNING id, filename, uploaded_at
            "#,
        )
        .bind(filename)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(DocumentRecord {
            id: row.get("id"),
            filename: row.get("filename"),
            uploaded_at: from_unix(row.get("uploaded_at")),
        })
    }

    pub async fn get_document(&self, filename: &str) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query("SELECT id, filename, uploaded_at FROM documents WHERE filename = ?")
            .bind(filename)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| DocumentRecord {
            id: row.get("id"),
            filename: row.get("filename"),
            uploaded_at: from_unix(row.get("uploaded_at")),
        }))
    }

    pub async fn add_question(&self, filename: &str, question: &str, answer: &str) -> Result<i64> {
        let Some(document) = self.get_document(filename).await? else {
            bail!("document not found: {}", filename);
        };

        let result = sqlx::query(
            "INSERT INTO questions (document_id, question, answer, asked_at) VALUES (?, ?, ?, ?)",
        )
        .bind(document.id)
        .bind(question)
        .bind(answer)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Q/A pairs of `filename` in the order they were asked. Unknown
    /// documents have none.
    pub async fn list_questions(&self, filename: &str) -> Result<Vec<QuestionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT q.id, q.question, q.answer, q.asked_at
            FROM questions q
            JOIN documents d ON d.id = q.document_id
            WHERE d.filename = ?
            ORDER BY q.id ASC
            "#,
        )
        .bind(filename)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| QuestionRecord {
                id: row.get("id"),
                question: row.get("question"),
                answer: row.get("answer"),
                asked_at: from_unix(row.get("asked_at")),
            })
            .collect())
    }

    /// Returns the number of rows removed.
    pub async fn delete_questions(&self, filename: &str) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM questions WHERE document_id IN (SELECT id FROM documents WHERE filename = ?)",
        )
        .bind(filename)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn from_unix(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}
