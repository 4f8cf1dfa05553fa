//! Document store backed by SQLite.
//!
//! Documents are JSON bodies keyed by their full path. The `parent` column
//! makes collection listings a single indexed lookup.

use super::{Document, DocumentPath, DocumentStore};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite document store.
///
/// # Schema
/// ```sql
/// CREATE TABLE documents (
///     path       TEXT PRIMARY KEY,
///     parent     TEXT NOT NULL,
///     body       TEXT NOT NULL,     -- JSON
///     updated_at TEXT NOT NULL      -- ISO 8601 timestamp
/// );
/// ```
///
/// Calls run on the caller's task while holding the connection mutex; every
/// statement is a single indexed row operation.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    /// Opens (or creates) the database and ensures the schema exists.
    /// Pass `":memory:"` for an ephemeral store.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).with_context(|| {
            format!("Failed to open document DB at {}", db_path.as_ref().display())
        })?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                path       TEXT PRIMARY KEY,
                parent     TEXT NOT NULL,
                body       TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_parent ON documents(parent);
            "#,
        )
        .context("Failed to create documents table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("document store connection lock poisoned"))
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Value>> {
        let conn = self.conn()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE path = ?1",
                params![path.as_str()],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read document {}", path))?;

        body.map(|b| {
            serde_json::from_str(&b).with_context(|| format!("Corrupt JSON in document {}", path))
        })
        .transpose()
    }

    async fn put(&self, path: &DocumentPath, data: Value) -> Result<()> {
        let parent = path.parent().map(|p| p.as_str().to_string()).unwrap_or_default();
        let body = serde_json::to_string(&data).context("Failed to serialize document")?;

        self.conn()?
            .execute(
                r#"
                INSERT INTO documents (path, parent, body, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(path) DO UPDATE SET
                    body = excluded.body,
                    updated_at = excluded.updated_at
                "#,
                params![path.as_str(), parent, body, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("Failed to write document {}", path))?;
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM documents WHERE path = ?1", params![path.as_str()])
            .with_context(|| format!("Failed to delete document {}", path))?;
        Ok(())
    }

    async fn list_children(&self, collection: &DocumentPath) -> Result<Vec<Document>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT path, body FROM documents WHERE parent = ?1 ORDER BY path")
            .context("Failed to prepare listing query")?;

        let rows = stmt
            .query_map(params![collection.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .with_context(|| format!("Failed to list collection {}", collection))?;

        let mut documents = Vec::new();
        for row in rows {
            let (path, body) = row.context("Failed to read document row")?;
            let data = serde_json::from_str(&body)
                .with_context(|| format!("Corrupt JSON in document {}", path))?;
            documents.push(Document {
                id: DocumentPath::from_encoded(path).id(),
                data,
            });
        }
        Ok(documents)
    }

    async fn batch_delete(&self, paths: &[DocumentPath]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin batch delete")?;
        for path in paths {
            tx.execute("DELETE FROM documents WHERE path = ?1", params![path.as_str()])
                .with_context(|| format!("Failed to delete document {} in batch", path))?;
        }
        // Dropping an uncommitted transaction rolls it back.
        tx.commit().context("Failed to commit batch delete")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn in_memory_store() -> SqliteDocumentStore {
        SqliteDocumentStore::new(":memory:").expect("in-memory store failed")
    }

    fn pages() -> DocumentPath {
        DocumentPath::from_segments(&["users", "u1", "integrations", "meta", "pages"])
    }

    #[tokio::test]
    async fn test_put_get_replace() {
        let store = in_memory_store();
        let path = pages().child("p1");

        store.put(&path, json!({"name": "first", "extra": 1})).await.unwrap();
        store.put(&path, json!({"name": "second"})).await.unwrap();

        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc, json!({"name": "second"}));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = in_memory_store();
        assert!(store.get(&pages().child("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = in_memory_store();
        let path = pages().child("p1");
        store.put(&path, json!({})).await.unwrap();

        store.delete(&path).await.unwrap();
        store.delete(&path).await.unwrap();
        assert!(store.get(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_children_only_direct() {
        let store = in_memory_store();
        store.put(&pages().child("b"), json!({"n": "b"})).await.unwrap();
        store.put(&pages().child("a"), json!({"n": "a"})).await.unwrap();
        store.put(&pages().parent().unwrap(), json!({"platform": true})).await.unwrap();
        store
            .put(
                &DocumentPath::from_segments(&["users", "u2", "integrations", "meta", "pages", "c"]),
                json!({}),
            )
            .await
            .unwrap();

        let listed = store.list_children(&pages()).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(listed[0].data, json!({"n": "a"}));
    }

    #[tokio::test]
    async fn test_batch_delete_removes_all() {
        let store = in_memory_store();
        let paths = vec![pages().child("a"), pages().child("b"), pages().parent().unwrap()];
        for p in &paths {
            store.put(p, json!({})).await.unwrap();
        }

        store.batch_delete(&paths).await.unwrap();

        assert!(store.list_children(&pages()).await.unwrap().is_empty());
        assert!(store.get(&paths[2]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_delete_is_all_or_nothing() {
        let store = in_memory_store();
        let paths = vec![pages().child("a"), pages().child("b"), pages().child("c")];
        for p in &paths {
            store.put(p, json!({})).await.unwrap();
        }

        // Make deletion of "b" fail inside the transaction.
        store
            .conn()
            .unwrap()
            .execute_batch(&format!(
                "CREATE TRIGGER block_b BEFORE DELETE ON documents \
                 WHEN old.path = '{}' BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
                paths[1].as_str()
            ))
            .unwrap();

        assert!(store.batch_delete(&paths).await.is_err());

        // "a" was deleted before "b" failed, and must have been rolled back.
        assert_eq!(store.list_children(&pages()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("docs.db");
        let path = pages().child("p1");

        {
            let store = SqliteDocumentStore::new(&db).unwrap();
            store.put(&path, json!({"name": "kept"})).await.unwrap();
        }

        let store = SqliteDocumentStore::new(&db).unwrap();
        assert_eq!(store.get(&path).await.unwrap(), Some(json!({"name": "kept"})));
    }
}
