//! SQLite-backed vector store.
//!
//! A store directory holds:
//! - `index.sqlite3`: documents, embedding records and store metadata
//! - `documents/`: raw copies of ingested uploads, keyed by their relative name
//!
//! The connection runs in exclusive locking mode, so only one [`VectorStore`]
//! can hold a directory at a time. The lock belongs to the connection and is
//! released by [`VectorStore::close`], by dropping the handle, or by the OS
//! when the owning process dies.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};
use tracing::{debug, info, warn};

use crate::error::{RagError, Result};

const DB_FILE: &str = "index.sqlite3";
const DOCUMENTS_DIR: &str = "documents";
const REMOVED_DIR: &str = "documents.removed";

#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingRecord {
    pub id: u64,
    pub vector: Vec<f32>,
    pub text: String,
    pub filename: String,
    pub position: usize,
    /// Duplicate-upload key of the source upload, see [`crate::upload_digest`].
    pub digest: String,
}

/// A record before the store assigns its id.
#[derive(Clone, Debug)]
pub struct NewRecord {
    pub vector: Vec<f32>,
    pub text: String,
    pub filename: String,
    pub position: usize,
    pub digest: String,
}

/// An ingested upload and how many records it produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredDocument {
    pub id: u64,
    pub filename: String,
    pub digest: String,
    pub chunks: usize,
}

#[derive(Clone, Debug)]
pub struct Hit {
    pub record: EmbeddingRecord,
    pub score: f32,
}

#[derive(Debug)]
pub struct VectorStore {
    dir: PathBuf,
    conn: Connection,
    records: Vec<EmbeddingRecord>,
    documents: Vec<StoredDocument>,
    dimensions: Option<usize>,
}

impl VectorStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join(DOCUMENTS_DIR))?;

        let conn = Connection::open(dir.join(DB_FILE))?;
        conn.busy_timeout(Duration::ZERO)?;
        conn.execute_batch("PRAGMA locking_mode=EXCLUSIVE; PRAGMA foreign_keys=ON;")?;
        // The exclusive lock taken here is kept until the connection closes.
        conn.execute_batch("BEGIN EXCLUSIVE; COMMIT;").map_err(|e| {
            if is_busy(&e) {
                RagError::StoreLocked(dir.display().to_string())
            } else {
                RagError::Database(e)
            }
        })?;
        migrate(&conn)?;

        let removed = dir.join(REMOVED_DIR);
        if removed.exists() {
            fs::remove_dir_all(&removed)?;
        }

        let records = load_records(&conn)?;
        let documents = load_documents(&conn)?;
        let dimensions = load_dimensions(&conn)?;
        info!(
            dir = %dir.display(),
            records = records.len(),
            documents = documents.len(),
            "opened vector store"
        );
        Ok(Self { dir, conn, records, documents, dimensions })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn documents(&self) -> &[StoredDocument] {
        &self.documents
    }

    /// Vector length every record in the store shares, once one exists.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    /// Distinct source filenames of all documents and records.
    pub fn filenames(&self) -> BTreeSet<String> {
        self.documents
            .iter()
            .map(|d| d.filename.clone())
            .chain(self.records.iter().map(|r| r.filename.clone()))
            .collect()
    }

    pub fn contains_digest(&self, digest: &str) -> bool {
        self.documents.iter().any(|d| d.digest == digest)
    }

    /// Stores one record and returns its id. No deduplication happens here.
    pub fn upsert(&mut self, record: NewRecord) -> Result<u64> {
        let dimensions = self.batch_dimensions(std::slice::from_ref(&record))?;
        let tx = self.conn.transaction()?;
        let stored = insert_records(&tx, vec![record], None)?;
        store_dimensions(&tx, dimensions)?;
        tx.commit()?;

        let id = stored
            .first()
            .map(|r| r.id)
            .ok_or_else(|| RagError::Store("record was not stored".to_string()))?;
        self.dimensions = dimensions;
        self.records.extend(stored);
        Ok(id)
    }

    /// Registers an upload together with all of its records and keeps a raw
    /// copy under `documents/`. Either everything is stored or nothing is.
    pub fn add_document(
        &mut self,
        filename: &str,
        digest: &str,
        bytes: &[u8],
        records: Vec<NewRecord>,
    ) -> Result<Vec<u64>> {
        let copy = self.document_path(filename)?;
        let dimensions = self.batch_dimensions(&records)?;
        let chunks = records.len();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO documents (filename, digest, chunks) VALUES (?1, ?2, ?3)",
            params![filename, digest, chunks as i64],
        )?;
        let document_id = tx.last_insert_rowid();
        let stored = insert_records(&tx, records, Some(document_id))?;
        store_dimensions(&tx, dimensions)?;

        if let Some(parent) = copy.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&copy, bytes)?;
        if let Err(e) = tx.commit() {
            let _ = fs::remove_file(&copy);
            return Err(e.into());
        }

        let ids = stored.iter().map(|r| r.id).collect();
        self.dimensions = dimensions;
        self.records.extend(stored);
        self.documents.push(StoredDocument {
            id: document_id as u64,
            filename: filename.to_string(),
            digest: digest.to_string(),
            chunks,
        });
        debug!(filename, chunks, "document committed");
        Ok(ids)
    }

    /// Top `k` records by cosine similarity, best first.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Hit>> {
        if let Some(expected) = self.dimensions {
            if expected != vector.len() {
                return Err(RagError::DimensionMismatch { expected, actual: vector.len() });
            }
        }
        let mut hits: Vec<Hit> = self
            .records
            .iter()
            .map(|r| Hit {
                score: cosine_similarity(&r.vector, vector),
                record: r.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        debug!(k, returned = hits.len(), "vector query");
        Ok(hits)
    }

    /// Where the raw copy of `filename` lives. Only plain relative names are accepted.
    pub fn document_path(&self, filename: &str) -> Result<PathBuf> {
        let name = Path::new(filename);
        let plain = !filename.is_empty() && name.components().all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(RagError::Store(format!("invalid document name `{}`", filename)));
        }
        Ok(self.dir.join(DOCUMENTS_DIR).join(name))
    }

    /// Drops every record and stored document.
    pub fn reset(&mut self) -> Result<()> {
        let docs = self.dir.join(DOCUMENTS_DIR);
        let removed = self.dir.join(REMOVED_DIR);
        if removed.exists() {
            fs::remove_dir_all(&removed)?;
        }
        if docs.exists() {
            fs::rename(&docs, &removed)?;
        }

        if let Err(e) = clear_tables(&mut self.conn) {
            if removed.exists() {
                if let Err(restore) = fs::rename(&removed, &docs) {
                    warn!(error = %restore, "could not restore document copies");
                }
            }
            return Err(e.into());
        }

        let cleared = self.records.len();
        self.records.clear();
        self.documents.clear();
        self.dimensions = None;
        fs::create_dir_all(&docs)?;
        if let Err(e) = fs::remove_dir_all(&removed) {
            // The index is already empty; leftovers are swept on the next open.
            warn!(error = %e, "could not delete old document copies");
        }
        warn!(removed = cleared, "vector store reset");
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| RagError::Database(e))
    }

    fn batch_dimensions(&self, records: &[NewRecord]) -> Result<Option<usize>> {
        let mut expected = self.dimensions;
        for record in records {
            if record.filename.is_empty() {
                return Err(RagError::Store("record has no source filename".to_string()));
            }
            if record.vector.is_empty() {
                return Err(RagError::Store(format!("empty vector for {}", record.filename)));
            }
            match expected {
                Some(d) if d != record.vector.len() => {
                    return Err(RagError::DimensionMismatch {
                        expected: d,
                        actual: record.vector.len(),
                    })
                }
                Some(_) => {}
                None => expected = Some(record.vector.len()),
            }
        }
        Ok(expected)
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == ErrorCode::DatabaseBusy || f.code == ErrorCode::DatabaseLocked
    )
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            digest TEXT NOT NULL,
            chunks INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_documents_digest ON documents(digest);

        CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER REFERENCES documents(id) ON DELETE CASCADE,
            filename TEXT NOT NULL,
            position INTEGER NOT NULL,
            text TEXT NOT NULL,
            vector BLOB NOT NULL,
            digest TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_records_document_id ON records(document_id);

        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn insert_records(
    tx: &Transaction<'_>,
    records: Vec<NewRecord>,
    document_id: Option<i64>,
) -> Result<Vec<EmbeddingRecord>> {
    let mut stmt = tx.prepare(
        "INSERT INTO records (document_id, filename, position, text, vector, digest)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut stored = Vec::with_capacity(records.len());
    for record in records {
        stmt.execute(params![
            document_id,
            record.filename,
            record.position as i64,
            record.text,
            encode_vector(&record.vector),
            record.digest,
        ])?;
        stored.push(EmbeddingRecord {
            id: tx.last_insert_rowid() as u64,
            vector: record.vector,
            text: record.text,
            filename: record.filename,
            position: record.position,
            digest: record.digest,
        });
    }
    Ok(stored)
}

fn store_dimensions(tx: &Transaction<'_>, dimensions: Option<usize>) -> Result<()> {
    if let Some(d) = dimensions {
        tx.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('dimensions', ?1)",
            params![d.to_string()],
        )?;
    }
    Ok(())
}

fn clear_tables(conn: &mut Connection) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch("DELETE FROM records; DELETE FROM documents; DELETE FROM meta;")?;
    tx.commit()
}

fn load_records(conn: &Connection) -> Result<Vec<EmbeddingRecord>> {
    let mut stmt = conn
        .prepare("SELECT id, filename, position, text, vector, digest FROM records ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Vec<u8>>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (id, filename, position, text, blob, digest) = row?;
        records.push(EmbeddingRecord {
            id: id as u64,
            vector: decode_vector(&blob)?,
            text,
            filename,
            position: position as usize,
            digest,
        });
    }
    Ok(records)
}

fn load_documents(conn: &Connection) -> Result<Vec<StoredDocument>> {
    let mut stmt = conn.prepare("SELECT id, filename, digest, chunks FROM documents ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(StoredDocument {
            id: row.get::<_, i64>(0)? as u64,
            filename: row.get(1)?,
            digest: row.get(2)?,
            chunks: row.get::<_, i64>(3)? as usize,
        })
    })?;
    let mut documents = Vec::new();
    for row in rows {
        documents.push(row?);
    }
    Ok(documents)
}

fn load_dimensions(conn: &Connection) -> Result<Option<usize>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM meta WHERE key = 'dimensions'", [], |row| row.get(0))
        .optional()?;
    raw.map(|v| {
        v.parse::<usize>()
            .map_err(|e| RagError::Store(format!("bad stored dimensions `{}`: {}", v, e)))
    })
    .transpose()
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(RagError::Store(format!("vector blob of {} bytes is truncated", blob.len())));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Cosine similarity; 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
