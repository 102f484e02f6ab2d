use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::answer::{answer_query, Answer};
use crate::build_prompt::Message;
use crate::chunk_text::chunk_segments;
use crate::config::Config;
use crate::embed_chunks::{build_embedder, Embedder};
use crate::embed_query::embed_query;
use crate::error::{RagError, Result};
use crate::generate::{ChatCompletionsClient, Generator};
use crate::load_document::{load_document, Document};
use crate::scan_files::Upload;
use crate::vector_store::{Hit, NewRecord, VectorStore};

#[derive(Debug)]
pub enum FileOutcome {
    Ingested { chunks: usize },
    /// Same filename and content already in the store.
    Duplicate,
    Failed(RagError),
}

#[derive(Debug)]
pub struct FileReport {
    pub filename: String,
    pub outcome: FileOutcome,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub files: Vec<FileReport>,
}

impl IngestReport {
    pub fn ingested(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Ingested { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Failed(_)))
            .count()
    }

    pub fn total_chunks(&self) -> usize {
        self.files
            .iter()
            .map(|f| match f.outcome {
                FileOutcome::Ingested { chunks } => chunks,
                _ => 0,
            })
            .sum()
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.files.is_empty() {
            return write!(f, "Nothing to ingest.");
        }
        for file in &self.files {
            match &file.outcome {
                FileOutcome::Ingested { chunks } => {
                    writeln!(f, "ok      {} ({} chunks)", file.filename, chunks)?
                }
                FileOutcome::Duplicate => writeln!(f, "skipped {} (already ingested)", file.filename)?,
                FileOutcome::Failed(err) => writeln!(f, "failed  {}: {}", file.filename, err)?,
            }
        }
        write!(
            f,
            "{} ingested, {} failed, {} chunks indexed",
            self.ingested(),
            self.failed(),
            self.total_chunks()
        )
    }
}

pub const RETRIEVAL_CHECK_QUERY: &str = "What is this document about?";
pub const LLM_CHECK_PROMPT: &str = "Hello! Please respond with 'Connection test successful.'";
const LLM_CHECK_REPLY: &str = "Connection test successful";

/// Result of [`Pipeline::check_llm`]: whether the reply was the expected one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LlmCheck {
    pub ok: bool,
    pub reply: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreStatus {
    pub records: usize,
    pub documents: Vec<String>,
    pub dir: String,
}

/// Owns every collaborator of the ingest and query paths.
pub struct Pipeline {
    cfg: Arc<Config>,
    embedder: Box<dyn Embedder>,
    generator: Box<dyn Generator>,
    store: VectorStore,
}

impl Pipeline {
    pub fn new(
        cfg: Arc<Config>,
        embedder: Box<dyn Embedder>,
        generator: Box<dyn Generator>,
        store: VectorStore,
    ) -> Self {
        Self { cfg, embedder, generator, store }
    }

    /// Wires the configured embedder, the chat completions client and the
    /// on-disk store.
    pub fn from_config(cfg: Arc<Config>) -> Result<Self> {
        let store = VectorStore::open(&cfg.store_dir)?;
        let embedder = build_embedder(&cfg);
        let generator = Box::new(ChatCompletionsClient::from_config(&cfg));
        Ok(Self::new(cfg, embedder, generator, store))
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Ingests each upload independently; one failure never stops the rest.
    pub fn ingest(&mut self, uploads: Vec<Upload>) -> IngestReport {
        let mut report = IngestReport::default();
        for upload in uploads {
            let filename = upload.filename.clone();
            let outcome = match self.ingest_one(upload) {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(filename = %filename, error = %err, "ingestion failed");
                    FileOutcome::Failed(err)
                }
            };
            report.files.push(FileReport { filename, outcome });
        }
        info!(
            ingested = report.ingested(),
            failed = report.failed(),
            chunks = report.total_chunks(),
            "ingestion finished"
        );
        report
    }

    fn ingest_one(&mut self, upload: Upload) -> Result<FileOutcome> {
        let digest = upload_digest(&upload.filename, &upload.bytes);
        let doc = Document::from_upload(upload.filename, upload.bytes)?;

        if self.cfg.dedupe_uploads && self.store.contains_digest(&digest) {
            info!(filename = %doc.filename, "duplicate upload skipped");
            return Ok(FileOutcome::Duplicate);
        }

        let segments = load_document(&doc)?;
        let chunks = chunk_segments(segments, self.cfg.chunk_size, self.cfg.chunk_overlap)?;
        let vectors = if chunks.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            self.embedder.embed_batch(&texts)?
        };
        if vectors.len() != chunks.len() {
            return Err(RagError::EmbeddingService(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let records: Vec<NewRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| NewRecord {
                vector,
                text: chunk.text,
                filename: chunk.filename,
                position: chunk.position,
                digest: digest.clone(),
            })
            .collect();
        let count = records.len();
        self.store.add_document(&doc.filename, &digest, &doc.bytes, records)?;
        info!(filename = %doc.filename, chunks = count, "ingested");
        Ok(FileOutcome::Ingested { chunks: count })
    }

    pub fn ask(&self, question: &str) -> Result<Answer> {
        answer_query(
            &self.cfg,
            self.embedder.as_ref(),
            &self.store,
            self.generator.as_ref(),
            question,
        )
    }

    /// Number of chunks retrieved per question from now on.
    pub fn set_top_k(&mut self, top_k: usize) -> Result<()> {
        let mut cfg = (*self.cfg).clone();
        cfg.top_k = top_k;
        cfg.validate()?;
        self.cfg = Arc::new(cfg);
        info!(top_k, "retrieval updated");
        Ok(())
    }

    /// Sampling temperature for later generations.
    pub fn set_temperature(&mut self, temperature: f32) -> Result<()> {
        let mut cfg = (*self.cfg).clone();
        cfg.temperature = temperature;
        cfg.validate()?;
        self.cfg = Arc::new(cfg);
        info!(temperature, "generation updated");
        Ok(())
    }

    /// Runs a fixed sample question through embedding and retrieval only.
    pub fn check_retrieval(&self) -> Result<Vec<Hit>> {
        let vector = embed_query(self.embedder.as_ref(), RETRIEVAL_CHECK_QUERY)?;
        let hits = self.store.query(&vector, self.cfg.top_k)?;
        info!(hits = hits.len(), "retrieval check");
        Ok(hits)
    }

    /// Asks the generator for a canned reply to confirm the LLM is reachable.
    pub fn check_llm(&self) -> Result<LlmCheck> {
        let reply = self
            .generator
            .generate(&[Message::user(LLM_CHECK_PROMPT)], self.cfg.temperature)?;
        let ok = reply.contains(LLM_CHECK_REPLY);
        info!(ok, "llm check");
        Ok(LlmCheck { ok, reply })
    }

    pub fn status(&self) -> StoreStatus {
        StoreStatus {
            records: self.store.len(),
            documents: self.store.filenames().into_iter().collect(),
            dir: self.store.dir().display().to_string(),
        }
    }

    pub fn reset(&mut self) -> Result<()> {
        self.store.reset()
    }

    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}

/// Hex SHA-256 over filename and content, the duplicate-upload key.
pub fn upload_digest(filename: &str, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update([0u8]);
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
