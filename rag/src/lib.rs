mod answer;
mod build_prompt;
mod chunk_text;
mod config;
mod embed_chunks;
mod embed_query;
mod error;
mod generate;
mod http;
mod ingest;
mod load_document;
pub mod logging;
mod scan_files;
mod vector_store;

pub use answer::{answer_query, Answer, NO_DOCUMENTS_ANSWER};
pub use build_prompt::{build_prompt_with_context, format_context_from_hits, Message};
pub use chunk_text::{chunk_segments, chunk_text, Chunk};
pub use config::{Config, EmbedProvider, DEFAULT_SYSTEM_PROMPT};
pub use embed_chunks::{build_embedder, Embedder, HashEmbedder, OllamaEmbedder};
pub use embed_query::embed_query;
pub use error::{RagError, Result};
pub use generate::{ChatCompletionsClient, Generator};
pub use ingest::{
    upload_digest, FileOutcome, FileReport, IngestReport, LlmCheck, Pipeline, StoreStatus,
    LLM_CHECK_PROMPT, RETRIEVAL_CHECK_QUERY,
};
pub use load_document::{load_document, Document, DocumentFormat, Segment, Segments};
pub use scan_files::{scan_files, Upload};
pub use vector_store::{
    cosine_similarity, EmbeddingRecord, Hit, NewRecord, StoredDocument, VectorStore,
};
