use std::collections::BTreeSet;

use tracing::info;

use crate::build_prompt::build_prompt_with_context;
use crate::config::Config;
use crate::embed_chunks::Embedder;
use crate::embed_query::embed_query;
use crate::error::Result;
use crate::generate::Generator;
use crate::vector_store::{Hit, VectorStore};

pub const NO_DOCUMENTS_ANSWER: &str =
    "No documents have been ingested yet. Upload PDF or TXT files and run Ingest, then ask again.";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub sources: BTreeSet<String>,
    /// The context block the answer was grounded on.
    pub context: String,
}

impl Answer {
    pub fn format_with_sources(&self) -> String {
        if self.sources.is_empty() {
            return self.text.clone();
        }
        let list: Vec<&str> = self.sources.iter().map(String::as_str).collect();
        format!("{}\n\nSources: {}", self.text, list.join(", "))
    }
}

/// Retrieves the top-k chunks for `question` and asks the generator to
/// answer from them.
pub fn answer_query(
    cfg: &Config,
    embedder: &dyn Embedder,
    store: &VectorStore,
    generator: &dyn Generator,
    question: &str,
) -> Result<Answer> {
    if store.is_empty() && !cfg.answer_without_context {
        info!("query against empty store, skipping generation");
        return Ok(Answer {
            text: NO_DOCUMENTS_ANSWER.to_string(),
            sources: BTreeSet::new(),
            context: String::new(),
        });
    }

    let query_vec = embed_query(embedder, question)?;
    let hits = store.query(&query_vec, cfg.top_k)?;
    let (messages, context) = build_prompt_with_context(cfg, question, &hits);
    let text = generator.generate(&messages, cfg.temperature)?;
    let sources = sources_of(&hits);
    info!(hits = hits.len(), sources = sources.len(), "answered query");
    Ok(Answer { text, sources, context })
}

fn sources_of(hits: &[Hit]) -> BTreeSet<String> {
    hits.iter().map(|h| h.record.filename.clone()).collect()
}
