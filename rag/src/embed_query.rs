use crate::embed_chunks::Embedder;
use crate::error::{RagError, Result};

pub fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let vector = embedder.embed(text)?;
    if vector.is_empty() {
        return Err(RagError::EmbeddingService("empty query embedding".to_string()));
    }
    Ok(vector)
}
