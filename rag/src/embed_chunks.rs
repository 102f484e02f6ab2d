use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::{Config, EmbedProvider};
use crate::error::{RagError, Result};
use crate::http::post_json;

/// Turns text into fixed-length vectors. Identical input yields identical output.
pub trait Embedder: Send {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::EmbeddingService("no embedding returned".to_string()))
    }
}

pub fn build_embedder(cfg: &Config) -> Box<dyn Embedder> {
    match cfg.embed_provider {
        EmbedProvider::Ollama => Box::new(OllamaEmbedder::new(&cfg.ollama_url, &cfg.embed_model)),
        EmbedProvider::Hash => Box::new(HashEmbedder::new(cfg.hash_dimensions)),
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Serialize)]
struct EmbedLegacyRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Embeddings from a local Ollama server.
#[derive(Clone, Debug)]
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    // Older servers only expose /api/embeddings, one prompt per call.
    fn embed_legacy(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, String> {
        let url = format!("{}/api/embeddings", self.base_url);
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let req = EmbedLegacyRequest { model: &self.model, prompt: text };
            let res = post_json::<Value, _>(&url, &req)?;
            out.extend(parse_embeddings(res)?);
        }
        Ok(out)
    }
}

impl Embedder for OllamaEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let url = format!("{}/api/embed", self.base_url);
        let req = EmbedRequest { model: &self.model, input: texts };
        let vectors = match post_json::<Value, _>(&url, &req) {
            Ok(res) => parse_embeddings(res),
            Err(err) => {
                tracing::debug!(error = %err, "/api/embed failed, trying legacy endpoint");
                self.embed_legacy(texts)
            }
        }
        .map_err(RagError::EmbeddingService)?;

        if vectors.len() != texts.len() {
            return Err(RagError::EmbeddingService(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

fn parse_embeddings(value: Value) -> std::result::Result<Vec<Vec<f32>>, String> {
    if let Some(embeddings) = value.get("embeddings") {
        return parse_embeddings_value(embeddings);
    }
    if let Some(embedding) = value.get("embedding") {
        return parse_embeddings_value(embedding);
    }
    Err("No embeddings in response".to_string())
}

fn parse_embeddings_value(value: &Value) -> std::result::Result<Vec<Vec<f32>>, String> {
    if let Some(arr) = value.as_array() {
        if arr.is_empty() {
            return Ok(vec![]);
        }
        if arr[0].is_array() {
            let mut out = Vec::new();
            for row in arr {
                out.push(parse_vec(row)?);
            }
            return Ok(out);
        }
        return Ok(vec![parse_vec(value)?]);
    }
    Err("Invalid embeddings format".to_string())
}

fn parse_vec(value: &Value) -> std::result::Result<Vec<f32>, String> {
    let arr = value.as_array().ok_or("Embedding is not an array")?;
    let mut out = Vec::with_capacity(arr.len());
    for v in arr {
        let n = v.as_f64().ok_or("Embedding value is not a number")?;
        out.push(n as f32);
    }
    Ok(out)
}

/// Offline bag-of-words embedder: every lower-cased word is hashed into one
/// of `dimensions` buckets, then the vector is L2-normalised.
#[derive(Clone, Debug)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_batch_embed_response() {
        let res = json!({"model": "nomic-embed-text", "embeddings": [[0.5, -1.0], [2.0, 0.25]]});
        assert_eq!(parse_embeddings(res).expect("parse"), vec![vec![0.5, -1.0], vec![2.0, 0.25]]);
    }

    #[test]
    fn parses_legacy_single_embedding_response() {
        let res = json!({"embedding": [0.1, 0.2, 0.3]});
        let parsed = parse_embeddings(res).expect("parse");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].len(), 3);
    }

    #[test]
    fn rejects_malformed_embedding_responses() {
        assert!(parse_embeddings(json!({"error": "model not found"})).is_err());
        assert!(parse_embeddings(json!({"embeddings": "nope"})).is_err());
        assert!(parse_embeddings(json!({"embedding": [0.1, "x"]})).is_err());
        assert_eq!(parse_embeddings(json!({"embeddings": []})).expect("parse"), Vec::<Vec<f32>>::new());
    }
}
