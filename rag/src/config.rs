use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{RagError, Result};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant that answers questions based on the provided context. \
Use only the information from the context to answer the question. If the context doesn't contain enough \
information to answer the question, say \"I don't have enough information to answer this question based on the provided context.\"";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbedProvider {
    Ollama,
    Hash,
}

impl FromStr for EmbedProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            other => Err(format!("expected `ollama` or `hash`, got `{}`", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_key: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub model_name: String,
    pub llm_base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_k: usize,
    pub embed_provider: EmbedProvider,
    pub ollama_url: String,
    pub embed_model: String,
    pub hash_dimensions: usize,
    pub store_dir: PathBuf,
    pub dedupe_uploads: bool,
    pub answer_without_context: bool,
    pub system_prompt: String,
    pub log_level: String,
    pub log_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env if present so the API key does not have to be exported by hand.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parses and validates settings from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("API_KEY")
            .or_else(|| get("GROQ_API_KEY"))
            .ok_or_else(|| RagError::InvalidConfig("API_KEY is required".to_string()))?;

        let cfg = Self {
            api_key,
            chunk_size: parse_or(&get, "CHUNK_SIZE", 1000)?,
            chunk_overlap: parse_or(&get, "CHUNK_OVERLAP", 200)?,
            model_name: get("MODEL_NAME").unwrap_or_else(|| "llama3-70b-8192".to_string()),
            llm_base_url: get("LLM_BASE_URL")
                .unwrap_or_else(|| "https://api.groq.com/openai/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            temperature: parse_or(&get, "TEMPERATURE", 0.7)?,
            max_tokens: parse_or(&get, "MAX_TOKENS", 4096)?,
            top_k: parse_or(&get, "TOP_K", 4)?,
            embed_provider: parse_or(&get, "EMBED_PROVIDER", EmbedProvider::Ollama)?,
            ollama_url: get("OLLAMA_URL")
                .unwrap_or_else(|| "http://localhost:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
            embed_model: get("EMBEDDING_MODEL").unwrap_or_else(|| "nomic-embed-text".to_string()),
            hash_dimensions: parse_or(&get, "HASH_EMBED_DIM", 384)?,
            store_dir: get("STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./docbuddy_store")),
            dedupe_uploads: parse_flag(&get, "DEDUPE_UPLOADS", true)?,
            answer_without_context: parse_flag(&get, "ANSWER_WITHOUT_CONTEXT", false)?,
            system_prompt: get("SYSTEM_PROMPT").unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_file: get("LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("docbuddy.log")),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfig("CHUNK_SIZE must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "CHUNK_OVERLAP ({}) must be less than CHUNK_SIZE ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::InvalidConfig("TOP_K must be greater than zero".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::InvalidConfig(format!(
                "TEMPERATURE must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        if self.embed_provider == EmbedProvider::Hash && self.hash_dimensions == 0 {
            return Err(RagError::InvalidConfig("HASH_EMBED_DIM must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| RagError::InvalidConfig(format!("{} = `{}`: {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_flag<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(RagError::InvalidConfig(format!("{} must be a boolean, got `{}`", key, v))),
    }
}
