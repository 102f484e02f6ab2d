use crate::config::Config;
use crate::vector_store::Hit;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

pub fn build_prompt_with_context(
    cfg: &Config,
    question: &str,
    hits: &[Hit],
) -> (Vec<Message>, String) {
    let context = format_context_from_hits(hits);

    let user_content = format!(
        "Use the context below to answer the question.\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        context, question
    );

    let messages = vec![Message::system(cfg.system_prompt.clone()), Message::user(user_content)];

    (messages, context)
}

/// Chunk texts in retrieval order, each headed by its source file.
pub fn format_context_from_hits(hits: &[Hit]) -> String {
    let context_lines: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            let r = &hit.record;
            format!("[{}] {} (chunk {})\n{}", i + 1, r.filename, r.position, r.text)
        })
        .collect();

    if context_lines.is_empty() {
        "(no context found)".to_string()
    } else {
        context_lines.join("\n\n")
    }
}
