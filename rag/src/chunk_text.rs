use crate::error::{RagError, Result};
use crate::load_document::Segment;

/// A window of a document's text, in document order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub filename: String,
    pub position: usize,
}

/// Splits `text` into windows of `size` characters, each starting
/// `size - overlap` characters after the previous one. The last window ends
/// at the end of the text and may be shorter than `size`.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    check_window(size, overlap)?;
    if text.trim().is_empty() {
        return Ok(vec![]);
    }

    let chars: Vec<char> = text.chars().collect();
    let len_chars = chars.len();
    let step = size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + size).min(len_chars);
        chunks.push(chars[start..end].iter().collect());
        if end == len_chars {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Chunks every segment, numbering chunks per filename across segments.
pub fn chunk_segments<I>(segments: I, size: usize, overlap: usize) -> Result<Vec<Chunk>>
where
    I: IntoIterator<Item = Result<Segment>>,
{
    check_window(size, overlap)?;

    let mut out: Vec<Chunk> = Vec::new();
    for segment in segments {
        let segment = segment?;
        let mut position = out
            .iter()
            .rev()
            .find(|c| c.filename == segment.filename)
            .map(|c| c.position + 1)
            .unwrap_or(0);
        for text in chunk_text(&segment.text, size, overlap)? {
            out.push(Chunk {
                text,
                filename: segment.filename.clone(),
                position,
            });
            position += 1;
        }
    }
    Ok(out)
}

fn check_window(size: usize, overlap: usize) -> Result<()> {
    if size == 0 {
        return Err(RagError::InvalidConfig("chunk size must be positive".to_string()));
    }
    if overlap >= size {
        return Err(RagError::InvalidConfig(format!(
            "chunk overlap ({}) must be less than chunk size ({})",
            overlap, size
        )));
    }
    Ok(())
}
