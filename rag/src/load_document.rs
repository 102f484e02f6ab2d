use std::path::Path;

use tracing::debug;

use crate::error::{RagError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Txt,
}

impl DocumentFormat {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }
}

/// An uploaded file waiting to be ingested.
#[derive(Clone, Debug)]
pub struct Document {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub format: DocumentFormat,
}

impl Document {
    pub fn from_upload(filename: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let filename = filename.into();
        let format = DocumentFormat::from_filename(&filename)
            .ok_or_else(|| RagError::UnsupportedFormat { filename: filename.clone() })?;
        Ok(Self { filename, bytes, format })
    }
}

/// Raw text pulled out of a document. PDF segments carry their 1-based page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub filename: String,
    pub page: Option<u32>,
}

type Loader = fn(&Document) -> Result<Segments>;

const LOADERS: [(DocumentFormat, Loader); 2] = [
    (DocumentFormat::Pdf, load_pdf),
    (DocumentFormat::Txt, load_txt),
];

pub fn load_document(doc: &Document) -> Result<Segments> {
    let (_, loader) = LOADERS
        .iter()
        .find(|(format, _)| *format == doc.format)
        .ok_or_else(|| RagError::UnsupportedFormat { filename: doc.filename.clone() })?;
    loader(doc)
}

fn load_txt(doc: &Document) -> Result<Segments> {
    let text = String::from_utf8_lossy(&doc.bytes).into_owned();
    Ok(Segments(Inner::Text(Some(Segment {
        text,
        filename: doc.filename.clone(),
        page: None,
    }))))
}

fn load_pdf(doc: &Document) -> Result<Segments> {
    let pdf = lopdf::Document::load_mem(&doc.bytes).map_err(|e| RagError::Pdf {
        filename: doc.filename.clone(),
        message: e.to_string(),
    })?;
    let pages: Vec<u32> = pdf.get_pages().keys().copied().collect();
    debug!(filename = %doc.filename, pages = pages.len(), "parsed PDF");
    Ok(Segments(Inner::Pdf {
        pdf: Box::new(pdf),
        pages: pages.into_iter(),
        filename: doc.filename.clone(),
    }))
}

/// Lazy, single-pass sequence of segments. PDF pages are extracted on demand.
pub struct Segments(Inner);

enum Inner {
    Text(Option<Segment>),
    Pdf {
        pdf: Box<lopdf::Document>,
        pages: std::vec::IntoIter<u32>,
        filename: String,
    },
}

impl Iterator for Segments {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.0 {
            Inner::Text(segment) => segment.take().map(Ok),
            Inner::Pdf { pdf, pages, filename } => {
                let page = pages.next()?;
                let segment = pdf
                    .extract_text(&[page])
                    .map(|text| Segment {
                        text,
                        filename: filename.clone(),
                        page: Some(page),
                    })
                    .map_err(|e| RagError::Pdf {
                        filename: filename.clone(),
                        message: format!("page {}: {}", page, e),
                    });
                Some(segment)
            }
        }
    }
}
