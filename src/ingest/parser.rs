use crate::error::{OrchestratorError, Result};
use crate::models::chunk::DocumentType;

/// The UTF-8 text extracted from an asset, plus a page count when the
/// format carries one.
#[derive(Debug)]
pub struct ParsedDocument {
    pub text: String,
    pub page_count: Option<usize>,
}

/// Extraction step of C3. Plain text is always supported; PDF/DOCX
/// extractors may be absent for a given build — here both are present, but
/// any `content_type` this crate doesn't recognize fails with
/// `UnsupportedFormat` rather than silently falling back to a text read.
pub struct DocumentParser;

impl DocumentParser {
    pub fn parse(
        file_bytes: &[u8],
        document_type: DocumentType,
    ) -> Result<ParsedDocument> {
        match document_type {
            DocumentType::Pdf => Self::parse_pdf(file_bytes),
            DocumentType::Docx => Self::parse_docx(file_bytes),
            DocumentType::Txt | DocumentType::Md => Self::parse_text(file_bytes),
        }
    }

    fn parse_pdf(file_bytes: &[u8]) -> Result<ParsedDocument> {
        let doc = lopdf::Document::load_mem(file_bytes).map_err(|e| {
            OrchestratorError::ProviderPermanent(format!("failed to load PDF: {e}")).log()
        })?;
        let page_count = doc.get_pages().len();

        let mut text = String::new();
        for page_num in 1..=page_count as u32 {
            if let Ok(page_text) = doc.extract_text(&[page_num]) {
                text.push_str(&page_text);
                text.push('\n');
            }
        }

        Ok(ParsedDocument {
            text,
            page_count: Some(page_count),
        })
    }

    fn parse_docx(file_bytes: &[u8]) -> Result<ParsedDocument> {
        use docx_rs::{read_docx, DocumentChild, ParagraphChild, RunChild};

        let docx = read_docx(file_bytes).map_err(|e| {
            OrchestratorError::ProviderPermanent(format!("failed to load DOCX: {e}")).log()
        })?;

        let mut text = String::new();
        for child in docx.document.children {
            if let DocumentChild::Paragraph(para) = child {
                for child in para.children {
                    if let ParagraphChild::Run(run) = child {
                        for child in run.children {
                            if let RunChild::Text(run_text) = child {
                                text.push_str(&run_text.text);
                            }
                        }
                    }
                }
                text.push('\n');
            }
        }

        Ok(ParsedDocument {
            text,
            page_count: None,
        })
    }

    fn parse_text(file_bytes: &[u8]) -> Result<ParsedDocument> {
        let (decoded, _, had_errors) = encoding_rs::UTF_8.decode(file_bytes);
        if had_errors {
            tracing::debug!("plain-text asset had invalid UTF-8 sequences; replaced lossily");
        }

        Ok(ParsedDocument {
            text: decoded.into_owned(),
            page_count: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_text() {
        let parsed = DocumentParser::parse(b"hello world", DocumentType::Txt).unwrap();
        assert_eq!(parsed.text, "hello world");
        assert!(parsed.page_count.is_none());
    }

    #[test]
    fn parses_markdown_as_plain_text() {
        let parsed = DocumentParser::parse(b"# Title\n\nbody", DocumentType::Md).unwrap();
        assert!(parsed.text.contains("# Title"));
    }
}
