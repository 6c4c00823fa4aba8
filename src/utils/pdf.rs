// PDF utilities for the extraction flow.
// Keep this module small: it only wraps `pdf-extract`.

use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("{0}")]
    Parse(String),

    #[error("encrypted PDF is not supported: {0}")]
    Encrypted(String),
}

/// Extracts the text of a PDF stored fully in memory.
///
/// Pages are concatenated in document order with no separator. A page that
/// yields no text contributes an empty string.
pub fn extract_text(bytes: &[u8]) -> Result<String, PdfError> {
    let pages = extract_pages(bytes)?;
    let text: String = pages.iter().map(String::as_str).collect();
    Ok(text)
}

/// Extracts one string per page.
///
/// `pdf-extract` can panic on malformed input; panics are converted into
/// `PdfError::Parse`.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<String>, PdfError> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));

    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(err)) => {
            let message = err.to_string();
            let lowered = message.to_ascii_lowercase();
            if lowered.contains("encrypt") || lowered.contains("password") {
                Err(PdfError::Encrypted(message))
            } else {
                Err(PdfError::Parse(message))
            }
        }
        Err(_) => Err(PdfError::Parse(
            "PDF parser panicked (malformed document)".to_string(),
        )),
    }
}

/// Returns true if given content-type or head indicates a PDF file.
/// - Content-Type: application/pdf (case-insensitive, substring match)
/// - Magic bytes: %PDF-
pub fn is_pdf(content_type: Option<&str>, head: &[u8]) -> bool {
    let ct = content_type.unwrap_or("").to_ascii_lowercase();
    ct.contains("application/pdf") || head.starts_with(b"%PDF-")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Builds a PDF with one page per entry; `None` produces a page without
    /// any text operators.
    pub(crate) fn build_pdf(pages: &[Option<&str>]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for page in pages {
            let operations = match page {
                Some(text) => vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
                None => vec![],
            };
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("content encodes"),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).expect("pdf saves");
        buf
    }

    #[test]
    fn concatenates_pages_in_order() {
        let bytes = build_pdf(&[Some("Alpha"), Some("Bravo"), Some("Charlie")]);
        let text = extract_text(&bytes).expect("text extracted");
        let a = text.find("Alpha").expect("page 1 text");
        let b = text.find("Bravo").expect("page 2 text");
        let c = text.find("Charlie").expect("page 3 text");
        assert!(a < b && b < c);
    }

    #[test]
    fn empty_page_contributes_nothing() {
        let with_blank = build_pdf(&[Some("Alpha"), None, Some("Bravo")]);
        let pages = extract_pages(&with_blank).expect("pages extracted");
        assert_eq!(pages.len(), 3);
        assert!(pages[1].trim().is_empty());

        let text = extract_text(&with_blank).expect("text extracted");
        assert!(text.contains("Alpha"));
        assert!(text.contains("Bravo"));
    }

    #[test]
    fn rejects_non_pdf_bytes() {
        let err = extract_text(b"this is not a pdf").unwrap_err();
        assert!(matches!(err, PdfError::Parse(_)));
    }

    #[test]
    fn detects_pdf_by_header_or_magic() {
        assert!(is_pdf(Some("application/pdf"), b""));
        assert!(is_pdf(Some("Application/PDF; qs=0.9"), b""));
        assert!(is_pdf(None, b"%PDF-1.7\n"));
        assert!(!is_pdf(Some("text/html"), b"<html>"));
    }
}
