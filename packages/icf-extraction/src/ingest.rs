//! Protocol ingest - text, PDF and DOCX files into a [`DocumentStore`].
//!
//! Page boundaries in text are taken from, in order of preference:
//! 1. `--- PAGE N ---` marker lines
//! 2. form feeds (`pdftotext` output), numbered from 1
//! 3. paragraphs packed into pages of about [`PAGE_CHAR_LIMIT`] characters
//!
//! PDFs keep their own page numbers. DOCX files are split on explicit page
//! breaks and fall back to paragraph packing when there are none.
//!
//! Blank pages are dropped; their numbers are not reused.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use tracing::{info, warn};

use crate::error::{IngestError, IngestResult};
use crate::types::document::DocumentStore;

/// Target page size when the text carries no page boundaries.
pub const PAGE_CHAR_LIMIT: usize = 3000;

const DOCX_BODY: &str = "word/document.xml";

fn page_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*---[ \t]*PAGE[ \t]+(\d+)[ \t]*---[ \t]*\r?$")
            .expect("page marker regex is valid")
    })
}

fn paragraph_break_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\r?\n").expect("paragraph regex is valid"))
}

/// Split on `--- PAGE N ---` markers. Text before the first marker joins
/// the first page. Returns `None` if there are no markers.
fn split_marked_pages(text: &str) -> Option<Vec<(u32, String)>> {
    let markers: Vec<(u32, usize, usize)> = page_marker_regex()
        .captures_iter(text)
        .filter_map(|c| {
            let whole = c.get(0)?;
            let page = c.get(1)?.as_str().parse().ok()?;
            Some((page, whole.start(), whole.end()))
        })
        .collect();

    let first = markers.first()?;
    let preamble = text[..first.1].trim();

    let mut pages = Vec::with_capacity(markers.len());
    for (i, &(page, _, body_start)) in markers.iter().enumerate() {
        let body_end = markers.get(i + 1).map_or(text.len(), |next| next.1);
        let body = text[body_start..body_end].trim();
        let body = if i == 0 && !preamble.is_empty() {
            format!("{preamble}\n{body}")
        } else {
            body.to_string()
        };
        pages.push((page, body));
    }

    Some(pages)
}

fn split_form_feeds(text: &str) -> Option<Vec<(u32, String)>> {
    if !text.contains('\x0c') {
        return None;
    }

    Some(
        text.split('\x0c')
            .enumerate()
            .map(|(i, page)| ((i + 1) as u32, page.trim().to_string()))
            .collect(),
    )
}

fn pack_paragraphs(text: &str) -> Vec<(u32, String)> {
    let mut pages = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut length = 0;

    for paragraph in paragraph_break_regex().split(text) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        current.push(paragraph);
        length += paragraph.len();

        if length >= PAGE_CHAR_LIMIT {
            pages.push(((pages.len() + 1) as u32, current.join("\n\n")));
            current.clear();
            length = 0;
        }
    }

    if !current.is_empty() {
        pages.push(((pages.len() + 1) as u32, current.join("\n\n")));
    }

    pages
}

/// Build a document store from protocol text.
pub fn parse_protocol_text(source: &str, text: &str) -> IngestResult<DocumentStore> {
    let pages = split_marked_pages(text)
        .or_else(|| split_form_feeds(text))
        .unwrap_or_else(|| pack_paragraphs(text));

    store_from_pages(source, pages)
}

fn store_from_pages(source: &str, pages: Vec<(u32, String)>) -> IngestResult<DocumentStore> {
    let pages: Vec<(u32, String)> = pages
        .into_iter()
        .filter(|(_, body)| !body.trim().is_empty())
        .collect();

    if pages.is_empty() {
        return Err(IngestError::Empty {
            source_name: source.to_string(),
        });
    }

    DocumentStore::from_pages(source, pages)
}

/// Text of each PDF page, numbered as the PDF numbers them.
fn read_pdf_pages(path: &Path) -> IngestResult<Vec<(u32, String)>> {
    let document = lopdf::Document::load(path).map_err(|e| IngestError::Decode {
        format: "pdf",
        reason: e.to_string(),
    })?;

    let mut pages = Vec::new();
    for page in document.get_pages().into_keys() {
        match document.extract_text(&[page]) {
            Ok(text) => pages.push((page, text.trim().to_string())),
            Err(e) => {
                warn!(path = %path.display(), page, error = %e, "No text layer on PDF page");
            }
        }
    }

    Ok(pages)
}

fn read_docx_body(path: &Path) -> IngestResult<String> {
    let decode = |reason: String| IngestError::Decode {
        format: "docx",
        reason,
    };

    let mut archive = zip::ZipArchive::new(File::open(path)?).map_err(|e| decode(e.to_string()))?;
    let mut entry = archive
        .by_name(DOCX_BODY)
        .map_err(|e| decode(format!("{DOCX_BODY}: {e}")))?;

    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

fn is_page_break(element: &BytesStart) -> bool {
    element.local_name().as_ref() == b"br"
        && element.attributes().flatten().any(|attr| {
            attr.key.local_name().as_ref() == b"type" && attr.value.as_ref() == b"page"
        })
}

/// Pages of a WordprocessingML body, split on `<w:br w:type="page"/>`.
/// Without any explicit page break the paragraphs are packed like plain text.
fn split_docx_pages(xml: &str) -> IngestResult<Vec<(u32, String)>> {
    let malformed = |e: quick_xml::Error| IngestError::Decode {
        format: "docx",
        reason: e.to_string(),
    };

    let mut reader = Reader::from_str(xml);
    let mut pages: Vec<Vec<String>> = vec![Vec::new()];
    let mut paragraph = String::new();
    let mut in_text = false;
    let mut breaks = 0;

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) if e.local_name().as_ref() == b"t" => in_text = false,
            Event::Text(t) if in_text => {
                paragraph.push_str(&t.unescape().map_err(malformed)?);
            }
            Event::Empty(e) if is_page_break(&e) => {
                breaks += 1;
                if let Some(page) = pages.last_mut() {
                    page.push(std::mem::take(&mut paragraph));
                }
                pages.push(Vec::new());
            }
            Event::Empty(e) if e.local_name().as_ref() == b"br" => paragraph.push('\n'),
            Event::Empty(e) if e.local_name().as_ref() == b"tab" => paragraph.push('\t'),
            Event::End(e) if e.local_name().as_ref() == b"p" => {
                if let Some(page) = pages.last_mut() {
                    page.push(std::mem::take(&mut paragraph));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let pages: Vec<String> = pages
        .into_iter()
        .map(|paragraphs| {
            paragraphs
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n")
        })
        .collect();

    if breaks == 0 {
        return Ok(pack_paragraphs(&pages.join("\n\n")));
    }

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, body)| ((i + 1) as u32, body))
        .collect())
}

/// Load a protocol from a `.txt`, `.pdf` or `.docx` file.
pub fn load_protocol(path: impl AsRef<Path>) -> IngestResult<DocumentStore> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IngestError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let source = path.display().to_string();

    let store = match extension.as_str() {
        "pdf" => store_from_pages(&source, read_pdf_pages(path)?)?,
        "docx" => store_from_pages(&source, split_docx_pages(&read_docx_body(path)?)?)?,
        "doc" => return Err(IngestError::UnsupportedFormat { extension }),
        _ => parse_protocol_text(&source, &std::fs::read_to_string(path)?)?,
    };

    info!(
        path = %path.display(),
        format = if extension.is_empty() { "txt" } else { extension.as_str() },
        pages = store.page_count(),
        chars = store.full_text().len(),
        "Loaded protocol"
    );

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_page_markers() {
        let text = "Cover note\n--- PAGE 1 ---\nTitle\n\n--- PAGE 2 ---\n   \n--- PAGE 3 ---\nDrug X every 21 days.\n";
        let store = parse_protocol_text("p.txt", text).unwrap();

        let pages: Vec<u32> = store.segments().iter().map(|s| s.page).collect();
        assert_eq!(pages, vec![1, 3]);
        assert_eq!(store.segments()[0].text, "Cover note\nTitle");
        assert_eq!(store.segments()[1].text, "Drug X every 21 days.");
    }

    #[test]
    fn test_out_of_order_markers_rejected() {
        let text = "--- PAGE 2 ---\nb\n--- PAGE 1 ---\na\n";
        assert!(matches!(
            parse_protocol_text("p.txt", text),
            Err(IngestError::PageOrder { previous: 2, page: 1 })
        ));
    }

    #[test]
    fn test_form_feeds() {
        let text = "Page one\x0c\x0cPage three";
        let store = parse_protocol_text("p.txt", text).unwrap();
        let pages: Vec<u32> = store.segments().iter().map(|s| s.page).collect();
        assert_eq!(pages, vec![1, 3]);
    }

    #[test]
    fn test_paragraph_packing() {
        let paragraph = "word ".repeat(400);
        let text = format!("{paragraph}\n\n{paragraph}\n\nshort tail");
        let store = parse_protocol_text("p.txt", &text).unwrap();

        assert_eq!(store.page_count(), 2);
        assert_eq!(store.segments()[1].text, "short tail");
    }

    #[test]
    fn test_empty_text_rejected() {
        assert!(matches!(
            parse_protocol_text("p.txt", "\n\n   \n"),
            Err(IngestError::Empty { .. })
        ));
    }

    #[test]
    fn test_load_protocol() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "--- PAGE 42 ---\nPatients will receive drug X every 21 days.").unwrap();

        let store = load_protocol(file.path()).unwrap();
        assert_eq!(store.segments()[0].page, 42);
    }

    fn docx_file(body: &str) -> tempfile::NamedTempFile {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        );

        let file = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
        let mut zip = zip::ZipWriter::new(file.reopen().unwrap());
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.start_file(DOCX_BODY, options).unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
        file
    }

    #[test]
    fn test_docx_page_breaks() {
        let file = docx_file(concat!(
            r#"<w:p><w:r><w:t>Protocol title</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#,
            r#"<w:p><w:r><w:t xml:space="preserve">Patients will receive </w:t></w:r>"#,
            r#"<w:r><w:t>drug X every 21 days &amp; weekly labs.</w:t></w:r></w:p>"#,
        ));

        let store = load_protocol(file.path()).unwrap();
        let pages: Vec<u32> = store.segments().iter().map(|s| s.page).collect();
        assert_eq!(pages, vec![1, 2]);
        assert_eq!(store.segments()[0].text, "Protocol title");
        assert_eq!(
            store.segments()[1].text,
            "Patients will receive drug X every 21 days & weekly labs."
        );
    }

    #[test]
    fn test_docx_without_breaks_is_packed() {
        let paragraph = "word ".repeat(700);
        let file = docx_file(&format!(
            "<w:p><w:r><w:t>{paragraph}</w:t></w:r></w:p><w:p><w:r><w:t>Tail</w:t><w:br/></w:r></w:p>"
        ));

        let store = load_protocol(file.path()).unwrap();
        assert_eq!(store.page_count(), 2);
        assert_eq!(store.segments()[1].text, "Tail");
    }

    #[test]
    fn test_unreadable_documents() {
        let mut pdf = tempfile::Builder::new().suffix(".PDF").tempfile().unwrap();
        write!(pdf, "not a pdf").unwrap();
        assert!(matches!(
            load_protocol(pdf.path()),
            Err(IngestError::Decode { format: "pdf", .. })
        ));

        let mut docx = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
        write!(docx, "not a zip").unwrap();
        assert!(matches!(
            load_protocol(docx.path()),
            Err(IngestError::Decode { format: "docx", .. })
        ));
    }

    #[test]
    fn test_legacy_and_missing_files_rejected() {
        let file = tempfile::Builder::new().suffix(".doc").tempfile().unwrap();
        assert!(matches!(
            load_protocol(file.path()),
            Err(IngestError::UnsupportedFormat { ref extension }) if extension == "doc"
        ));
        assert!(matches!(
            load_protocol("/nonexistent/protocol.txt"),
            Err(IngestError::NotFound { .. })
        ));
    }
}
