//! Text extraction from downloaded file blobs.
//!
//! Extraction is a pure transform over an in-memory buffer. "No text" is an
//! empty string; `Err` is reserved for blobs that claim a format but cannot
//! be decoded as it (corrupt PDF, broken DOCX archive).

use lopdf::Document;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use std::ops::RangeInclusive;
use tracing::debug;

use super::format::FileFormat;
use crate::error::{AppError, Result};

/// Bytes inspected when sniffing opaque blobs for binary content
const BINARY_SNIFF_LEN: usize = 8192;
const DOCX_BODY: &str = "word/document.xml";

/// Extract all text from a blob of the given format
pub fn extract(blob: &[u8], format: FileFormat) -> Result<String> {
    match format {
        FileFormat::Pdf => extract_pdf(blob, None),
        FileFormat::Docx => extract_docx(blob),
        FileFormat::PlainText | FileFormat::NativeExport => {
            Ok(String::from_utf8_lossy(blob).into_owned())
        }
        FileFormat::Unsupported => Ok(decode_opaque(blob)),
    }
}

/// Extract text from PDF pages.
///
/// `pages` is an inclusive, 1-based page range; pages past the end are
/// ignored. A page without recoverable text contributes an empty string.
pub fn extract_pdf(blob: &[u8], pages: Option<RangeInclusive<u32>>) -> Result<String> {
    let doc = Document::load_mem(blob)
        .map_err(|e| AppError::Extraction(format!("PDF could not be parsed: {e}")))?;

    let mut text = String::new();
    for page_number in doc.get_pages().keys() {
        if let Some(range) = &pages {
            if !range.contains(page_number) {
                continue;
            }
        }
        match doc.extract_text(&[*page_number]) {
            Ok(page_text) if !page_text.trim().is_empty() => {
                text.push_str(&page_text);
                if !page_text.ends_with('\n') {
                    text.push('\n');
                }
            }
            Ok(_) => {}
            Err(e) => debug!("No text on PDF page {page_number}: {e}"),
        }
    }

    Ok(text)
}

/// Concatenate paragraph text from a DOCX archive, one line per paragraph
pub fn extract_docx(blob: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(blob))
        .map_err(|e| AppError::Extraction(format!("DOCX archive could not be opened: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .map_err(|e| AppError::Extraction(format!("DOCX has no document body: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| AppError::Extraction(format!("DOCX body is unreadable: {e}")))?;

    paragraphs_from_document_xml(&xml)
}

fn paragraphs_from_document_xml(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_run_text = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:p" | b"w:br" | b"w:cr" => text.push('\n'),
                b"w:tab" => text.push('\t'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_run_text => {
                let decoded = t
                    .unescape()
                    .map_err(|e| AppError::Extraction(format!("DOCX text is malformed: {e}")))?;
                text.push_str(&decoded);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AppError::Extraction(format!(
                    "DOCX XML is malformed at {}: {e}",
                    reader.buffer_position()
                )))
            }
            Ok(_) => {}
        }
    }

    Ok(text)
}

/// Best-effort decoding for formats without a dedicated extractor
fn decode_opaque(blob: &[u8]) -> String {
    let check_len = blob.len().min(BINARY_SNIFF_LEN);
    if blob[..check_len].contains(&0) {
        return String::new();
    }
    match std::str::from_utf8(blob) {
        Ok(text) => text.to_string(),
        Err(_) => String::new(),
    }
}

/// Parse a "start-end" page range such as "1-5" (1-based, inclusive)
pub fn parse_page_range(range: &str) -> Result<RangeInclusive<u32>> {
    let invalid = || AppError::Other(format!("Invalid page range '{range}'. Use e.g. 1-5"));
    let (start, end) = range.split_once('-').ok_or_else(invalid)?;
    let start: u32 = start.trim().parse().map_err(|_| invalid())?;
    let end: u32 = end.trim().parse().map_err(|_| invalid())?;
    if start == 0 || end < start {
        return Err(invalid());
    }
    Ok(start..=end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file(DOCX_BODY, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn test_plain_text_passthrough() {
        let text = extract("hola mundo".as_bytes(), FileFormat::PlainText).unwrap();
        assert_eq!(text, "hola mundo");
    }

    #[test]
    fn test_plain_text_invalid_utf8_is_lossy() {
        let text = extract(&[b'a', 0xff, b'b'], FileFormat::PlainText).unwrap();
        assert!(text.starts_with('a'));
        assert!(text.ends_with('b'));
    }

    #[test]
    fn test_unsupported_binary_yields_empty() {
        let blob = [0x89, b'P', b'N', b'G', 0x00, 0x01];
        assert_eq!(extract(&blob, FileFormat::Unsupported).unwrap(), "");
    }

    #[test]
    fn test_unsupported_utf8_is_decoded() {
        let text = extract("plain words".as_bytes(), FileFormat::Unsupported).unwrap();
        assert_eq!(text, "plain words");
    }

    #[test]
    fn test_docx_paragraphs() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>First</w:t></w:r><w:r><w:t xml:space="preserve"> paragraph</w:t></w:r></w:p>
    <w:p/>
    <w:p><w:r><w:t>Fish &amp; chips</w:t><w:tab/><w:t>end</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = extract(&docx_with_body(body), FileFormat::Docx).unwrap();
        assert_eq!(text, "First paragraph\n\nFish & chips\tend\n");
    }

    #[test]
    fn test_docx_without_body_is_extraction_error() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"<x/>").unwrap();
            writer.finish().unwrap();
        }
        let result = extract(&buffer.into_inner(), FileFormat::Docx);
        assert!(matches!(result, Err(AppError::Extraction(_))));
    }

    #[test]
    fn test_corrupt_pdf_is_extraction_error() {
        let result = extract(b"definitely not a pdf", FileFormat::Pdf);
        assert!(matches!(result, Err(AppError::Extraction(_))));
    }

    #[test]
    fn test_parse_page_range() {
        assert_eq!(parse_page_range("1-5").unwrap(), 1..=5);
        assert_eq!(parse_page_range(" 2 - 2 ").unwrap(), 2..=2);
        assert!(parse_page_range("0-3").is_err());
        assert!(parse_page_range("5-1").is_err());
        assert!(parse_page_range("abc").is_err());
    }
}
