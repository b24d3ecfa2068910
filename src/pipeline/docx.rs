//! Raw-text extraction from Word documents.
//!
//! A `.docx` file is a zip archive; the body lives in `word/document.xml`.
//! We stream that part through quick-xml and keep only run text, so there
//! is no layout, styling or numbering in the output. Each paragraph ends
//! with a blank line, tabs and manual line breaks are kept.

use crate::error::IngestError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::debug;

const DOCUMENT_PART: &str = "word/document.xml";

/// Extract the raw text of the DOCX at `path`.
pub async fn extract_docx_text(path: &Path) -> Result<String, IngestError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path)
            .map_err(|e| IngestError::DocxFailed(format!("cannot open {}: {}", path.display(), e)))?;
        let text = read_archive(file)?;
        debug!("Extracted {} chars from {}", text.len(), path.display());
        Ok(text)
    })
    .await
    .map_err(|e| IngestError::Internal(format!("DOCX task panicked: {e}")))?
}

fn read_archive<R: Read + Seek>(reader: R) -> Result<String, IngestError> {
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| IngestError::DocxFailed(format!("Failed to open DOCX: {e}")))?;
    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| IngestError::DocxFailed(format!("Failed to find {DOCUMENT_PART}: {e}")))?;

    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| IngestError::DocxFailed(format!("Failed to read {DOCUMENT_PART}: {e}")))?;

    parse_document_xml(&xml)
}

pub(crate) fn parse_document_xml(xml: &str) -> Result<String, IngestError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut text = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => text.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" | b"cr" => text.push('\n'),
                b"p" => text.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let decoded = e
                    .decode()
                    .map_err(|e| IngestError::DocxFailed(format!("XML parsing error: {e}")))?;
                text.push_str(&decoded);
            }
            Ok(Event::GeneralRef(e)) if in_text => {
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    text.push(ch);
                } else {
                    let name = e
                        .decode()
                        .map_err(|e| IngestError::DocxFailed(format!("XML parsing error: {e}")))?;
                    if let Some(resolved) = quick_xml::escape::resolve_predefined_entity(&name) {
                        text.push_str(resolved);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(IngestError::DocxFailed(format!("XML parsing error: {e}")));
            }
            _ => {}
        }
    }

    Ok(text)
}
