//! Text extraction: script bytes + declared format → plain UTF-8 text.
//!
//! | Format | Source | Method |
//! |--------|--------|--------|
//! | PDF    | `.pdf`, `application/pdf` | pdfium text layer, page by page |
//! | TXT    | `.txt`, `.fountain`, `text/plain` | lossy UTF-8 decode |
//! | FDX    | `.fdx`, XML content types | `<Paragraph>`/`<Text>` runs via quick-xml |
//!
//! Scanned PDFs have no text layer; those fail with
//! [`SceneSplitError::ExtractionFailed`] rather than producing an empty prompt.

use crate::error::SceneSplitError;
use pdfium_render::prelude::*;
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Supported script formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptFormat {
    Pdf,
    /// Plain text, including Fountain.
    Txt,
    /// Final Draft XML.
    Fdx,
}

impl ScriptFormat {
    /// Detect from the filename extension.
    pub fn from_filename(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(ScriptFormat::Pdf),
            "txt" | "text" | "fountain" => Some(ScriptFormat::Txt),
            "fdx" => Some(ScriptFormat::Fdx),
            _ => None,
        }
    }

    /// Detect from a MIME type; parameters such as `; charset=utf-8` are ignored.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/pdf" => Some(ScriptFormat::Pdf),
            "text/plain" | "text/x-fountain" => Some(ScriptFormat::Txt),
            "application/xml" | "text/xml" | "application/x-fdx" => Some(ScriptFormat::Fdx),
            _ => None,
        }
    }

    /// Extension first, then content type.
    pub fn detect(filename: &str, content_type: Option<&str>) -> Result<Self, SceneSplitError> {
        ScriptFormat::from_filename(filename)
            .or_else(|| content_type.and_then(ScriptFormat::from_content_type))
            .ok_or_else(|| SceneSplitError::UnsupportedFormat {
                declared: Path::new(filename)
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .or_else(|| content_type.map(str::to_string))
                    .unwrap_or_else(|| filename.to_string()),
            })
    }

    pub fn label(self) -> &'static str {
        match self {
            ScriptFormat::Pdf => "PDF",
            ScriptFormat::Txt => "TXT",
            ScriptFormat::Fdx => "FDX",
        }
    }
}

impl fmt::Display for ScriptFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn failed(format: ScriptFormat, detail: impl Into<String>) -> SceneSplitError {
    SceneSplitError::ExtractionFailed {
        format: format.label().to_string(),
        detail: detail.into(),
    }
}

/// Extract plain text from a script payload.
///
/// PDF extraction runs inside `spawn_blocking`: pdfium is a synchronous C
/// library and would otherwise stall a runtime worker.
pub async fn extract_text(
    bytes: &[u8],
    format: ScriptFormat,
    pdfium_lib_path: Option<&Path>,
) -> Result<String, SceneSplitError> {
    let text = match format {
        ScriptFormat::Txt => extract_plain(bytes)?,
        ScriptFormat::Fdx => extract_fdx(bytes)?,
        ScriptFormat::Pdf => {
            let owned = bytes.to_vec();
            let lib = pdfium_lib_path.map(Path::to_path_buf);
            tokio::task::spawn_blocking(move || extract_pdf_blocking(&owned, lib.as_deref()))
                .await
                .map_err(|e| SceneSplitError::Internal(format!("Extraction task panicked: {}", e)))??
        }
    };

    info!("Extracted {} chars from {} script", text.chars().count(), format);
    Ok(text)
}

// ── TXT / Fountain ───────────────────────────────────────────────────────────

/// Decode plain text. Invalid UTF-8 sequences are replaced, a BOM is dropped
/// and line endings are normalised to `\n`.
pub fn extract_plain(bytes: &[u8]) -> Result<String, SceneSplitError> {
    let decoded = String::from_utf8_lossy(bytes);
    let text = tidy(decoded.trim_start_matches('\u{FEFF}'));
    if text.is_empty() {
        return Err(failed(ScriptFormat::Txt, "file appears to be empty"));
    }
    Ok(text)
}

fn tidy(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .trim()
        .to_string()
}

// ── FDX (Final Draft XML) ────────────────────────────────────────────────────

/// Extract the screenplay body of a Final Draft document.
///
/// Each `<Paragraph>` inside `<Content>` becomes one line (its `<Text>` runs
/// concatenated); a blank line precedes every `Scene Heading` paragraph so
/// the result reads like a plain-text screenplay.
pub fn extract_fdx(bytes: &[u8]) -> Result<String, SceneSplitError> {
    let mut reader = XmlReader::from_reader(bytes);
    let mut buf = Vec::new();

    let mut in_content = false;
    let mut in_text = false;
    let mut paragraph: Option<(String, String)> = None;
    let mut lines: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"Content" => in_content = true,
                b"Paragraph" if in_content => {
                    let kind = e
                        .try_get_attribute("Type")
                        .ok()
                        .flatten()
                        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
                        .unwrap_or_default();
                    paragraph = Some((kind, String::new()));
                }
                b"Text" if paragraph.is_some() => in_text = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"Content" => in_content = false,
                b"Paragraph" => {
                    if let Some((kind, text)) = paragraph.take() {
                        push_paragraph(&mut lines, &kind, &text);
                    }
                }
                b"Text" => in_text = false,
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let run = t
                    .unescape()
                    .map_err(|e| failed(ScriptFormat::Fdx, format!("bad text run: {}", e)))?;
                if let Some((_, text)) = paragraph.as_mut() {
                    text.push_str(&run);
                }
            }
            Ok(Event::CData(c)) if in_text => {
                if let Some((_, text)) = paragraph.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(failed(
                    ScriptFormat::Fdx,
                    format!("malformed XML at byte {}: {}", reader.buffer_position(), e),
                ));
            }
        }
        buf.clear();
    }

    let text = lines.join("\n").trim().to_string();
    if text.is_empty() {
        return Err(failed(ScriptFormat::Fdx, "no screenplay paragraphs found"));
    }
    debug!("FDX: {} lines", lines.len());
    Ok(text)
}

fn push_paragraph(lines: &mut Vec<String>, kind: &str, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if kind == "Scene Heading" && lines.last().is_some_and(|l| !l.is_empty()) {
        lines.push(String::new());
    }
    lines.push(text.to_string());
}

// ── PDF ──────────────────────────────────────────────────────────────────────

fn extract_pdf_blocking(bytes: &[u8], pdfium_lib_path: Option<&Path>) -> Result<String, SceneSplitError> {
    if !bytes.starts_with(b"%PDF") {
        let magic: Vec<u8> = bytes.iter().take(4).copied().collect();
        return Err(failed(
            ScriptFormat::Pdf,
            format!("not a PDF file (first bytes: {:?})", magic),
        ));
    }

    let pdfium = bind_pdfium(pdfium_lib_path)?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| failed(ScriptFormat::Pdf, format!("cannot open document: {:?}", e)))?;

    let pages = document.pages();
    debug!("PDF loaded: {} pages", pages.len());

    let mut text = String::new();
    for (idx, page) in pages.iter().enumerate() {
        match page.text() {
            Ok(page_text) => {
                let content = page_text.all();
                if !content.trim().is_empty() {
                    text.push_str(content.trim_end());
                    text.push('\n');
                }
            }
            Err(e) => warn!("Page {}: no text layer ({:?})", idx + 1, e),
        }
    }

    let text = tidy(&text);
    if text.is_empty() {
        return Err(failed(
            ScriptFormat::Pdf,
            "no text content found in PDF (is it a scanned image?)",
        ));
    }
    Ok(text)
}

/// Bind pdfium from an explicit directory, `PDFIUM_LIB_PATH`, or the system.
fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, SceneSplitError> {
    let configured: Option<PathBuf> = lib_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    let bindings = match configured {
        Some(path) => {
            let library = if path.is_file() {
                path
            } else {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            };
            debug!("Binding pdfium from {}", library.display());
            Pdfium::bind_to_library(library)
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| SceneSplitError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FDX: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no" ?>
<FinalDraft DocumentType="Script" Template="No" Version="5">
  <Content>
    <Paragraph Type="Scene Heading">
      <Text>INT. KITCHEN - NIGHT</Text>
    </Paragraph>
    <Paragraph Type="Action">
      <Text>Rain hammers the window. </Text><Text Style="Bold">MAYA</Text><Text> waits.</Text>
    </Paragraph>
    <Paragraph Type="Character">
      <Text>MAYA</Text>
    </Paragraph>
    <Paragraph Type="Dialogue">
      <Text>You&apos;re late.</Text>
    </Paragraph>
    <Paragraph Type="Action"/>
    <Paragraph Type="Scene Heading">
      <Text>EXT. JETTY - DAWN</Text>
    </Paragraph>
  </Content>
  <TitlePage>
    <Content>
      <Paragraph><Text>Title page</Text></Paragraph>
    </Content>
  </TitlePage>
</FinalDraft>"#;

    #[test]
    fn detect_by_extension_then_content_type() {
        assert_eq!(ScriptFormat::detect("draft.PDF", None).unwrap(), ScriptFormat::Pdf);
        assert_eq!(ScriptFormat::detect("draft.fountain", None).unwrap(), ScriptFormat::Txt);
        assert_eq!(ScriptFormat::detect("draft.fdx", Some("application/pdf")).unwrap(), ScriptFormat::Fdx);
        assert_eq!(
            ScriptFormat::detect("upload", Some("text/plain; charset=utf-8")).unwrap(),
            ScriptFormat::Txt
        );
    }

    #[test]
    fn unknown_format_is_unsupported() {
        match ScriptFormat::detect("notes.docx", Some("application/octet-stream")) {
            Err(SceneSplitError::UnsupportedFormat { declared }) => assert_eq!(declared, ".docx"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            ScriptFormat::detect("upload", None),
            Err(SceneSplitError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn plain_text_is_tidied() {
        let text = extract_plain(b"\xEF\xBB\xBFFADE IN:\r\n\r\nINT. HOUSE - DAY\r\n  ").unwrap();
        assert_eq!(text, "FADE IN:\n\nINT. HOUSE - DAY");
    }

    #[test]
    fn plain_text_invalid_utf8_is_replaced() {
        let text = extract_plain(b"EXT. CAF\xE9 - DAY").unwrap();
        assert!(text.starts_with("EXT. CAF"));
    }

    #[test]
    fn empty_plain_text_fails() {
        assert!(matches!(
            extract_plain(b"  \n\t "),
            Err(SceneSplitError::ExtractionFailed { .. })
        ));
    }

    #[test]
    fn fdx_paragraphs_become_lines() {
        let text = extract_fdx(SAMPLE_FDX.as_bytes()).unwrap();
        assert_eq!(
            text,
            "INT. KITCHEN - NIGHT\nRain hammers the window. MAYA waits.\nMAYA\nYou're late.\n\nEXT. JETTY - DAWN\nTitle page"
        );
    }

    #[test]
    fn fdx_without_content_fails() {
        let err = extract_fdx(b"<FinalDraft><HeaderAndFooter/></FinalDraft>").unwrap_err();
        assert!(matches!(err, SceneSplitError::ExtractionFailed { .. }));
    }

    #[test]
    fn fdx_mismatched_tags_fail() {
        let err = extract_fdx(b"<FinalDraft><Content><Paragraph><Text>A</Paragraph></Content>").unwrap_err();
        assert!(matches!(err, SceneSplitError::ExtractionFailed { .. }));
    }

    #[tokio::test]
    async fn pdf_magic_is_checked_before_binding() {
        let err = extract_text(b"hello", ScriptFormat::Pdf, None).await.unwrap_err();
        match err {
            SceneSplitError::ExtractionFailed { format, detail } => {
                assert_eq!(format, "PDF");
                assert!(detail.contains("not a PDF"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
