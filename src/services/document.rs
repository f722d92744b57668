// Document Ingestion
// Extracts plain text from uploaded .txt/.md/.docx files

use crate::services::providers::ProviderError;
use regex::Regex;
use std::io::{Cursor, Read};
use std::sync::OnceLock;
use tracing::info;
use zip::ZipArchive;

const DOCX_BODY: &str = "word/document.xml";

fn paragraph_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<w:p(?:\s[^>]*?)?(?:/>|>(.*?)</w:p>)").unwrap())
}

fn run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab/>").unwrap())
}

fn decode_xml_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Extract text by file extension. Paragraphs are separated by `\n`.
pub fn extract_text(file_name: &str, bytes: &[u8]) -> Result<String, ProviderError> {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let text = match ext.as_str() {
        "txt" | "md" => normalize_line_endings(&String::from_utf8_lossy(bytes)),
        "docx" => docx_text(bytes)?,
        _ => {
            return Err(ProviderError::InvalidInput(format!(
                "unsupported file type: {} (expected .txt, .md or .docx)",
                file_name
            )))
        }
    };

    info!(
        file = %file_name,
        bytes = bytes.len(),
        chars = text.chars().count(),
        "document.extracted"
    );
    Ok(text)
}

fn docx_text(bytes: &[u8]) -> Result<String, ProviderError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ProviderError::InvalidInput(format!("invalid docx archive: {}", e)))?;
    let mut entry = archive
        .by_name(DOCX_BODY)
        .map_err(|e| ProviderError::InvalidInput(format!("docx has no {}: {}", DOCX_BODY, e)))?;

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| ProviderError::InvalidInput(format!("failed to read {}: {}", DOCX_BODY, e)))?;

    Ok(docx_xml_to_text(&xml))
}

/// One output line per `<w:p>`; text comes from `<w:t>` runs only.
pub fn docx_xml_to_text(xml: &str) -> String {
    let mut paragraphs = Vec::new();
    for para in paragraph_regex().captures_iter(xml) {
        let inner = para.get(1).map_or("", |m| m.as_str());
        let mut line = String::new();
        for run in run_regex().captures_iter(inner) {
            match run.get(1) {
                Some(text) => line.push_str(&decode_xml_entities(text.as_str())),
                None => line.push('\t'),
            }
        }
        paragraphs.push(line);
    }
    paragraphs.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_docx(document_xml: &str) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("[Content_Types].xml", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"<Types/>").unwrap();
        writer.start_file(DOCX_BODY, SimpleFileOptions::default()).unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    const BODY: &str = r#"<w:document><w:body>
<w:p><w:pPr><w:pStyle w:val="Title"/></w:pPr><w:r><w:t>第一章 绪论</w:t></w:r></w:p>
<w:p w:rsidR="00A1"><w:r><w:t xml:space="preserve">Fish &amp; chips </w:t></w:r><w:r><w:t>&lt;tasty&gt;</w:t></w:r></w:p>
<w:p/>
<w:p><w:r><w:t>A</w:t><w:tab/><w:t>B</w:t></w:r></w:p>
</w:body></w:document>"#;

    #[test]
    fn test_docx_xml_paragraphs_and_entities() {
        let text = docx_xml_to_text(BODY);
        assert_eq!(text, "第一章 绪论\nFish & chips <tasty>\n\nA\tB");
    }

    #[test]
    fn test_extract_docx_archive() {
        let bytes = build_docx(BODY);
        let text = extract_text("Paper.DOCX", &bytes).unwrap();
        assert!(text.starts_with("第一章 绪论\n"));
    }

    #[test]
    fn test_extract_plain_text_normalizes_newlines() {
        let text = extract_text("notes.md", "line one\r\nline two\rline three".as_bytes()).unwrap();
        assert_eq!(text, "line one\nline two\nline three");
    }

    #[test]
    fn test_unsupported_or_corrupt_input() {
        let err = extract_text("paper.pdf", b"%PDF").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(_)));
        assert!(!err.is_service());

        assert!(matches!(
            extract_text("broken.docx", b"not a zip"),
            Err(ProviderError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_docx_without_body_is_invalid_input() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("[Content_Types].xml", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"<Types/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        match extract_text("empty.docx", &bytes) {
            Err(ProviderError::InvalidInput(msg)) => assert!(msg.contains(DOCX_BODY)),
            other => panic!("expected InvalidInput, got {:?}", other.map(|t| t.len())),
        }
    }
}
