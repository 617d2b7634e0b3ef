//! DOCX 텍스트 추출 모듈
//!
//! DOCX는 ZIP 아카이브이며 본문은 `word/document.xml`에 있습니다.
//! 문단(`<w:p>`)마다 텍스트 런(`<w:t>`)을 이어 붙여 한 줄로 만듭니다.

use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::ExtractionError;

const DOCUMENT_XML: &str = "word/document.xml";

/// DOCX에서 텍스트 추출 (문단 단위 줄바꿈)
pub fn extract_text_from_docx(path: &Path) -> Result<String, ExtractionError> {
    let file = std::fs::File::open(path).map_err(|source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| ExtractionError::Docx(e.to_string()))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_XML)
        .map_err(|e| ExtractionError::Docx(format!("{}: {}", DOCUMENT_XML, e)))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractionError::Docx(e.to_string()))?;

    Ok(extract_plaintext_from_document_xml(&xml))
}

/// document.xml 본문에서 문단 텍스트 추출
pub fn extract_plaintext_from_document_xml(xml: &str) -> String {
    static PARAGRAPH: OnceLock<Regex> = OnceLock::new();
    static TEXT_RUN: OnceLock<Regex> = OnceLock::new();

    let paragraph = PARAGRAPH.get_or_init(|| {
        Regex::new(r"(?s)<w:p(?:\s[^>]*)?>(.*?)</w:p>").expect("valid paragraph regex")
    });
    let text_run = TEXT_RUN.get_or_init(|| {
        Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>").expect("valid text run regex")
    });

    paragraph
        .captures_iter(xml)
        .map(|para| {
            text_run
                .captures_iter(&para[1])
                .map(|run| unescape_xml(&run[1]))
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document><w:body>
<w:p><w:pPr><w:pStyle w:val="Title"/></w:pPr><w:r><w:t>Deep</w:t></w:r><w:r><w:t xml:space="preserve"> Learning</w:t></w:r></w:p>
<w:p w:rsidR="00A1"><w:r><w:t>Tom &amp; Jerry &lt;3</w:t></w:r><w:r><w:tab/></w:r></w:p>
</w:body></w:document>"#;

    #[test]
    fn test_extract_paragraphs() {
        let text = extract_plaintext_from_document_xml(SAMPLE_XML);
        assert_eq!(text, "Deep Learning\nTom & Jerry <3");
    }

    #[test]
    fn test_extract_from_archive() {
        let file = tempfile::Builder::new()
            .suffix(".docx")
            .tempfile()
            .expect("tempfile");

        {
            let mut writer = zip::ZipWriter::new(file.reopen().expect("reopen"));
            writer
                .start_file(DOCUMENT_XML, zip::write::SimpleFileOptions::default())
                .expect("start_file");
            writer.write_all(SAMPLE_XML.as_bytes()).expect("write");
            writer.finish().expect("finish");
        }

        let text = extract_text_from_docx(file.path()).expect("extract");
        assert!(text.starts_with("Deep Learning"));
    }

    #[test]
    fn test_missing_document_xml() {
        let file = tempfile::Builder::new()
            .suffix(".docx")
            .tempfile()
            .expect("tempfile");

        {
            let mut writer = zip::ZipWriter::new(file.reopen().expect("reopen"));
            writer
                .start_file("other.xml", zip::write::SimpleFileOptions::default())
                .expect("start_file");
            writer.write_all(b"<x/>").expect("write");
            writer.finish().expect("finish");
        }

        assert!(matches!(
            extract_text_from_docx(file.path()),
            Err(ExtractionError::Docx(_))
        ));
    }
}
