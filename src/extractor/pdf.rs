//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트를 추출합니다.

use std::path::Path;

use super::ExtractionError;

/// PDF에서 텍스트 추출
///
/// 페이지 구분(폼피드)을 줄바꿈으로 바꾸고 빈 페이지는 제거합니다.
/// 텍스트 레이어가 없는 스캔본은 빈 문자열을 반환합니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<String, ExtractionError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| ExtractionError::Pdf(e.to_string()))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(String::new());
    }

    Ok(split_pdf_pages(&text).join("\n"))
}

/// PDF 텍스트를 페이지별로 분리
fn split_pdf_pages(text: &str) -> Vec<String> {
    text.split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pdf_pages_with_formfeed() {
        let text = "Page 1 content\x0cPage 2 content\x0c\x0cPage 3 content";
        let pages = split_pdf_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], "Page 1 content");
        assert_eq!(pages[2], "Page 3 content");
    }

    #[test]
    fn test_split_pdf_pages_no_separator() {
        let pages = split_pdf_pages("Just some text without page breaks");
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn test_garbage_pdf_is_rejected() {
        let file = tempfile::Builder::new()
            .suffix(".pdf")
            .tempfile()
            .expect("tempfile");
        std::fs::write(file.path(), b"%PDF-garbage").expect("write");
        let path = file.path().to_path_buf();

        // 파서가 패닉하는 경우는 ContentExtractor가 Task 에러로 변환
        let result = std::panic::catch_unwind(move || extract_text_from_pdf(&path));
        if let Ok(inner) = result {
            assert!(inner.is_err());
        }
    }
}
