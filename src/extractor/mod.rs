//! 콘텐츠 추출 모듈
//!
//! 업로드된 파일에서 텍스트를 추출합니다.
//! - PDF 파일: pdf-extract로 텍스트 추출
//! - DOCX 파일: word/document.xml의 문단 텍스트 추출
//! - 그 외: UTF-8 텍스트로 읽기 (잘못된 바이트는 치환)

pub mod docx;
pub mod pdf;

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// PDF 파일
    Pdf,
    /// Word 문서 (Office Open XML)
    Docx,
    /// 그 외 모든 파일 (텍스트로 취급)
    Text,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => FileType::Pdf,
            "docx" => FileType::Docx,
            _ => FileType::Text,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(FileType::Text)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// 추출 실패 (사용자가 올린 파일을 읽을 수 없음)
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to stage upload: {0}")]
    Staging(#[source] std::io::Error),
    #[error("Unreadable PDF: {0}")]
    Pdf(String),
    #[error("Unreadable DOCX: {0}")]
    Docx(String),
    #[error("Extraction task failed: {0}")]
    Task(String),
}

// ============================================================================
// Content Extractor
// ============================================================================

/// 콘텐츠 추출기
#[derive(Debug, Clone, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 파일에서 텍스트 추출
    ///
    /// PDF/DOCX 파싱은 CPU 바운드이므로 blocking 스레드에서 실행합니다.
    pub async fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let file_type = FileType::from_path(path);
        let owned = path.to_path_buf();

        let result = tokio::task::spawn_blocking(move || match file_type {
            FileType::Pdf => pdf::extract_text_from_pdf(&owned),
            FileType::Docx => docx::extract_text_from_docx(&owned),
            FileType::Text => read_text_lossy(&owned),
        })
        .await;

        match result {
            Ok(inner) => inner,
            // 파서 패닉도 읽을 수 없는 파일로 취급
            Err(e) => Err(ExtractionError::Task(e.to_string())),
        }
    }

    /// 업로드된 바이트에서 텍스트 추출
    ///
    /// 원래 확장자를 유지한 임시 파일에 기록한 뒤 추출합니다.
    /// 임시 파일은 성공/실패와 무관하게 함수 종료 시 삭제됩니다.
    pub async fn extract_bytes(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<String, ExtractionError> {
        let suffix = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();

        let mut staged = tempfile::Builder::new()
            .prefix("paperchat-upload-")
            .suffix(&suffix)
            .tempfile()
            .map_err(ExtractionError::Staging)?;
        staged.write_all(bytes).map_err(ExtractionError::Staging)?;
        staged.flush().map_err(ExtractionError::Staging)?;

        tracing::debug!(
            "Staged upload {} ({} bytes) at {:?}",
            filename,
            bytes.len(),
            staged.path()
        );

        self.extract(staged.path()).await
    }
}

/// 텍스트 파일 읽기 (잘못된 UTF-8은 치환 문자로)
fn read_text_lossy(path: &Path) -> Result<String, ExtractionError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// ============================================================================
// Tests
// ============================================================================
