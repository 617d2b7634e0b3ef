//! Text Chunking Module
//!
//! 고정 크기 슬라이딩 윈도우로 텍스트를 분할합니다.
//! 연속된 청크는 항상 `overlap` 문자만큼 겹치므로, 윈도우 경계 근처의
//! 문장도 최소 한 청크 안에서는 온전히 검색됩니다.

use anyhow::Result;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 기본 청크 크기 (문자 수)
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// 기본 오버랩 크기 (문자 수)
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 윈도우 크기 (문자 수)
    pub chunk_size: usize,
    /// 이전 청크와 겹치는 크기 (문자 수)
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than zero");
        }
        if self.overlap >= self.chunk_size {
            anyhow::bail!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap,
                self.chunk_size
            );
        }
        Ok(())
    }

    /// 윈도우 시작점 이동 폭
    pub fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;
}

// ============================================================================
// WindowChunker
// ============================================================================

/// 슬라이딩 윈도우 청커
///
/// 길이는 바이트가 아닌 문자(`char`) 단위로 계산하므로
/// 한글 등 멀티바이트 문자가 잘리지 않습니다.
#[derive(Debug, Clone, Default)]
pub struct WindowChunker {
    config: ChunkConfig,
}

impl WindowChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }
}

impl Chunker for WindowChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.config.chunk_size, self.config.overlap)
    }
}

/// 텍스트를 겹치는 고정 크기 윈도우로 분할
///
/// # Arguments
/// * `text` - 분할할 텍스트
/// * `chunk_size` - 윈도우 크기 (문자 수)
/// * `overlap` - 연속 윈도우 간 중첩 문자 수
///
/// # Returns
/// 순서가 유지된 청크 목록. 마지막 청크는 `chunk_size`보다 짧을 수 있습니다.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }

    // 각 문자의 바이트 오프셋 (+ 끝 위치)
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = bounds.len() - 1;

    if char_count <= chunk_size {
        return vec![text.to_string()];
    }

    let stride = ChunkConfig {
        chunk_size,
        overlap,
    }
    .stride();
    let mut chunks = Vec::with_capacity(char_count / stride + 1);
    let mut start = 0;

    while start < char_count {
        let end = (start + chunk_size).min(char_count);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        start += stride;
    }

    chunks
}

// ============================================================================
// Tests
// ============================================================================
