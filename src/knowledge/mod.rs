//! Knowledge 모듈 - 세션 단위 시맨틱 인덱스
//!
//! - Chunker: 고정 크기 오버랩 윈도우 분할
//! - Index: 정확한 L2 최근접 이웃 검색
//! - Retriever: 청킹 + 임베딩 + 문맥 검색
//! - Citations: 인용 패턴 주석

mod chunker;
mod citations;
mod index;
mod retriever;

// Re-exports
pub use chunker::{
    chunk_text, ChunkConfig, Chunker, WindowChunker, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE,
};
pub use citations::{extract_citations, Citation, CitationStyle};
pub use index::{l2_distance_squared, FlatIndex, Neighbor};
pub use retriever::{Retriever, SemanticIndex, DEFAULT_TOP_K};
