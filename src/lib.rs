//! paperchat - 세션 기반 RAG 질의응답 엔진
//!
//! 업로드 문서 또는 논문 리서치 결과로 의미 검색 인덱스를 만들고,
//! 질문과 관련된 구절을 모델에 전달해 근거 있는 답변을 생성합니다.
//! 세션마다 인덱스와 대화 기록을 유지해 후속 질문을 이어갑니다.

pub mod chat;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod knowledge;
pub mod scraper;
pub mod server;
pub mod session;
pub mod sources;

// Re-exports
pub use chat::{ChatMessage, ChatModel, Conversation, GeminiChat, Role};
pub use config::{EngineArgs, EngineConfig};
pub use embedding::{
    create_embedder, get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding, HashEmbedding,
};
pub use engine::{Dispatcher, QueryRequest, QueryResponse, Route, UploadedFile};
pub use error::QueryError;
pub use extractor::{ContentExtractor, ExtractionError, FileType};
pub use knowledge::{
    chunk_text, extract_citations, ChunkConfig, Chunker, Citation, CitationStyle, FlatIndex,
    Retriever, SemanticIndex, WindowChunker,
};
pub use session::{RetentionPolicy, Session, SessionMode, SessionStore};
pub use sources::{FetchedText, Paper, SearchHit, SourceAggregator};
