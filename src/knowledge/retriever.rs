//! Context Retriever - 청크 인덱싱 + 질의별 관련 문맥 검색
//!
//! 텍스트를 청킹/임베딩하여 `SemanticIndex`를 만들고,
//! 질의와 가장 가까운 청크들을 이어 붙여 프롬프트 문맥으로 반환합니다.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::embedding::EmbeddingProvider;

use super::chunker::{Chunker, WindowChunker};
use super::index::{FlatIndex, Neighbor};

/// 기본 검색 청크 수
pub const DEFAULT_TOP_K: usize = 3;

// ============================================================================
// SemanticIndex
// ============================================================================

/// 청크 목록과 그 임베딩 인덱스의 쌍
///
/// `chunks[i]`의 벡터가 인덱스의 i번째 벡터입니다.
/// 생성 후에는 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticIndex {
    index: FlatIndex,
    chunks: Vec<String>,
}

impl SemanticIndex {
    /// 청크 목록으로 인덱스 생성
    ///
    /// 청크가 없으면 `None`을 반환합니다 (검색 범위를 좁힐 문맥 없음).
    pub async fn build(
        embedder: &dyn EmbeddingProvider,
        chunks: Vec<String>,
    ) -> Result<Option<Self>> {
        if chunks.is_empty() {
            return Ok(None);
        }

        let vectors = embedder
            .embed_batch(&chunks)
            .await
            .context("Failed to embed chunks")?;

        if vectors.len() != chunks.len() {
            anyhow::bail!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        // 차원은 첫 벡터 기준으로 고정
        let dimension = vectors[0].len();
        let mut index = FlatIndex::new(dimension);
        index.add(&vectors)?;

        tracing::debug!(
            "Built index: {} chunks, dimension {} ({})",
            chunks.len(),
            dimension,
            embedder.name()
        );

        Ok(Some(Self { index, chunks }))
    }

    /// 질의 벡터로 top-k 청크 검색 (가까운 순)
    pub fn nearest(&self, query_vector: &[f32], k: usize) -> Result<Vec<(&str, f32)>> {
        let neighbors = self.index.search(query_vector, k)?;
        Ok(neighbors
            .into_iter()
            .filter_map(|Neighbor { id, distance }| {
                self.chunks.get(id).map(|c| (c.as_str(), distance))
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

// ============================================================================
// Retriever
// ============================================================================

/// 청커 + 임베딩 + 검색 설정을 묶은 검색기
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: WindowChunker,
    top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, chunker: WindowChunker, top_k: usize) -> Self {
        Self {
            embedder,
            chunker,
            top_k,
        }
    }

    /// 원문 텍스트로 인덱스 생성 (청킹 → 임베딩 → 인덱싱)
    pub async fn build(&self, text: &str) -> Result<Option<SemanticIndex>> {
        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            tracing::warn!("No chunks generated; continuing without an index");
        }
        SemanticIndex::build(self.embedder.as_ref(), chunks).await
    }

    /// 질의와 관련된 문맥 검색
    ///
    /// 인덱스가 없거나 질의가 비어 있으면 빈 문자열을 반환합니다.
    /// 질의 임베딩이 실패해도 에러 대신 빈 문맥으로 진행합니다.
    pub async fn relevant_context(&self, index: Option<&SemanticIndex>, query: &str) -> String {
        let index = match index {
            Some(index) if !index.is_empty() => index,
            _ => return String::new(),
        };
        if query.trim().is_empty() {
            return String::new();
        }

        let query_vector = match self.embedder.embed_query(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Query embedding failed, answering without context: {:#}", e);
                return String::new();
            }
        };

        match index.nearest(&query_vector, self.top_k) {
            Ok(hits) => hits
                .into_iter()
                .map(|(chunk, _)| chunk)
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => {
                tracing::warn!("Index search failed, answering without context: {:#}", e);
                String::new()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
