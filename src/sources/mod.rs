//! Source Aggregator - 외부 텍스트 수집 오케스트레이션
//!
//! - 업로드 문서: `ContentExtractor`로 텍스트 추출 (실패는 사용자에게 보고)
//! - 리서치 질의: 1차 검색(arXiv) → 부족하면 2차 검색(Semantic Scholar)
//!   → 후보별 전문 다운로드, 실패 시 초록으로 대체, 둘 다 없으면 건너뜀
//!
//! 외부 검색/다운로드 실패는 절대 에러로 올라가지 않습니다.

mod arxiv;
mod fetch;
mod scholar;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::extractor::{ContentExtractor, ExtractionError};

pub use arxiv::ArxivSearch;
pub use fetch::{normalize_paper_url, HttpPaperFetcher, BROWSER_USER_AGENT};
pub use scholar::SemanticScholarSearch;

// ============================================================================
// Types
// ============================================================================

/// 수집된 논문 (리서치 모드 전용)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paper {
    pub title: String,
    pub url: Option<String>,
    pub text: String,
}

/// 검색 결과 후보 (아직 본문을 받기 전)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    /// 전문(PDF 등) URL
    pub url: Option<String>,
    /// 초록/요약 (다운로드 실패 시 대체 텍스트)
    pub summary: Option<String>,
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// 학술 검색 소스
#[async_trait]
pub trait AcademicSearch: Send + Sync {
    /// 질의로 논문 후보 검색
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    /// 소스 이름 (로그용)
    fn name(&self) -> &str;
}

/// 다운로드 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedText {
    /// 논문 전문 (PDF, 일반 텍스트)
    FullText(String),
    /// HTML 랜딩 페이지 텍스트 (초록이 없을 때만 사용)
    LandingPage {
        title: Option<String>,
        content: String,
    },
}

/// 논문 본문 다운로더
#[async_trait]
pub trait PaperFetcher: Send + Sync {
    /// URL에서 본문 텍스트 추출
    async fn fetch(&self, url: &str) -> Result<FetchedText>;
}

// ============================================================================
// SourceAggregator
// ============================================================================

/// 리서치 수집 설정
#[derive(Debug, Clone, Copy)]
pub struct ResearchOptions {
    /// 수집할 최대 논문 수
    pub max_results: usize,
    /// 2차 소스 후보 처리 간 대기 시간
    pub secondary_delay: Duration,
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self {
            max_results: 3,
            secondary_delay: Duration::from_secs(1),
        }
    }
}

/// 외부 텍스트 수집기
pub struct SourceAggregator {
    extractor: ContentExtractor,
    primary: Arc<dyn AcademicSearch>,
    secondary: Option<Arc<dyn AcademicSearch>>,
    fetcher: Arc<dyn PaperFetcher>,
    options: ResearchOptions,
}

impl SourceAggregator {
    pub fn new(
        extractor: ContentExtractor,
        primary: Arc<dyn AcademicSearch>,
        secondary: Option<Arc<dyn AcademicSearch>>,
        fetcher: Arc<dyn PaperFetcher>,
        options: ResearchOptions,
    ) -> Self {
        Self {
            extractor,
            primary,
            secondary,
            fetcher,
            options,
        }
    }

    /// 업로드된 문서에서 텍스트 추출
    pub async fn gather_document(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<String, ExtractionError> {
        let text = self.extractor.extract_bytes(bytes, filename).await?;
        tracing::info!("Extracted {} chars from {}", text.chars().count(), filename);
        Ok(text)
    }

    /// 리서치 질의에 대한 논문 수집
    ///
    /// 결과가 비어 있을 수 있습니다 (모든 소스 실패 포함).
    pub async fn gather_research(&self, query: &str) -> Vec<Paper> {
        let max_results = self.options.max_results;
        let mut papers = Vec::with_capacity(max_results);

        // 1. 1차 소스
        match self.primary.search(query, max_results).await {
            Ok(hits) => {
                tracing::info!("{}: {} candidates", self.primary.name(), hits.len());
                for hit in hits {
                    if papers.len() >= max_results {
                        break;
                    }
                    if let Some(paper) = self.resolve(hit).await {
                        papers.push(paper);
                    }
                }
            }
            Err(e) => tracing::warn!("{} search failed: {:#}", self.primary.name(), e),
        }

        // 2. 부족하면 2차 소스로 채움
        if papers.len() < max_results {
            if let Some(secondary) = &self.secondary {
                self.fill_from(secondary.as_ref(), query, &mut papers).await;
            }
        }

        tracing::info!("Research gather for {:?}: {} papers", query, papers.len());
        papers
    }

    async fn fill_from(&self, source: &dyn AcademicSearch, query: &str, papers: &mut Vec<Paper>) {
        let max_results = self.options.max_results;

        let hits = match source.search(query, max_results).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("{} search failed: {:#}", source.name(), e);
                return;
            }
        };
        tracing::info!("{}: {} candidates", source.name(), hits.len());

        for hit in hits {
            if let Some(paper) = self.resolve(hit).await {
                papers.push(paper);
            }
            if papers.len() >= max_results {
                break;
            }
            // rate limit 회피
            if !self.options.secondary_delay.is_zero() {
                tokio::time::sleep(self.options.secondary_delay).await;
            }
        }
    }

    /// 후보 하나를 논문으로 변환 (전문 → 초록 → 랜딩 페이지 → 건너뜀)
    async fn resolve(&self, hit: SearchHit) -> Option<Paper> {
        let mut text = String::new();
        let mut landing_page = None;

        if let Some(url) = hit.url.as_deref() {
            match self.fetcher.fetch(url).await {
                Ok(FetchedText::FullText(body)) => text = body,
                Ok(FetchedText::LandingPage { title, content }) => {
                    tracing::debug!("{} is a landing page ({:?}), not full text", url, title);
                    landing_page = Some(content);
                }
                Err(e) => tracing::debug!("Download failed for {}: {:#}", url, e),
            }
        }

        if text.trim().is_empty() {
            text = hit.summary.unwrap_or_default();
        }

        if text.trim().is_empty() {
            text = landing_page.unwrap_or_default();
        }

        if text.trim().is_empty() {
            tracing::debug!("Skipping {:?}: no text available", hit.title);
            return None;
        }

        Some(Paper {
            title: hit.title,
            url: hit.url,
            text,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
