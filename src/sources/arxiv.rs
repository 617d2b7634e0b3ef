//! arXiv 검색 (1차 소스)
//!
//! arXiv API는 Atom 피드를 반환하므로 feed-rs로 파싱합니다.
//! ref: https://info.arxiv.org/help/api/user-manual.html

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use feed_rs::model::Entry;
use url::Url;

use super::{AcademicSearch, SearchHit};

const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";

/// arXiv 검색 클라이언트
pub struct ArxivSearch {
    client: reqwest::Client,
}

impl ArxivSearch {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("paperchat/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    fn query_url(query: &str, max_results: usize) -> Result<Url> {
        let url = Url::parse_with_params(
            ARXIV_API_URL,
            &[
                ("search_query", format!("all:{}", query)),
                ("start", "0".to_string()),
                ("max_results", max_results.to_string()),
                ("sortBy", "relevance".to_string()),
            ],
        )?;
        Ok(url)
    }
}

#[async_trait]
impl AcademicSearch for ArxivSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let url = Self::query_url(query, max_results)?;

        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .context("arXiv request failed")?
            .error_for_status()
            .context("arXiv returned error status")?
            .bytes()
            .await
            .context("Failed to read arXiv response")?;

        parse_feed(&bytes)
    }

    fn name(&self) -> &str {
        "arxiv"
    }
}

/// Atom 피드를 검색 후보로 변환
fn parse_feed(bytes: &[u8]) -> Result<Vec<SearchHit>> {
    let feed = feed_rs::parser::parse(bytes).context("Failed to parse arXiv feed")?;
    Ok(feed.entries.iter().filter_map(entry_to_hit).collect())
}

fn entry_to_hit(entry: &Entry) -> Option<SearchHit> {
    let title = entry
        .title
        .as_ref()
        .map(|t| normalize_whitespace(&t.content))
        .filter(|t| !t.is_empty())?;

    // PDF 링크 우선, 없으면 초록 페이지
    let pdf_link = entry.links.iter().find(|link| {
        link.title.as_deref() == Some("pdf")
            || link.media_type.as_deref() == Some("application/pdf")
    });
    let url = pdf_link
        .or_else(|| entry.links.first())
        .map(|link| link.href.clone())
        .or_else(|| Some(entry.id.clone()))
        .filter(|href| !href.trim().is_empty());

    let summary = entry
        .summary
        .as_ref()
        .map(|s| normalize_whitespace(&s.content))
        .filter(|s| !s.is_empty());

    Some(SearchHit {
        title,
        url,
        summary,
    })
}

fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// Tests
// ============================================================================
