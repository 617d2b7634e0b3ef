//! Semantic Scholar 검색 (2차 소스)
//!
//! 인증 없이 사용할 수 있는 Graph API paper search를 사용합니다.
//! 무인증 호출은 rate limit이 엄격하므로 호출 간격은 `SourceAggregator`가 조절합니다.
//! ref: https://api.semanticscholar.org/api-docs/graph

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::{AcademicSearch, SearchHit};

const SEMANTIC_SCHOLAR_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";

/// Semantic Scholar 검색 클라이언트
pub struct SemanticScholarSearch {
    client: reqwest::Client,
}

impl SemanticScholarSearch {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("paperchat/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<PaperRecord>,
}

#[derive(Debug, Deserialize)]
struct PaperRecord {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default, rename = "openAccessPdf")]
    open_access_pdf: Option<OpenAccessPdf>,
}

#[derive(Debug, Deserialize)]
struct OpenAccessPdf {
    #[serde(default)]
    url: Option<String>,
}

impl PaperRecord {
    fn into_hit(self) -> Option<SearchHit> {
        let title = self.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;

        // 오픈 액세스 PDF가 있으면 우선 사용
        let url = self
            .open_access_pdf
            .and_then(|pdf| pdf.url)
            .filter(|u| !u.is_empty())
            .or(self.url);

        Some(SearchHit {
            title,
            url,
            summary: self.abstract_text.filter(|a| !a.trim().is_empty()),
        })
    }
}

#[async_trait]
impl AcademicSearch for SemanticScholarSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let url = Url::parse_with_params(
            SEMANTIC_SCHOLAR_URL,
            &[
                ("query", query.to_string()),
                ("limit", max_results.max(1).to_string()),
                ("fields", "title,url,abstract,openAccessPdf".to_string()),
            ],
        )?;

        let body = self
            .client
            .get(url)
            .send()
            .await
            .context("Semantic Scholar request failed")?
            .error_for_status()
            .context("Semantic Scholar returned error status")?
            .text()
            .await
            .context("Failed to read Semantic Scholar response")?;

        parse_response(&body)
    }

    fn name(&self) -> &str {
        "semantic-scholar"
    }
}

fn parse_response(body: &str) -> Result<Vec<SearchHit>> {
    let response: SearchResponse =
        serde_json::from_str(body).context("Failed to parse Semantic Scholar response")?;
    Ok(response
        .data
        .into_iter()
        .filter_map(PaperRecord::into_hit)
        .collect())
}
