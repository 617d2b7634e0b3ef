//! 논문 본문 다운로더
//!
//! URL에서 전문을 받아 텍스트로 변환합니다.
//! PDF는 `ContentExtractor`로 전문을 추출하고, HTML은 `scraper` 모듈로
//! 랜딩 페이지 텍스트만 뽑습니다 (전문으로 취급하지 않음).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use url::Url;

use super::{FetchedText, PaperFetcher};
use crate::extractor::ContentExtractor;
use crate::scraper::extract_page;

/// 일부 출판사가 기본 UA를 차단하므로 브라우저 UA를 사용
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// HTTP 다운로더
pub struct HttpPaperFetcher {
    client: reqwest::Client,
    extractor: ContentExtractor,
}

impl HttpPaperFetcher {
    /// 타임아웃을 지정하여 생성
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            extractor: ContentExtractor::new(),
        })
    }
}

#[async_trait]
impl PaperFetcher for HttpPaperFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedText> {
        let url = normalize_paper_url(url);
        tracing::debug!("Downloading {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Request failed: {}", url))?
            .error_for_status()
            .with_context(|| format!("Bad status: {}", url))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body: {}", url))?;

        if content_type.contains("pdf") || bytes.starts_with(b"%PDF") {
            let text = self
                .extractor
                .extract_bytes(&bytes, "download.pdf")
                .await
                .with_context(|| format!("PDF extraction failed: {}", url))?;
            return Ok(FetchedText::FullText(text));
        }

        let body = String::from_utf8_lossy(&bytes);
        if content_type.contains("html") {
            let page = extract_page(&body);
            return Ok(FetchedText::LandingPage {
                title: page.title,
                content: page.content,
            });
        }

        Ok(FetchedText::FullText(body.into_owned()))
    }
}

/// arXiv 초록 페이지 URL을 PDF URL로 변환
///
/// `https://arxiv.org/abs/2301.00001v2` → `https://arxiv.org/pdf/2301.00001v2.pdf`.
/// arXiv가 아니거나 파싱할 수 없으면 원래 URL을 그대로 반환합니다.
pub fn normalize_paper_url(raw: &str) -> String {
    let raw = raw.trim();
    match extract_arxiv_id(raw) {
        Some(id) if !raw.to_lowercase().ends_with(".pdf") => {
            format!("https://arxiv.org/pdf/{}.pdf", id)
        }
        _ => raw.to_string(),
    }
}

fn extract_arxiv_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.to_lowercase();
    if !matches!(
        host.as_str(),
        "arxiv.org" | "www.arxiv.org" | "export.arxiv.org"
    ) {
        return None;
    }

    let path = url.path().trim_start_matches('/');
    let id = path
        .strip_prefix("abs/")
        .or_else(|| path.strip_prefix("pdf/"))?
        .trim_end_matches(".pdf")
        .trim_matches('/');

    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_arxiv_abs() {
        assert_eq!(
            normalize_paper_url("https://arxiv.org/abs/2301.00001v2"),
            "https://arxiv.org/pdf/2301.00001v2.pdf"
        );
        assert_eq!(
            normalize_paper_url("http://export.arxiv.org/abs/hep-th/9901001"),
            "https://arxiv.org/pdf/hep-th/9901001.pdf"
        );
    }

    #[test]
    fn test_normalize_arxiv_pdf_without_extension() {
        assert_eq!(
            normalize_paper_url("http://arxiv.org/pdf/2301.00001v1"),
            "https://arxiv.org/pdf/2301.00001v1.pdf"
        );
    }

    #[test]
    fn test_normalize_leaves_other_urls() {
        assert_eq!(
            normalize_paper_url("https://arxiv.org/pdf/2301.00001.pdf"),
            "https://arxiv.org/pdf/2301.00001.pdf"
        );
        assert_eq!(
            normalize_paper_url("https://example.org/paper.html"),
            "https://example.org/paper.html"
        );
        assert_eq!(normalize_paper_url("not a url"), "not a url");
        assert_eq!(normalize_paper_url("https://arxiv.org/list/cs"), "https://arxiv.org/list/cs");
    }

    #[test]
    fn test_fetcher_creation() {
        assert!(HttpPaperFetcher::new(Duration::from_secs(5)).is_ok());
    }

    mod server {
        use std::time::Duration;

        use crate::sources::{FetchedText, HttpPaperFetcher, PaperFetcher};
        use axum::http::{header, StatusCode};
        use axum::routing::get;
        use axum::Router;

        const LANDING_PAGE: &str = "<html><head><title>Paper landing page</title></head><body>\
            <nav>Skip to search form Skip to main content Sign In</nav>\
            <main><p>This landing page describes the paper but does not contain its full text. \
            Readers are asked to sign in before downloading anything at all.</p></main>\
            </body></html>";

        async fn spawn() -> String {
            let app = Router::new()
                .route(
                    "/landing",
                    get(|| async { ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], LANDING_PAGE) }),
                )
                .route(
                    "/notes.txt",
                    get(|| async { ([(header::CONTENT_TYPE, "text/plain")], "plain paper body") }),
                )
                .route(
                    "/typed.pdf",
                    get(|| async { ([(header::CONTENT_TYPE, "application/pdf")], "not really a pdf") }),
                )
                .route(
                    "/download",
                    get(|| async {
                        (
                            [(header::CONTENT_TYPE, "application/octet-stream")],
                            "%PDF-1.4 truncated",
                        )
                    }),
                )
                .route("/gone", get(|| async { StatusCode::NOT_FOUND }));

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            format!("http://{}", addr)
        }

        fn fetcher() -> HttpPaperFetcher {
            HttpPaperFetcher::new(Duration::from_secs(5)).unwrap()
        }

        #[tokio::test]
        async fn test_html_is_landing_page() {
            let base = spawn().await;
            let fetched = fetcher().fetch(&format!("{}/landing", base)).await.unwrap();

            match fetched {
                FetchedText::LandingPage { title, content } => {
                    assert_eq!(title.as_deref(), Some("Paper landing page"));
                    assert!(content.contains("does not contain its full text"));
                }
                other => panic!("expected landing page, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_plain_text_passes_through() {
            let base = spawn().await;
            let fetched = fetcher().fetch(&format!("{}/notes.txt", base)).await.unwrap();
            assert_eq!(fetched, FetchedText::FullText("plain paper body".to_string()));
        }

        #[tokio::test]
        async fn test_pdf_by_content_type() {
            let base = spawn().await;
            let err = fetcher()
                .fetch(&format!("{}/typed.pdf", base))
                .await
                .unwrap_err();
            assert!(format!("{:#}", err).contains("PDF extraction failed"));
        }

        #[tokio::test]
        async fn test_pdf_by_magic_bytes() {
            let base = spawn().await;
            let err = fetcher()
                .fetch(&format!("{}/download", base))
                .await
                .unwrap_err();
            assert!(format!("{:#}", err).contains("PDF extraction failed"));
        }

        #[tokio::test]
        async fn test_error_status() {
            let base = spawn().await;
            let err = fetcher().fetch(&format!("{}/gone", base)).await.unwrap_err();
            assert!(format!("{:#}", err).contains("Bad status"));
        }
    }
}
