//! HTML 본문 추출 모듈
//!
//! 논문 URL이 PDF가 아니라 랜딩 페이지(HTML)일 때 사용합니다.
//! 네트워크 요청은 `sources::HttpPaperFetcher`가 담당하고,
//! 여기서는 HTML → 텍스트 변환만 수행합니다.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// 본문으로 인정할 최소 길이 (문자 수)
const MIN_CONTENT_LEN: usize = 100;

/// 추출된 페이지 콘텐츠
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedContent {
    /// 페이지 제목
    pub title: Option<String>,
    /// 본문 텍스트 (HTML 태그 제거됨)
    pub content: String,
}

/// HTML 문서에서 제목과 본문 추출
pub fn extract_page(html: &str) -> ScrapedContent {
    let document = Html::parse_document(html);
    ScrapedContent {
        title: extract_title(&document),
        content: extract_content(&document),
    }
}

/// 제목 추출 (`<title>` → `<h1>`)
fn extract_title(document: &Html) -> Option<String> {
    ["title", "h1"].into_iter().find_map(|tag| {
        let selector = Selector::parse(tag).ok()?;
        let element = document.select(&selector).next()?;
        let title = element.text().collect::<String>().trim().to_string();
        (!title.is_empty()).then_some(title)
    })
}

/// 본문 추출
///
/// 우선순위: article > main > [role=main] > .content > #content > body
fn extract_content(document: &Html) -> String {
    let selectors = [
        "article",
        "main",
        "[role=main]",
        ".content",
        "#content",
        "body",
    ];

    for selector_str in selectors {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                let text = extract_text_from_element(&element);
                if text.chars().count() > MIN_CONTENT_LEN {
                    return text;
                }
            }
        }
    }

    // 폴백: 짧더라도 body 전체
    Selector::parse("body")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|element| extract_text_from_element(&element))
        })
        .unwrap_or_default()
}

/// 요소에서 텍스트 추출 (script/style 제외, 연속 공백 정리)
fn extract_text_from_element(element: &ElementRef) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();

    let mut text = String::new();
    for node in element.descendants() {
        let Some(node_text) = node.value().as_text() else {
            continue;
        };
        let inside_ignored = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| matches!(e.name(), "script" | "style" | "noscript"))
                .unwrap_or(false)
        });
        if inside_ignored {
            continue;
        }

        let trimmed = node_text.trim();
        if !trimmed.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }

    let re = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"));
    re.replace_all(&text, " ").trim().to_string()
}
