//! 인용 패턴 추출
//!
//! APA 스타일(`Smith (2020)`)과 번호 스타일(`[1]`, `[2, 3]`) 인용을
//! 주변 문맥과 함께 찾아냅니다. 정확도보다는 주석용 best-effort 유틸리티입니다.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// 인용 앞뒤로 포함할 문맥 크기 (문자 수)
const CONTEXT_WINDOW: usize = 100;

/// 인용 스타일
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationStyle {
    Apa,
    Numeric,
}

/// 추출된 인용
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub style: CitationStyle,
    /// 매치된 원문 (예: "Smith (2020)")
    pub matched: String,
    /// 앞뒤 문맥을 포함한 발췌
    pub context: String,
}

fn patterns() -> &'static [(CitationStyle, Regex)] {
    static PATTERNS: OnceLock<Vec<(CitationStyle, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                CitationStyle::Apa,
                r"(?P<author>[A-Z][a-z]+\s(?:[A-Z][.]\s)*[A-Z][a-z]+)\s*\((?P<year>\d{4})\)",
            ),
            (CitationStyle::Numeric, r"\[(?P<ref>\d+(?:,\s*\d+)*)\]"),
        ]
        .into_iter()
        .filter_map(|(style, pattern)| match Regex::new(pattern) {
            Ok(re) => Some((style, re)),
            Err(e) => {
                tracing::warn!("Skipping citation pattern {:?}: {}", style, e);
                None
            }
        })
        .collect()
    })
}

/// 텍스트에서 인용 추출
///
/// 스타일별로 순서대로 스캔하므로 결과는 APA 인용 전체, 그다음 번호 인용 순입니다.
pub fn extract_citations(text: &str) -> Vec<Citation> {
    let mut citations = Vec::new();

    for (style, re) in patterns() {
        for m in re.find_iter(text) {
            let (start, end) = context_bounds(text, m.start(), m.end());

            citations.push(Citation {
                style: *style,
                matched: m.as_str().to_string(),
                context: text[start..end].trim().to_string(),
            });
        }
    }

    citations
}

/// 매치 앞뒤로 최대 `CONTEXT_WINDOW` 문자를 포함하는 바이트 범위
fn context_bounds(text: &str, start: usize, end: usize) -> (usize, usize) {
    let before = text[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_WINDOW - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let after = text[end..]
        .char_indices()
        .nth(CONTEXT_WINDOW)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());
    (before, after)
}
