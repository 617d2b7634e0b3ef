//! 모델에 보내는 프롬프트 조립

use crate::sources::Paper;

/// 파일 업로드 시 질의가 없을 때 사용하는 기본 질의
pub const DEFAULT_DOCUMENT_QUERY: &str = "Provide a comprehensive summary of the document.";

/// 업로드 문서 기반 질의
pub fn document_prompt(query: &str, context: &str) -> String {
    format!(
        "Based on the following document content, answer the question.\n\
         Question: {}\n\
         Relevant Content: {}",
        query, context
    )
}

/// 기존 세션의 후속 질의
pub fn follow_up_prompt(query: &str, context: &str) -> String {
    format!(
        "Based on the provided context and our conversation history, answer the question.\n\
         Question: {}\n\
         Relevant Context: {}",
        query, context
    )
}

/// 리서치 결과 종합
pub fn research_prompt(query: &str, papers: &[Paper], context: &str) -> String {
    let titles: Vec<&str> = papers.iter().map(|p| p.title.as_str()).collect();
    format!(
        "Based on the following research papers, please synthesize an answer for the query: \"{}\"\n\n\
         Found papers: {:?}\n\
         Key content:\n{}\n\n\
         Provide a comprehensive answer.",
        query, titles, context
    )
}

/// 논문 본문을 하나의 인덱싱 대상 텍스트로 결합
pub fn combine_papers(papers: &[Paper]) -> String {
    papers
        .iter()
        .map(|p| format!("Source: {}\n{}", p.title, p.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
