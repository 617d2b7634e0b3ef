//! Router / Dispatcher - 요청 분류와 모드별 처리
//!
//! 요청은 부작용 없이 먼저 `Route`로 분류한 뒤 처리합니다:
//!
//! ```text
//! QueryRequest ─classify─▶ FileIngest ─▶ 추출 → 인덱스 → 세션 저장 → 모델
//!                         Continue   ─▶ 기존 인덱스로 검색 → 모델
//!                         Research   ─▶ 논문 수집 → (없으면 일반 대화) → 모델
//!                         Invalid    ─▶ 400
//! ```
//!
//! 세션은 첫 모델 호출 전에 저장되므로, 모델이 실패해도 세션 ID는 유효합니다.

mod prompts;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::chat::{ChatModel, GeminiChat};
use crate::config::EngineConfig;
use crate::embedding::{create_embedder, get_api_key};
use crate::error::QueryError;
use crate::extractor::ContentExtractor;
use crate::knowledge::{extract_citations, Retriever, WindowChunker};
use crate::session::{Session, SessionMode, SessionStore};
use crate::sources::{
    AcademicSearch, ArxivSearch, HttpPaperFetcher, SemanticScholarSearch, SourceAggregator,
};

pub use prompts::{
    combine_papers, document_prompt, follow_up_prompt, research_prompt, DEFAULT_DOCUMENT_QUERY,
};

// ============================================================================
// Request / Response
// ============================================================================

/// 업로드된 파일
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// 질의 요청 (빈 문자열은 없는 것으로 취급)
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub query: Option<String>,
    pub file: Option<UploadedFile>,
    pub session_id: Option<String>,
}

impl QueryRequest {
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_file(mut self, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.file = Some(UploadedFile {
            filename: filename.into(),
            bytes,
        });
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// 공백만 있는 질의도 "제공됨"으로 보는 원시 질의
    fn raw_query(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.is_empty())
    }

    /// 실제로 사용할 질의 (앞뒤 공백 제거, 비어 있으면 None)
    fn query(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// 질의 응답
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub session_id: String,
}

/// 요청 분류 결과
#[derive(Debug)]
pub enum Route {
    /// 새 문서 업로드 (세션 ID는 무시)
    FileIngest,
    /// 기존 세션 이어가기
    Continue(Arc<Session>),
    /// 논문 리서치
    Research,
    /// 거부 (사유 포함)
    Invalid(String),
}

// ============================================================================
// Dispatcher
// ============================================================================

/// 요청 처리기
///
/// `Send + Sync`이며 서버에서 `Arc`로 공유합니다.
pub struct Dispatcher {
    sessions: Arc<SessionStore>,
    retriever: Retriever,
    sources: SourceAggregator,
    chat: Arc<dyn ChatModel>,
}

impl Dispatcher {
    pub fn new(
        sessions: Arc<SessionStore>,
        retriever: Retriever,
        sources: SourceAggregator,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            sessions,
            retriever,
            sources,
            chat,
        }
    }

    /// 설정으로 실제 협력자(Gemini, arXiv, Semantic Scholar)를 구성
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;

        let embedder = create_embedder(
            config.offline,
            config.embedding_dimension,
            config.model_timeout,
            config.embedding_rpm,
        )?;
        let retriever = Retriever::new(embedder, WindowChunker::new(config.chunk), config.top_k);

        let primary: Arc<dyn AcademicSearch> = Arc::new(ArxivSearch::new(config.search_timeout)?);
        let secondary: Option<Arc<dyn AcademicSearch>> = if config.use_secondary_source {
            Some(Arc::new(SemanticScholarSearch::new(config.search_timeout)?))
        } else {
            None
        };
        let fetcher = Arc::new(HttpPaperFetcher::new(config.download_timeout)?);
        let sources = SourceAggregator::new(
            ContentExtractor::new(),
            primary,
            secondary,
            fetcher,
            config.research,
        );

        let api_key = get_api_key().context("Chat model requires an API key")?;
        let chat = GeminiChat::new(
            api_key,
            config.chat_model.clone(),
            config.max_output_tokens,
            config.model_timeout,
        )?;
        tracing::info!("Using chat model {}", chat.name());

        let sessions = Arc::new(SessionStore::new(config.retention));
        Ok(Self::new(sessions, retriever, sources, Arc::new(chat)))
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// 요청 분류 (세션 조회 외에는 부작용 없음)
    pub fn classify(&self, request: &QueryRequest) -> Route {
        if request.raw_query().is_none() && request.file.is_none() {
            return Route::Invalid("Either query or file must be provided".to_string());
        }

        if request.file.is_some() {
            return Route::FileIngest;
        }

        if let Some(session) = request.session_id().and_then(|id| self.sessions.get(id)) {
            if request.query().is_none() {
                return Route::Invalid("Query is required for follow-up questions.".to_string());
            }
            return Route::Continue(session);
        }

        if request.query().is_some() {
            return Route::Research;
        }

        Route::Invalid("Invalid request or session ID.".to_string())
    }

    /// 요청 처리
    pub async fn handle(&self, request: QueryRequest) -> Result<QueryResponse, QueryError> {
        match self.classify(&request) {
            Route::Invalid(reason) => Err(QueryError::InvalidRequest(reason)),
            Route::FileIngest => self.ingest_file(request).await,
            Route::Continue(session) => {
                let query = request.query().unwrap_or_default();
                self.continue_session(&session, query).await
            }
            Route::Research => {
                let query = request.query().unwrap_or_default();
                self.research(query).await
            }
        }
    }

    // ------------------------------------------------------------------------
    // Modes
    // ------------------------------------------------------------------------

    async fn ingest_file(&self, request: QueryRequest) -> Result<QueryResponse, QueryError> {
        let query = request
            .query()
            .unwrap_or(DEFAULT_DOCUMENT_QUERY)
            .to_string();
        let Some(file) = request.file else {
            return Err(QueryError::InvalidRequest(
                "Either query or file must be provided".to_string(),
            ));
        };

        let text = self
            .sources
            .gather_document(&file.bytes, &file.filename)
            .await?;

        let index = self
            .retriever
            .build(&text)
            .await
            .context("Failed to index uploaded document")?
            .map(Arc::new);
        let citations = extract_citations(&text);
        tracing::info!(
            "Indexed {}: {} chunks, {} citations",
            file.filename,
            index.as_ref().map(|i| i.len()).unwrap_or(0),
            citations.len()
        );

        let session = Session::builder(SessionMode::File, self.chat.start_chat())
            .index(index)
            .citations(citations)
            .source_name(file.filename)
            .build();
        let session = self.sessions.insert(session);

        let context = self
            .retriever
            .relevant_context(session.index().map(|i| i.as_ref()), &query)
            .await;
        let answer = send(&session, &document_prompt(&query, &context)).await?;

        Ok(QueryResponse {
            answer,
            session_id: session.id().to_string(),
        })
    }

    async fn continue_session(
        &self,
        session: &Session,
        query: &str,
    ) -> Result<QueryResponse, QueryError> {
        tracing::info!("Continuing session {} ({})", session.id(), session.mode());

        let prompt = match session.index() {
            Some(index) => {
                let context = self
                    .retriever
                    .relevant_context(Some(index.as_ref()), query)
                    .await;
                follow_up_prompt(query, &context)
            }
            None => query.to_string(),
        };
        let answer = send(session, &prompt).await?;

        Ok(QueryResponse {
            answer,
            session_id: session.id().to_string(),
        })
    }

    async fn research(&self, query: &str) -> Result<QueryResponse, QueryError> {
        let papers = self.sources.gather_research(query).await;

        if papers.is_empty() {
            tracing::info!("No papers found, falling back to simple chat");
            let session = self
                .sessions
                .insert(Session::builder(SessionMode::Simple, self.chat.start_chat()).build());
            let answer = send(&session, query).await?;
            return Ok(QueryResponse {
                answer,
                session_id: session.id().to_string(),
            });
        }

        let combined = combine_papers(&papers);
        let index = self
            .retriever
            .build(&combined)
            .await
            .context("Failed to index research papers")?
            .map(Arc::new);
        let citations = extract_citations(&combined);

        let session = Session::builder(SessionMode::Research, self.chat.start_chat())
            .index(index)
            .papers(papers)
            .citations(citations)
            .build();
        let session = self.sessions.insert(session);

        let context = self
            .retriever
            .relevant_context(session.index().map(|i| i.as_ref()), query)
            .await;
        let prompt = research_prompt(query, session.papers(), &context);
        let answer = send(&session, &prompt).await?;

        Ok(QueryResponse {
            answer,
            session_id: session.id().to_string(),
        })
    }
}

/// 세션 대화로 프롬프트 전송 (같은 세션의 턴은 직렬화됨)
async fn send(session: &Session, prompt: &str) -> Result<String, QueryError> {
    let mut conversation = session.conversation().await;
    let answer = conversation
        .send(prompt)
        .await
        .with_context(|| format!("Model call failed for session {}", session.id()))?;
    Ok(answer)
}

// ============================================================================
// Tests
// ============================================================================
