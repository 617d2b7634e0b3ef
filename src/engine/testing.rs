//! 테스트용 협력자 대역 (검색, 다운로드, 임베딩, 대화 모델)

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::chat::{ChatMessage, ChatModel, Conversation, Role};
use crate::embedding::{EmbeddingProvider, HashEmbedding};
use crate::sources::{AcademicSearch, FetchedText, PaperFetcher, SearchHit};

// ============================================================================
// Search / Fetch
// ============================================================================

/// 고정된 결과를 돌려주는 검색 소스
pub(crate) struct StaticSearch {
    name: String,
    hits: Vec<SearchHit>,
    calls: AtomicUsize,
}

impl StaticSearch {
    pub(crate) fn new(name: &str, hits: Vec<SearchHit>) -> Self {
        Self {
            name: name.to_string(),
            hits,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AcademicSearch for StaticSearch {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 항상 실패하는 검색 소스
pub(crate) struct FailingSearch;

#[async_trait]
impl AcademicSearch for FailingSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        bail!("search backend unavailable")
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// URL → 본문 고정 매핑, 그 외 URL은 실패
pub(crate) struct StaticFetcher {
    pages: HashMap<String, String>,
}

impl StaticFetcher {
    pub(crate) fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, text)| (url.to_string(), text.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl PaperFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedText> {
        self.pages
            .get(url)
            .cloned()
            .map(FetchedText::FullText)
            .ok_or_else(|| anyhow!("404 for {}", url))
    }
}

// ============================================================================
// Embedding
// ============================================================================

/// 호출 횟수를 세는 해시 임베딩
#[derive(Default)]
pub(crate) struct CountingEmbedding {
    inner: HashEmbedding,
    documents: AtomicUsize,
    queries: AtomicUsize,
}

impl CountingEmbedding {
    pub(crate) fn document_calls(&self) -> usize {
        self.documents.load(Ordering::SeqCst)
    }

    pub(crate) fn query_calls(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.documents.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        "counting-hash"
    }
}

// ============================================================================
// Chat
// ============================================================================

/// 받은 프롬프트를 기록하고 되돌려주는 대화 모델
#[derive(Clone, Default)]
pub(crate) struct EchoChat {
    prompts: Arc<Mutex<Vec<String>>>,
    started: Arc<AtomicUsize>,
    fail: bool,
}

impl EchoChat {
    /// 모든 호출이 실패하는 모델
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// 지금까지 받은 프롬프트 (모든 대화 합산, 순서대로)
    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    /// 시작된 대화 수
    pub(crate) fn conversations_started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl ChatModel for EchoChat {
    fn start_chat(&self) -> Box<dyn Conversation> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Box::new(EchoConversation {
            prompts: Arc::clone(&self.prompts),
            history: Vec::new(),
            fail: self.fail,
        })
    }

    fn name(&self) -> &str {
        "echo"
    }
}

struct EchoConversation {
    prompts: Arc<Mutex<Vec<String>>>,
    history: Vec<ChatMessage>,
    fail: bool,
}

#[async_trait]
impl Conversation for EchoConversation {
    async fn send(&mut self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            bail!("model quota exceeded");
        }

        let answer = format!("answer #{} ({} chars)", self.history.len() / 2 + 1, prompt.len());
        self.history.push(ChatMessage {
            role: Role::User,
            text: prompt.to_string(),
        });
        self.history.push(ChatMessage {
            role: Role::Model,
            text: answer.clone(),
        });
        Ok(answer)
    }

    fn history(&self) -> &[ChatMessage] {
        &self.history
    }
}
