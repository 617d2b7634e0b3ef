//! Session Store - 프로세스 전역 세션 저장소
//!
//! 세션 ID → `Session` 매핑을 하나의 뮤텍스로 보호합니다.
//! 락은 삽입/조회/삭제 동안만 잡고, 외부 호출(임베딩, 모델 등) 중에는 잡지 않습니다.
//!
//! 보존 정책: 유휴 TTL + 최대 세션 수(LRU 방출).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chat::Conversation;
use crate::knowledge::{Citation, SemanticIndex};
use crate::sources::Paper;

// ============================================================================
// Session
// ============================================================================

/// 세션 생성 경로
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// 파일 업로드로 시작
    File,
    /// 논문 리서치로 시작
    Research,
    /// 논문을 찾지 못해 일반 대화로 시작
    Simple,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionMode::File => "file",
            SessionMode::Research => "research",
            SessionMode::Simple => "simple",
        };
        f.write_str(s)
    }
}

/// 대화 세션
///
/// 인덱스/청크/논문/인용은 생성 시 고정되며, 대화 기록만 턴마다 늘어납니다.
pub struct Session {
    id: String,
    mode: SessionMode,
    conversation: tokio::sync::Mutex<Box<dyn Conversation>>,
    index: Option<Arc<SemanticIndex>>,
    papers: Vec<Paper>,
    citations: Vec<Citation>,
    source_name: Option<String>,
    created_at: DateTime<Utc>,
    last_access: Mutex<Instant>,
}

impl Session {
    /// 새 세션 ID 발급 (UUID v4)
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn builder(mode: SessionMode, conversation: Box<dyn Conversation>) -> SessionBuilder {
        SessionBuilder {
            id: Self::new_id(),
            mode,
            conversation,
            index: None,
            papers: Vec::new(),
            citations: Vec::new(),
            source_name: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// 세션 인덱스 (없으면 검색 없이 일반 대화)
    pub fn index(&self) -> Option<&Arc<SemanticIndex>> {
        self.index.as_ref()
    }

    pub fn papers(&self) -> &[Paper] {
        &self.papers
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    /// 대화 핸들 잠금
    ///
    /// 같은 세션에 대한 동시 턴은 여기서 직렬화됩니다.
    pub async fn conversation(&self) -> tokio::sync::MutexGuard<'_, Box<dyn Conversation>> {
        self.conversation.lock().await
    }

    fn touch(&self) {
        *lock_recover(&self.last_access) = Instant::now();
    }

    fn last_access(&self) -> Instant {
        *lock_recover(&self.last_access)
    }

    /// 요약 정보
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            mode: self.mode,
            chunks: self.index.as_ref().map(|i| i.len()).unwrap_or(0),
            papers: self.papers.iter().map(|p| p.title.clone()).collect(),
            citations: self.citations.len(),
            source_name: self.source_name.clone(),
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("chunks", &self.index.as_ref().map(|i| i.len()))
            .field("papers", &self.papers.len())
            .field("citations", &self.citations.len())
            .finish()
    }
}

/// 세션 생성기
pub struct SessionBuilder {
    id: String,
    mode: SessionMode,
    conversation: Box<dyn Conversation>,
    index: Option<Arc<SemanticIndex>>,
    papers: Vec<Paper>,
    citations: Vec<Citation>,
    source_name: Option<String>,
}

impl SessionBuilder {
    pub fn index(mut self, index: Option<Arc<SemanticIndex>>) -> Self {
        self.index = index;
        self
    }

    pub fn papers(mut self, papers: Vec<Paper>) -> Self {
        self.papers = papers;
        self
    }

    pub fn citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    pub fn source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    pub fn build(self) -> Session {
        Session {
            id: self.id,
            mode: self.mode,
            conversation: tokio::sync::Mutex::new(self.conversation),
            index: self.index,
            papers: self.papers,
            citations: self.citations,
            source_name: self.source_name,
            created_at: Utc::now(),
            last_access: Mutex::new(Instant::now()),
        }
    }
}

/// 세션 요약 (상태 조회용)
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub mode: SessionMode,
    pub chunks: usize,
    pub papers: Vec<String>,
    pub citations: usize,
    pub source_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// SessionStore
// ============================================================================

/// 세션 보존 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// 마지막 접근 후 이 시간이 지나면 만료 (None이면 무기한)
    pub idle_ttl: Option<Duration>,
    /// 최대 세션 수 (초과 시 가장 오래 사용되지 않은 세션 방출)
    pub max_sessions: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            idle_ttl: Some(Duration::from_secs(60 * 60)),
            max_sessions: 1000,
        }
    }
}

/// 프로세스 전역 세션 저장소
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    policy: RetentionPolicy,
}

impl SessionStore {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            policy,
        }
    }

    /// 세션 저장
    ///
    /// 만료된 세션을 정리하고, 용량을 넘으면 LRU 세션을 방출한 뒤 삽입합니다.
    pub fn insert(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        let mut sessions = self.lock();

        self.evict_expired_locked(&mut sessions);

        let capacity = self.policy.max_sessions.max(1);
        while sessions.len() >= capacity {
            let Some(oldest) = sessions
                .values()
                .min_by_key(|s| s.last_access())
                .map(|s| s.id.clone())
            else {
                break;
            };
            tracing::info!("Session store full, evicting least recently used {}", oldest);
            sessions.remove(&oldest);
        }

        sessions.insert(session.id.clone(), Arc::clone(&session));
        tracing::debug!("Stored session {} ({}), total {}", session.id, session.mode, sessions.len());
        session
    }

    /// 세션 조회 (접근 시간 갱신)
    ///
    /// 만료된 세션은 없는 것으로 취급하고 제거합니다.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let mut sessions = self.lock();
        let session = sessions.get(id)?;

        if self.is_expired(session) {
            tracing::info!("Session {} expired", id);
            sessions.remove(id);
            return None;
        }

        session.touch();
        Some(Arc::clone(session))
    }

    /// 세션 제거
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.lock().remove(id)
    }

    /// 만료 세션 일괄 정리, 제거된 수 반환
    pub fn evict_expired(&self) -> usize {
        let mut sessions = self.lock();
        self.evict_expired_locked(&mut sessions)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 살아 있는 세션 요약 (생성 순, 접근 시간은 갱신하지 않음)
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .lock()
            .values()
            .filter(|s| !self.is_expired(s))
            .map(|s| s.summary())
            .collect();
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    fn evict_expired_locked(&self, sessions: &mut HashMap<String, Arc<Session>>) -> usize {
        let before = sessions.len();
        sessions.retain(|_, s| !self.is_expired(s));
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!("Evicted {} expired sessions", removed);
        }
        removed
    }

    fn is_expired(&self, session: &Session) -> bool {
        match self.policy.idle_ttl {
            Some(ttl) => session.last_access().elapsed() >= ttl,
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Session>>> {
        lock_recover(&self.sessions)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

/// 패닉으로 오염된 락도 복구해서 사용 (맵 자체는 항상 일관된 상태)
fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::EchoChat;
    use crate::chat::ChatModel;

    fn session(mode: SessionMode) -> Session {
        Session::builder(mode, EchoChat::default().start_chat()).build()
    }

    #[test]
    fn test_insert_and_get() {
        let store = SessionStore::default();
        let stored = store.insert(session(SessionMode::Simple));

        let found = store.get(stored.id()).expect("session should exist");
        assert!(Arc::ptr_eq(&stored, &found));
        assert_eq!(found.mode(), SessionMode::Simple);
        assert!(found.index().is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unknown_id() {
        let store = SessionStore::default();
        assert!(store.get("does-not-exist").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = session(SessionMode::File);
        let b = session(SessionMode::File);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_lru_eviction() {
        let store = SessionStore::new(RetentionPolicy {
            idle_ttl: None,
            max_sessions: 2,
        });

        let first = store.insert(session(SessionMode::Simple));
        std::thread::sleep(Duration::from_millis(5));
        let second = store.insert(session(SessionMode::Simple));
        std::thread::sleep(Duration::from_millis(5));

        // first를 최근 사용으로 만들어 second가 방출되도록
        assert!(store.get(first.id()).is_some());
        std::thread::sleep(Duration::from_millis(5));

        let third = store.insert(session(SessionMode::Simple));

        assert_eq!(store.len(), 2);
        assert!(store.get(first.id()).is_some());
        assert!(store.get(second.id()).is_none());
        assert!(store.get(third.id()).is_some());
    }

    #[test]
    fn test_ttl_expiry() {
        let store = SessionStore::new(RetentionPolicy {
            idle_ttl: Some(Duration::from_millis(20)),
            max_sessions: 10,
        });

        let stale = store.insert(session(SessionMode::Research));
        std::thread::sleep(Duration::from_millis(40));

        assert!(store.get(stale.id()).is_none());
        assert!(store.is_empty());

        store.insert(session(SessionMode::Research));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(store.evict_expired(), 1);
    }

    #[test]
    fn test_summaries() {
        let store = SessionStore::default();
        let s = Session::builder(SessionMode::File, EchoChat::default().start_chat())
            .source_name("paper.pdf")
            .build();
        store.insert(s);

        let summaries = store.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].mode, SessionMode::File);
        assert_eq!(summaries[0].source_name.as_deref(), Some("paper.pdf"));
        assert_eq!(summaries[0].chunks, 0);
    }

    #[test]
    fn test_summaries_skip_expired() {
        let store = SessionStore::new(RetentionPolicy {
            idle_ttl: Some(Duration::from_millis(20)),
            max_sessions: 10,
        });
        store.insert(session(SessionMode::Simple));
        std::thread::sleep(Duration::from_millis(40));
        let fresh = store.insert(session(SessionMode::File));

        let summaries = store.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].session_id, fresh.id());
    }

    #[test]
    fn test_remove() {
        let store = SessionStore::default();
        let stored = store.insert(session(SessionMode::Simple));

        let removed = store.remove(stored.id()).expect("session should be removed");
        assert!(Arc::ptr_eq(&stored, &removed));
        assert!(store.get(stored.id()).is_none());
        assert!(store.remove(stored.id()).is_none());
    }

    #[test]
    fn test_concurrent_inserts() {
        let store = Arc::new(SessionStore::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let s = store.insert(session(SessionMode::Simple));
                        assert!(store.get(s.id()).is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("thread panicked");
        }
        assert_eq!(store.len(), 200);
    }
}
