//! 엔진 설정
//!
//! 모든 값은 CLI 플래그 또는 `PAPERCHAT_*` 환경변수로 덮어쓸 수 있습니다.
//! API 키는 별도로 `GEMINI_API_KEY` / `GOOGLE_AI_API_KEY`에서 읽습니다.

use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;

use crate::chat::{DEFAULT_CHAT_MODEL, DEFAULT_MAX_OUTPUT_TOKENS};
use crate::embedding::DEFAULT_DIMENSION;
use crate::knowledge::{ChunkConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_TOP_K};
use crate::session::RetentionPolicy;
use crate::sources::ResearchOptions;

/// Gemini 임베딩이 지원하는 차원
const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

// ============================================================================
// EngineConfig
// ============================================================================

/// 엔진 전체 설정
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 청크 크기/오버랩 (문자 수)
    pub chunk: ChunkConfig,
    /// 질의당 검색할 청크 수
    pub top_k: usize,
    /// 리서치 수집 설정
    pub research: ResearchOptions,
    /// 2차 학술 소스(Semantic Scholar) 사용 여부
    pub use_secondary_source: bool,
    /// 학술 검색 타임아웃
    pub search_timeout: Duration,
    /// 논문 다운로드 타임아웃
    pub download_timeout: Duration,
    /// 임베딩/대화 모델 호출 타임아웃
    pub model_timeout: Duration,
    /// 세션 보존 정책
    pub retention: RetentionPolicy,
    /// 대화 모델 이름
    pub chat_model: String,
    /// 응답 최대 토큰
    pub max_output_tokens: u32,
    /// 임베딩 차원 (Gemini)
    pub embedding_dimension: usize,
    /// 문서 임베딩 배치 요청의 분당 상한 (0이면 제한 없음, 질의 임베딩은 제한 없음)
    pub embedding_rpm: u32,
    /// 해시 임베딩 사용 (임베딩 API 호출 없음)
    pub offline: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            top_k: DEFAULT_TOP_K,
            research: ResearchOptions::default(),
            use_secondary_source: true,
            search_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(20),
            model_timeout: Duration::from_secs(60),
            retention: RetentionPolicy::default(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            embedding_dimension: DEFAULT_DIMENSION,
            embedding_rpm: 0,
            offline: false,
        }
    }
}

impl EngineConfig {
    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        self.chunk.validate()?;

        if self.top_k == 0 {
            bail!("top_k must be at least 1");
        }
        if self.research.max_results == 0 {
            bail!("max_results must be at least 1");
        }
        if self.retention.max_sessions == 0 {
            bail!("max_sessions must be at least 1");
        }
        if self.chat_model.trim().is_empty() {
            bail!("chat model name must not be empty");
        }
        if self.max_output_tokens == 0 {
            bail!("max_output_tokens must be at least 1");
        }
        if !self.offline && !SUPPORTED_DIMENSIONS.contains(&self.embedding_dimension) {
            bail!(
                "Unsupported embedding dimension {} (expected one of {:?})",
                self.embedding_dimension,
                SUPPORTED_DIMENSIONS
            );
        }
        for (name, timeout) in [
            ("search", self.search_timeout),
            ("download", self.download_timeout),
            ("model", self.model_timeout),
        ] {
            if timeout.is_zero() {
                bail!("{} timeout must be greater than zero", name);
            }
        }

        Ok(())
    }
}

// ============================================================================
// CLI / Environment
// ============================================================================

/// 엔진 설정 플래그 (`serve`/`ask`/`status` 공통)
#[derive(Debug, Clone, Args)]
pub struct EngineArgs {
    /// 청크 크기 (문자 수)
    #[arg(long, env = "PAPERCHAT_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// 청크 오버랩 (문자 수)
    #[arg(long, env = "PAPERCHAT_CHUNK_OVERLAP", default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,

    /// 질의당 검색할 청크 수
    #[arg(long, env = "PAPERCHAT_TOP_K", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// 리서치 시 수집할 최대 논문 수
    #[arg(long, env = "PAPERCHAT_MAX_RESULTS", default_value_t = 3)]
    pub max_results: usize,

    /// 2차 소스 후보 사이 대기 시간 (밀리초)
    #[arg(long, env = "PAPERCHAT_SECONDARY_DELAY_MS", default_value_t = 1000)]
    pub secondary_delay_ms: u64,

    /// 2차 학술 소스 비활성화
    #[arg(long, env = "PAPERCHAT_NO_SECONDARY")]
    pub no_secondary: bool,

    /// 학술 검색 타임아웃 (초)
    #[arg(long, env = "PAPERCHAT_SEARCH_TIMEOUT", default_value_t = 30)]
    pub search_timeout_secs: u64,

    /// 논문 다운로드 타임아웃 (초)
    #[arg(long, env = "PAPERCHAT_DOWNLOAD_TIMEOUT", default_value_t = 20)]
    pub download_timeout_secs: u64,

    /// 모델 호출 타임아웃 (초)
    #[arg(long, env = "PAPERCHAT_MODEL_TIMEOUT", default_value_t = 60)]
    pub model_timeout_secs: u64,

    /// 세션 유휴 만료 시간 (초, 0이면 만료 없음)
    #[arg(long, env = "PAPERCHAT_SESSION_TTL", default_value_t = 3600)]
    pub session_ttl_secs: u64,

    /// 최대 세션 수
    #[arg(long, env = "PAPERCHAT_MAX_SESSIONS", default_value_t = 1000)]
    pub max_sessions: usize,

    /// 대화 모델 이름
    #[arg(long, env = "PAPERCHAT_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    /// 응답 최대 토큰
    #[arg(long, env = "PAPERCHAT_MAX_OUTPUT_TOKENS", default_value_t = DEFAULT_MAX_OUTPUT_TOKENS)]
    pub max_output_tokens: u32,

    /// 임베딩 차원 (768, 1536, 3072)
    #[arg(long, env = "PAPERCHAT_EMBEDDING_DIMENSION", default_value_t = DEFAULT_DIMENSION)]
    pub embedding_dimension: usize,

    /// 문서 임베딩 배치 요청의 분당 상한 (0이면 제한 없음)
    #[arg(long, env = "PAPERCHAT_EMBEDDING_RPM", default_value_t = 0)]
    pub embedding_rpm: u32,

    /// 오프라인 해시 임베딩 사용
    #[arg(long, env = "PAPERCHAT_OFFLINE")]
    pub offline: bool,
}

impl EngineArgs {
    /// 검증된 엔진 설정으로 변환
    pub fn into_config(self) -> Result<EngineConfig> {
        let idle_ttl = (self.session_ttl_secs > 0).then(|| Duration::from_secs(self.session_ttl_secs));

        let config = EngineConfig {
            chunk: ChunkConfig {
                chunk_size: self.chunk_size,
                overlap: self.chunk_overlap,
            },
            top_k: self.top_k,
            research: ResearchOptions {
                max_results: self.max_results,
                secondary_delay: Duration::from_millis(self.secondary_delay_ms),
            },
            use_secondary_source: !self.no_secondary,
            search_timeout: Duration::from_secs(self.search_timeout_secs),
            download_timeout: Duration::from_secs(self.download_timeout_secs),
            model_timeout: Duration::from_secs(self.model_timeout_secs),
            retention: RetentionPolicy {
                idle_ttl,
                max_sessions: self.max_sessions,
            },
            chat_model: self.chat_model,
            max_output_tokens: self.max_output_tokens,
            embedding_dimension: self.embedding_dimension,
            embedding_rpm: self.embedding_rpm,
            offline: self.offline,
        };

        config.validate()?;
        Ok(config)
    }
}
