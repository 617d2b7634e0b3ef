//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 청크와 질의를 고정 차원 벡터로 변환합니다.
//! - `GeminiEmbedding`: Gemini API (gemini-embedding-001)
//! - `HashEmbedding`: 네트워크 없이 동작하는 결정적 해시 임베딩 (오프라인/테스트용)

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 같은 입력에 대해 항상 같은 벡터를 반환해야 합니다.
/// 검색 결과의 결정성이 여기에 의존합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩 (문서 청크용)
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 질의 임베딩 (기본 구현: `embed`와 동일)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// Gemini 임베딩 API (gemini-embedding-001 - MRL 지원)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
const GEMINI_EMBED_MODEL: &str = "models/gemini-embedding-001";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// batchEmbedContents 한 번에 보낼 수 있는 최대 텍스트 수
const MAX_BATCH_SIZE: usize = 100;
/// 429/5xx 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 첫 재시도 대기 (이후 2배씩)
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// 임베딩 용도 (Gemini taskType)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
enum TaskType {
    #[serde(rename = "RETRIEVAL_DOCUMENT")]
    Document,
    #[serde(rename = "RETRIEVAL_QUERY")]
    Query,
}

/// 분당 요청 수 제한
///
/// 슬롯 예약만 락 안에서 하고 대기는 락 밖에서 하므로,
/// 한 요청의 대기가 다른 요청의 예약을 막지 않습니다.
#[derive(Debug)]
struct RequestPacer {
    limit: Option<(usize, Duration)>,
    slots: std::sync::Mutex<VecDeque<Instant>>,
}

impl RequestPacer {
    fn unlimited() -> Self {
        Self {
            limit: None,
            slots: std::sync::Mutex::new(VecDeque::new()),
        }
    }

    fn per_window(max_requests: usize, window: Duration) -> Self {
        Self {
            limit: Some((max_requests.max(1), window)),
            slots: std::sync::Mutex::new(VecDeque::new()),
        }
    }

    /// 분당 요청 수로 생성 (0이면 제한 없음)
    fn per_minute(requests_per_minute: u32) -> Self {
        match requests_per_minute {
            0 => Self::unlimited(),
            n => Self::per_window(n as usize, Duration::from_secs(60)),
        }
    }

    /// 다음 요청 슬롯을 예약하고, 그 슬롯까지 남은 시간을 반환
    fn reserve(&self) -> Duration {
        let Some((max_requests, window)) = self.limit else {
            return Duration::ZERO;
        };

        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        while slots
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= window)
        {
            slots.pop_front();
        }

        let mut slot = if slots.len() < max_requests {
            now
        } else {
            slots[slots.len() - max_requests] + window
        };
        if let Some(&last) = slots.back() {
            slot = slot.max(last);
        }
        slots.push_back(slot);

        slot.saturating_duration_since(now)
    }

    async fn acquire(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            tracing::debug!("Embedding rate limit: waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }
}

/// Google Gemini 임베딩 구현체
///
/// 문서 청크는 `batchEmbedContents`로 최대 100개씩 묶어 보내고,
/// 질의는 `embedContent` 한 번으로 처리합니다 (질의는 속도 제한 대상 아님).
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    pacer: RequestPacer,
}

impl GeminiEmbedding {
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `dimension` - 임베딩 차원 (768, 1536, 3072 중 선택)
    /// * `timeout` - 요청당 HTTP 타임아웃
    /// * `requests_per_minute` - 문서 배치 요청의 분당 상한 (0이면 제한 없음)
    pub fn with_options(
        api_key: String,
        dimension: usize,
        timeout: Duration,
        requests_per_minute: u32,
    ) -> Result<Self> {
        if ![768, 1536, 3072].contains(&dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            );
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            dimension,
            pacer: RequestPacer::per_minute(requests_per_minute),
        })
    }

    fn endpoint(method: &str) -> String {
        format!("{}/{}:{}", GEMINI_API_BASE, GEMINI_EMBED_MODEL, method)
    }

    fn request<'a>(&self, text: &'a str, task: TaskType) -> EmbedRequest<'a> {
        EmbedRequest {
            model: GEMINI_EMBED_MODEL,
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
            task_type: task,
            output_dimensionality: self.dimension,
        }
    }

    /// 429/5xx/전송 실패는 지수 백오프로 재시도, 그 외 실패는 즉시 반환
    async fn post<T: Serialize + Sync>(&self, url: &str, body: &T) -> Result<String> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0;

        loop {
            let error = match self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    let text = response
                        .text()
                        .await
                        .context("Failed to read embedding response")?;
                    if status.is_success() {
                        return Ok(text);
                    }
                    let error = gemini_error(status, &text);
                    if status != reqwest::StatusCode::TOO_MANY_REQUESTS && !status.is_server_error()
                    {
                        return Err(error);
                    }
                    error
                }
                Err(e) => anyhow::Error::new(e).context("Failed to send embedding request"),
            };

            if attempt >= MAX_RETRIES {
                return Err(error.context(format!("Embedding failed after {} retries", MAX_RETRIES)));
            }
            attempt += 1;
            tracing::warn!(
                "Embedding request failed ({:#}), retrying in {:?} ({}/{})",
                error,
                backoff,
                attempt,
                MAX_RETRIES
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }

    /// 비어 있지 않은 문서 텍스트 묶음 하나를 임베딩
    async fn embed_group(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.pacer.acquire().await;

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| self.request(text, TaskType::Document))
                .collect(),
        };
        let body = self
            .post(&Self::endpoint("batchEmbedContents"), &request)
            .await?;
        parse_batch_response(&body, texts.len())
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().context("Empty embedding batch")
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let body = self
            .post(
                &Self::endpoint("embedContent"),
                &self.request(text, TaskType::Query),
            )
            .await?;
        let response: EmbedResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;
        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = vec![vec![0.0; self.dimension]; texts.len()];

        // 빈 텍스트는 API에 보내지 않고 0 벡터로 둠
        let pending: Vec<(usize, &str)> = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(i, t)| (i, t.as_str()))
            .collect();

        for (n, group) in pending.chunks(MAX_BATCH_SIZE).enumerate() {
            tracing::debug!(
                "Embedding batch {} ({} of {} texts)",
                n + 1,
                group.len(),
                pending.len()
            );
            let group_texts: Vec<&str> = group.iter().map(|(_, t)| *t).collect();
            let vectors = self.embed_group(&group_texts).await?;
            for ((index, _), vector) in group.iter().zip(vectors) {
                results[*index] = vector;
            }
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// Gemini API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'static str,
    content: EmbedContent<'a>,
    #[serde(rename = "taskType")]
    task_type: TaskType,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// 배치 응답 파싱 (요청 수와 응답 수가 다르면 에러)
fn parse_batch_response(body: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let response: BatchEmbedResponse =
        serde_json::from_str(body).context("Failed to parse batch embedding response")?;
    if response.embeddings.len() != expected {
        anyhow::bail!(
            "Batch embedding returned {} vectors for {} texts",
            response.embeddings.len(),
            expected
        );
    }
    Ok(response.embeddings.into_iter().map(|e| e.values).collect())
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

/// 실패 응답 본문을 에러로 변환
pub(crate) fn gemini_error(status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    match serde_json::from_str::<GeminiError>(body) {
        Ok(error) => anyhow::anyhow!(
            "Gemini API error ({}): {}",
            error.error.status,
            error.error.message
        ),
        Err(_) => anyhow::anyhow!("Gemini API error ({}): {}", status, body),
    }
}

// ============================================================================
// Hash Embedding (offline)
// ============================================================================

/// 해시 임베딩 기본 차원
pub const HASH_DIMENSION: usize = 256;

/// 토큰 해싱 기반 임베딩
///
/// 소문자 단어마다 SHA-256으로 버킷과 부호를 정해 누적한 뒤 L2 정규화합니다.
/// 같은 단어를 공유하는 텍스트끼리 가까워지므로 API 키 없이도
/// 최소한의 의미 검색이 가능합니다.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(HASH_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.encode(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash-embedding"
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
///
/// `offline`이면 해시 임베딩을, 아니면 Gemini 임베딩을 사용합니다.
pub fn create_embedder(
    offline: bool,
    dimension: usize,
    timeout: Duration,
    requests_per_minute: u32,
) -> Result<Arc<dyn EmbeddingProvider>> {
    if offline {
        tracing::info!("Using offline hash embedding (dimension: {})", HASH_DIMENSION);
        return Ok(Arc::new(HashEmbedding::default()));
    }

    let api_key = get_api_key()?;
    let embedder = GeminiEmbedding::with_options(api_key, dimension, timeout, requests_per_minute)?;
    tracing::info!(
        "Using Gemini API embedding (dimension: {})",
        embedder.dimension()
    );
    Ok(Arc::new(embedder))
}

// ============================================================================
// Tests
// ============================================================================
