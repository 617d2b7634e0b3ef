//! 대화 백엔드 모듈
//!
//! 세션마다 하나의 `Conversation`을 가지며, 대화 기록은 그 안에 유지됩니다.
//! Gemini generateContent API는 무상태이므로 매 요청에 전체 기록을 함께 보냅니다.
//! source: https://ai.google.dev/api/generate-content

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::gemini_error;

// ============================================================================
// Traits
// ============================================================================

/// 대화 한 턴의 발화자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// 대화 기록 한 항목
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

/// 기록을 유지하는 대화 핸들
#[async_trait]
pub trait Conversation: Send + Sync {
    /// 메시지를 보내고 응답 텍스트를 받음 (성공 시 기록에 추가)
    async fn send(&mut self, prompt: &str) -> Result<String>;

    /// 지금까지의 대화 기록
    fn history(&self) -> &[ChatMessage];
}

/// 대화 핸들 팩토리
pub trait ChatModel: Send + Sync {
    /// 빈 기록으로 새 대화 시작
    fn start_chat(&self) -> Box<dyn Conversation>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Gemini
// ============================================================================

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// 기본 대화 모델
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

/// 기본 최대 출력 토큰
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 10_000;

/// Gemini 대화 모델
#[derive(Debug, Clone)]
pub struct GeminiChat {
    api_key: String,
    model: String,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl GeminiChat {
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `model` - 모델 이름 (예: gemini-2.5-flash)
    /// * `max_output_tokens` - 응답 최대 토큰
    /// * `timeout` - 요청당 HTTP 타임아웃
    pub fn new(
        api_key: String,
        model: impl Into<String>,
        max_output_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            model: model.into(),
            max_output_tokens,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", GEMINI_API_BASE, self.model)
    }
}

impl ChatModel for GeminiChat {
    fn start_chat(&self) -> Box<dyn Conversation> {
        Box::new(GeminiConversation {
            chat: self.clone(),
            history: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Gemini 대화 핸들
pub struct GeminiConversation {
    chat: GeminiChat,
    history: Vec<ChatMessage>,
}

#[async_trait]
impl Conversation for GeminiConversation {
    async fn send(&mut self, prompt: &str) -> Result<String> {
        let request = build_request(&self.history, prompt, self.chat.max_output_tokens);

        let response = self
            .chat
            .client
            .post(self.chat.endpoint())
            .header("x-goog-api-key", &self.chat.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send generateContent request")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response body")?;

        if !status.is_success() {
            return Err(gemini_error(status, &body));
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse generateContent response")?;
        let answer = parsed.text().context("Model returned no text candidates")?;

        // 실패한 턴은 기록에 남기지 않음
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

fn build_request(history: &[ChatMessage], prompt: &str, max_output_tokens: u32) -> GenerateRequest {
    let mut contents: Vec<Content> = history
        .iter()
        .map(|m| Content {
            role: m.role,
            parts: vec![Part {
                text: m.text.clone(),
            }],
        })
        .collect();
    contents.push(Content {
        role: Role::User,
        parts: vec![Part {
            text: prompt.to_string(),
        }],
    });

    GenerateRequest {
        contents,
        generation_config: GenerationConfig { max_output_tokens },
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    role: Role,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

impl GenerateResponse {
    /// 첫 후보의 텍스트 파트를 이어 붙임
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        (!text.is_empty()).then_some(text)
    }
}

// ============================================================================
// Tests
// ============================================================================
