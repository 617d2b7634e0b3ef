//! 클라이언트에 보고되는 에러 분류
//!
//! 내부 배관은 `anyhow`로 처리하고, 요청 경계에서만 이 타입으로 좁힙니다.
//! 검색/다운로드 실패 같은 열화(degradation)는 여기까지 올라오지 않습니다.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::extractor::ExtractionError;

#[derive(Debug, Error)]
pub enum QueryError {
    /// 잘못된 요청 (질의/파일 누락 등)
    #[error("{0}")]
    InvalidRequest(String),

    /// 존재하지 않거나 만료된 세션 (세션 조회/삭제 API)
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// 업로드 파일에서 텍스트를 추출할 수 없음
    #[error("Failed to extract text: {0}")]
    ExtractionFailed(String),

    /// 인덱싱/모델 호출 등 내부 실패
    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl QueryError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            QueryError::InvalidRequest(_) | QueryError::ExtractionFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            QueryError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            QueryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 응답 본문의 `error` 필드 값
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::InvalidRequest(_) => "invalid_request",
            QueryError::SessionNotFound(_) => "session_not_found",
            QueryError::ExtractionFailed(_) => "extraction_failed",
            QueryError::Internal(_) => "internal_error",
        }
    }

    fn detail(&self) -> String {
        match self {
            QueryError::InvalidRequest(msg) | QueryError::ExtractionFailed(msg) => msg.clone(),
            QueryError::SessionNotFound(id) => format!("No active session with id {}", id),
            QueryError::Internal(e) => format!("{:#}", e),
        }
    }
}

impl From<ExtractionError> for QueryError {
    fn from(e: ExtractionError) -> Self {
        QueryError::ExtractionFailed(e.to_string())
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::info!("Request rejected ({}): {}", self.code(), self);
        }

        let body = Json(json!({
            "error": self.code(),
            "detail": self.detail(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let invalid = QueryError::InvalidRequest("Either query or file must be provided".into());
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.code(), "invalid_request");
        assert_eq!(invalid.to_string(), "Either query or file must be provided");

        let extraction: QueryError = ExtractionError::Pdf("bad xref".into()).into();
        assert_eq!(extraction.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(extraction.code(), "extraction_failed");

        let missing = QueryError::SessionNotFound("abc".into());
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.code(), "session_not_found");

        let internal: QueryError = anyhow::anyhow!("model unavailable").into();
        assert_eq!(internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.code(), "internal_error");
    }

    #[test]
    fn test_into_response_status() {
        let response = QueryError::InvalidRequest("nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = QueryError::Internal(anyhow::anyhow!("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
