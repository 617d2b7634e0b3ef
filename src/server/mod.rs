//! HTTP 서버
//!
//! - `POST /query` (multipart: `query`, `file`, `session_id` 모두 선택)
//! - `GET /sessions`, `GET /sessions/{id}`, `DELETE /sessions/{id}`
//! - `GET /health`
//!
//! 브라우저 프론트엔드가 다른 출처에서 호출하므로 CORS 레이어를 항상 붙입니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::engine::{Dispatcher, QueryRequest, QueryResponse, UploadedFile};
use crate::error::QueryError;
use crate::knowledge::Citation;
use crate::session::SessionSummary;

/// 업로드 최대 크기
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// 만료 세션 정리 주기
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// CORS 레이어 생성
///
/// 출처 목록이 비어 있거나 `*`를 포함하면 모든 출처를 허용합니다.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o.trim() == "*") {
        return Ok(layer.allow_origin(Any));
    }

    let origins = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o.trim()).with_context(|| format!("Invalid CORS origin: {}", o))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// 라우터 구성
pub fn build_router(dispatcher: Arc<Dispatcher>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/sessions", get(list_sessions_handler))
        .route(
            "/sessions/{id}",
            get(session_handler).delete(delete_session_handler),
        )
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(dispatcher)
}

/// 서버 실행 (Ctrl+C로 종료)
pub async fn serve(addr: SocketAddr, dispatcher: Arc<Dispatcher>, cors: CorsLayer) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    let sessions = Arc::clone(dispatcher.sessions());
    let eviction = tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            interval.tick().await;
            sessions.evict_expired();
        }
    });

    axum::serve(listener, build_router(dispatcher, cors))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")?;

    eviction.abort();
    Ok(())
}

async fn health_handler(State(dispatcher): State<Arc<Dispatcher>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": dispatcher.sessions().len(),
    }))
}

/// 세션 상세 (요약 + 추출된 인용)
#[derive(Debug, Serialize)]
struct SessionDetail {
    #[serde(flatten)]
    summary: SessionSummary,
    citations: Vec<Citation>,
}

async fn list_sessions_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
) -> Json<Vec<SessionSummary>> {
    Json(dispatcher.sessions().summaries())
}

async fn session_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetail>, QueryError> {
    let session = dispatcher
        .sessions()
        .get(&id)
        .ok_or(QueryError::SessionNotFound(id))?;

    Ok(Json(SessionDetail {
        summary: session.summary(),
        citations: session.citations().to_vec(),
    }))
}

async fn delete_session_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path(id): Path<String>,
) -> Result<StatusCode, QueryError> {
    match dispatcher.sessions().remove(&id) {
        Some(_) => {
            tracing::info!("Deleted session {}", id);
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(QueryError::SessionNotFound(id)),
    }
}

async fn query_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    mut multipart: Multipart,
) -> Result<Json<QueryResponse>, QueryError> {
    let request = read_request(&mut multipart).await?;
    tracing::info!(
        "POST /query (query: {}, file: {:?}, session: {:?})",
        request.query.is_some(),
        request.file.as_ref().map(|f| f.filename.as_str()),
        request.session_id
    );

    let response = dispatcher.handle(request).await?;
    Ok(Json(response))
}

/// multipart 폼을 요청으로 변환 (알 수 없는 필드는 무시)
async fn read_request(multipart: &mut Multipart) -> Result<QueryRequest, QueryError> {
    let malformed = |e: axum::extract::multipart::MultipartError| {
        QueryError::InvalidRequest(format!("Malformed multipart body: {}", e))
    };

    let mut request = QueryRequest::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "query" => request.query = Some(field.text().await.map_err(malformed)?),
            "session_id" => request.session_id = Some(field.text().await.map_err(malformed)?),
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(malformed)?;
                // 브라우저는 파일을 고르지 않아도 빈 파트를 보냄
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }
                request.file = Some(UploadedFile {
                    filename: if filename.is_empty() {
                        "upload".to_string()
                    } else {
                        filename
                    },
                    bytes: bytes.to_vec(),
                });
            }
            other => tracing::debug!("Ignoring multipart field {:?}", other),
        }
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{EchoChat, FailingSearch, StaticFetcher};
    use crate::extractor::ContentExtractor;
    use crate::knowledge::{Retriever, WindowChunker, DEFAULT_TOP_K};
    use crate::session::SessionStore;
    use crate::sources::{ResearchOptions, SourceAggregator};
    use crate::embedding::HashEmbedding;
    use reqwest::multipart::{Form, Part};

    async fn spawn_server() -> String {
        spawn_server_with_cors(&[]).await
    }

    async fn spawn_server_with_cors(origins: &[&str]) -> String {
        let origins: Vec<String> = origins.iter().map(|o| o.to_string()).collect();
        let cors = cors_layer(&origins).unwrap();
        let dispatcher = Dispatcher::new(
            Arc::new(SessionStore::default()),
            Retriever::new(
                Arc::new(HashEmbedding::default()),
                WindowChunker::with_defaults(),
                DEFAULT_TOP_K,
            ),
            SourceAggregator::new(
                ContentExtractor::new(),
                Arc::new(FailingSearch),
                None,
                Arc::new(StaticFetcher::new(&[])),
                ResearchOptions {
                    max_results: 3,
                    secondary_delay: Duration::ZERO,
                },
            ),
            Arc::new(EchoChat::default()),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(Arc::new(dispatcher), cors))
                .await
                .unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_health() {
        let base = spawn_server().await;
        let body: serde_json::Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 0);
    }

    #[tokio::test]
    async fn test_query_with_file_then_follow_up() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let form = Form::new().part(
            "file",
            Part::bytes(b"Transformers use attention.".to_vec()).file_name("notes.txt"),
        );
        let response = client
            .post(format!("{}/query", base))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let first: serde_json::Value = response.json().await.unwrap();
        let session_id = first["session_id"].as_str().unwrap().to_string();
        assert!(!first["answer"].as_str().unwrap().is_empty());

        let form = Form::new()
            .text("query", "what do they use?")
            .text("session_id", session_id.clone());
        let second: serde_json::Value = client
            .post(format!("{}/query", base))
            .multipart(form)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(second["session_id"], session_id.as_str());
    }

    #[tokio::test]
    async fn test_empty_form_is_bad_request() {
        let base = spawn_server().await;
        let response = reqwest::Client::new()
            .post(format!("{}/query", base))
            .multipart(Form::new().text("unrelated", "x"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "invalid_request");
        assert_eq!(body["detail"], "Either query or file must be provided");
    }

    #[tokio::test]
    async fn test_corrupt_docx_is_extraction_failure() {
        let base = spawn_server().await;
        let form = Form::new().part(
            "file",
            Part::bytes(b"definitely not a zip".to_vec()).file_name("paper.docx"),
        );
        let response = reqwest::Client::new()
            .post(format!("{}/query", base))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "extraction_failed");
    }

    async fn upload(client: &reqwest::Client, base: &str, text: &str) -> String {
        let form = Form::new().part(
            "file",
            Part::bytes(text.as_bytes().to_vec()).file_name("notes.txt"),
        );
        let body: serde_json::Value = client
            .post(format!("{}/query", base))
            .multipart(form)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        body["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin_by_default() {
        let base = spawn_server().await;
        let response = reqwest::Client::new()
            .get(format!("{}/health", base))
            .header("Origin", "http://localhost:5173")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }

    #[tokio::test]
    async fn test_cors_preflight_for_query() {
        let base = spawn_server().await;
        let response = reqwest::Client::new()
            .request(reqwest::Method::OPTIONS, format!("{}/query", base))
            .header("Origin", "http://localhost:5173")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert!(response
            .headers()
            .contains_key("access-control-allow-methods"));
    }

    #[tokio::test]
    async fn test_cors_restricted_origins() {
        let base = spawn_server_with_cors(&["http://localhost:3000"]).await;
        let client = reqwest::Client::new();

        let allowed = client
            .get(format!("{}/health", base))
            .header("Origin", "http://localhost:3000")
            .send()
            .await
            .unwrap();
        assert_eq!(
            allowed.headers()["access-control-allow-origin"],
            "http://localhost:3000"
        );

        let other = client
            .get(format!("{}/health", base))
            .header("Origin", "http://evil.example")
            .send()
            .await
            .unwrap();
        assert!(!other.headers().contains_key("access-control-allow-origin"));
    }

    #[test]
    fn test_invalid_cors_origin() {
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
        assert!(cors_layer(&["*".to_string()]).is_ok());
    }

    #[tokio::test]
    async fn test_list_and_inspect_sessions() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();
        let session_id = upload(&client, &base, "John Smith (2020) showed attention helps.").await;

        let sessions: serde_json::Value = client
            .get(format!("{}/sessions", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let sessions = sessions.as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["session_id"], session_id.as_str());
        assert_eq!(sessions[0]["mode"], "file");
        assert_eq!(sessions[0]["source_name"], "notes.txt");

        let detail: serde_json::Value = client
            .get(format!("{}/sessions/{}", base, session_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(detail["session_id"], session_id.as_str());
        assert_eq!(detail["citations"][0]["matched"], "John Smith (2020)");
    }

    #[tokio::test]
    async fn test_delete_session() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();
        let session_id = upload(&client, &base, "Transformers use attention.").await;

        let response = client
            .delete(format!("{}/sessions/{}", base, session_id))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 204);

        let response = client
            .get(format!("{}/sessions/{}", base, session_id))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "session_not_found");

        let response = client
            .delete(format!("{}/sessions/{}", base, session_id))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }
}
