//! CLI 모듈
//!
//! paperchat CLI 명령어 정의 및 구현

use std::io::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::{EngineArgs, EngineConfig};
use crate::embedding::has_api_key;
use crate::engine::{Dispatcher, QueryRequest};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "paperchat")]
#[command(version, about = "세션 기반 RAG 질의응답 (문서 업로드 + 논문 리서치)", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// HTTP 서버 실행
    Serve {
        /// 바인드 주소
        #[arg(short, long, env = "PAPERCHAT_ADDR", default_value = "127.0.0.1:8000")]
        addr: SocketAddr,

        /// 허용할 CORS 출처 (쉼표 구분, 생략하면 모든 출처 허용)
        #[arg(long = "cors-origin", env = "PAPERCHAT_CORS_ORIGINS", value_delimiter = ',')]
        cors_origins: Vec<String>,
    },

    /// 한 번 질문하기 (문서 또는 리서치)
    Ask {
        /// 질문
        #[arg(short, long)]
        query: Option<String>,

        /// 업로드할 문서 (pdf, docx, 텍스트)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// 이어갈 세션 ID
        #[arg(short, long)]
        session: Option<String>,

        /// 답변 후 같은 세션으로 후속 질문 계속
        #[arg(short, long)]
        interactive: bool,
    },

    /// 설정 및 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { addr, cors_origins } => cmd_serve(cli.engine, addr, cors_origins).await,
        Commands::Ask {
            query,
            file,
            session,
            interactive,
        } => cmd_ask(cli.engine, query, file, session, interactive).await,
        Commands::Status => cmd_status(cli.engine),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// API 키 확인
fn require_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

fn build_dispatcher(engine: EngineArgs) -> Result<Arc<Dispatcher>> {
    require_api_key()?;
    let config = engine.into_config().context("잘못된 설정")?;
    let dispatcher = Dispatcher::from_config(&config).context("엔진 초기화 실패")?;
    Ok(Arc::new(dispatcher))
}

/// 서버 명령어 (serve)
async fn cmd_serve(engine: EngineArgs, addr: SocketAddr, cors_origins: Vec<String>) -> Result<()> {
    let cors = crate::server::cors_layer(&cors_origins).context("잘못된 CORS 설정")?;
    let dispatcher = build_dispatcher(engine)?;
    println!("[*] paperchat 서버 시작: http://{}", addr);
    if cors_origins.is_empty() {
        println!("[*] CORS: 모든 출처 허용");
    } else {
        println!("[*] CORS: {}", cors_origins.join(", "));
    }
    crate::server::serve(addr, dispatcher, cors).await
}

/// 질문 명령어 (ask)
///
/// 세션은 프로세스 메모리에만 있으므로, 후속 질문은 `--interactive`로 이어갑니다.
async fn cmd_ask(
    engine: EngineArgs,
    query: Option<String>,
    file: Option<PathBuf>,
    session: Option<String>,
    interactive: bool,
) -> Result<()> {
    let dispatcher = build_dispatcher(engine)?;

    let mut request = QueryRequest {
        query,
        file: None,
        session_id: session,
    };

    if let Some(path) = file {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("파일 읽기 실패: {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        println!("[*] 문서 업로드: {} ({})", filename, format_bytes(bytes.len()));
        request = request.with_file(filename, bytes);
    } else if let Some(q) = request.query.as_deref() {
        println!("[*] 질문: {}", truncate_text(q, 80));
    }

    let response = dispatcher.handle(request).await?;
    print_answer(&response.answer, &response.session_id);

    if !interactive {
        return Ok(());
    }

    // 후속 질문 루프 (빈 줄 또는 exit로 종료)
    let session_id = response.session_id;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() || line == "exit" || line == "quit" {
            break;
        }

        let request = QueryRequest::default()
            .with_query(line)
            .with_session(session_id.clone());
        match dispatcher.handle(request).await {
            Ok(response) => print_answer(&response.answer, &response.session_id),
            Err(e) => println!("[!] {}", e),
        }
    }

    Ok(())
}

fn print_answer(answer: &str, session_id: &str) {
    println!();
    println!("{}", answer);
    println!();
    println!("[OK] 세션: {}", session_id);
}

/// 상태 명령어 (status)
///
/// 적용될 설정과 API 키 상태를 출력합니다.
fn cmd_status(engine: EngineArgs) -> Result<()> {
    println!("paperchat v{}", env!("CARGO_PKG_VERSION"));
    println!();

    // API 키 상태
    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match engine.into_config() {
        Ok(config) => print_config(&config),
        Err(e) => println!("[!] 잘못된 설정: {}", e),
    }

    Ok(())
}

fn print_config(config: &EngineConfig) {
    println!("[OK] 설정:");
    println!(
        "     청크: {} 문자 (오버랩 {})",
        config.chunk.chunk_size, config.chunk.overlap
    );
    println!("     검색 청크 수: {}", config.top_k);
    println!(
        "     리서치: 최대 {} 편, 2차 소스 {}",
        config.research.max_results,
        if config.use_secondary_source {
            "사용"
        } else {
            "미사용"
        }
    );
    println!(
        "     임베딩: {}",
        if config.offline {
            "오프라인 해시".to_string()
        } else {
            format!(
                "Gemini ({}차원, {})",
                config.embedding_dimension,
                match config.embedding_rpm {
                    0 => "속도 제한 없음".to_string(),
                    rpm => format!("분당 {} 배치", rpm),
                }
            )
        }
    );
    println!(
        "     모델: {} (최대 {} 토큰)",
        config.chat_model, config.max_output_tokens
    );
    println!(
        "     세션: 최대 {} 개, 만료 {}",
        config.retention.max_sessions,
        match config.retention.idle_ttl {
            Some(ttl) => format!("{}초", ttl.as_secs()),
            None => "없음".to_string(),
        }
    );
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
