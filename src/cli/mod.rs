//! CLI 모듈
//!
//! doc-chat-rag CLI 명령어 정의 및 구현.
//! 업로드(ingest)와 채팅(ask) 경계를 명령줄로 제공합니다.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::collector::{CollectionStats, CollectorConfig, DocumentCollector};
use crate::config::RagConfig;
use crate::error::RagError;
use crate::knowledge::{ChatMessage, ChatRequest, ChatResponse, Retriever, StoreHandle};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "doc-chat-rag")]
#[command(version, about = "문서 기반 RAG 채팅", long_about = None)]
pub struct Cli {
    /// 벡터 저장소 경로 (기본: ~/.doc-chat-rag/embedding.db)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서(PDF, 텍스트)를 임베딩하여 저장소에 추가
    Ingest {
        /// 수집할 파일 또는 폴더 경로
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// 숨김 파일 포함
        #[arg(long)]
        include_hidden: bool,

        /// 결과를 JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 저장된 문서를 근거로 질문에 답변
    Ask {
        /// 질문
        question: Option<String>,

        /// 대화 파일 (`{"chats": [{"role", "content"}, ...]}`)
        #[arg(long, conflicts_with = "question")]
        chats: Option<PathBuf>,

        /// 프롬프트에 들어간 조각 개수
        #[arg(short = 'k', long, value_parser = parse_top_k)]
        top_k: Option<usize>,

        /// 사용된 컨텍스트 조각 출력
        #[arg(long)]
        show_context: bool,

        /// 결과를 JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 질문과 가장 가까운 조각 검색 (답변 생성 없음)
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short = 'k', long, default_value = "5")]
        limit: usize,
    },

    /// 상태 확인
    Status {
        /// 설정과 저장소 통계를 JSON으로 출력
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = RagConfig::from_env().context("설정 로드 실패")?;
    if let Some(store) = cli.store {
        config.store_path = store;
    }

    match cli.command {
        Commands::Ingest {
            paths,
            include_hidden,
            json,
        } => cmd_ingest(&config, &paths, include_hidden, json).await,
        Commands::Ask {
            question,
            chats,
            top_k,
            show_context,
            json,
        } => {
            if let Some(k) = top_k {
                config.top_k = k;
            }
            cmd_ask(&config, question, chats, show_context, json).await
        }
        Commands::Search { query, limit } => cmd_search(&config, &query, limit).await,
        Commands::Status { json } => cmd_status(&config, json).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 수집 명령어 (ingest)
async fn cmd_ingest(
    config: &RagConfig,
    paths: &[PathBuf],
    include_hidden: bool,
    json: bool,
) -> Result<()> {
    let collector = DocumentCollector::new(CollectorConfig {
        include_hidden,
        ..Default::default()
    });

    let documents = collector.collect(paths).context("문서 수집 실패")?;
    if documents.is_empty() {
        bail!("수집할 문서가 없습니다 (지원 형식: pdf, txt, md)");
    }

    let stats = CollectionStats::from_documents(&documents);
    if !json {
        println!("[*] 수집 대상: {} 문서", stats.total_files);
        println!(
            "    PDF: {}, 텍스트: {}, 총 크기: {}",
            stats.pdf_files,
            stats.text_files,
            format_bytes(stats.total_size as usize)
        );
        for doc in &documents {
            println!("    [{}] {}", doc.kind.label(), doc.path.display());
        }
        println!("[*] 텍스트 추출 및 임베딩 생성 중...");
    }

    let retriever = Retriever::from_config(config).context("Retriever 초기화 실패")?;
    let document_paths: Vec<PathBuf> = documents.into_iter().map(|d| d.path).collect();

    let report = retriever
        .ingest(&document_paths)
        .await
        .map_err(|e| tagged(e, "문서 수집 실패"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "[OK] 완료: 조각 {}, 추가 {}, 중복 건너뜀 {}",
            report.fragments, report.appended, report.skipped
        );
        println!("     저장소: {}", report.store_path.display());
    }

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(
    config: &RagConfig,
    question: Option<String>,
    chats: Option<PathBuf>,
    show_context: bool,
    json: bool,
) -> Result<()> {
    let conversation = if let Some(path) = chats {
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("대화 파일 읽기 실패: {:?}", path))?;
        let request: ChatRequest =
            serde_json::from_str(&raw).context("대화 파일 형식이 올바르지 않습니다")?;
        request.chats
    } else if let Some(question) = question {
        vec![ChatMessage::user(question)]
    } else {
        bail!("질문 또는 --chats 중 하나를 지정해야 합니다");
    };

    let retriever = Retriever::from_config(config).context("Retriever 초기화 실패")?;

    if show_context {
        let prepared = retriever
            .prepare(&conversation)
            .await
            .map_err(|e| tagged(e, "검색 실패"))?;
        eprintln!("[*] 컨텍스트 ({} 건):", prepared.context.len());
        for (i, candidate) in prepared.context.iter().enumerate() {
            eprintln!(
                "  {}. [점수: {:.4}] {}",
                i + 1,
                candidate.score,
                truncate_text(&candidate.text, 120)
            );
        }
    }

    let output = retriever
        .answer(&conversation)
        .await
        .map_err(|e| tagged(e, "답변 생성 실패"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ChatResponse { output })?);
    } else {
        println!("{}", output.content);
    }

    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(config: &RagConfig, query: &str, limit: usize) -> Result<()> {
    println!("[*] 검색 중: \"{}\"", query);

    let retriever = Retriever::from_config(config).context("Retriever 초기화 실패")?;
    let results = retriever
        .search(query, limit)
        .await
        .map_err(|e| tagged(e, "검색 실패"))?;

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());
    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [점수: {:.4}] {}",
            i + 1,
            result.score,
            truncate_text(&result.text, 200)
        );
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &RagConfig, json: bool) -> Result<()> {
    let store = StoreHandle::spawn(config.store_path.clone()).context("저장소 열기 실패")?;

    if json {
        let stats = store.stats().await.context("저장소 통계 조회 실패")?;
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "config": config,
            "has_api_key": config.has_api_key(),
            "store": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("doc-chat-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 저장소 경로: {}", config.store_path.display());
    println!("[*] 임베딩 모델: {}", config.embedding_model);
    println!("[*] 완성 모델: {} (max_tokens {})", config.completion_model, config.max_tokens);
    println!("[*] 컨텍스트 조각 수: {}", config.top_k);

    if config.has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export OPENAI_API_KEY=your-key");
    }

    match store.stats().await {
        Ok(stats) if stats.exists => {
            println!("[OK] 저장된 조각: {} 건", stats.record_count);
            if let Some(dimension) = stats.dimension {
                println!("     벡터 차원: {}", dimension);
            }
        }
        Ok(_) => println!("[!] 저장소 없음 (ingest로 생성)"),
        Err(e) => println!("[!] 저장소 통계 조회 실패: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 조각 개수 파싱 (1 이상)
fn parse_top_k(value: &str) -> std::result::Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(k) => Ok(k),
        Err(e) => Err(e.to_string()),
    }
}

/// 에러 종류 태그를 붙여 anyhow로 변환
fn tagged(err: RagError, message: &str) -> anyhow::Error {
    let kind = err.kind();
    tracing::error!(kind, "{}: {}", message, err);
    anyhow::Error::new(err).context(format!("{} [{}]", message, kind))
}

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
