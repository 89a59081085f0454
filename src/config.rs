//! 설정 모듈 - 환경변수 기반 런타임 설정
//!
//! 모든 값은 환경변수에서 읽으며, 없으면 기본값을 사용합니다.
//! 저장 위치 기본값: ~/.doc-chat-rag/embedding.db

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

/// 기본 OpenAI 호환 API 주소
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// 기본 임베딩 모델
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
/// 기본 완성 모델
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo-instruct";
/// 답변 최대 토큰 수
pub const DEFAULT_MAX_TOKENS: u32 = 64;
/// 프롬프트에 넣을 상위 조각 수
pub const DEFAULT_TOP_K: usize = 3;
/// HTTP 요청 타임아웃 (초)
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// 저장소 파일 이름
pub const STORE_FILE_NAME: &str = "embedding.db";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.doc-chat-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".doc-chat-rag")
}

/// 기본 저장소 경로
pub fn default_store_path() -> PathBuf {
    get_data_dir().join(STORE_FILE_NAME)
}

// ============================================================================
// RagConfig
// ============================================================================

/// 런타임 설정
#[derive(Debug, Clone, Serialize)]
pub struct RagConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub embedding_model: String,
    pub completion_model: String,
    pub max_tokens: u32,
    pub top_k: usize,
    pub store_path: PathBuf,
    pub request_timeout: Duration,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            top_k: DEFAULT_TOP_K,
            store_path: default_store_path(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RagConfig {
    /// 프로세스 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 조회 함수로 설정 로드
    ///
    /// 빈 문자열은 미설정으로 취급합니다.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.api_key = get("OPENAI_API_KEY");

        if let Some(base_url) = get("OPENAI_BASE_URL") {
            url::Url::parse(&base_url)
                .with_context(|| format!("Invalid OPENAI_BASE_URL: {}", base_url))?;
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get("RAG_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(model) = get("RAG_COMPLETION_MODEL") {
            config.completion_model = model;
        }
        if let Some(value) = get("RAG_MAX_TOKENS") {
            config.max_tokens = value
                .parse()
                .with_context(|| format!("Invalid RAG_MAX_TOKENS: {}", value))?;
        }
        if let Some(value) = get("RAG_TOP_K") {
            config.top_k = value
                .parse()
                .with_context(|| format!("Invalid RAG_TOP_K: {}", value))?;
        }
        if let Some(path) = get("RAG_STORE_PATH") {
            config.store_path = PathBuf::from(path);
        }
        if let Some(value) = get("RAG_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = value
                .parse()
                .with_context(|| format!("Invalid RAG_REQUEST_TIMEOUT_SECS: {}", value))?;
            config.request_timeout = Duration::from_secs(secs);
        }

        anyhow::ensure!(config.top_k > 0, "RAG_TOP_K must be at least 1");
        Ok(config)
    }

    /// API 키 반환 (없으면 에러)
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "API key not found. Set OPENAI_API_KEY environment variable.\n\
                 Get your API key at: https://platform.openai.com/api-keys"
            )
        })
    }

    /// API 키 존재 여부
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================
