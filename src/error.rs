//! 에러 타입 - 검색/응답 파이프라인 경계 에러
//!
//! 내부 모듈은 anyhow로 컨텍스트를 쌓고, Retriever 경계에서
//! 실패 종류별 태그가 붙은 `RagError`로 변환합니다.

use std::path::PathBuf;

use thiserror::Error;

use crate::knowledge::StoreError;

/// 파이프라인 결과 타입
pub type RagResult<T> = std::result::Result<T, RagError>;

/// 실패 종류별로 구분된 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 잘못된 입력 (빈 문서 목록, 잘못된 대화 등)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 문서 텍스트 추출 실패
    #[error("failed to extract text from {path:?}")]
    Extraction {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// 임베딩 서비스 호출 실패
    #[error("embedding service failed")]
    Embedding(#[source] anyhow::Error),

    /// 완성(completion) 서비스 호출 실패
    #[error("completion service failed")]
    Completion(#[source] anyhow::Error),

    /// 벡터 저장소 파일 없음
    #[error("vector store not found at {0:?}; ingest documents first")]
    StoreMissing(PathBuf),

    /// 벡터 저장소는 있지만 레코드가 없음
    #[error("vector store at {0:?} has no records")]
    StoreEmpty(PathBuf),

    /// 벡터 차원 불일치
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 기타 저장소 실패 (손상된 행, SQLite 에러 등)
    #[error("vector store failure")]
    Store(#[source] StoreError),
}

impl RagError {
    /// 로그/응답용 고정 태그
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::InvalidInput(_) => "invalid_input",
            RagError::Extraction { .. } => "extraction",
            RagError::Embedding(_) => "embedding",
            RagError::Completion(_) => "completion",
            RagError::StoreMissing(_) => "store_missing",
            RagError::StoreEmpty(_) => "store_empty",
            RagError::DimensionMismatch { .. } => "dimension_mismatch",
            RagError::Store(_) => "store",
        }
    }

    /// 재시도하면 성공할 수 있는 업스트림 실패인지 여부
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::Embedding(_) | RagError::Completion(_))
    }
}

impl From<StoreError> for RagError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Missing(path) => RagError::StoreMissing(path),
            StoreError::Empty(path) => RagError::StoreEmpty(path),
            StoreError::Dimension { expected, actual } => {
                RagError::DimensionMismatch { expected, actual }
            }
            other => RagError::Store(other),
        }
    }
}
