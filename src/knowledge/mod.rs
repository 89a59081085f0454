//! Knowledge 모듈 - 임베딩 기반 검색 파이프라인
//!
//! - Store: SQLite 단일 테이블 벡터 저장소 (헤더 `Text`, `Text embedding`)
//! - Handle: 저장소 소유 스레드, 쓰기 직렬화 + 스냅샷 읽기
//! - Vector: 코사인 유사도 전체 스캔 랭킹
//! - Retriever: 수집/응답 오케스트레이션

mod handle;
mod retriever;
mod store;
mod vector;

// Re-exports
pub use handle::StoreHandle;
pub use retriever::{
    build_prompt, ChatMessage, ChatRequest, ChatResponse, IngestReport, PreparedPrompt,
    Retriever, Role, CONTEXT_SEPARATOR,
};
pub use store::{StoreError, StoreStats, VectorStore, HEADER, TABLE_NAME};
pub use vector::{cosine_similarity, rank, ScoredCandidate, VectorRecord};
