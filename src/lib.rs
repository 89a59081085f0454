//! doc-chat-rag - 문서 기반 RAG 채팅
//!
//! 문서를 텍스트 조각으로 나누어 임베딩을 저장하고,
//! 질문과 가장 가까운 조각을 프롬프트에 넣어 답변을 생성합니다.

pub mod cli;
pub mod collector;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod knowledge;

// Re-exports
pub use completion::{CompletionProvider, OpenAiCompletion};
pub use config::{get_data_dir, RagConfig};
pub use embedding::{EmbeddingProvider, OpenAiEmbedding};
pub use error::{RagError, RagResult};
pub use extractor::{extract_all, Fragment};
pub use knowledge::{
    build_prompt, cosine_similarity, rank, ChatMessage, ChatRequest, ChatResponse, IngestReport,
    PreparedPrompt, Retriever, Role, ScoredCandidate, StoreError, StoreHandle, StoreStats,
    VectorRecord, VectorStore,
};
