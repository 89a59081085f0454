//! Retriever - 수집/응답 파이프라인 오케스트레이터
//!
//! - 수집: 문서 → 텍스트 조각 → 임베딩 → 저장소
//! - 응답: 마지막 메시지 → 임베딩 → 유사도 랭킹 → 프롬프트 → 완성
//!
//! 모든 하위 단계 실패는 종류별 `RagError`로 드러나며 재시도하지 않습니다.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::completion::{CompletionProvider, OpenAiCompletion};
use crate::config::{RagConfig, DEFAULT_MAX_TOKENS, DEFAULT_TOP_K};
use crate::embedding::{EmbeddingProvider, OpenAiEmbedding};
use crate::error::{RagError, RagResult};
use crate::extractor::{self, Fragment};

use super::handle::StoreHandle;
use super::vector::{rank, ScoredCandidate, VectorRecord};

/// 컨텍스트 조각 구분자
pub const CONTEXT_SEPARATOR: &str = ". ";

// ============================================================================
// Conversation Types
// ============================================================================

/// 대화 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// 대화 메시지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 채팅 요청 본문 (`{"chats": [...]}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub chats: Vec<ChatMessage>,
}

/// 채팅 응답 본문 (`{"output": {...}}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub output: ChatMessage,
}

// ============================================================================
// Result Types
// ============================================================================

/// 수집 결과
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// 처리한 문서 수
    pub documents: usize,
    /// 추출된 조각 수
    pub fragments: usize,
    /// 새로 저장된 레코드 수
    pub appended: usize,
    /// 중복으로 건너뛴 조각 수
    pub skipped: usize,
    /// 저장소 경로
    pub store_path: PathBuf,
}

/// 완성 호출 직전까지 조립된 프롬프트
#[derive(Debug, Clone, Serialize)]
pub struct PreparedPrompt {
    /// 쿼리 (마지막 메시지 내용)
    pub query: String,
    /// 상위 k개 조각
    pub context: Vec<ScoredCandidate>,
    /// 완성 서비스로 보낼 프롬프트
    pub prompt: String,
}

// ============================================================================
// Retriever
// ============================================================================

/// 검색 증강 오케스트레이터
///
/// 외부 서비스는 트레이트 객체로 받으므로 테스트에서 교체할 수 있습니다.
#[derive(Clone)]
pub struct Retriever {
    store: StoreHandle,
    embedder: Arc<dyn EmbeddingProvider>,
    completer: Arc<dyn CompletionProvider>,
    top_k: usize,
    max_tokens: u32,
}

impl Retriever {
    pub fn new(
        store: StoreHandle,
        embedder: Arc<dyn EmbeddingProvider>,
        completer: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            store,
            embedder,
            completer,
            top_k: DEFAULT_TOP_K,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// 설정에서 OpenAI 호환 클라이언트로 생성
    pub fn from_config(config: &RagConfig) -> anyhow::Result<Self> {
        let store = StoreHandle::spawn(config.store_path.clone())
            .context("Failed to start vector store worker")?;
        let embedder = OpenAiEmbedding::from_config(config).context("Failed to create embedder")?;
        let completer =
            OpenAiCompletion::from_config(config).context("Failed to create completion client")?;

        tracing::info!(
            "Using embedding model {} and completion model {}",
            embedder.name(),
            completer.name()
        );

        Ok(Self::new(store, Arc::new(embedder), Arc::new(completer))
            .with_top_k(config.top_k)
            .with_max_tokens(config.max_tokens))
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// 문서 수집
    ///
    /// 모든 문서를 동시에 추출한 뒤, 새 조각만 순차적으로 임베딩하고
    /// 전부 성공했을 때에만 한 번에 저장합니다.
    /// 이미 저장된 텍스트와 배치 내 중복은 임베딩하지 않습니다.
    pub async fn ingest(&self, paths: &[PathBuf]) -> RagResult<IngestReport> {
        tracing::info!("Ingesting {} documents", paths.len());

        let fragments = extractor::extract_all(paths).await?;
        let fragment_count = fragments.len();

        let unique = dedup_fragments(fragments);
        let existing = self.store.contains(unique.clone()).await?;
        let fresh: Vec<String> = unique
            .into_iter()
            .filter(|text| !existing.contains(text))
            .collect();
        let duplicates = fragment_count - fresh.len();

        if duplicates > 0 {
            tracing::info!("Skipping {} duplicate fragments", duplicates);
        }

        let embeddings = self
            .embedder
            .embed_batch(&fresh)
            .await
            .map_err(RagError::Embedding)?;

        let records: Vec<VectorRecord> = fresh
            .into_iter()
            .zip(embeddings)
            .map(|(text, embedding)| VectorRecord::new(text, embedding))
            .collect();

        let appended = self.store.append_all(records).await?;
        // 동시 수집으로 먼저 저장된 텍스트는 INSERT OR IGNORE에서 빠짐
        let skipped = fragment_count - appended;

        let report = IngestReport {
            documents: paths.len(),
            fragments: fragment_count,
            appended,
            skipped,
            store_path: self.store.path().to_path_buf(),
        };

        tracing::info!(
            "Ingest complete: {} fragments, {} appended, store at {:?}",
            report.fragments,
            report.appended,
            report.store_path
        );
        Ok(report)
    }

    /// 쿼리에 가장 가까운 조각 k개
    pub async fn search(&self, query: &str, k: usize) -> RagResult<Vec<ScoredCandidate>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidInput("query is empty".to_string()));
        }

        let corpus = self.store.load_all().await?;

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(RagError::Embedding)?;

        let expected = corpus.first().map(|r| r.dimension()).unwrap_or_default();
        if query_embedding.len() != expected {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: query_embedding.len(),
            });
        }

        Ok(rank(&query_embedding, &corpus, k))
    }

    /// 완성 호출 전까지의 응답 준비 (검색 + 프롬프트 조립)
    pub async fn prepare(&self, conversation: &[ChatMessage]) -> RagResult<PreparedPrompt> {
        let query = last_message(conversation)?.to_string();
        let context = self.search(&query, self.top_k).await?;

        let joined = context
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        let prompt = build_prompt(&joined, &query);

        Ok(PreparedPrompt {
            query,
            context,
            prompt,
        })
    }

    /// 대화의 마지막 메시지에 대한 답변
    pub async fn answer(&self, conversation: &[ChatMessage]) -> RagResult<ChatMessage> {
        let prepared = self.prepare(conversation).await?;
        tracing::debug!("Prompt:\n{}", prepared.prompt);

        let completion = self
            .completer
            .complete(&prepared.prompt, self.max_tokens)
            .await
            .map_err(RagError::Completion)?;

        Ok(ChatMessage::assistant(completion.trim()))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 고정 템플릿 프롬프트 조립
pub fn build_prompt(context: &str, question: &str) -> String {
    format!("Info: {}\nQuestion: {}\nAnswer:", context, question)
}

/// 대화의 마지막 메시지 내용 (비어있으면 에러)
fn last_message(conversation: &[ChatMessage]) -> RagResult<&str> {
    let last = conversation
        .last()
        .ok_or_else(|| RagError::InvalidInput("conversation is empty".to_string()))?;

    let content = last.content.trim();
    if content.is_empty() {
        return Err(RagError::InvalidInput(
            "last message has no content".to_string(),
        ));
    }
    Ok(content)
}

/// 배치 내 중복 텍스트 제거 (첫 등장 순서 유지)
fn dedup_fragments(fragments: Vec<Fragment>) -> Vec<String> {
    let mut seen = HashSet::new();
    fragments
        .into_iter()
        .filter_map(|f| seen.insert(f.text.clone()).then_some(f.text))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::knowledge::StoreError;

    /// 키워드 기반 가짜 임베딩 (france, paris, tower, capital)
    struct KeywordEmbedder {
        calls: Mutex<Vec<String>>,
        fail_on_call: Option<usize>,
    }

    impl KeywordEmbedder {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on_call: None,
            }
        }

        fn failing_on(call: usize) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on_call: Some(call),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(text.to_string());
                calls.len()
            };
            if self.fail_on_call == Some(call) {
                anyhow::bail!("embedding service unavailable");
            }

            let lower = text.to_lowercase();
            let mut vector: Vec<f32> = ["france", "paris", "tower", "capital"]
                .iter()
                .map(|kw| if lower.contains(kw) { 1.0 } else { 0.0 })
                .collect();
            vector.push(0.1);
            Ok(vector)
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    /// 프롬프트를 기록하는 가짜 완성
    struct RecordingCompleter {
        prompts: Mutex<Vec<(String, u32)>>,
        reply: Option<String>,
    }

    impl RecordingCompleter {
        fn replying(reply: &str) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                reply: Some(reply.to_string()),
            }
        }

        fn failing() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                reply: None,
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for RecordingCompleter {
        async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), max_tokens));
            self.reply
                .clone()
                .ok_or_else(|| anyhow::anyhow!("completion service unavailable"))
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct Fixture {
        dir: TempDir,
        embedder: Arc<KeywordEmbedder>,
        completer: Arc<RecordingCompleter>,
        retriever: Retriever,
    }

    fn fixture_with(embedder: KeywordEmbedder, completer: RecordingCompleter) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = StoreHandle::spawn(dir.path().join("embedding").join("embedding.db")).unwrap();
        let embedder = Arc::new(embedder);
        let completer = Arc::new(completer);
        let retriever = Retriever::new(store, embedder.clone(), completer.clone());
        Fixture {
            dir,
            embedder,
            completer,
            retriever,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(KeywordEmbedder::new(), RecordingCompleter::replying("  Paris.\n"))
    }

    fn write_doc(dir: &TempDir, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    #[test]
    fn test_build_prompt_template() {
        let prompt = build_prompt("A. B", "Why?");
        assert_eq!(prompt, "Info: A. B\nQuestion: Why?\nAnswer:");
    }

    #[test]
    fn test_chat_message_wire_format() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));

        let request: ChatRequest = serde_json::from_str(
            r#"{"chats":[{"role":"user","content":"Hello"},{"role":"assistant","content":"Hi"}]}"#,
        )
        .unwrap();
        assert_eq!(request.chats.len(), 2);
        assert_eq!(request.chats[0], ChatMessage::user("Hello"));
    }

    #[test]
    fn test_dedup_fragments_keeps_first_occurrence() {
        let fragments = vec![
            Fragment::new("a", 0).unwrap(),
            Fragment::new("b", 0).unwrap(),
            Fragment::new("a", 1).unwrap(),
        ];
        assert_eq!(dedup_fragments(fragments), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_end_to_end_answer() {
        let fx = fixture();
        let doc = write_doc(
            &fx.dir,
            "paris.txt",
            &["Paris is the capital of France.", "The Eiffel Tower is in Paris."],
        );

        let report = fx.retriever.ingest(&[doc]).await.unwrap();
        assert_eq!(report.fragments, 2);
        assert_eq!(report.appended, 2);
        assert!(report.store_path.ends_with("embedding.db"));

        let question = "What is the capital of France?";
        let prepared = fx
            .retriever
            .prepare(&[ChatMessage::user(question)])
            .await
            .unwrap();
        assert_eq!(prepared.context[0].text, "Paris is the capital of France.");
        assert!(prepared
            .prompt
            .contains("Info: Paris is the capital of France.. The Eiffel Tower is in Paris."));
        assert!(prepared
            .prompt
            .contains("Question: What is the capital of France?"));
        assert!(prepared.prompt.ends_with("Answer:"));

        let reply = fx
            .retriever
            .answer(&[ChatMessage::user(question)])
            .await
            .unwrap();
        assert_eq!(reply, ChatMessage::assistant("Paris."));

        let prompts = fx.completer.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].0, prepared.prompt);
        assert_eq!(prompts[0].1, DEFAULT_MAX_TOKENS);
    }

    #[tokio::test]
    async fn test_ingest_is_atomic_on_embedding_failure() {
        let fx = fixture_with(KeywordEmbedder::failing_on(2), RecordingCompleter::replying("x"));
        let doc = write_doc(&fx.dir, "three.txt", &["one", "two", "three"]);

        let err = fx.retriever.ingest(&[doc]).await.unwrap_err();
        assert_eq!(err.kind(), "embedding");
        assert!(err.is_retryable());
        assert_eq!(fx.embedder.call_count(), 2);

        let loaded = fx.retriever.store().load_all().await;
        assert!(matches!(loaded, Err(StoreError::Missing(_))));
    }

    #[tokio::test]
    async fn test_ingest_grows_store_with_union() {
        let fx = fixture();
        let first = write_doc(&fx.dir, "first.txt", &["alpha", "beta"]);
        let second = write_doc(&fx.dir, "second.txt", &["gamma", "delta"]);

        fx.retriever.ingest(&[first]).await.unwrap();
        fx.retriever.ingest(&[second]).await.unwrap();

        let texts: Vec<String> = fx
            .retriever
            .store()
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(texts, vec!["alpha", "beta", "gamma", "delta"]);
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent_and_skips_embedding() {
        let fx = fixture();
        let doc = write_doc(&fx.dir, "doc.txt", &["alpha", "beta", "alpha"]);

        let first = fx.retriever.ingest(&[doc.clone()]).await.unwrap();
        assert_eq!(first.appended, 2);
        assert_eq!(first.skipped, 1);
        assert_eq!(fx.embedder.call_count(), 2);

        let second = fx.retriever.ingest(&[doc]).await.unwrap();
        assert_eq!(second.appended, 0);
        assert_eq!(second.skipped, 3);
        assert_eq!(fx.embedder.call_count(), 2);

        assert_eq!(fx.retriever.store().load_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_multiple_documents_in_input_order() {
        let fx = fixture();
        let a = write_doc(&fx.dir, "a.txt", &["a1", "a2"]);
        let b = write_doc(&fx.dir, "b.txt", &["b1"]);
        let c = write_doc(&fx.dir, "c.txt", &["c1", "c2"]);

        fx.retriever.ingest(&[c, a, b]).await.unwrap();

        let texts: Vec<String> = fx
            .retriever
            .store()
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(texts, vec!["c1", "c2", "a1", "a2", "b1"]);
    }

    #[tokio::test]
    async fn test_ingest_empty_batch_is_invalid() {
        let fx = fixture();
        let err = fx.retriever.ingest(&[]).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert_eq!(fx.embedder.call_count(), 0);
    }

    #[tokio::test]
    async fn test_answer_without_store_fails() {
        let fx = fixture();
        let err = fx
            .retriever
            .answer(&[ChatMessage::user("anything?")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "store_missing");
        assert!(fx.completer.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_answer_with_empty_store_fails() {
        let fx = fixture();
        let blank = write_doc(&fx.dir, "blank.txt", &["", "   "]);
        let report = fx.retriever.ingest(&[blank]).await.unwrap();
        assert_eq!(report.appended, 0);

        let err = fx
            .retriever
            .answer(&[ChatMessage::user("anything?")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "store_empty");
    }

    #[tokio::test]
    async fn test_answer_rejects_bad_conversation() {
        let fx = fixture();
        assert_eq!(
            fx.retriever.answer(&[]).await.unwrap_err().kind(),
            "invalid_input"
        );
        assert_eq!(
            fx.retriever
                .answer(&[ChatMessage::user("hi"), ChatMessage::user("  ")])
                .await
                .unwrap_err()
                .kind(),
            "invalid_input"
        );
    }

    #[tokio::test]
    async fn test_completion_failure_surfaces() {
        let fx = fixture_with(KeywordEmbedder::new(), RecordingCompleter::failing());
        let doc = write_doc(&fx.dir, "doc.txt", &["Paris is in France."]);
        fx.retriever.ingest(&[doc]).await.unwrap();

        let err = fx
            .retriever
            .answer(&[ChatMessage::user("Where is Paris?")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "completion");
    }

    #[tokio::test]
    async fn test_search_dimension_mismatch() {
        let fx = fixture();
        fx.retriever
            .store()
            .append_all(vec![VectorRecord::new("short", vec![1.0, 0.0])])
            .await
            .unwrap();

        let err = fx.retriever.search("paris", 3).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 2,
                actual: 5
            }
        ));
    }

    /// 임베딩 도중 같은 텍스트를 다른 수집이 먼저 저장하는 상황
    struct RacingEmbedder {
        store: StoreHandle,
    }

    #[async_trait]
    impl EmbeddingProvider for RacingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let vector = vec![1.0, 0.0, 0.0, 0.0, 0.1];
            self.store
                .append_all(vec![VectorRecord::new(text, vector.clone())])
                .await?;
            Ok(vector)
        }

        fn name(&self) -> &str {
            "racing"
        }
    }

    #[tokio::test]
    async fn test_ingest_counts_rows_lost_to_concurrent_writer() {
        let dir = TempDir::new().unwrap();
        let store = StoreHandle::spawn(dir.path().join("embedding.db")).unwrap();
        let retriever = Retriever::new(
            store.clone(),
            Arc::new(RacingEmbedder {
                store: store.clone(),
            }),
            Arc::new(RecordingCompleter::replying("unused")),
        );
        let doc = write_doc(&dir, "doc.txt", &["Paris is in France."]);

        let report = retriever.ingest(&[doc]).await.unwrap();
        assert_eq!(report.fragments, 1);
        assert_eq!(report.appended, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.appended + report.skipped, report.fragments);
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_dimension_mismatch_is_tagged() {
        let fx = fixture();
        fx.retriever
            .store()
            .append_all(vec![VectorRecord::new("short", vec![1.0, 0.0])])
            .await
            .unwrap();
        let doc = write_doc(&fx.dir, "doc.txt", &["Paris is the capital of France."]);

        let err = fx.retriever.ingest(&[doc]).await.unwrap_err();
        assert_eq!(err.kind(), "dimension_mismatch");
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 2,
                actual: 5
            }
        ));
        assert_eq!(fx.retriever.store().load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_top_k_limits_context() {
        let fx = fixture();
        let retriever = fx.retriever.clone().with_top_k(1);
        let doc = write_doc(
            &fx.dir,
            "doc.txt",
            &["Paris is the capital of France.", "The Eiffel Tower is in Paris."],
        );
        retriever.ingest(&[doc]).await.unwrap();

        let prepared = retriever
            .prepare(&[ChatMessage::user("capital of France")])
            .await
            .unwrap();
        assert_eq!(prepared.context.len(), 1);
        assert_eq!(
            prepared.prompt,
            "Info: Paris is the capital of France.\nQuestion: capital of France\nAnswer:"
        );
    }
}
