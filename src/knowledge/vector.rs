//! 유사도 랭킹 - 코사인 유사도 기반 전체 선형 탐색
//!
//! 인덱스 없이 매 쿼리마다 저장소 전체를 스캔합니다 (O(n·d)).

use serde::Serialize;

// ============================================================================
// Types
// ============================================================================

/// 벡터 레코드 (조각 텍스트 + 임베딩)
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// 조각 텍스트 (저장소 키)
    pub text: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

impl VectorRecord {
    pub fn new(text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            text: text.into(),
            embedding,
        }
    }

    /// 벡터 차원
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

/// 랭킹 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    /// 조각 텍스트
    pub text: String,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub score: f32,
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다.
/// 길이가 다르거나, 비어있거나, 노름이 0인 벡터는 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// 상위 k개 조각 선택
///
/// 모든 레코드를 점수화한 뒤 점수 내림차순으로 정렬합니다.
/// 정렬은 안정 정렬이라 동점이면 corpus 순서를 유지합니다.
pub fn rank(query: &[f32], corpus: &[VectorRecord], k: usize) -> Vec<ScoredCandidate> {
    let mut scores: Vec<(usize, f32)> = corpus
        .iter()
        .enumerate()
        .map(|(i, record)| (i, cosine_similarity(query, &record.embedding)))
        .collect();

    scores.sort_by(|a, b| b.1.total_cmp(&a.1));

    scores
        .into_iter()
        .take(k)
        .map(|(i, score)| ScoredCandidate {
            text: corpus[i].text.clone(),
            score,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
