//! 텍스트 추출 모듈
//!
//! 문서를 순서가 보존된 텍스트 조각(Fragment) 목록으로 변환합니다.
//! - PDF 파일: pdf-extract로 텍스트 추출
//! - 텍스트 파일: 직접 읽기
//!
//! 여러 문서는 동시에 추출되며, 결과는 입력 문서 순서대로 이어 붙입니다.

pub mod pdf;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::collector::DocumentKind;
use crate::error::{RagError, RagResult};

// ============================================================================
// Fragment
// ============================================================================

/// 추출된 텍스트 조각
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// 조각 텍스트 (앞뒤 공백 제거, 비어있지 않음)
    pub text: String,
    /// 원본 문서 인덱스 (배치 내 입력 순서)
    pub document: usize,
}

impl Fragment {
    /// 공백만 있는 텍스트면 None
    pub fn new(text: &str, document: usize) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            document,
        })
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// 단일 문서에서 텍스트 조각 추출 (블로킹)
pub fn extract_document(path: &Path, kind: DocumentKind) -> Result<Vec<String>> {
    match kind {
        DocumentKind::Pdf => pdf::extract_fragments_from_pdf(path),
        DocumentKind::Text => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read text file: {:?}", path))?;
            Ok(split_fragments(&text))
        }
    }
}

/// 여러 문서를 동시에 추출
///
/// 문서마다 블로킹 태스크 하나를 띄우고 모두 끝날 때까지 기다립니다.
/// 하나라도 실패하면 배치 전체가 실패합니다.
pub async fn extract_all(paths: &[PathBuf]) -> RagResult<Vec<Fragment>> {
    if paths.is_empty() {
        return Err(RagError::InvalidInput("no documents were given".to_string()));
    }

    let tasks = paths.iter().cloned().enumerate().map(|(index, path)| async move {
        let kind = DocumentKind::from_path(&path).ok_or_else(|| {
            RagError::InvalidInput(format!("unsupported document type: {:?}", path))
        })?;

        let task_path = path.clone();
        let texts = tokio::task::spawn_blocking(move || extract_document(&task_path, kind))
            .await
            .map_err(|e| RagError::Extraction {
                path: path.clone(),
                source: anyhow::anyhow!("Extraction task failed: {}", e),
            })?
            .map_err(|source| RagError::Extraction {
                path: path.clone(),
                source,
            })?;

        tracing::debug!("Extracted {} fragments from {:?}", texts.len(), path);

        Ok::<_, RagError>(
            texts
                .iter()
                .filter_map(|text| Fragment::new(text, index))
                .collect::<Vec<_>>(),
        )
    });

    let per_document = futures::future::try_join_all(tasks).await?;
    Ok(per_document.into_iter().flatten().collect())
}

/// 텍스트를 줄 단위 조각으로 분리
///
/// 줄 안의 연속 공백은 하나로 합치고, 빈 줄은 버립니다.
pub(crate) fn split_fragments(text: &str) -> Vec<String> {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex"));

    text.lines()
        .map(|line| whitespace.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
