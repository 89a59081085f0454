//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트 조각을 추출합니다.

use std::path::Path;

use anyhow::{Context, Result};

use super::split_fragments;

/// PDF에서 텍스트 조각 추출
///
/// 문서에 나타나는 순서대로, 비어있지 않은 줄마다 조각 하나를 반환합니다.
pub fn extract_fragments_from_pdf(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;
    extract_fragments_from_pdf_bytes(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))
}

/// 메모리상의 PDF 바이트에서 텍스트 조각 추출
pub fn extract_fragments_from_pdf_bytes(bytes: &[u8]) -> Result<Vec<String>> {
    let text = pdf_extract::extract_text_from_mem(bytes).context("Malformed PDF document")?;

    if text.trim().is_empty() {
        tracing::warn!("No text extracted from PDF. It might be a scanned document.");
        return Ok(Vec::new());
    }

    // 폼피드(\x0c)는 페이지 경계
    Ok(text.split('\x0c').flat_map(split_fragments).collect())
}

// ============================================================================
// Tests
// ============================================================================
