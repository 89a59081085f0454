//! 문서 수집 모듈
//!
//! CLI로 전달된 파일/폴더 경로를 수집 대상 문서 목록으로 펼칩니다.
//! .gitignore 패턴을 존중하고, 지원하는 확장자만 수집합니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;

// ============================================================================
// Document Kind
// ============================================================================

/// 지원하는 문서 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// PDF 문서
    Pdf,
    /// 일반 텍스트 (txt, md)
    Text,
}

impl DocumentKind {
    /// 확장자로 문서 종류 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" | "md" | "markdown" => Some(DocumentKind::Text),
            _ => None,
        }
    }

    /// 파일 경로에서 종류 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "PDF",
            DocumentKind::Text => "TXT",
        }
    }
}

// ============================================================================
// Collected Document
// ============================================================================

/// 수집된 문서 정보
#[derive(Debug, Clone)]
pub struct CollectedDocument {
    /// 문서 경로
    pub path: PathBuf,
    /// 문서 종류
    pub kind: DocumentKind,
    /// 파일 크기 (바이트)
    pub size: u64,
}

impl CollectedDocument {
    /// 경로에서 생성 (지원하지 않는 확장자면 None)
    pub fn from_path(path: PathBuf) -> Result<Option<Self>> {
        let kind = match DocumentKind::from_path(&path) {
            Some(kind) => kind,
            None => return Ok(None),
        };

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read metadata: {:?}", path))?;

        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path,
            kind,
            size: metadata.len(),
        }))
    }
}

// ============================================================================
// Document Collector
// ============================================================================

/// 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

/// 문서 수집기
pub struct DocumentCollector {
    config: CollectorConfig,
}

impl DocumentCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 경로 목록 수집
    ///
    /// 파일은 그대로 (지원하지 않는 확장자면 에러), 폴더는 재귀적으로 펼칩니다.
    /// 폴더 안의 문서는 경로 순으로 정렬되어 결과 순서가 결정적입니다.
    pub fn collect(&self, paths: &[PathBuf]) -> Result<Vec<CollectedDocument>> {
        let mut documents = Vec::new();

        for path in paths {
            if path.is_dir() {
                documents.extend(self.collect_directory(path)?);
            } else {
                documents.push(self.collect_file(path)?);
            }
        }

        Ok(documents)
    }

    /// 단일 파일 수집
    pub fn collect_file(&self, path: &Path) -> Result<CollectedDocument> {
        if !path.exists() {
            anyhow::bail!("File not found: {:?}", path);
        }

        if !path.is_file() {
            anyhow::bail!("Not a file: {:?}", path);
        }

        CollectedDocument::from_path(path.to_path_buf())?
            .ok_or_else(|| anyhow::anyhow!("Unsupported document type: {:?}", path))
    }

    /// 폴더 재귀 수집
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedDocument>> {
        if !path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", path);
        }

        let mut documents = Vec::new();

        let walker = WalkBuilder::new(path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            match CollectedDocument::from_path(entry.path().to_path_buf()) {
                Ok(Some(doc)) => {
                    if self.should_include(&doc) {
                        documents.push(doc);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Failed to collect document: {}", e);
                }
            }
        }

        documents.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::info!("Collected {} documents from {:?}", documents.len(), path);
        Ok(documents)
    }

    fn should_include(&self, doc: &CollectedDocument) -> bool {
        if self.config.max_file_size > 0 && doc.size > self.config.max_file_size {
            tracing::debug!("Skipping large file: {:?} ({} bytes)", doc.path, doc.size);
            return false;
        }
        true
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// 수집 통계
#[derive(Debug, Default)]
pub struct CollectionStats {
    pub total_files: usize,
    pub pdf_files: usize,
    pub text_files: usize,
    pub total_size: u64,
}

impl CollectionStats {
    pub fn from_documents(documents: &[CollectedDocument]) -> Self {
        let mut stats = Self::default();

        for doc in documents {
            stats.total_files += 1;
            stats.total_size += doc.size;

            match doc.kind {
                DocumentKind::Pdf => stats.pdf_files += 1,
                DocumentKind::Text => stats.text_files += 1,
            }
        }

        stats
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_document_kind_from_extension() {
        assert_eq!(DocumentKind::from_extension("pdf"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension("PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension("md"), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::from_extension("exe"), None);
    }

    #[test]
    fn test_collect_directory_sorted_and_filtered() {
        let dir = tempfile::Builder::new().prefix("docs").tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "beta").unwrap();
        std::fs::write(dir.path().join("a.md"), "alpha").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8; 4]).unwrap();

        let collector = DocumentCollector::with_defaults();
        let docs = collector.collect(&[dir.path().to_path_buf()]).unwrap();

        assert_eq!(docs.len(), 2);
        assert!(docs[0].path.ends_with("a.md"));
        assert!(docs[1].path.ends_with("b.txt"));

        let stats = CollectionStats::from_documents(&docs);
        assert_eq!(stats.text_files, 2);
        assert_eq!(stats.pdf_files, 0);
        assert_eq!(stats.total_size, 9);
    }

    #[test]
    fn test_collect_unsupported_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let collector = DocumentCollector::with_defaults();
        assert!(collector.collect(&[path]).is_err());
    }

    #[test]
    fn test_collect_missing_file_is_error() {
        let collector = DocumentCollector::with_defaults();
        assert!(collector
            .collect(&[PathBuf::from("/nonexistent/doc.pdf")])
            .is_err());
    }
}
