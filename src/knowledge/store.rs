//! Vector Store - rusqlite 기반 단일 테이블 벡터 저장소
//!
//! 배포당 하나의 파일, 하나의 테이블만 사용합니다.
//! 컬럼은 헤더 `["Text", "Text embedding"]` 두 개로 고정되며,
//! 임베딩은 JSON 배열 문자열로 저장합니다 (f32 무손실 왕복).
//!
//! 헤더 행(0번 행)은 별도 데이터 행이 아니라 테이블 스키마의 컬럼 이름입니다.
//! 따라서 `load_all`이 돌려주는 레코드는 모두 데이터 행입니다.
//!
//! 저장 위치 기본값: ~/.doc-chat-rag/embedding.db

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

use super::vector::VectorRecord;

/// 벡터 테이블 이름
pub const TABLE_NAME: &str = "embeddings";

/// 헤더 행 (컬럼 이름)
pub const HEADER: [&str; 2] = ["Text", "Text embedding"];

// ============================================================================
// Errors
// ============================================================================

/// 저장소 에러
#[derive(Debug, Error)]
pub enum StoreError {
    /// 저장소 파일 또는 테이블이 없음
    #[error("vector store not found: {0:?}")]
    Missing(PathBuf),

    /// 저장소는 있지만 레코드가 없음
    #[error("vector store is empty: {0:?}")]
    Empty(PathBuf),

    /// 벡터 차원 불일치
    #[error("dimension mismatch: store holds {expected}-d vectors, got {actual}-d")]
    Dimension { expected: usize, actual: usize },

    /// 저장할 수 없는 레코드 (빈 텍스트, 빈 벡터, NaN 등)
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// 저장된 벡터를 해석할 수 없음
    #[error("corrupt vector in row {row}: {reason}")]
    Corrupt { row: i64, reason: String },

    /// 예상과 다른 테이블 구조
    #[error("unexpected store schema: columns {0:?}")]
    Schema(Vec<String>),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// 저장소 워커 종료됨
    #[error("vector store worker has shut down")]
    Closed,
}

impl StoreError {
    fn corrupt(row: i64, reason: impl std::fmt::Display) -> Self {
        StoreError::Corrupt {
            row,
            reason: reason.to_string(),
        }
    }
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub exists: bool,
    pub record_count: usize,
    pub dimension: Option<usize>,
    pub path: PathBuf,
}

// ============================================================================
// VectorStore
// ============================================================================

/// 동기 벡터 저장소
///
/// 연결은 처음 필요할 때 엽니다. 읽기 작업은 파일을 만들지 않습니다.
/// 동시 접근은 `StoreHandle`을 통해 직렬화해야 합니다.
pub struct VectorStore {
    path: PathBuf,
    conn: Option<Connection>,
    schema_ready: bool,
}

impl VectorStore {
    /// 저장소 생성 (파일은 아직 열지 않음)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: None,
            schema_ready: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 쓰기용 연결 (파일/테이블이 없으면 생성)
    fn writer(&mut self) -> Result<&mut Connection, StoreError> {
        if self.conn.is_none() {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let conn = Connection::open_with_flags(
                &self.path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            self.conn = Some(conn);
        }

        let conn = self.conn.as_mut().ok_or(StoreError::Closed)?;

        if !self.schema_ready {
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (\"{}\" TEXT PRIMARY KEY, \"{}\" TEXT NOT NULL)",
                    TABLE_NAME, HEADER[0], HEADER[1]
                ),
                [],
            )?;
            verify_header(conn)?;
            self.schema_ready = true;
            tracing::debug!("Vector store initialized at {:?}", self.path);
        }

        Ok(conn)
    }

    /// 읽기용 연결 (파일이나 테이블이 없으면 None)
    fn reader(&mut self) -> Result<Option<&Connection>, StoreError> {
        if self.conn.is_none() {
            if !self.path.exists() {
                return Ok(None);
            }
            let conn = Connection::open_with_flags(
                &self.path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            self.conn = Some(conn);
        }

        let conn = match self.conn.as_ref() {
            Some(conn) => conn,
            None => return Ok(None),
        };

        if !self.schema_ready {
            if !table_exists(conn)? {
                return Ok(None);
            }
            verify_header(conn)?;
            self.schema_ready = true;
        }

        Ok(Some(conn))
    }

    /// 레코드 전체를 한 트랜잭션으로 추가
    ///
    /// 저장소가 없으면 생성합니다. 이미 있는 텍스트는 건너뛰며,
    /// 실제로 추가된 행 수를 반환합니다. 하나라도 실패하면 아무것도 쓰지 않습니다.
    pub fn append_all(&mut self, records: &[VectorRecord]) -> Result<usize, StoreError> {
        let existing_dimension = self.dimension()?;
        validate_records(records, existing_dimension)?;

        let conn = self.writer()?;
        let tx = conn.transaction()?;
        let mut appended = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO {} (\"{}\", \"{}\") VALUES (?1, ?2)",
                TABLE_NAME, HEADER[0], HEADER[1]
            ))?;

            for record in records {
                let serialized = serde_json::to_string(&record.embedding)
                    .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
                appended += stmt.execute(params![record.text, serialized])?;
            }
        }
        tx.commit()?;

        tracing::info!(
            "Appended {} records to {:?} ({} skipped as duplicates)",
            appended,
            self.path,
            records.len() - appended
        );
        Ok(appended)
    }

    /// 저장소 전체 로드 (삽입 순서)
    ///
    /// 파일이 없으면 `Missing`, 행이 없으면 `Empty`를 반환합니다.
    pub fn load_all(&mut self) -> Result<Vec<VectorRecord>, StoreError> {
        let path = self.path.clone();
        let conn = self.reader()?.ok_or_else(|| StoreError::Missing(path.clone()))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT rowid, \"{}\", \"{}\" FROM {} ORDER BY rowid",
            HEADER[0], HEADER[1], TABLE_NAME
        ))?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut records: Vec<VectorRecord> = Vec::new();
        for row in rows {
            let (rowid, text, serialized) = row?;
            let embedding: Vec<f32> =
                serde_json::from_str(&serialized).map_err(|e| StoreError::corrupt(rowid, e))?;

            if embedding.is_empty() {
                return Err(StoreError::corrupt(rowid, "empty vector"));
            }
            if let Some(first) = records.first() {
                if first.dimension() != embedding.len() {
                    return Err(StoreError::corrupt(
                        rowid,
                        format!(
                            "expected {} dimensions, found {}",
                            first.dimension(),
                            embedding.len()
                        ),
                    ));
                }
            }

            records.push(VectorRecord { text, embedding });
        }

        if records.is_empty() {
            return Err(StoreError::Empty(path));
        }

        tracing::debug!("Loaded {} records from {:?}", records.len(), path);
        Ok(records)
    }

    /// 이미 저장된 텍스트 조회
    pub fn contains(&mut self, texts: &[String]) -> Result<HashSet<String>, StoreError> {
        let conn = match self.reader()? {
            Some(conn) => conn,
            None => return Ok(HashSet::new()),
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT 1 FROM {} WHERE \"{}\" = ?1",
            TABLE_NAME, HEADER[0]
        ))?;

        let mut found = HashSet::new();
        for text in texts {
            if stmt.exists(params![text])? {
                found.insert(text.clone());
            }
        }
        Ok(found)
    }

    /// 저장된 벡터 차원 (비어있으면 None)
    pub fn dimension(&mut self) -> Result<Option<usize>, StoreError> {
        let conn = match self.reader()? {
            Some(conn) => conn,
            None => return Ok(None),
        };

        let first: Option<(i64, String)> = conn
            .query_row(
                &format!(
                    "SELECT rowid, \"{}\" FROM {} ORDER BY rowid LIMIT 1",
                    HEADER[1], TABLE_NAME
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match first {
            Some((rowid, serialized)) => {
                let embedding: Vec<f32> = serde_json::from_str(&serialized)
                    .map_err(|e| StoreError::corrupt(rowid, e))?;
                Ok(Some(embedding.len()))
            }
            None => Ok(None),
        }
    }

    /// 저장소 통계
    pub fn stats(&mut self) -> Result<StoreStats, StoreError> {
        let path = self.path.clone();
        let dimension = self.dimension()?;

        let (exists, record_count) = match self.reader()? {
            Some(conn) => {
                let count: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM {}", TABLE_NAME),
                    [],
                    |row| row.get(0),
                )?;
                (true, count as usize)
            }
            None => (false, 0),
        };

        Ok(StoreStats {
            exists,
            record_count,
            dimension,
            path,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn table_exists(conn: &Connection) -> Result<bool, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![TABLE_NAME],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// 컬럼 이름이 헤더와 일치하는지 확인
fn verify_header(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", TABLE_NAME))?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;

    if columns != HEADER {
        return Err(StoreError::Schema(columns));
    }
    Ok(())
}

/// 배치 내 레코드 검증 (모두 같은 차원, 저장소 차원과 일치)
fn validate_records(records: &[VectorRecord], existing: Option<usize>) -> Result<(), StoreError> {
    let expected = existing.or_else(|| records.first().map(|r| r.dimension()));

    for record in records {
        if record.text.trim().is_empty() {
            return Err(StoreError::InvalidRecord("empty fragment text".to_string()));
        }
        if record.embedding.is_empty() {
            return Err(StoreError::InvalidRecord(format!(
                "empty vector for {:?}",
                record.text
            )));
        }
        if record.embedding.iter().any(|v| !v.is_finite()) {
            return Err(StoreError::InvalidRecord(format!(
                "non-finite value in vector for {:?}",
                record.text
            )));
        }
        if let Some(expected) = expected {
            if record.dimension() != expected {
                return Err(StoreError::Dimension {
                    expected,
                    actual: record.dimension(),
                });
            }
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
