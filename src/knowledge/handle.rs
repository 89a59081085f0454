//! Store Handle - 저장소 소유 스레드와 통신하는 핸들
//!
//! 하나의 전용 스레드가 SQLite 연결을 소유하고, 명령을 채널로 받아
//! 도착 순서(FIFO)대로 처리합니다.
//! - 쓰기는 직렬화되며 트랜잭션 단위로 반영됩니다.
//! - 읽기는 두 쓰기 사이에서 처리되므로 항상 완결된 스냅샷을 봅니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};

use super::store::{StoreError, StoreStats, VectorStore};
use super::vector::VectorRecord;

/// 명령 큐 크기
const COMMAND_BUFFER: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

enum Command {
    Append {
        records: Vec<VectorRecord>,
        reply: Reply<usize>,
    },
    Load {
        reply: Reply<Vec<VectorRecord>>,
    },
    Contains {
        texts: Vec<String>,
        reply: Reply<HashSet<String>>,
    },
    Stats {
        reply: Reply<StoreStats>,
    },
}

/// 저장소 핸들 (복제 가능, 모든 복제본이 같은 소유 스레드를 공유)
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<Command>,
    path: PathBuf,
}

impl StoreHandle {
    /// 소유 스레드 시작
    ///
    /// 모든 핸들이 drop되면 스레드도 종료됩니다.
    pub fn spawn(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let store = VectorStore::new(path.clone());

        std::thread::Builder::new()
            .name("vector-store".to_string())
            .spawn(move || run_worker(store, rx))?;

        Ok(Self { tx, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 레코드 전체 추가 (원자적)
    pub async fn append_all(&self, records: Vec<VectorRecord>) -> Result<usize, StoreError> {
        self.request(|reply| Command::Append { records, reply }).await
    }

    /// 스냅샷 로드
    pub async fn load_all(&self) -> Result<Vec<VectorRecord>, StoreError> {
        self.request(|reply| Command::Load { reply }).await
    }

    /// 이미 저장된 텍스트 조회
    pub async fn contains(&self, texts: Vec<String>) -> Result<HashSet<String>, StoreError> {
        self.request(|reply| Command::Contains { texts, reply }).await
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, StoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| StoreError::Closed)?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }
}

fn run_worker(mut store: VectorStore, mut rx: mpsc::Receiver<Command>) {
    tracing::debug!("Vector store worker started for {:?}", store.path());

    while let Some(command) = rx.blocking_recv() {
        // 요청자가 이미 떠났으면 응답은 버려짐
        match command {
            Command::Append { records, reply } => {
                let _ = reply.send(store.append_all(&records));
            }
            Command::Load { reply } => {
                let _ = reply.send(store.load_all());
            }
            Command::Contains { texts, reply } => {
                let _ = reply.send(store.contains(&texts));
            }
            Command::Stats { reply } => {
                let _ = reply.send(store.stats());
            }
        }
    }

    tracing::debug!("Vector store worker stopped for {:?}", store.path());
}

// ============================================================================
// Tests
// ============================================================================
