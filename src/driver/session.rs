//! Session
//!
//! 연결 하나 위에서 작업 순서를 정하는 세션. 북마크, 접근 모드, 대상
//! 데이터베이스를 들고 있고, 한 번에 하나의 트랜잭션만 연다.
//!
//! 다른 태스크가 같은 세션을 동시에 쓰면 중재하지 않고
//! [`DriverError::ConcurrentUse`]로 알린다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::bolt::message::Begin;

use super::bookmark::Bookmarks;
use super::config::{AccessMode, SessionConfig, TransactionConfig, FETCH_ALL};
use super::connection::Connection;
use super::cursor::ResultCursor;
use super::error::{DriverError, DriverResult};
use super::pool::ConnectionPool;
use super::transaction::Transaction;
use super::value::{Params, Value};

// ============================================================================
// Query - 쿼리
// ============================================================================

/// 쿼리
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// 쿼리 텍스트
    pub text: String,
    /// 파라미터
    pub parameters: Params,
}

impl Query {
    /// 새 쿼리 생성
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), parameters: Params::new() }
    }

    /// 파라미터 추가
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// 파라미터들 추가
    pub fn with_params(mut self, params: Params) -> Self {
        self.parameters.extend(params);
        self
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Query {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// Session - 세션
// ============================================================================

/// 세션과 그 세션의 트랜잭션이 공유하는 상태
pub(crate) struct SessionState {
    pub(crate) bookmarks: RwLock<Bookmarks>,
    pub(crate) tx_open: AtomicBool,
    /// 연결이 실패 상태이거나 트랜잭션 중간에 버려짐
    pub(crate) reset_required: AtomicBool,
}

/// 데이터베이스 세션
pub struct Session<S = TcpStream> {
    link: Arc<Mutex<Option<Connection<S>>>>,
    state: Arc<SessionState>,
    config: SessionConfig,
    pool: Option<Arc<ConnectionPool<S>>>,
    closed: AtomicBool,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// 연결을 직접 소유하는 세션. `close()`는 GOODBYE를 보낸다.
    pub fn new(conn: Connection<S>, config: SessionConfig) -> Self {
        Self::build(conn, config, None)
    }

    /// 풀에서 빌린 연결의 세션. `close()`는 연결을 풀에 돌려준다.
    pub fn pooled(conn: Connection<S>, config: SessionConfig, pool: Arc<ConnectionPool<S>>) -> Self {
        Self::build(conn, config, Some(pool))
    }

    fn build(conn: Connection<S>, config: SessionConfig, pool: Option<Arc<ConnectionPool<S>>>) -> Self {
        let state = SessionState {
            bookmarks: RwLock::new(config.bookmarks.clone()),
            tx_open: AtomicBool::new(false),
            reset_required: AtomicBool::new(false),
        };
        Self {
            link: Arc::new(Mutex::new(Some(conn))),
            state: Arc::new(state),
            config,
            pool,
            closed: AtomicBool::new(false),
        }
    }

    /// 세션 기본 접근 모드와 데이터베이스로 트랜잭션 시작
    pub async fn begin_transaction(&self, config: TransactionConfig) -> DriverResult<Transaction<S>> {
        self.begin(self.config.access_mode, self.config.database.as_deref(), &Bookmarks::new(), config)
            .await
    }

    /// 트랜잭션 시작. 세션 북마크와 `bookmarks`의 합집합을 BEGIN에 싣는다.
    pub async fn begin(
        &self,
        mode: AccessMode,
        database: Option<&str>,
        bookmarks: &Bookmarks,
        config: TransactionConfig,
    ) -> DriverResult<Transaction<S>> {
        self.ensure_open()?;
        if self.state.tx_open.load(Ordering::Acquire) {
            return Err(DriverError::invalid_state("a transaction is already open in this session"));
        }
        let mut link = self
            .link
            .clone()
            .try_lock_owned()
            .map_err(|_| DriverError::ConcurrentUse("session is being used by another task"))?;
        let conn = Option::as_mut(&mut *link).ok_or_else(|| DriverError::invalid_state("session has no connection"))?;
        if conn.is_defunct() {
            return Err(DriverError::invalid_state("the session's connection is defunct"));
        }
        if self.state.reset_required.load(Ordering::Acquire) || !conn.is_ready() || conn.outstanding() > 0 {
            warn!(state = ?conn.state(), outstanding = conn.outstanding(), "resetting connection before BEGIN");
            conn.reset().await?;
            self.state.reset_required.store(false, Ordering::Release);
        }

        let mut begin = Begin::new().with_read_mode(mode == AccessMode::Read);
        if self.config.use_bookmarks {
            let sent = self.state.bookmarks.read().union(bookmarks);
            begin = begin.with_bookmarks(sent.to_vec());
        }
        if let Some(db) = database {
            begin = begin.with_database(db);
        }
        if let Some(timeout) = config.timeout {
            begin = begin.with_timeout(timeout);
        }
        begin = begin.with_metadata(config.metadata);
        if let Some(user) = &self.config.impersonated_user {
            begin = begin.with_impersonated_user(user);
        }

        self.state.tx_open.store(true, Ordering::Release);
        let mut tx = Transaction::new(link, self.state.clone(), self.config.fetch_size, self.config.use_bookmarks);
        tx.open(begin).await?;
        Ok(tx)
    }

    /// 단일 문장 트랜잭션: BEGIN, RUN, 전체 PULL, COMMIT.
    ///
    /// 돌려주는 커서는 모든 레코드와 요약을 이미 가진 분리 커서다.
    /// 실패하면 롤백하고 에러를 돌려준다.
    pub async fn run_auto_commit(&self, query: impl Into<Query>) -> DriverResult<ResultCursor<'static, S>> {
        let query = query.into();
        let mut tx = self.begin_transaction(TransactionConfig::default()).await?;
        tx.set_fetch_size(FETCH_ALL);
        match tx.buffer_all(query).await {
            Ok((keys, records, summary)) => {
                tx.commit().await?;
                Ok(ResultCursor::detached(keys, records, summary))
            }
            Err(e) => {
                if tx.is_open() {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(error = %rollback, "rollback after auto-commit failure failed");
                    }
                }
                Err(e)
            }
        }
    }

    /// 세션을 닫는다. 풀 연결은 (필요하면 RESET 후) 반환, 아니면 GOODBYE.
    pub async fn close(&self) -> DriverResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut link = match self.link.clone().try_lock_owned() {
            Ok(link) => link,
            Err(_) => {
                self.closed.store(false, Ordering::Release);
                return Err(DriverError::ConcurrentUse("session is still in use; finish the transaction first"));
            }
        };
        let Some(mut conn) = link.take() else {
            return Ok(());
        };
        let needs_reset = self.state.reset_required.swap(false, Ordering::AcqRel);
        match &self.pool {
            Some(pool) => pool.release(conn, needs_reset).await,
            None => conn.close().await,
        }
        debug!(bookmarks = %self.last_bookmark(), "session closed");
        Ok(())
    }
}

impl<S> Session<S> {
    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(DriverError::invalid_state("session is closed"))
        } else {
            Ok(())
        }
    }

    /// 마지막 커밋의 북마크 (없으면 초기 북마크)
    pub fn last_bookmark(&self) -> Bookmarks {
        self.state.bookmarks.read().clone()
    }

    /// 열린 트랜잭션이 있는지
    pub fn has_open_transaction(&self) -> bool {
        self.state.tx_open.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// 세션 설정
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.config.database)
            .field("access_mode", &self.config.access_mode)
            .field("tx_open", &self.has_open_transaction())
            .field("closed", &!self.is_open())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
