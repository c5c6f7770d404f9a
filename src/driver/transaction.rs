//! Transaction
//!
//! 명시적 트랜잭션과 그 상태 기계.
//!
//! ```text
//! pending ──BEGIN──▶ open ──COMMIT──▶ committing ──▶ committed
//!                     │ └──ROLLBACK─▶ rolling-back ─▶ rolled-back
//!                     └──FAILURE (RUN/PULL/DISCARD/COMMIT)──▶ failed
//! ```
//!
//! 실행 중인 결과 스트림은 트랜잭션이 소유하고, [`ResultCursor`]는 그 위의
//! 뷰다. 다 읽지 않은 스트림은 다음 문장이나 커밋/롤백 전에 버려진다.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use crate::bolt::message::{Begin, Request, Response, Run, StreamLimit, Success};

use super::bookmark::Bookmarks;
use super::config::FETCH_ALL;
use super::connection::{expect_success, Connection};
use super::cursor::ResultCursor;
use super::error::{DriverError, DriverResult};
use super::record::Record;
use super::session::{Query, SessionState};
use super::summary::{Counters, Summary};
use super::value::{self, Value};

/// 세션의 연결에 대한 독점 잠금
pub(crate) type Link<S> = OwnedMutexGuard<Option<Connection<S>>>;

fn connection<S>(link: &mut Option<Link<S>>) -> DriverResult<&mut Connection<S>> {
    link.as_mut()
        .and_then(|guard| Option::as_mut(&mut **guard))
        .ok_or_else(|| DriverError::invalid_state("transaction no longer holds a connection"))
}

// ============================================================================
// TransactionState - 트랜잭션 상태
// ============================================================================

/// 트랜잭션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// BEGIN 응답 대기
    Pending,
    /// 활성 상태
    Open,
    /// COMMIT 응답 대기
    Committing,
    /// 커밋됨
    Committed,
    /// ROLLBACK 응답 대기
    RollingBack,
    /// 롤백됨
    RolledBack,
    /// 실패. 서버가 롤백하고 연결은 RESET이 필요하다.
    Failed,
}

impl TransactionState {
    /// 완료 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::RollingBack => "rolling-back",
            Self::RolledBack => "rolled-back",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ActiveStream - 실행 중인 결과 스트림
// ============================================================================

pub(crate) struct ActiveStream {
    keys: Arc<[String]>,
    qid: Option<i64>,
    buffer: VecDeque<Record>,
    summary: Summary,
    /// 보낸 PULL/DISCARD의 요약 응답을 아직 못 받음
    awaiting: bool,
    done: bool,
}

// ============================================================================
// Transaction - 트랜잭션
// ============================================================================

/// 명시적 트랜잭션. 세션의 연결을 끝날 때까지 독점한다.
pub struct Transaction<S = TcpStream> {
    link: Option<Link<S>>,
    session: Arc<SessionState>,
    state: TransactionState,
    stream: Option<ActiveStream>,
    counters: Counters,
    fetch_size: i64,
    use_bookmarks: bool,
    bookmark: Option<String>,
    statements: usize,
}

impl<S> Transaction<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(link: Link<S>, session: Arc<SessionState>, fetch_size: i64, use_bookmarks: bool) -> Self {
        Self {
            link: Some(link),
            session,
            state: TransactionState::Pending,
            stream: None,
            counters: Counters::default(),
            fetch_size,
            use_bookmarks,
            bookmark: None,
            statements: 0,
        }
    }

    pub(crate) fn set_fetch_size(&mut self, fetch_size: i64) {
        self.fetch_size = fetch_size;
    }

    /// BEGIN 전송. SUCCESS면 open.
    pub(crate) async fn open(&mut self, begin: Begin) -> DriverResult<()> {
        debug!(bookmarks = begin.bookmarks().len(), read = begin.is_read(), db = ?begin.database(), "C: BEGIN");
        match self.exchange(Request::Begin(begin)).await {
            Ok(_) => {
                self.state = TransactionState::Open;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// 문장 실행. RUN과 첫 PULL을 한 번에 보내고 RUN 응답(필드 목록)을 기다린다.
    pub async fn run(&mut self, query: impl Into<Query>) -> DriverResult<ResultCursor<'_, S>> {
        self.ensure_open("run")?;
        if let Err(e) = self.start(query.into()).await {
            return Err(self.fail(e));
        }
        Ok(ResultCursor::live(self))
    }

    /// 여러 문장을 한 번에 파이프라인. 문장마다 요약 하나.
    ///
    /// 중간에 FAILURE가 나면 서버는 나머지를 IGNORED로 답하고 트랜잭션은 실패한다.
    pub async fn run_batch<I, Q>(&mut self, statements: I) -> DriverResult<Vec<Summary>>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<Query>,
    {
        self.ensure_open("run a batch in")?;
        let queries: Vec<Query> = statements.into_iter().map(Into::into).collect();
        match self.batch(queries).await {
            Ok(summaries) => Ok(summaries),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// 실행 후 결과를 버리고 요약 반환
    pub async fn execute_update(&mut self, query: impl Into<Query>) -> DriverResult<Summary> {
        self.run(query).await?.consume().await
    }

    /// 커밋. 서버가 준 북마크를 세션에 기록하고 반환.
    pub async fn commit(&mut self) -> DriverResult<Option<String>> {
        self.ensure_open("commit")?;
        if let Err(e) = self.advance(true).await {
            return Err(self.fail(e));
        }
        self.state = TransactionState::Committing;
        let meta = match self.exchange(Request::Commit).await {
            Ok(meta) => meta,
            Err(e) => return Err(self.fail(e)),
        };

        self.state = TransactionState::Committed;
        self.bookmark = meta.bookmark().map(str::to_owned);
        if self.use_bookmarks {
            if let Some(bookmark) = &self.bookmark {
                *self.session.bookmarks.write() = Bookmarks::single(bookmark.clone());
            }
        }
        debug!(
            statements = self.statements,
            updates = self.counters.update_count(),
            bookmark = self.bookmark.as_deref().unwrap_or(""),
            "transaction committed"
        );
        self.finish(false);
        Ok(self.bookmark.clone())
    }

    /// 롤백
    pub async fn rollback(&mut self) -> DriverResult<()> {
        self.ensure_open("roll back")?;
        if let Err(e) = self.advance(true).await {
            return Err(self.fail(e));
        }
        self.state = TransactionState::RollingBack;
        if let Err(e) = self.exchange(Request::Rollback).await {
            return Err(self.fail(e));
        }
        self.state = TransactionState::RolledBack;
        debug!(statements = self.statements, "transaction rolled back");
        self.finish(false);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Stream handling
    // ------------------------------------------------------------------------

    async fn start(&mut self, query: Query) -> DriverResult<()> {
        self.advance(true).await?;
        let conn = connection(&mut self.link)?;
        let parameters = value::map_to_wire(&query.parameters, conn.version());
        conn.queue(Request::Run(Run::new(query.text.clone(), parameters)))?;
        conn.queue(Request::Pull(StreamLimit::new(self.fetch_size, None)))?;
        conn.flush().await?;

        let meta = conn.fetch_summary().await?;
        let keys: Arc<[String]> = meta.fields().unwrap_or_default().into();
        debug!(fields = keys.len(), qid = ?meta.qid(), "statement started");
        self.stream = Some(ActiveStream {
            keys,
            qid: meta.qid(),
            buffer: VecDeque::new(),
            summary: Summary::new(query.text, &meta, conn.server().agent.clone()),
            awaiting: true,
            done: false,
        });
        self.statements += 1;
        Ok(())
    }

    async fn batch(&mut self, queries: Vec<Query>) -> DriverResult<Vec<Summary>> {
        self.advance(true).await?;
        self.stream = None;
        let conn = connection(&mut self.link)?;
        let version = conn.version();
        for query in &queries {
            let parameters = value::map_to_wire(&query.parameters, version);
            conn.queue(Request::Run(Run::new(query.text.clone(), parameters)))?;
            conn.queue(Request::Pull(StreamLimit::all()))?;
        }
        conn.flush().await?;

        let server = conn.server().agent.clone();
        let mut summaries = Vec::with_capacity(queries.len());
        for query in queries {
            let meta = conn.fetch_summary().await?;
            let mut summary = Summary::new(query.text, &meta, server.clone());
            loop {
                let (phase, response) = conn.receive_tagged().await?;
                if let Response::Record(_) = response {
                    continue;
                }
                let tail = expect_success(phase, conn.last_sent(), response)?;
                summary.absorb(&tail);
                break;
            }
            self.counters += summary.counters;
            self.statements += 1;
            summaries.push(summary);
        }
        debug!(statements = summaries.len(), "batch complete");
        Ok(summaries)
    }

    /// 스트림 진행. `discard`면 버퍼를 비우고 남은 레코드를 DISCARD로 버린다.
    async fn advance(&mut self, discard: bool) -> DriverResult<Option<Record>> {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };
            if discard {
                stream.buffer.clear();
            } else if let Some(record) = stream.buffer.pop_front() {
                return Ok(Some(record));
            }
            if stream.done {
                return Ok(None);
            }

            let conn = connection(&mut self.link)?;
            if !stream.awaiting {
                let request = if discard {
                    Request::Discard(StreamLimit::new(FETCH_ALL, stream.qid))
                } else {
                    Request::Pull(StreamLimit::new(self.fetch_size, stream.qid))
                };
                conn.send(request).await?;
                stream.awaiting = true;
            }

            let (phase, response) = conn.receive_tagged().await?;
            match response {
                Response::Record(fields) => {
                    if !discard {
                        let values = fields.into_iter().map(Value::from_wire).collect::<DriverResult<Vec<_>>>()?;
                        stream.buffer.push_back(Record::new(stream.keys.clone(), values)?);
                    }
                }
                other => {
                    let meta = expect_success(phase, conn.last_sent(), other)?;
                    stream.summary.absorb(&meta);
                    stream.awaiting = false;
                    if !meta.has_more() {
                        stream.done = true;
                        self.counters += stream.summary.counters;
                    }
                }
            }
        }
    }

    pub(crate) async fn next_record(&mut self) -> DriverResult<Option<Record>> {
        if self.state == TransactionState::Failed {
            return Err(DriverError::invalid_state("the result stream failed with its transaction"));
        }
        match self.advance(false).await {
            Ok(record) => Ok(record),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// 남은 레코드를 버리고 스트림 요약 반환
    pub(crate) async fn finish_stream(&mut self) -> DriverResult<Summary> {
        if self.state == TransactionState::Failed {
            return Err(DriverError::invalid_state("the result stream failed with its transaction"));
        }
        if let Err(e) = self.advance(true).await {
            return Err(self.fail(e));
        }
        self.stream
            .as_ref()
            .map(|stream| stream.summary.clone())
            .ok_or_else(|| DriverError::invalid_state("the result stream is no longer available"))
    }

    /// 모든 레코드를 읽어 버퍼링
    pub(crate) async fn buffer_all(&mut self, query: Query) -> DriverResult<(Arc<[String]>, Vec<Record>, Summary)> {
        let mut cursor = self.run(query).await?;
        let keys = cursor.shared_keys();
        let mut records = Vec::new();
        while let Some(record) = cursor.next().await? {
            records.push(record);
        }
        let summary = cursor.consume().await?;
        Ok((keys, records, summary))
    }

    async fn exchange(&mut self, request: Request) -> DriverResult<Success> {
        let conn = connection(&mut self.link)?;
        conn.send(request).await?;
        conn.fetch_summary().await
    }
}

impl<S> Transaction<S> {
    fn ensure_open(&self, action: &str) -> DriverResult<()> {
        if self.state == TransactionState::Open {
            Ok(())
        } else {
            Err(DriverError::invalid_state(format!("cannot {} a transaction that is {}", action, self.state)))
        }
    }

    fn fail(&mut self, err: DriverError) -> DriverError {
        warn!(error = %err, state = %self.state, "transaction failed");
        self.state = TransactionState::Failed;
        self.stream = None;
        self.finish(true);
        err
    }

    /// 연결 잠금 해제. 세션은 다음 BEGIN 전에 필요하면 RESET한다.
    fn finish(&mut self, needs_reset: bool) {
        if needs_reset {
            self.session.reset_required.store(true, Ordering::Release);
        }
        self.session.tx_open.store(false, Ordering::Release);
        self.link = None;
    }

    pub(crate) fn stream_keys(&self) -> Arc<[String]> {
        self.stream.as_ref().map(|s| s.keys.clone()).unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// 스트림이 끝났을 때만 요약이 있다
    pub(crate) fn stream_summary(&self) -> Option<&Summary> {
        self.stream.as_ref().filter(|s| s.done).map(|s| &s.summary)
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TransactionState::Open
    }

    /// 지금까지 실행한 모든 문장의 카운터 합계
    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// 커밋으로 받은 북마크
    pub fn bookmark(&self) -> Option<&str> {
        self.bookmark.as_deref()
    }
}

impl<S> fmt::Debug for Transaction<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .field("statements", &self.statements)
            .field("counters", &self.counters)
            .finish()
    }
}

impl<S> Drop for Transaction<S> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            warn!(state = %self.state, "transaction dropped while open, connection will be reset");
            self.finish(true);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
