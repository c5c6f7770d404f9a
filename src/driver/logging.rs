//! Session operations and the logging decorator
//!
//! [`SessionOps`]는 세션이 제공하는 작업의 공통 인터페이스이고,
//! [`LoggingSession`]은 같은 인터페이스를 구현하면서 호출 전후와 소요 시간을
//! 기록한다. URL 속성 `debug`가 켜져 있으면 드라이버가 이 래퍼를 활성화한다.

use std::future::Future;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use super::bookmark::Bookmarks;
use super::config::{AccessMode, SessionConfig, TransactionConfig};
use super::cursor::ResultCursor;
use super::error::DriverResult;
use super::session::{Query, Session};
use super::transaction::Transaction;

/// 세션 작업
pub trait SessionOps {
    /// 연결 스트림 타입
    type Stream: 'static;

    fn config(&self) -> &SessionConfig;

    fn begin(
        &self,
        mode: AccessMode,
        database: Option<&str>,
        bookmarks: &Bookmarks,
        config: TransactionConfig,
    ) -> impl Future<Output = DriverResult<Transaction<Self::Stream>>>;

    fn run_auto_commit(&self, query: Query) -> impl Future<Output = DriverResult<ResultCursor<'static, Self::Stream>>>;

    fn last_bookmark(&self) -> Bookmarks;

    fn close(&self) -> impl Future<Output = DriverResult<()>>;
}

impl<S> SessionOps for Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = S;

    fn config(&self) -> &SessionConfig {
        Session::config(self)
    }

    fn begin(
        &self,
        mode: AccessMode,
        database: Option<&str>,
        bookmarks: &Bookmarks,
        config: TransactionConfig,
    ) -> impl Future<Output = DriverResult<Transaction<S>>> {
        Session::begin(self, mode, database, bookmarks, config)
    }

    fn run_auto_commit(&self, query: Query) -> impl Future<Output = DriverResult<ResultCursor<'static, S>>> {
        Session::run_auto_commit(self, query)
    }

    fn last_bookmark(&self) -> Bookmarks {
        Session::last_bookmark(self)
    }

    fn close(&self) -> impl Future<Output = DriverResult<()>> {
        Session::close(self)
    }
}

// ============================================================================
// LoggingSession - 로깅 데코레이터
// ============================================================================

/// 호출마다 시작과 끝, 소요 시간을 기록하는 세션 래퍼
#[derive(Debug)]
pub struct LoggingSession<T> {
    inner: T,
    enabled: bool,
}

impl<T: SessionOps> LoggingSession<T> {
    pub fn new(inner: T) -> Self {
        Self { inner, enabled: true }
    }

    /// `enabled`가 false면 기록 없이 그대로 위임
    pub fn with_enabled(inner: T, enabled: bool) -> Self {
        Self { inner, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    async fn traced<R, F>(&self, call: &'static str, detail: &str, fut: F) -> DriverResult<R>
    where
        F: Future<Output = DriverResult<R>>,
    {
        if !self.enabled {
            return fut.await;
        }
        info!(call, detail, "session call");
        let started = Instant::now();
        let result = fut.await;
        match &result {
            Ok(_) => info!(call, elapsed = ?started.elapsed(), "session call returned"),
            Err(e) => warn!(call, elapsed = ?started.elapsed(), error = %e, "session call failed"),
        }
        result
    }
}

impl<T: SessionOps> SessionOps for LoggingSession<T> {
    type Stream = T::Stream;

    fn config(&self) -> &SessionConfig {
        self.inner.config()
    }

    async fn begin(
        &self,
        mode: AccessMode,
        database: Option<&str>,
        bookmarks: &Bookmarks,
        config: TransactionConfig,
    ) -> DriverResult<Transaction<T::Stream>> {
        let detail = format!("mode={:?} db={} bookmarks={}", mode, database.unwrap_or("-"), bookmarks);
        self.traced("begin", &detail, self.inner.begin(mode, database, bookmarks, config))
            .await
    }

    async fn run_auto_commit(&self, query: Query) -> DriverResult<ResultCursor<'static, T::Stream>> {
        let detail = query.text.clone();
        self.traced("run_auto_commit", &detail, self.inner.run_auto_commit(query))
            .await
    }

    fn last_bookmark(&self) -> Bookmarks {
        self.inner.last_bookmark()
    }

    async fn close(&self) -> DriverResult<()> {
        self.traced("close", "", self.inner.close()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::handshake::BoltVersion;
    use crate::driver::testkit::{FakeServer, Script};
    use crate::driver::Connection;

    #[tokio::test]
    async fn test_decorator_delegates() {
        let server = FakeServer::start(BoltVersion::V4_4, Script::default());
        let conn = Connection::establish(server.client_stream(), &server.config()).await.unwrap();
        let session = LoggingSession::new(Session::new(conn, SessionConfig::default()));
        assert!(session.is_enabled());

        let cursor = session.run_auto_commit(Query::new("CREATE (n)")).await.unwrap();
        assert!(cursor.is_update());
        assert_eq!(session.last_bookmark().to_string(), "bm:1");

        let mut tx = session
            .begin(AccessMode::Read, Some("neo4j"), &Bookmarks::new(), TransactionConfig::new())
            .await
            .unwrap();
        tx.rollback().await.unwrap();
        session.close().await.unwrap();

        let names: Vec<_> = server.requests().iter().map(|r| r.name()).collect();
        assert_eq!(names[..7], ["HELLO", "BEGIN", "RUN", "PULL", "COMMIT", "BEGIN", "ROLLBACK"]);
    }

    #[tokio::test]
    async fn test_disabled_decorator_passes_errors_through() {
        let server = FakeServer::start(BoltVersion::V4_4, Script::default());
        let conn = Connection::establish(server.client_stream(), &server.config()).await.unwrap();
        let session = LoggingSession::with_enabled(Session::new(conn, SessionConfig::default()), false);
        session.close().await.unwrap();

        let err = session.run_auto_commit(Query::new("RETURN 1")).await.unwrap_err();
        assert!(matches!(err, crate::driver::DriverError::InvalidState(_)));
    }
}
