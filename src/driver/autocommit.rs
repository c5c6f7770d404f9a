//! Auto-commit facade
//!
//! 문장 단위 API. auto-commit 모드에서는 문장마다 자체 트랜잭션에서 실행하고,
//! 끄면 첫 문장에서 트랜잭션을 열어 `commit`/`rollback`까지 유지한다.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::bookmark::Bookmarks;
use super::config::{AccessMode, TransactionConfig, FETCH_ALL};
use super::error::{DriverError, DriverResult};
use super::logging::SessionOps;
use super::record::Record;
use super::session::Query;
use super::summary::Summary;
use super::transaction::{Transaction, TransactionState};

/// 유효성 확인용 문장
const FASTEST_STATEMENT: &str = "RETURN 1";

// ============================================================================
// ResultSet / Execution
// ============================================================================

/// 버퍼링된 결과
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    keys: Arc<[String]>,
    records: Vec<Record>,
    summary: Summary,
}

impl ResultSet {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl IntoIterator for ResultSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// `execute`의 결과: 필드가 있으면 결과 집합, 없으면 업데이트 건수
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    Rows(ResultSet),
    Updated(i64),
}

/// `set_auto_commit`의 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSwitch {
    /// 열려 있던 트랜잭션을 커밋했는지
    pub committed: bool,
    /// 전환 후 세션 북마크
    pub bookmarks: Bookmarks,
}

// ============================================================================
// AutoCommitConnection
// ============================================================================

/// auto-commit 모드를 가진 문장 단위 연결
pub struct AutoCommitConnection<T: SessionOps> {
    session: T,
    tx: Option<Transaction<T::Stream>>,
    auto_commit: bool,
    read_only: bool,
    closed: bool,
}

impl<T> AutoCommitConnection<T>
where
    T: SessionOps,
    T::Stream: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    pub fn new(session: T, auto_commit: bool, read_only: bool) -> Self {
        Self { session, tx: None, auto_commit, read_only, closed: false }
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed {
            Err(DriverError::invalid_state("connection is closed"))
        } else {
            Ok(())
        }
    }

    fn access_mode(&self) -> AccessMode {
        if self.read_only {
            AccessMode::Read
        } else {
            AccessMode::Write
        }
    }

    async fn begin(&self, config: TransactionConfig) -> DriverResult<Transaction<T::Stream>> {
        let database = self.session.config().database.clone();
        self.session
            .begin(self.access_mode(), database.as_deref(), &Bookmarks::new(), config)
            .await
    }

    /// 수동 모드의 현재 트랜잭션. 없으면 연다.
    /// 실패한 트랜잭션은 `rollback()`으로 치울 때까지 남아 문장을 거부한다.
    async fn current(&mut self) -> DriverResult<&mut Transaction<T::Stream>> {
        self.reject_failed()?;
        if self.tx.as_ref().map_or(true, |tx| !tx.is_open()) {
            self.tx = None;
            let tx = self.begin(TransactionConfig::default()).await?;
            debug!("implicit transaction opened");
            self.tx = Some(tx);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| DriverError::invalid_state("no transaction available"))
    }

    async fn buffered(&mut self, query: Query) -> DriverResult<ResultSet> {
        self.ensure_open()?;
        let (keys, records, summary) = if self.auto_commit {
            let mut tx = self.begin(TransactionConfig::default()).await?;
            tx.set_fetch_size(FETCH_ALL);
            let result = tx.buffer_all(query).await;
            finish_single(tx, result).await?
        } else {
            let tx = self.current().await?;
            tx.buffer_all(query).await?
        };
        Ok(ResultSet { keys, records, summary })
    }

    /// 문장 실행. 필드가 없는 문장은 업데이트 건수를 돌려준다.
    pub async fn execute(&mut self, query: impl Into<Query>) -> DriverResult<Execution> {
        let result = self.buffered(query.into()).await?;
        if result.keys.is_empty() {
            Ok(Execution::Updated(result.summary.update_count()))
        } else {
            Ok(Execution::Rows(result))
        }
    }

    /// 업데이트 건수
    pub async fn execute_update(&mut self, query: impl Into<Query>) -> DriverResult<i64> {
        Ok(self.buffered(query.into()).await?.summary.update_count())
    }

    /// 결과 집합 (업데이트 문장이면 필드 없는 빈 결과)
    pub async fn execute_query(&mut self, query: impl Into<Query>) -> DriverResult<ResultSet> {
        self.buffered(query.into()).await
    }

    /// 여러 문장을 한 번에 파이프라인. 문장별 업데이트 건수.
    pub async fn execute_batch<I, Q>(&mut self, statements: I) -> DriverResult<Vec<i64>>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<Query>,
    {
        self.ensure_open()?;
        let summaries = if self.auto_commit {
            let mut tx = self.begin(TransactionConfig::default()).await?;
            let result = tx.run_batch(statements).await;
            finish_single(tx, result).await?
        } else {
            self.current().await?.run_batch(statements).await?
        };
        Ok(summaries.iter().map(Summary::update_count).collect())
    }

    /// 수동 모드의 트랜잭션 커밋. 실패한 트랜잭션은 커밋할 수 없다.
    pub async fn commit(&mut self) -> DriverResult<()> {
        self.ensure_open()?;
        self.reject_in_auto_commit("commit")?;
        self.reject_failed()?;
        if let Some(mut tx) = self.tx.take() {
            if tx.is_open() {
                tx.commit().await?;
            }
        }
        Ok(())
    }

    /// 수동 모드의 트랜잭션 롤백. 실패한 트랜잭션도 여기서 치운다.
    pub async fn rollback(&mut self) -> DriverResult<()> {
        self.ensure_open()?;
        self.reject_in_auto_commit("roll back")?;
        if let Some(mut tx) = self.tx.take() {
            if tx.is_open() {
                tx.rollback().await?;
            }
        }
        Ok(())
    }

    fn reject_failed(&self) -> DriverResult<()> {
        match &self.tx {
            Some(tx) if tx.state() == TransactionState::Failed => Err(DriverError::invalid_state(
                "transaction failed and was rolled back; call rollback() before continuing",
            )),
            _ => Ok(()),
        }
    }

    fn reject_in_auto_commit(&self, action: &str) -> DriverResult<()> {
        if self.auto_commit {
            Err(DriverError::invalid_state(format!("cannot {} while auto-commit is enabled", action)))
        } else {
            Ok(())
        }
    }

    /// 모드 전환. 열린 트랜잭션이 있으면 커밋한다.
    pub async fn set_auto_commit(&mut self, enabled: bool) -> DriverResult<ModeSwitch> {
        self.ensure_open()?;
        let mut committed = false;
        if enabled != self.auto_commit {
            self.reject_failed()?;
            if let Some(mut tx) = self.tx.take() {
                if tx.is_open() {
                    tx.commit().await?;
                    committed = true;
                }
            }
            self.auto_commit = enabled;
            debug!(auto_commit = enabled, committed, "auto-commit mode switched");
        }
        Ok(ModeSwitch { committed, bookmarks: self.session.last_bookmark() })
    }

    /// 읽기 전용 전환. 트랜잭션 중에는 불가.
    pub fn set_read_only(&mut self, read_only: bool) -> DriverResult<()> {
        self.ensure_open()?;
        if self.tx.as_ref().is_some_and(|tx| tx.is_open()) {
            return Err(DriverError::invalid_state("cannot change read-only mode during a transaction"));
        }
        self.read_only = read_only;
        Ok(())
    }

    /// `RETURN 1`을 트랜잭션 안에서 제한 시간 내에 실행할 수 있는지
    pub async fn is_valid(&mut self, timeout: Duration) -> bool {
        if self.closed {
            return false;
        }
        if let Some(tx) = &self.tx {
            if tx.is_open() {
                return true;
            }
        }
        let check = async {
            let mut tx = self.begin(TransactionConfig::new().with_timeout(timeout)).await?;
            tx.run(FASTEST_STATEMENT).await?.consume().await?;
            tx.commit().await
        };
        match tokio::time::timeout(timeout, check).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(error = %e, "validity check failed");
                false
            }
            Err(_) => {
                debug!(?timeout, "validity check timed out");
                false
            }
        }
    }

    /// 열린 트랜잭션을 롤백하고 세션을 닫는다
    pub async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(mut tx) = self.tx.take() {
            if tx.is_open() {
                if let Err(e) = tx.rollback().await {
                    warn!(error = %e, "rollback on close failed");
                }
            }
        }
        self.session.close().await
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 세션의 마지막 북마크
    pub fn bookmarks(&self) -> Bookmarks {
        self.session.last_bookmark()
    }

    pub fn session(&self) -> &T {
        &self.session
    }
}

/// 단일 트랜잭션 마무리: 성공이면 커밋, 실패면 (아직 열려 있으면) 롤백
async fn finish_single<S, R>(mut tx: Transaction<S>, result: DriverResult<R>) -> DriverResult<R>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if tx.is_open() {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback after statement failure failed");
                }
            }
            Err(e)
        }
    }
}

impl<T: SessionOps> std::fmt::Debug for AutoCommitConnection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoCommitConnection")
            .field("auto_commit", &self.auto_commit)
            .field("read_only", &self.read_only)
            .field("in_transaction", &self.tx.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::bolt::handshake::BoltVersion;
    use crate::bolt::message::{Request, Response, Success};
    use crate::bolt::packstream::PackStreamValue;
    use crate::driver::config::SessionConfig;
    use crate::driver::session::Session;
    use crate::driver::testkit::{failure, FakeServer, Script};
    use crate::driver::value::Value;
    use crate::driver::Connection;

    type Conn = AutoCommitConnection<Session<tokio::io::DuplexStream>>;

    async fn open(server: &FakeServer, auto_commit: bool) -> Conn {
        let conn = Connection::establish(server.client_stream(), &server.config()).await.unwrap();
        AutoCommitConnection::new(Session::new(conn, SessionConfig::default()), auto_commit, false)
    }

    fn creates_one_node() -> Script {
        Script::default().on_pull(|_| {
            let mut stats = HashMap::new();
            stats.insert("nodes-created".to_string(), PackStreamValue::Integer(1));
            vec![Response::Success(Success::new().with("has_more", false).with("type", "w").with("stats", stats))]
        })
    }

    fn names(server: &FakeServer) -> Vec<&'static str> {
        server.requests().iter().map(|r| r.name()).collect()
    }

    #[tokio::test]
    async fn test_execute_distinguishes_updates_from_rows() {
        let server = FakeServer::start(BoltVersion::V4_4, creates_one_node());
        let mut conn = open(&server, true).await;
        assert_eq!(conn.execute("CREATE (n)").await.unwrap(), Execution::Updated(1));

        let rows = vec![vec![PackStreamValue::from("a")], vec![PackStreamValue::from("b")]];
        let server = FakeServer::start(BoltVersion::V4_4, Script::default().results(&["v"], rows));
        let mut conn = open(&server, true).await;
        match conn.execute("UNWIND ['a', 'b'] AS v RETURN v").await.unwrap() {
            Execution::Rows(rs) => {
                assert_eq!(rs.keys(), ["v"]);
                let values: Vec<_> = rs.iter().map(|r| r.get("v").cloned()).collect();
                assert_eq!(values, [Some(Value::from("a")), Some(Value::from("b"))]);
            }
            other => panic!("expected rows, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_each_auto_commit_statement_is_its_own_transaction() {
        let server = FakeServer::start(BoltVersion::V4_4, creates_one_node());
        let mut conn = open(&server, true).await;
        conn.execute_update("CREATE (a)").await.unwrap();
        conn.execute_update("CREATE (b)").await.unwrap();
        assert_eq!(server.count("BEGIN"), 2);
        assert_eq!(server.count("COMMIT"), 2);
        assert_eq!(conn.bookmarks().to_string(), "bm:2");
        assert!(conn.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_manual_mode_spans_statements() {
        let server = FakeServer::start(BoltVersion::V4_4, creates_one_node());
        let mut conn = open(&server, false).await;
        conn.execute_update("CREATE (a)").await.unwrap();
        conn.execute_update("CREATE (b)").await.unwrap();
        assert_eq!(server.count("BEGIN"), 1);
        assert_eq!(server.count("COMMIT"), 0);

        conn.rollback().await.unwrap();
        assert_eq!(server.count("ROLLBACK"), 1);
        assert_eq!(server.count("COMMIT"), 0);
    }

    #[tokio::test]
    async fn test_switching_mode_commits_open_work() {
        let server = FakeServer::start(BoltVersion::V4_4, creates_one_node());
        let mut conn = open(&server, false).await;
        conn.execute_update("CREATE (a)").await.unwrap();
        assert!(conn.set_read_only(true).is_err());

        let switch = conn.set_auto_commit(true).await.unwrap();
        assert!(switch.committed);
        assert_eq!(switch.bookmarks.to_string(), "bm:1");
        assert!(conn.auto_commit());

        let again = conn.set_auto_commit(true).await.unwrap();
        assert!(!again.committed);
        assert_eq!(server.count("COMMIT"), 1);
    }

    #[tokio::test]
    async fn test_execute_batch_pipelines_statements() {
        let server = FakeServer::start(BoltVersion::V4_4, creates_one_node());
        let mut conn = open(&server, true).await;
        let counts = conn.execute_batch(["CREATE (a)", "CREATE (b)", "CREATE (c)"]).await.unwrap();
        assert_eq!(counts, [1, 1, 1]);
        assert_eq!(names(&server), ["HELLO", "BEGIN", "RUN", "PULL", "RUN", "PULL", "RUN", "PULL", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_read_only_sends_read_mode() {
        let server = FakeServer::start(BoltVersion::V4_4, Script::default());
        let mut conn = open(&server, true).await;
        conn.set_read_only(true).unwrap();
        conn.execute_query("MATCH (n) RETURN n").await.unwrap();
        match server.requests().iter().find(|r| matches!(r, Request::Begin(_))) {
            Some(Request::Begin(begin)) => assert!(begin.is_read()),
            other => panic!("expected BEGIN, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_is_valid() {
        let server = FakeServer::start(BoltVersion::V4_4, Script::default());
        let mut conn = open(&server, true).await;
        assert!(conn.is_valid(Duration::from_secs(1)).await);
        assert!(names(&server).contains(&"COMMIT"));

        let server = FakeServer::start(BoltVersion::V4_4, Script::default().silent_on_run());
        let mut conn = open(&server, true).await;
        assert!(!conn.is_valid(Duration::from_millis(50)).await);

        conn.close().await.unwrap();
        assert!(!conn.is_valid(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_close_rolls_back_open_transaction() {
        let server = FakeServer::start(BoltVersion::V4_4, creates_one_node());
        let mut conn = open(&server, false).await;
        conn.execute_update("CREATE (a)").await.unwrap();
        conn.close().await.unwrap();
        assert!(conn.is_closed());
        assert!(conn.execute("RETURN 1").await.is_err());
        server.wait_for(|reqs| matches!(reqs.last(), Some(Request::Goodbye))).await;
        assert_eq!(server.count("ROLLBACK"), 1);
    }

    #[tokio::test]
    async fn test_failed_manual_transaction_refuses_commit_until_rolled_back() {
        let mut runs = 0;
        let script = Script::default().on_run(move |_| {
            runs += 1;
            if runs == 2 {
                vec![failure("Neo.ClientError.Schema.ConstraintValidationFailed", "already exists")]
            } else {
                vec![Response::Success(Success::new().with("fields", Vec::<String>::new()))]
            }
        });
        let server = FakeServer::start(BoltVersion::V4_4, script);
        let mut conn = open(&server, false).await;

        conn.execute_update("CREATE (a)").await.unwrap();
        assert!(conn.execute_update("CREATE (a)").await.is_err());

        // 앞의 작업은 이미 롤백됨. 커밋 성공으로 보고하면 안 된다.
        assert!(matches!(conn.commit().await, Err(DriverError::InvalidState(_))));
        assert!(matches!(conn.execute("RETURN 1").await, Err(DriverError::InvalidState(_))));
        assert!(matches!(conn.set_auto_commit(true).await, Err(DriverError::InvalidState(_))));
        assert_eq!(server.count("COMMIT"), 0);
        assert_eq!(server.count("BEGIN"), 1);

        conn.rollback().await.unwrap();
        assert_eq!(server.count("ROLLBACK"), 0);

        conn.execute_update("CREATE (b)").await.unwrap();
        conn.commit().await.unwrap();
        let names = names(&server);
        let reset = names.iter().position(|n| *n == "RESET").unwrap();
        assert_eq!(names.iter().rposition(|n| *n == "BEGIN"), Some(reset + 1));
        assert_eq!(server.count("COMMIT"), 1);
    }
}
