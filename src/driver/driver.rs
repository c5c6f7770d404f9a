//! Driver
//!
//! URL 하나에 대한 진입점. 연결 풀을 소유하고 세션과 auto-commit 연결을 만든다.

use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::info;

use super::autocommit::AutoCommitConnection;
use super::config::{AuthToken, ConnectionConfig, PoolConfig, SessionConfig};
use super::connection::{Connection, ServerInfo};
use super::error::DriverResult;
use super::flavor::{FlavorRegistry, ResolvedUrl};
use super::logging::LoggingSession;
use super::pool::{ConnectionPool, PoolMetrics};
use super::session::Session;

/// 새 연결을 만드는 함수. 기본은 TCP 접속.
pub type Connector<S> = Arc<dyn Fn(ConnectionConfig) -> BoxFuture<'static, DriverResult<Connection<S>>> + Send + Sync>;

/// 드라이버가 만드는 auto-commit 연결. URL의 `debug` 속성이 로깅을 켠다.
pub type DriverConnection<S = TcpStream> = AutoCommitConnection<LoggingSession<Session<S>>>;

// ============================================================================
// Driver - 드라이버
// ============================================================================

/// 드라이버
pub struct Driver<S = TcpStream> {
    url: ResolvedUrl,
    pool: Arc<ConnectionPool<S>>,
    connector: Connector<S>,
}

impl Driver<TcpStream> {
    /// 기본 계열(bolt, neo4j, memgraph)로 URL을 해석해 드라이버 생성.
    /// `auth`가 없으면 URL의 `user`/`password` 속성을 쓴다.
    pub fn new(url: &str, auth: Option<AuthToken>) -> DriverResult<Self> {
        Self::with_registry(&FlavorRegistry::with_defaults(), url, auth)
    }

    /// 주어진 레지스트리로 URL 해석
    pub fn with_registry(registry: &FlavorRegistry, url: &str, auth: Option<AuthToken>) -> DriverResult<Self> {
        Self::from_resolved(registry.resolve(url)?, auth, PoolConfig::default())
    }

    /// 해석된 URL과 풀 설정으로 생성
    pub fn from_resolved(url: ResolvedUrl, auth: Option<AuthToken>, pool: PoolConfig) -> DriverResult<Self> {
        let connector: Connector<TcpStream> =
            Arc::new(|config: ConnectionConfig| async move { Connection::dial(&config).await }.boxed());
        Self::with_connector(url, auth, pool, connector)
    }
}

impl<S> Driver<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// 임의의 스트림(TLS 등)을 만드는 커넥터로 생성
    pub fn with_connector(
        url: ResolvedUrl,
        auth: Option<AuthToken>,
        pool: PoolConfig,
        connector: Connector<S>,
    ) -> DriverResult<Self> {
        let config = url.connection_config(auth)?;
        info!(flavor = %url.flavor.name, address = %url.address, scheme = %url.scheme, "driver created");
        Ok(Self { url, pool: Arc::new(ConnectionPool::new(config, pool)), connector })
    }

    async fn acquire(&self) -> DriverResult<Connection<S>> {
        let connector = self.connector.clone();
        self.pool.acquire_with(move |config| connector(config)).await
    }

    /// 세션 생성. 연결은 풀에서 빌리고 `close()` 때 돌려준다.
    pub async fn session(&self, config: SessionConfig) -> DriverResult<Session<S>> {
        let conn = self.acquire().await?;
        Ok(Session::pooled(conn, config, self.pool.clone()))
    }

    /// URL 속성으로 만든 설정의 세션
    pub async fn default_session(&self) -> DriverResult<Session<S>> {
        self.session(self.url.session_config()?).await
    }

    /// URL 속성(`autocommit`, `readonly`, `debug`)을 따르는 auto-commit 연결
    pub async fn connect(&self) -> DriverResult<DriverConnection<S>> {
        let auto_commit = self.url.auto_commit()?;
        let read_only = self.url.read_only()?;
        let session = LoggingSession::with_enabled(self.default_session().await?, self.url.debug()?);
        Ok(AutoCommitConnection::new(session, auto_commit, read_only))
    }

    /// 연결 하나를 열어(또는 재사용해) 서버 정보 확인
    pub async fn verify_connectivity(&self) -> DriverResult<ServerInfo> {
        let conn = self.acquire().await?;
        let server = conn.server().clone();
        self.pool.release(conn, false).await;
        Ok(server)
    }

    /// 풀 닫기
    pub async fn close(&self) {
        self.pool.close().await;
        info!(address = %self.url.address, "driver closed");
    }

    pub fn url(&self) -> &ResolvedUrl {
        &self.url
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.pool.metrics()
    }
}

impl<S> fmt::Debug for Driver<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("flavor", &self.url.flavor.name)
            .field("address", &self.url.address)
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::handshake::BoltVersion;
    use crate::bolt::message::Request;
    use crate::driver::testkit::{FakeServer, Script};
    use crate::driver::autocommit::Execution;

    fn driver(server: &FakeServer, url: &str) -> Driver<tokio::io::DuplexStream> {
        let resolved = FlavorRegistry::with_defaults().resolve(url).unwrap();
        let server = server.clone();
        let connector: Connector<tokio::io::DuplexStream> = Arc::new(move |config: ConnectionConfig| {
            let stream = server.client_stream();
            async move { Connection::establish(stream, &config).await }.boxed()
        });
        Driver::with_connector(resolved, None, PoolConfig::default(), connector).unwrap()
    }

    #[tokio::test]
    async fn test_sessions_share_pooled_connection() {
        let server = FakeServer::start(BoltVersion::V4_4, Script::default());
        let driver = driver(&server, "jdbc:neo4j:bolt://db.example:7687/movies?user=neo4j,password=secret");

        let info = driver.verify_connectivity().await.unwrap();
        assert_eq!(info.agent.as_deref(), Some("Neo4j/5.13.0"));

        let session = driver.default_session().await.unwrap();
        session.begin_transaction(Default::default()).await.unwrap().commit().await.unwrap();
        session.close().await.unwrap();

        let metrics = driver.metrics();
        assert_eq!(metrics.total_created, 1);
        assert_eq!(metrics.idle, 1);

        let requests = server.requests();
        match (&requests[0], requests.iter().find(|r| matches!(r, Request::Begin(_)))) {
            (Request::Hello(hello), Some(Request::Begin(begin))) => {
                assert_eq!(hello.extra.get("principal").and_then(|v| v.as_str()), Some("neo4j"));
                assert_eq!(begin.database(), Some("movies"));
            }
            other => panic!("unexpected requests {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_follows_url_properties() {
        let server = FakeServer::start(BoltVersion::new(4, 1), Script::default());
        let driver = driver(&server, "jdbc:memgraph:bolt://localhost/ignored?autocommit=false&readonly=true&debug");

        let mut conn = driver.connect().await.unwrap();
        assert!(!conn.auto_commit());
        assert!(conn.read_only());
        assert!(conn.session().is_enabled());

        assert_eq!(conn.execute("CREATE (n)").await.unwrap(), Execution::Updated(0));
        conn.commit().await.unwrap();
        conn.close().await.unwrap();

        match server.requests().iter().find(|r| matches!(r, Request::Begin(_))) {
            Some(Request::Begin(begin)) => {
                assert!(begin.is_read());
                assert_eq!(begin.database(), None);
            }
            other => panic!("expected BEGIN, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_driver_rejects_sessions() {
        let server = FakeServer::start(BoltVersion::V4_4, Script::default());
        let driver = driver(&server, "bolt://localhost");
        driver.close().await;
        assert!(driver.default_session().await.is_err());
    }

    #[tokio::test]
    #[ignore] // 실제 Bolt 서버 필요
    async fn test_real_server_roundtrip() {
        let driver = Driver::new("bolt://localhost:7687?user=neo4j,password=password", None).unwrap();
        let mut conn = driver.connect().await.unwrap();
        match conn.execute("RETURN 1 AS one").await.unwrap() {
            Execution::Rows(rs) => assert_eq!(rs.records()[0].get_as::<i64>("one").unwrap(), 1),
            other => panic!("expected rows, got {:?}", other),
        }
        conn.close().await.unwrap();
        driver.close().await;
    }
}
