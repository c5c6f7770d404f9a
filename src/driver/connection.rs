//! Bolt Connection
//!
//! 바이트 스트림 하나 위의 Bolt 연결: 핸드셰이크, HELLO/LOGON, 파이프라이닝,
//! RESET, GOODBYE. 스트림은 `AsyncRead + AsyncWrite`이면 무엇이든 된다
//! (TCP, 호출자가 만든 TLS 스트림, 테스트용 duplex).

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

use crate::bolt::codec::ClientCodec;
use crate::bolt::handshake::{self, BoltVersion, HANDSHAKE_RESPONSE_SIZE};
use crate::bolt::message::{Hello, Request, Response, Success};

use super::config::ConnectionConfig;
use super::error::{DriverError, DriverResult, Phase};

// ============================================================================
// ConnectionState - 연결 상태
// ============================================================================

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 요청 가능
    Ready,
    /// 서버가 FAILURE를 보냄. RESET 전까지 요청은 IGNORED.
    Failed,
    /// I/O 또는 프로토콜 에러. 다시 쓸 수 없음.
    Defunct,
    /// GOODBYE 후 닫힘
    Closed,
}

/// HELLO 응답의 서버 정보
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// 서버 agent (예: `Neo4j/5.13.0`)
    pub agent: Option<String>,
    /// 서버가 부여한 연결 ID
    pub connection_id: Option<String>,
}

fn phase_of(request: &Request) -> Phase {
    match request {
        Request::Hello(_) => Phase::Hello,
        Request::Logon(_) | Request::Logoff => Phase::Logon,
        Request::Goodbye => Phase::Goodbye,
        Request::Reset => Phase::Reset,
        Request::Run(_) => Phase::Run,
        Request::Begin(_) => Phase::Begin,
        Request::Commit => Phase::Commit,
        Request::Rollback => Phase::Rollback,
        Request::Pull(_) => Phase::Pull,
        Request::Discard(_) => Phase::Discard,
    }
}

// ============================================================================
// Connection - Bolt 연결
// ============================================================================

/// Bolt 연결
pub struct Connection<S> {
    stream: S,
    codec: ClientCodec,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    version: BoltVersion,
    state: ConnectionState,
    server: ServerInfo,
    /// 응답을 기다리는 요청들의 단계 (전송 순서)
    pending: VecDeque<Phase>,
    last_sent: Option<&'static str>,
    request_timeout: Option<Duration>,
    last_used: Instant,
}

impl Connection<TcpStream> {
    /// TCP로 접속 후 핸드셰이크와 인증까지 수행
    pub async fn dial(config: &ConnectionConfig) -> DriverResult<Self> {
        let addr = config.address.to_socket_addr();
        let limit = config.connect_timeout;
        let stream = match tokio::time::timeout(limit, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(DriverError::ConnectionLost { phase: Phase::Dial, last_sent: None, source })
            }
            Err(_) => return Err(DriverError::Timeout { phase: Phase::Dial, after: limit }),
        };
        // 작은 메시지가 많으므로 Nagle 끔
        stream.set_nodelay(true).ok();
        debug!(address = %addr, "tcp connected");
        Self::establish(stream, config).await
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// 이미 열린 스트림 위에서 핸드셰이크와 HELLO (5.1부터는 LOGON까지) 수행
    pub async fn establish(stream: S, config: &ConnectionConfig) -> DriverResult<Self> {
        let limit = config.connect_timeout;
        match tokio::time::timeout(limit, Self::open(stream, config)).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout { phase: Phase::Handshake, after: limit }),
        }
    }

    async fn open(mut stream: S, config: &ConnectionConfig) -> DriverResult<Self> {
        let version = Self::handshake(&mut stream, config).await?;
        let mut conn = Self {
            stream,
            codec: ClientCodec::with_max_message_size(config.max_message_size),
            read_buffer: BytesMut::with_capacity(8 * 1024),
            write_buffer: BytesMut::with_capacity(8 * 1024),
            version,
            state: ConnectionState::Ready,
            server: ServerInfo::default(),
            pending: VecDeque::new(),
            last_sent: None,
            request_timeout: config.request_timeout,
            last_used: Instant::now(),
        };
        if let Err(err) = conn.authenticate(config).await {
            conn.shutdown().await;
            return Err(err);
        }
        info!(
            address = %config.address,
            version = %version,
            server = conn.server.agent.as_deref().unwrap_or("unknown"),
            connection_id = conn.server.connection_id.as_deref().unwrap_or(""),
            "bolt connection established"
        );
        Ok(conn)
    }

    async fn handshake(stream: &mut S, config: &ConnectionConfig) -> DriverResult<BoltVersion> {
        let lost = |source: io::Error| DriverError::ConnectionLost {
            phase: Phase::Handshake,
            last_sent: None,
            source,
        };
        let preamble = handshake::client_preamble(&config.proposals);
        stream.write_all(&preamble).await.map_err(lost)?;
        stream.flush().await.map_err(lost)?;

        let mut reply = [0u8; HANDSHAKE_RESPONSE_SIZE];
        stream.read_exact(&mut reply).await.map_err(lost)?;

        let offered = handshake::describe(&config.proposals);
        let version = BoltVersion::from_reply(reply)
            .ok_or_else(|| DriverError::UnsupportedVersion { offered: offered.clone() })?;
        if !config.proposals.iter().any(|p| p.contains(version)) {
            return Err(DriverError::protocol(
                Phase::Handshake,
                None,
                format!("server chose {} which was not offered ({})", version, offered),
            ));
        }
        debug!(version = %version, "handshake complete");
        Ok(version)
    }

    async fn authenticate(&mut self, config: &ConnectionConfig) -> DriverResult<()> {
        let mut hello = Hello::new(&config.user_agent);
        if let Some(routing) = &config.routing {
            hello = hello.with_routing(routing.clone());
        }
        let auth = config.auth.to_extra();
        let separate_logon = self.version.separates_auth();
        if !separate_logon {
            hello = hello.with_auth(auth.clone());
        }

        self.send(Request::Hello(hello)).await?;
        let meta = self.fetch_summary().await?;
        self.server = ServerInfo {
            agent: meta.server().map(str::to_owned),
            connection_id: meta.connection_id().map(str::to_owned),
        };

        if separate_logon {
            self.send(Request::Logon(auth)).await?;
            self.fetch_summary().await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    fn ensure_open(&self) -> DriverResult<()> {
        match self.state {
            ConnectionState::Ready | ConnectionState::Failed => Ok(()),
            ConnectionState::Defunct => Err(DriverError::invalid_state("connection is defunct")),
            ConnectionState::Closed => Err(DriverError::invalid_state("connection is closed")),
        }
    }

    /// 요청을 버퍼에 쌓는다. `flush` 전까지는 보내지 않음.
    pub fn queue(&mut self, request: Request) -> DriverResult<()> {
        self.ensure_open()?;
        let phase = phase_of(&request);
        let name = request.name();
        if let Err(e) = self.codec.encode_ref(&request, &mut self.write_buffer) {
            return Err(DriverError::from_codec(phase, self.last_sent, e));
        }
        if request.expects_response() {
            self.pending.push_back(phase);
        }
        self.last_sent = Some(name);
        debug!(message = name, pending = self.pending.len(), "C: queued");
        Ok(())
    }

    /// 쌓인 요청을 한 번에 전송
    ///
    /// 쓰는 동안은 폐기 상태로 둔다. 중간에 취소되면 메시지가 반쯤 나간
    /// 스트림이 남으므로 연결을 다시 쓰면 안 된다.
    pub async fn flush(&mut self) -> DriverResult<()> {
        if self.write_buffer.is_empty() {
            return Ok(());
        }
        let phase = self.pending.back().copied().unwrap_or(Phase::Goodbye);
        let previous = std::mem::replace(&mut self.state, ConnectionState::Defunct);
        let result = match self.stream.write_all(&self.write_buffer).await {
            Ok(()) => self.stream.flush().await,
            Err(e) => Err(e),
        };
        self.write_buffer.clear();
        match result {
            Ok(()) => {
                self.state = previous;
                Ok(())
            }
            Err(source) => Err(DriverError::ConnectionLost { phase, last_sent: self.last_sent, source }),
        }
    }

    /// 요청 하나를 즉시 전송
    pub async fn send(&mut self, request: Request) -> DriverResult<()> {
        self.queue(request)?;
        self.flush().await
    }

    // ------------------------------------------------------------------------
    // Receiving
    // ------------------------------------------------------------------------

    /// 다음 응답. 요청 타임아웃이 지나면 연결은 폐기된다.
    pub async fn receive(&mut self) -> DriverResult<Response> {
        self.receive_tagged().await.map(|(_, response)| response)
    }

    /// 응답과 그 응답이 속한 요청 단계
    pub(crate) async fn receive_tagged(&mut self) -> DriverResult<(Phase, Response)> {
        self.ensure_open()?;
        let phase = self.pending.front().copied().ok_or_else(|| {
            DriverError::invalid_state("receive called with no outstanding request")
        })?;

        let result = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.read_message(phase)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(phase = %phase, ?limit, "request timed out, abandoning connection");
                    self.state = ConnectionState::Defunct;
                    return Err(DriverError::Timeout { phase, after: limit });
                }
            },
            None => self.read_message(phase).await,
        };

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                self.state = ConnectionState::Defunct;
                return Err(err);
            }
        };

        self.last_used = Instant::now();
        debug!(phase = %phase, message = response.name(), "S: received");
        if response.is_summary() {
            self.pending.pop_front();
        }
        if let Response::Failure(failure) = &response {
            warn!(phase = %phase, code = %failure.code, "server reported failure");
            self.state = ConnectionState::Failed;
        }
        Ok((phase, response))
    }

    async fn read_message(&mut self, phase: Phase) -> DriverResult<Response> {
        loop {
            match self.codec.decode(&mut self.read_buffer) {
                Ok(Some(response)) => return Ok(response),
                Ok(None) => {}
                Err(e) => return Err(DriverError::from_codec(phase, self.last_sent, e)),
            }

            let n = match self.stream.read_buf(&mut self.read_buffer).await {
                Ok(n) => n,
                Err(source) => {
                    return Err(DriverError::ConnectionLost { phase, last_sent: self.last_sent, source })
                }
            };
            if n == 0 {
                return match self.codec.decode_eof(&mut self.read_buffer) {
                    Ok(Some(response)) => Ok(response),
                    Ok(None) => Err(DriverError::ConnectionLost {
                        phase,
                        last_sent: self.last_sent,
                        source: io::Error::new(io::ErrorKind::UnexpectedEof, "server closed the connection"),
                    }),
                    Err(e) => Err(DriverError::from_codec(phase, self.last_sent, e)),
                };
            }
        }
    }

    /// 다음 요약 응답. SUCCESS가 아니면 에러로 변환.
    pub async fn fetch_summary(&mut self) -> DriverResult<Success> {
        let (phase, response) = self.receive_tagged().await?;
        expect_success(phase, self.last_sent, response)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// RESET을 보내고 이전에 파이프라인된 응답을 모두 버린 뒤 Ready로 복귀
    pub async fn reset(&mut self) -> DriverResult<()> {
        let discarded = self.pending.len();
        self.send(Request::Reset).await?;
        loop {
            let (phase, response) = self.receive_tagged().await?;
            if phase == Phase::Reset && response.is_summary() && self.pending.is_empty() {
                return match response {
                    Response::Success(_) => {
                        self.state = ConnectionState::Ready;
                        debug!(discarded, "connection reset");
                        Ok(())
                    }
                    Response::Failure(failure) => {
                        self.state = ConnectionState::Defunct;
                        Err(DriverError::from_failure(Phase::Reset, failure.code, failure.message))
                    }
                    other => {
                        self.state = ConnectionState::Defunct;
                        Err(DriverError::protocol(
                            Phase::Reset,
                            self.last_sent,
                            format!("unexpected {} in reply to RESET", other.name()),
                        ))
                    }
                };
            }
        }
    }

    /// RESET 왕복으로 연결 확인
    pub async fn check_liveness(&mut self, limit: Duration) -> DriverResult<()> {
        match tokio::time::timeout(limit, self.reset()).await {
            Ok(result) => result,
            Err(_) => {
                self.state = ConnectionState::Defunct;
                Err(DriverError::Timeout { phase: Phase::Reset, after: limit })
            }
        }
    }

    /// GOODBYE 후 스트림 종료. 에러는 무시.
    pub async fn close(&mut self) {
        if matches!(self.state, ConnectionState::Ready | ConnectionState::Failed) {
            if self.queue(Request::Goodbye).is_ok() {
                let _ = self.flush().await;
            }
            info!(connection_id = self.server.connection_id.as_deref().unwrap_or(""), "bolt connection closed");
        }
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        self.state = ConnectionState::Closed;
        let _ = self.stream.shutdown().await;
    }
}

impl<S> Connection<S> {
    /// 협상된 프로토콜 버전
    pub fn version(&self) -> BoltVersion {
        self.version
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn server(&self) -> &ServerInfo {
        &self.server
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn is_defunct(&self) -> bool {
        matches!(self.state, ConnectionState::Defunct | ConnectionState::Closed)
    }

    /// 아직 응답을 받지 않은 요청 수
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// 마지막으로 보낸 메시지 이름
    pub fn last_sent(&self) -> Option<&'static str> {
        self.last_sent
    }

    /// 마지막 응답 이후 경과 시간
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    pub(crate) fn mark_defunct(&mut self) {
        self.state = ConnectionState::Defunct;
    }
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("version", &self.version)
            .field("state", &self.state)
            .field("server", &self.server)
            .field("outstanding", &self.pending.len())
            .finish()
    }
}

/// 요약 응답을 SUCCESS로 변환. FAILURE는 단계에 따라 분류.
pub(crate) fn expect_success(
    phase: Phase,
    last_sent: Option<&'static str>,
    response: Response,
) -> DriverResult<Success> {
    match response {
        Response::Success(success) => Ok(success),
        Response::Failure(failure) => Err(DriverError::from_failure(phase, failure.code, failure.message)),
        Response::Ignored => Err(DriverError::invalid_state(format!(
            "{} was ignored: the server is in a failed state",
            phase
        ))),
        Response::Record(_) => Err(DriverError::protocol(phase, last_sent, "unexpected RECORD")),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::handshake::VersionRange;
    use crate::bolt::message::{Failure, StreamLimit};
    use crate::driver::config::AuthToken;
    use crate::driver::testkit::{FakeServer, Script};

    #[tokio::test]
    async fn test_handshake_and_hello_on_4_4() {
        let server = FakeServer::start(BoltVersion::V4_4, Script::default());
        let config = server.config_with(AuthToken::basic("neo4j", "pw"));
        let conn = Connection::establish(server.client_stream(), &config).await.unwrap();

        assert_eq!(conn.version(), BoltVersion::V4_4);
        assert!(conn.is_ready());
        assert_eq!(conn.server().agent.as_deref(), Some("Neo4j/5.13.0"));

        let requests = server.requests();
        match &requests[0] {
            Request::Hello(h) => {
                assert_eq!(h.extra.get("scheme").and_then(|v| v.as_str()), Some("basic"));
                assert_eq!(h.extra.get("principal").and_then(|v| v.as_str()), Some("neo4j"));
            }
            other => panic!("expected HELLO, got {:?}", other),
        }
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn test_logon_on_5_1_and_later() {
        let server = FakeServer::start(BoltVersion::new(5, 4), Script::default());
        let config = server.config_with(AuthToken::basic("neo4j", "pw"));
        Connection::establish(server.client_stream(), &config).await.unwrap();

        let requests = server.requests();
        match (&requests[0], &requests[1]) {
            (Request::Hello(h), Request::Logon(auth)) => {
                assert!(!h.extra.contains_key("scheme"));
                assert_eq!(auth.get("credentials").and_then(|v| v.as_str()), Some("pw"));
            }
            other => panic!("expected HELLO then LOGON, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_version() {
        let server = FakeServer::refusing();
        let err = Connection::establish(server.client_stream(), &server.config()).await.unwrap_err();
        match err {
            DriverError::UnsupportedVersion { offered } => assert!(offered.starts_with("5.4..5.0")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unoffered_version_is_protocol_error() {
        let server = FakeServer::start(BoltVersion::V4_4, Script::default());
        let config = ConnectionConfig::builder(Default::default())
            .with_proposals(vec![VersionRange::exact(5, 0)])
            .build()
            .unwrap();
        let err = Connection::establish(server.client_stream(), &config).await.unwrap_err();
        assert!(matches!(err, DriverError::Protocol { phase: Phase::Handshake, .. }));
    }

    #[tokio::test]
    async fn test_authentication_failure() {
        let script = Script::default().on_hello(|_| {
            vec![Response::Failure(Failure::new("Neo.ClientError.Security.Unauthorized", "bad credentials"))]
        });
        let server = FakeServer::start(BoltVersion::V4_4, script);
        let err = Connection::establish(server.client_stream(), &server.config()).await.unwrap_err();
        assert!(matches!(err, DriverError::Authentication { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_reset_drains_pipelined_responses() {
        let script = Script::default().on_run(|_| {
            vec![Response::Failure(Failure::new("Neo.ClientError.Statement.SyntaxError", "bad"))]
        });
        let server = FakeServer::start(BoltVersion::V4_4, script);
        let mut conn = Connection::establish(server.client_stream(), &server.config()).await.unwrap();

        conn.queue(Request::Run(crate::bolt::message::Run::new("RETURN", Default::default()))).unwrap();
        conn.queue(Request::Pull(StreamLimit::all())).unwrap();
        conn.flush().await.unwrap();
        assert_eq!(conn.outstanding(), 2);

        conn.reset().await.unwrap();
        assert!(conn.is_ready());
        assert_eq!(conn.outstanding(), 0);
        assert!(matches!(server.requests().last(), Some(Request::Reset)));
    }

    #[tokio::test]
    async fn test_server_disconnect_marks_defunct() {
        let server = FakeServer::start(BoltVersion::V4_4, Script::default().hang_up_on_run());
        let mut conn = Connection::establish(server.client_stream(), &server.config()).await.unwrap();
        conn.send(Request::Run(crate::bolt::message::Run::new("RETURN 1", Default::default())))
            .await
            .unwrap();
        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err, DriverError::ConnectionLost { phase: Phase::Run, last_sent: Some("RUN"), .. }));
        assert!(conn.is_defunct());
    }

    #[tokio::test]
    async fn test_request_timeout_is_fatal() {
        let server = FakeServer::start(BoltVersion::V4_4, Script::default().silent_on_run());
        let config = ConnectionConfig::builder(Default::default())
            .with_request_timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let mut conn = Connection::establish(server.client_stream(), &config).await.unwrap();
        conn.send(Request::Run(crate::bolt::message::Run::new("RETURN 1", Default::default())))
            .await
            .unwrap();
        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err, DriverError::Timeout { phase: Phase::Run, .. }));
        assert!(conn.is_defunct());
        assert!(conn.queue(Request::Reset).is_err());
    }

    #[tokio::test]
    async fn test_cancelled_flush_marks_defunct() {
        let server = FakeServer::start(BoltVersion::V4_4, Script::default().stall_on("BEGIN"));
        let mut conn = Connection::establish(server.client_stream(), &server.config()).await.unwrap();
        conn.send(Request::Begin(Default::default())).await.unwrap();
        server.wait_for(|reqs| matches!(reqs.last(), Some(Request::Begin(_)))).await;

        // 서버가 읽지 않으니 전송 버퍼보다 큰 메시지는 끝까지 쓰이지 않는다
        let text = format!("RETURN '{}'", "x".repeat(256 * 1024));
        conn.queue(Request::Run(crate::bolt::message::Run::new(text, Default::default()))).unwrap();
        let flushed = tokio::time::timeout(Duration::from_millis(50), conn.flush()).await;
        assert!(flushed.is_err());

        assert!(conn.is_defunct());
        assert!(conn.queue(Request::Reset).is_err());
        assert!(conn.reset().await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_response_is_protocol_error() {
        // 크기 0 구조체, 알 수 없는 시그니처 0x55
        let bytes = vec![0x00, 0x02, 0xB0, 0x55, 0x00, 0x00];
        let server = FakeServer::start(BoltVersion::V4_4, Script::default().raw_on("RUN", bytes));
        let mut conn = Connection::establish(server.client_stream(), &server.config()).await.unwrap();
        conn.send(Request::Run(crate::bolt::message::Run::new("RETURN 1", Default::default())))
            .await
            .unwrap();

        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err, DriverError::Protocol { phase: Phase::Run, last_sent: Some("RUN"), .. }));
        assert!(err.is_fatal());
        assert!(conn.is_defunct());
        assert!(conn.queue(Request::Reset).is_err());
    }

    #[tokio::test]
    async fn test_close_sends_goodbye() {
        let server = FakeServer::start(BoltVersion::V4_4, Script::default());
        let mut conn = Connection::establish(server.client_stream(), &server.config()).await.unwrap();
        assert!(conn.check_liveness(Duration::from_secs(1)).await.is_ok());
        conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Closed);
        server.wait_for(|reqs| matches!(reqs.last(), Some(Request::Goodbye))).await;
    }
}
