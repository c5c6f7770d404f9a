//! Configuration
//!
//! 연결, 세션, 트랜잭션, 풀 설정

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::bolt::codec::DEFAULT_MAX_MESSAGE_SIZE;
use crate::bolt::handshake::VersionRange;
use crate::bolt::packstream::PackStreamValue;

use super::bookmark::Bookmarks;
use super::error::{DriverError, DriverResult};

/// 기본 Bolt 포트
pub const DEFAULT_PORT: u16 = 7687;

/// 기본 Fetch Size
pub const DEFAULT_FETCH_SIZE: i64 = 1000;

/// 전체 결과 요청 (`n = -1`)
pub const FETCH_ALL: i64 = -1;

fn default_user_agent() -> String {
    format!("bolt-session/{}", env!("CARGO_PKG_VERSION"))
}

// ============================================================================
// AuthToken - 인증 토큰
// ============================================================================

/// 인증 토큰
#[derive(Clone, Default)]
pub enum AuthToken {
    /// 인증 없음
    #[default]
    None,
    /// Basic 인증 (사용자명/비밀번호)
    Basic {
        username: String,
        password: String,
        realm: Option<String>,
    },
    /// Bearer 토큰
    Bearer { token: String },
    /// Kerberos 티켓 (base64)
    Kerberos { ticket: String },
    /// 커스텀 스킴
    Custom {
        scheme: String,
        principal: String,
        credentials: String,
        realm: Option<String>,
        parameters: HashMap<String, PackStreamValue>,
    },
}

impl AuthToken {
    /// Basic 인증 토큰 생성
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic { username: username.into(), password: password.into(), realm: None }
    }

    /// Basic 인증 토큰 생성 (realm 포함)
    pub fn basic_with_realm(
        username: impl Into<String>,
        password: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
            realm: Some(realm.into()),
        }
    }

    /// Bearer 토큰 생성
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer { token: token.into() }
    }

    /// Kerberos 토큰 생성
    pub fn kerberos(ticket: impl Into<String>) -> Self {
        Self::Kerberos { ticket: ticket.into() }
    }

    /// 인증 스킴
    pub fn scheme(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Basic { .. } => "basic",
            Self::Bearer { .. } => "bearer",
            Self::Kerberos { .. } => "kerberos",
            Self::Custom { scheme, .. } => scheme,
        }
    }

    /// HELLO/LOGON 인증 맵
    pub fn to_extra(&self) -> HashMap<String, PackStreamValue> {
        let mut map = HashMap::new();
        map.insert("scheme".to_string(), self.scheme().into());
        match self {
            Self::None => {}
            Self::Basic { username, password, realm } => {
                map.insert("principal".into(), username.as_str().into());
                map.insert("credentials".into(), password.as_str().into());
                if let Some(realm) = realm {
                    map.insert("realm".into(), realm.as_str().into());
                }
            }
            Self::Bearer { token } => {
                map.insert("credentials".into(), token.as_str().into());
            }
            Self::Kerberos { ticket } => {
                map.insert("principal".into(), "".into());
                map.insert("credentials".into(), ticket.as_str().into());
            }
            Self::Custom { principal, credentials, realm, parameters, .. } => {
                map.insert("principal".into(), principal.as_str().into());
                map.insert("credentials".into(), credentials.as_str().into());
                if let Some(realm) = realm {
                    map.insert("realm".into(), realm.as_str().into());
                }
                if !parameters.is_empty() {
                    map.insert("parameters".into(), PackStreamValue::Map(parameters.clone()));
                }
            }
        }
        map
    }
}

// 자격 증명은 로그에 남기지 않는다
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, realm, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("realm", realm)
                .finish_non_exhaustive(),
            other => write!(f, "AuthToken({})", other.scheme()),
        }
    }
}

// ============================================================================
// ServerAddress - 서버 주소
// ============================================================================

/// 서버 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
}

impl ServerAddress {
    /// 새 서버 주소 생성
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// `host[:port]` 파싱. IPv6는 `[::1]:7687` 형식.
    pub fn parse(authority: &str, default_port: u16) -> DriverResult<Self> {
        if authority.is_empty() {
            return Err(DriverError::configuration("missing host"));
        }
        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| DriverError::configuration(format!("bad IPv6 address: {}", authority)))?;
            (host, tail.strip_prefix(':'))
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };
        let port = match port {
            Some(p) => p
                .parse()
                .map_err(|_| DriverError::configuration(format!("invalid port: {}", p)))?,
            None => default_port,
        };
        if host.is_empty() {
            return Err(DriverError::configuration("missing host"));
        }
        Ok(Self::new(host, port))
    }

    /// 소켓 주소 문자열
    pub fn to_socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_socket_addr())
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

// ============================================================================
// ConnectionConfig - 연결 설정
// ============================================================================

/// 연결 설정
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// 서버 주소
    pub address: ServerAddress,
    /// 인증 토큰
    pub auth: AuthToken,
    /// User Agent
    pub user_agent: String,
    /// 라우팅 컨텍스트 (있으면 HELLO에 포함)
    pub routing: Option<HashMap<String, String>>,
    /// 연결 타임아웃
    pub connect_timeout: Duration,
    /// 요청별 응답 타임아웃
    pub request_timeout: Option<Duration>,
    /// 최대 메시지 크기
    pub max_message_size: usize,
    /// 핸드셰이크 버전 제안 (최대 4개)
    pub proposals: Vec<VersionRange>,
}

impl ConnectionConfig {
    /// 빌더 시작
    pub fn builder(address: ServerAddress) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            config: Self { address, ..Self::default() },
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: ServerAddress::default(),
            auth: AuthToken::None,
            user_agent: default_user_agent(),
            routing: None,
            connect_timeout: Duration::from_secs(30),
            request_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            proposals: vec![
                VersionRange::down_to(5, 4, 4),
                VersionRange::down_to(4, 4, 2),
                VersionRange::exact(4, 1),
                VersionRange::exact(4, 0),
            ],
        }
    }
}

/// 연결 설정 빌더
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// 인증 설정
    pub fn with_auth(mut self, auth: AuthToken) -> Self {
        self.config.auth = auth;
        self
    }

    /// User Agent 설정
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// 라우팅 컨텍스트 설정
    pub fn with_routing(mut self, context: HashMap<String, String>) -> Self {
        self.config.routing = Some(context);
        self
    }

    /// 연결 타임아웃 설정
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// 요청 타임아웃 설정
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// 최대 메시지 크기 설정
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// 버전 제안 설정
    pub fn with_proposals(mut self, proposals: Vec<VersionRange>) -> Self {
        self.config.proposals = proposals;
        self
    }

    /// 빌드. 제안이 없거나 4개를 넘으면 에러.
    pub fn build(self) -> DriverResult<ConnectionConfig> {
        let n = self.config.proposals.len();
        if n == 0 || n > 4 {
            return Err(DriverError::configuration(format!(
                "between 1 and 4 version proposals required, got {}",
                n
            )));
        }
        Ok(self.config)
    }
}

// ============================================================================
// AccessMode - 접근 모드
// ============================================================================

/// 접근 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// 읽기
    Read,
    /// 쓰기
    #[default]
    Write,
}

// ============================================================================
// SessionConfig - 세션 설정
// ============================================================================

/// 세션 설정
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 데이터베이스 이름
    pub database: Option<String>,
    /// 접근 모드
    pub access_mode: AccessMode,
    /// 초기 북마크
    pub bookmarks: Bookmarks,
    /// Fetch Size (`-1`이면 전체)
    pub fetch_size: i64,
    /// 북마크 송수신 여부
    pub use_bookmarks: bool,
    /// 임퍼소네이션 사용자
    pub impersonated_user: Option<String>,
}

impl SessionConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 시작
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            database: None,
            access_mode: AccessMode::Write,
            bookmarks: Bookmarks::new(),
            fetch_size: DEFAULT_FETCH_SIZE,
            use_bookmarks: true,
            impersonated_user: None,
        }
    }
}

/// 세션 설정 빌더
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// 데이터베이스 설정
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.config.database = Some(database.into());
        self
    }

    /// 접근 모드 설정
    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.config.access_mode = mode;
        self
    }

    /// 읽기 모드로 설정
    pub fn with_read_access(self) -> Self {
        self.with_access_mode(AccessMode::Read)
    }

    /// 북마크 설정
    pub fn with_bookmarks(mut self, bookmarks: Bookmarks) -> Self {
        self.config.bookmarks = bookmarks;
        self
    }

    /// Fetch Size 설정
    pub fn with_fetch_size(mut self, size: i64) -> Self {
        self.config.fetch_size = size;
        self
    }

    /// 북마크 사용 여부
    pub fn with_bookmarks_enabled(mut self, enabled: bool) -> Self {
        self.config.use_bookmarks = enabled;
        self
    }

    /// 임퍼소네이션 사용자 설정
    pub fn with_impersonated_user(mut self, user: impl Into<String>) -> Self {
        self.config.impersonated_user = Some(user.into());
        self
    }

    /// 빌드. fetch size는 양수 또는 -1.
    pub fn build(self) -> DriverResult<SessionConfig> {
        let n = self.config.fetch_size;
        if n == 0 || n < FETCH_ALL {
            return Err(DriverError::configuration(format!("invalid fetch size: {}", n)));
        }
        Ok(self.config)
    }
}

// ============================================================================
// TransactionConfig - 트랜잭션 설정
// ============================================================================

/// 트랜잭션 설정
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    /// 트랜잭션 타임아웃 (서버 측)
    pub timeout: Option<Duration>,
    /// 트랜잭션 메타데이터
    pub metadata: HashMap<String, PackStreamValue>,
}

impl TransactionConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 타임아웃 설정
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 메타데이터 추가
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<PackStreamValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// PoolConfig - 풀 설정
// ============================================================================

/// 연결 풀 설정
///
/// | 필드 | 기본값 | 설명 |
/// |------|--------|------|
/// | `max_idle` | 16 | 보관할 유휴 연결 수 |
/// | `liveness_check_after` | 없음 | 이보다 오래 쉰 연결은 RESET으로 확인 |
/// | `liveness_timeout` | 5초 | 확인 타임아웃 |
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 최대 유휴 연결 수
    pub max_idle: usize,
    /// 유휴 시간 임계값
    pub liveness_check_after: Option<Duration>,
    /// 확인 타임아웃
    pub liveness_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 16,
            liveness_check_after: None,
            liveness_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    /// 최대 유휴 연결 수 설정
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// 유휴 시간 임계값 설정
    pub fn with_liveness_check_after(mut self, idle: Duration) -> Self {
        self.liveness_check_after = Some(idle);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
