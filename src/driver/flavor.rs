//! Flavors
//!
//! 서버 계열별 차이 (스킴, 포트, 버전 제안, 멀티 DB)와 URL 해석.
//!
//! ```text
//! jdbc:<flavor>:<scheme>://host[:port][/database][?key=value&...]
//! <scheme>://host[:port][/database][?key=value&...]
//! ```
//!
//! 쿼리 구분자는 `&`, `,`, `;` 모두 허용한다. 값 없는 키는 `true`로 본다.

use std::collections::HashMap;

use crate::bolt::handshake::VersionRange;

use super::config::{
    AccessMode, AuthToken, ConnectionConfig, ServerAddress, SessionConfig, DEFAULT_FETCH_SIZE,
    DEFAULT_PORT,
};
use super::error::{DriverError, DriverResult};

const JDBC_PREFIX: &str = "jdbc:";

// ============================================================================
// Flavor - 서버 계열 설정
// ============================================================================

/// 서버 계열 설정
#[derive(Debug, Clone, PartialEq)]
pub struct Flavor {
    /// 이름 (`jdbc:<name>:` 부분)
    pub name: String,
    /// 허용 스킴
    pub schemes: Vec<String>,
    /// 기본 포트
    pub default_port: u16,
    /// 핸드셰이크 버전 제안
    pub proposals: Vec<VersionRange>,
    /// BEGIN에 `db`를 보낼지
    pub multi_database: bool,
    /// User Agent
    pub user_agent: String,
}

impl Flavor {
    /// 범용 Bolt 서버
    pub fn bolt() -> Self {
        Self {
            name: "bolt".into(),
            schemes: vec!["bolt".into()],
            default_port: DEFAULT_PORT,
            proposals: ConnectionConfig::default().proposals,
            multi_database: true,
            user_agent: ConnectionConfig::default().user_agent,
        }
    }

    /// Neo4j. `neo4j://` 스킴은 HELLO에 라우팅 컨텍스트를 보낸다.
    pub fn neo4j() -> Self {
        Self {
            name: "neo4j".into(),
            schemes: vec!["bolt".into(), "neo4j".into()],
            ..Self::bolt()
        }
    }

    /// Memgraph. 5.2까지만 제안하고 `db`는 보내지 않는다.
    pub fn memgraph() -> Self {
        Self {
            name: "memgraph".into(),
            schemes: vec!["bolt".into(), "memgraph".into()],
            proposals: vec![
                VersionRange::down_to(5, 2, 2),
                VersionRange::exact(4, 1),
                VersionRange::exact(4, 0),
            ],
            multi_database: false,
            ..Self::bolt()
        }
    }

    pub fn accepts_scheme(&self, scheme: &str) -> bool {
        self.schemes.iter().any(|s| s == scheme)
    }
}

// ============================================================================
// FlavorRegistry - 계열 레지스트리
// ============================================================================

/// 계열 레지스트리. 전역 상태 없이 명시적으로 넘긴다.
#[derive(Debug, Clone, Default)]
pub struct FlavorRegistry {
    flavors: Vec<Flavor>,
}

impl FlavorRegistry {
    /// 빈 레지스트리
    pub fn new() -> Self {
        Self::default()
    }

    /// 기본 계열 (bolt, neo4j, memgraph)
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Flavor::bolt());
        registry.register(Flavor::neo4j());
        registry.register(Flavor::memgraph());
        registry
    }

    /// 등록. 같은 이름은 교체.
    pub fn register(&mut self, flavor: Flavor) {
        match self.flavors.iter_mut().find(|f| f.name == flavor.name) {
            Some(existing) => *existing = flavor,
            None => self.flavors.push(flavor),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Flavor> {
        self.flavors.iter().find(|f| f.name == name)
    }

    /// URL 해석
    pub fn resolve(&self, url: &str) -> DriverResult<ResolvedUrl> {
        let (flavor_name, rest) = match url.strip_prefix(JDBC_PREFIX) {
            Some(tail) => {
                let (name, rest) = tail
                    .split_once(':')
                    .ok_or_else(|| DriverError::configuration(format!("malformed URL: {}", url)))?;
                (Some(name), rest)
            }
            None => (None, url),
        };

        let (scheme, rest) = rest
            .split_once("://")
            .ok_or_else(|| DriverError::configuration(format!("URL without scheme: {}", url)))?;
        if scheme.contains('+') {
            return Err(DriverError::configuration(format!(
                "scheme '{}' requires TLS; supply an encrypted stream to Connection::establish instead",
                scheme
            )));
        }

        let flavor = match flavor_name {
            Some(name) => {
                let flavor = self
                    .get(name)
                    .ok_or_else(|| DriverError::configuration(format!("unknown flavor: {}", name)))?;
                if !flavor.accepts_scheme(scheme) {
                    return Err(DriverError::configuration(format!(
                        "flavor '{}' does not accept scheme '{}'",
                        name, scheme
                    )));
                }
                flavor
            }
            None => self
                .flavors
                .iter()
                .find(|f| f.accepts_scheme(scheme))
                .ok_or_else(|| DriverError::configuration(format!("no flavor accepts scheme '{}'", scheme)))?,
        };

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };
        let (authority, path) = match location.split_once('/') {
            Some((authority, path)) => (authority, Some(path)),
            None => (location, None),
        };

        let address = ServerAddress::parse(authority, flavor.default_port)?;
        let properties = match query {
            Some(q) => parse_properties(q)?,
            None => HashMap::new(),
        };
        let database = properties
            .get("database")
            .cloned()
            .or_else(|| path.map(str::to_owned))
            .map(|db| db.trim().to_owned())
            .filter(|db| !db.is_empty());

        Ok(ResolvedUrl {
            flavor: flavor.clone(),
            scheme: scheme.to_owned(),
            address,
            database,
            properties,
        })
    }
}

/// 쿼리 문자열 파싱. 키는 소문자로 정규화.
fn parse_properties(query: &str) -> DriverResult<HashMap<String, String>> {
    let mut properties = HashMap::new();
    for pair in query.split(['&', ',', ';']).filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, "true"));
        properties.insert(percent_decode(key)?.to_ascii_lowercase(), percent_decode(value)?);
    }
    Ok(properties)
}

fn percent_decode(input: &str) -> DriverResult<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| DriverError::configuration(format!("bad escape in '{}'", input)))?;
                out.push(hex);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| DriverError::configuration(format!("non UTF-8 value in '{}'", input)))
}

// ============================================================================
// ResolvedUrl - 해석된 URL
// ============================================================================

/// 해석된 URL
#[derive(Debug, Clone)]
pub struct ResolvedUrl {
    pub flavor: Flavor,
    pub scheme: String,
    pub address: ServerAddress,
    pub database: Option<String>,
    /// 소문자 키의 URL 속성
    pub properties: HashMap<String, String>,
}

impl ResolvedUrl {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// 속성 추가 (URL 값보다 우선)
    pub fn with_property(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.insert(key.to_ascii_lowercase(), value.into());
        self
    }

    fn flag(&self, key: &str, default: bool) -> DriverResult<bool> {
        match self.property(key) {
            None => Ok(default),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => Err(DriverError::configuration(format!("{} must be true or false, got '{}'", key, v))),
        }
    }

    pub fn read_only(&self) -> DriverResult<bool> {
        self.flag("readonly", false)
    }

    pub fn auto_commit(&self) -> DriverResult<bool> {
        self.flag("autocommit", true)
    }

    pub fn use_bookmarks(&self) -> DriverResult<bool> {
        self.flag("usebookmarks", true)
    }

    /// 호출 로깅 데코레이터 사용 여부
    pub fn debug(&self) -> DriverResult<bool> {
        self.flag("debug", false)
    }

    pub fn fetch_size(&self) -> DriverResult<i64> {
        match self.property("fetchsize") {
            None => Ok(DEFAULT_FETCH_SIZE),
            Some(v) => v
                .parse()
                .map_err(|_| DriverError::configuration(format!("invalid fetchsize: {}", v))),
        }
    }

    /// `user`/`password` 속성에서 만든 인증 토큰. 명시적 토큰이 우선.
    pub fn auth(&self) -> AuthToken {
        match self.property("user") {
            Some(user) => AuthToken::basic(user, self.property("password").unwrap_or_default()),
            None => AuthToken::None,
        }
    }

    /// 연결 설정
    pub fn connection_config(&self, auth: Option<AuthToken>) -> DriverResult<ConnectionConfig> {
        let mut builder = ConnectionConfig::builder(self.address.clone())
            .with_auth(auth.unwrap_or_else(|| self.auth()))
            .with_user_agent(self.flavor.user_agent.clone())
            .with_proposals(self.flavor.proposals.clone());
        if self.scheme == "neo4j" {
            let mut routing = HashMap::new();
            routing.insert("address".to_string(), self.address.to_string());
            builder = builder.with_routing(routing);
        }
        builder.build()
    }

    /// 세션 설정. 멀티 DB를 지원하지 않는 계열은 데이터베이스를 무시.
    pub fn session_config(&self) -> DriverResult<SessionConfig> {
        let mut builder = SessionConfig::builder()
            .with_access_mode(if self.read_only()? { AccessMode::Read } else { AccessMode::Write })
            .with_fetch_size(self.fetch_size()?)
            .with_bookmarks_enabled(self.use_bookmarks()?);
        if let (true, Some(db)) = (self.flavor.multi_database, &self.database) {
            builder = builder.with_database(db.clone());
        }
        builder.build()
    }
}

// ============================================================================
// Tests
// ============================================================================
