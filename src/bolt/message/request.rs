//! Client requests.

use std::collections::HashMap;
use std::time::Duration;

use super::signature;
use crate::bolt::packstream::{PackStreamError, PackStreamStructure, PackStreamValue};

type Extra = HashMap<String, PackStreamValue>;

/// Every request the engine sends.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Hello(Hello),
    /// Authentication for Bolt 5.1+, carried separately from HELLO.
    Logon(Extra),
    Logoff,
    Goodbye,
    Reset,
    Run(Run),
    Begin(Begin),
    Commit,
    Rollback,
    Pull(StreamLimit),
    Discard(StreamLimit),
}

impl Request {
    pub fn signature(&self) -> u8 {
        match self {
            Request::Hello(_) => signature::HELLO,
            Request::Logon(_) => signature::LOGON,
            Request::Logoff => signature::LOGOFF,
            Request::Goodbye => signature::GOODBYE,
            Request::Reset => signature::RESET,
            Request::Run(_) => signature::RUN,
            Request::Begin(_) => signature::BEGIN,
            Request::Commit => signature::COMMIT,
            Request::Rollback => signature::ROLLBACK,
            Request::Pull(_) => signature::PULL,
            Request::Discard(_) => signature::DISCARD,
        }
    }

    /// Message name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Hello(_) => "HELLO",
            Request::Logon(_) => "LOGON",
            Request::Logoff => "LOGOFF",
            Request::Goodbye => "GOODBYE",
            Request::Reset => "RESET",
            Request::Run(_) => "RUN",
            Request::Begin(_) => "BEGIN",
            Request::Commit => "COMMIT",
            Request::Rollback => "ROLLBACK",
            Request::Pull(_) => "PULL",
            Request::Discard(_) => "DISCARD",
        }
    }

    /// Whether the server answers this request. GOODBYE is fire-and-forget.
    pub fn expects_response(&self) -> bool {
        !matches!(self, Request::Goodbye)
    }

    pub fn to_structure(&self) -> PackStreamStructure {
        let fields = match self {
            Request::Hello(hello) => vec![PackStreamValue::Map(hello.extra.clone())],
            Request::Logon(auth) => vec![PackStreamValue::Map(auth.clone())],
            Request::Run(run) => vec![
                PackStreamValue::String(run.query.clone()),
                PackStreamValue::Map(run.parameters.clone()),
                PackStreamValue::Map(run.extra.clone()),
            ],
            Request::Begin(begin) => vec![PackStreamValue::Map(begin.extra.clone())],
            Request::Pull(limit) | Request::Discard(limit) => vec![limit.to_value()],
            Request::Logoff
            | Request::Goodbye
            | Request::Reset
            | Request::Commit
            | Request::Rollback => Vec::new(),
        };
        PackStreamStructure::new(self.signature(), fields)
    }

    /// Parses a request; used by server-side codecs.
    pub fn from_structure(s: &PackStreamStructure) -> Result<Self, PackStreamError> {
        let request = match s.tag {
            signature::HELLO => {
                s.expect_fields("HELLO", 1, 1)?;
                Request::Hello(Hello { extra: s.map_field(0, "HELLO")?.clone() })
            }
            signature::LOGON => {
                s.expect_fields("LOGON", 1, 1)?;
                Request::Logon(s.map_field(0, "LOGON")?.clone())
            }
            signature::RUN => {
                s.expect_fields("RUN", 2, 3)?;
                Request::Run(Run {
                    query: s.str_field(0, "RUN")?.to_owned(),
                    parameters: s.map_field(1, "RUN")?.clone(),
                    extra: s.field(2).as_map().cloned().unwrap_or_default(),
                })
            }
            signature::BEGIN => {
                s.expect_fields("BEGIN", 0, 1)?;
                Request::Begin(Begin { extra: s.field(0).as_map().cloned().unwrap_or_default() })
            }
            signature::PULL => Request::Pull(StreamLimit::from_structure(s, "PULL")?),
            signature::DISCARD => Request::Discard(StreamLimit::from_structure(s, "DISCARD")?),
            signature::LOGOFF => Request::Logoff,
            signature::GOODBYE => Request::Goodbye,
            signature::RESET => Request::Reset,
            signature::COMMIT => Request::Commit,
            signature::ROLLBACK => Request::Rollback,
            other => {
                return Err(PackStreamError::InvalidStructure(format!(
                    "unknown request signature 0x{:02X}",
                    other
                )))
            }
        };
        Ok(request)
    }
}

/// HELLO: user agent, and before Bolt 5.1 the auth token.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Hello {
    pub extra: Extra,
}

impl Hello {
    pub fn new(user_agent: &str) -> Self {
        let mut extra = Extra::new();
        extra.insert("user_agent".into(), user_agent.into());
        Self { extra }
    }

    /// Merges auth entries (`scheme`, `principal`, ...) into the extra map.
    pub fn with_auth(mut self, auth: Extra) -> Self {
        self.extra.extend(auth);
        self
    }

    /// Routing context; presence tells the server the client is cluster-aware.
    pub fn with_routing(mut self, context: HashMap<String, String>) -> Self {
        let map = context.into_iter().map(|(k, v)| (k, v.into())).collect();
        self.extra.insert("routing".into(), PackStreamValue::Map(map));
        self
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.extra.get("user_agent").and_then(PackStreamValue::as_str)
    }
}

/// RUN: statement text, parameters and transaction-independent extras.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Run {
    pub query: String,
    pub parameters: Extra,
    pub extra: Extra,
}

impl Run {
    pub fn new(query: impl Into<String>, parameters: Extra) -> Self {
        Self { query: query.into(), parameters, extra: Extra::new() }
    }
}

/// BEGIN extras.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Begin {
    pub extra: Extra,
}

impl Begin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Omitted entirely when empty.
    pub fn with_bookmarks<I, S>(mut self, bookmarks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list: Vec<PackStreamValue> = bookmarks
            .into_iter()
            .map(|b| PackStreamValue::String(b.into()))
            .collect();
        if !list.is_empty() {
            self.extra.insert("bookmarks".into(), PackStreamValue::List(list));
        }
        self
    }

    /// Only read mode goes on the wire; write is the server default.
    pub fn with_read_mode(mut self, read: bool) -> Self {
        if read {
            self.extra.insert("mode".into(), "r".into());
        }
        self
    }

    pub fn with_database(mut self, db: &str) -> Self {
        self.extra.insert("db".into(), db.into());
        self
    }

    /// Whole milliseconds; sub-millisecond remainders are dropped.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.extra
            .insert("tx_timeout".into(), PackStreamValue::Integer(timeout.as_millis() as i64));
        self
    }

    pub fn with_metadata(mut self, metadata: Extra) -> Self {
        if !metadata.is_empty() {
            self.extra.insert("tx_metadata".into(), PackStreamValue::Map(metadata));
        }
        self
    }

    pub fn with_impersonated_user(mut self, user: &str) -> Self {
        self.extra.insert("imp_user".into(), user.into());
        self
    }

    pub fn bookmarks(&self) -> Vec<String> {
        self.extra.get("bookmarks").map(PackStreamValue::to_string_list).unwrap_or_default()
    }

    pub fn is_read(&self) -> bool {
        self.extra.get("mode").and_then(PackStreamValue::as_str) == Some("r")
    }

    pub fn database(&self) -> Option<&str> {
        self.extra.get("db").and_then(PackStreamValue::as_str)
    }
}

/// `{n, qid}` argument of PULL and DISCARD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimit {
    /// Record count, `-1` for all.
    pub n: i64,
    /// Statement id inside an explicit transaction, `-1` for the last one.
    pub qid: i64,
}

impl StreamLimit {
    pub const ALL: i64 = -1;
    pub const LAST_QUERY: i64 = -1;

    pub fn all() -> Self {
        Self { n: Self::ALL, qid: Self::LAST_QUERY }
    }

    pub fn new(n: i64, qid: Option<i64>) -> Self {
        Self { n, qid: qid.unwrap_or(Self::LAST_QUERY) }
    }

    fn to_value(self) -> PackStreamValue {
        let mut extra = Extra::new();
        extra.insert("n".into(), PackStreamValue::Integer(self.n));
        if self.qid != Self::LAST_QUERY {
            extra.insert("qid".into(), PackStreamValue::Integer(self.qid));
        }
        PackStreamValue::Map(extra)
    }

    fn from_structure(s: &PackStreamStructure, what: &str) -> Result<Self, PackStreamError> {
        s.expect_fields(what, 1, 1)?;
        let extra = s.map_field(0, what)?;
        let n = extra
            .get("n")
            .and_then(PackStreamValue::as_int)
            .ok_or_else(|| PackStreamError::InvalidStructure(format!("{} without n", what)))?;
        let qid = extra.get("qid").and_then(PackStreamValue::as_int);
        Ok(Self::new(n, qid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_extra_layout() {
        let begin = Begin::new()
            .with_bookmarks(vec!["bm:1", "bm:2"])
            .with_read_mode(true)
            .with_database("movies")
            .with_timeout(Duration::from_millis(1500));

        assert_eq!(begin.bookmarks(), vec!["bm:1".to_string(), "bm:2".to_string()]);
        assert!(begin.is_read());
        assert_eq!(begin.database(), Some("movies"));
        assert_eq!(begin.extra.get("tx_timeout"), Some(&PackStreamValue::Integer(1500)));
    }

    #[test]
    fn test_write_mode_and_empty_bookmarks_are_omitted() {
        let begin = Begin::new().with_bookmarks(Vec::<String>::new()).with_read_mode(false);
        assert!(begin.extra.is_empty());
    }

    #[test]
    fn test_pull_omits_default_qid() {
        let s = Request::Pull(StreamLimit::new(100, None)).to_structure();
        let extra = s.fields[0].as_map().unwrap();
        assert_eq!(extra.get("n"), Some(&PackStreamValue::Integer(100)));
        assert!(!extra.contains_key("qid"));

        let s = Request::Discard(StreamLimit::new(-1, Some(3))).to_structure();
        let parsed = Request::from_structure(&s).unwrap();
        assert_eq!(parsed, Request::Discard(StreamLimit { n: -1, qid: 3 }));
    }

    #[test]
    fn test_structure_round_trip() {
        let mut params = Extra::new();
        params.insert("name".into(), "Ada".into());
        let requests = vec![
            Request::Hello(Hello::new("agent/1.0")),
            Request::Run(Run::new("RETURN $name", params)),
            Request::Begin(Begin::new().with_database("neo4j")),
            Request::Commit,
            Request::Rollback,
            Request::Reset,
            Request::Goodbye,
        ];
        for request in requests {
            let parsed = Request::from_structure(&request.to_structure()).unwrap();
            assert_eq!(parsed, request);
        }
    }

    #[test]
    fn test_unknown_signature_is_rejected() {
        let s = PackStreamStructure::empty(0x55);
        assert!(Request::from_structure(&s).is_err());
    }

    #[test]
    fn test_hello_carries_agent_and_routing() {
        let mut routing = HashMap::new();
        routing.insert("address".to_string(), "db:7687".to_string());
        let hello = Hello::new("agent/1.0").with_routing(routing);
        assert_eq!(hello.user_agent(), Some("agent/1.0"));
        assert!(hello.extra.contains_key("routing"));
    }
}
