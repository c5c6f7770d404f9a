//! 테스트용 가짜 Bolt 서버
//!
//! `tokio::io::duplex` 위에서 서버 코덱으로 요청을 읽고, 스크립트대로 응답한다.
//! FAILURE 이후에는 실제 서버처럼 RESET 전까지 모든 요청을 IGNORED로 답하고,
//! 받은 요청은 모두 기록한다.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::codec::Framed;

use crate::bolt::codec::ServerCodec;
use crate::bolt::handshake::{self, BoltVersion, HANDSHAKE_SIZE};
use crate::bolt::message::{Failure, Request, Response, Success};
use crate::bolt::packstream::PackStreamValue;

use super::config::{AuthToken, ConnectionConfig};

type Handler = Box<dyn FnMut(&Request) -> Vec<Response> + Send>;

enum Action {
    Reply(Vec<Response>),
    HangUp,
    Silent,
    /// 읽기를 멈추고 연결만 붙잡아 둔다
    Stall,
    /// 코덱을 거치지 않은 바이트
    Raw(Vec<u8>),
}

// ============================================================================
// Script - 응답 스크립트
// ============================================================================

/// 요청 이름별 응답 스크립트. 지정하지 않은 요청은 기본 SUCCESS.
#[derive(Default)]
pub struct Script {
    handlers: HashMap<&'static str, Handler>,
    hang_up_on: Option<&'static str>,
    silent_on: Option<&'static str>,
    stall_on: Option<&'static str>,
    raw: HashMap<&'static str, Vec<u8>>,
    commits: u64,
}

impl Script {
    /// 요청 이름(`"RUN"`, `"PULL"`, ...)에 대한 핸들러
    pub fn on<F>(mut self, name: &'static str, handler: F) -> Self
    where
        F: FnMut(&Request) -> Vec<Response> + Send + 'static,
    {
        self.handlers.insert(name, Box::new(handler));
        self
    }

    pub fn on_hello<F>(self, handler: F) -> Self
    where
        F: FnMut(&Request) -> Vec<Response> + Send + 'static,
    {
        self.on("HELLO", handler)
    }

    pub fn on_run<F>(self, handler: F) -> Self
    where
        F: FnMut(&Request) -> Vec<Response> + Send + 'static,
    {
        self.on("RUN", handler)
    }

    pub fn on_pull<F>(self, handler: F) -> Self
    where
        F: FnMut(&Request) -> Vec<Response> + Send + 'static,
    {
        self.on("PULL", handler)
    }

    pub fn on_commit<F>(self, handler: F) -> Self
    where
        F: FnMut(&Request) -> Vec<Response> + Send + 'static,
    {
        self.on("COMMIT", handler)
    }

    /// RUN을 받으면 연결을 끊는다
    pub fn hang_up_on_run(mut self) -> Self {
        self.hang_up_on = Some("RUN");
        self
    }

    /// RUN에 응답하지 않는다
    pub fn silent_on_run(mut self) -> Self {
        self.silent_on = Some("RUN");
        self
    }

    /// 이 요청을 받은 뒤로는 더 읽지 않는다. 클라이언트 쓰기가 막힌다.
    pub fn stall_on(mut self, name: &'static str) -> Self {
        self.stall_on = Some(name);
        self
    }

    /// 이 요청에 주어진 바이트를 그대로 보낸다
    pub fn raw_on(mut self, name: &'static str, bytes: Vec<u8>) -> Self {
        self.raw.insert(name, bytes);
        self
    }

    /// 모든 RUN이 같은 결과를 돌려준다. PULL `n`만큼 레코드를 나눠 보내고,
    /// DISCARD는 남은 레코드를 버린다.
    pub fn results(self, fields: &[&str], rows: Vec<Vec<PackStreamValue>>) -> Self {
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let stream: Arc<Mutex<VecDeque<Vec<PackStreamValue>>>> = Arc::default();
        let (on_run, on_pull, on_discard) = (stream.clone(), stream.clone(), stream);
        self.on_run(move |_| {
            *on_run.lock() = rows.iter().cloned().collect();
            vec![Response::Success(Success::new().with("fields", fields.clone()).with("t_first", 1i64))]
        })
        .on_pull(move |request| {
            let n = match request {
                Request::Pull(limit) if limit.n >= 0 => limit.n as usize,
                _ => usize::MAX,
            };
            let mut remaining = on_pull.lock();
            let take = n.min(remaining.len());
            let mut out: Vec<Response> = remaining.drain(..take).map(Response::Record).collect();
            out.push(Response::Success(
                Success::new().with("has_more", !remaining.is_empty()).with("type", "r").with("t_last", 2i64),
            ));
            out
        })
        .on("DISCARD", move |_| {
            on_discard.lock().clear();
            vec![Response::Success(Success::new().with("has_more", false).with("type", "r"))]
        })
    }

    fn respond(&mut self, request: &Request, failed: bool) -> Action {
        if matches!(request, Request::Goodbye) {
            return Action::HangUp;
        }
        if failed && !matches!(request, Request::Reset) {
            return Action::Reply(vec![Response::Ignored]);
        }
        let name = request.name();
        if self.hang_up_on == Some(name) {
            return Action::HangUp;
        }
        if self.silent_on == Some(name) {
            return Action::Silent;
        }
        if self.stall_on == Some(name) {
            return Action::Stall;
        }
        if let Some(bytes) = self.raw.get(name) {
            return Action::Raw(bytes.clone());
        }
        if let Some(handler) = self.handlers.get_mut(name) {
            return Action::Reply(handler(request));
        }
        Action::Reply(vec![self.default_reply(request)])
    }

    fn default_reply(&mut self, request: &Request) -> Response {
        let success = match request {
            Request::Hello(_) => Success::new()
                .with("server", "Neo4j/5.13.0")
                .with("connection_id", "bolt-1"),
            Request::Run(_) => Success::new().with("fields", Vec::<String>::new()).with("t_first", 0i64),
            Request::Pull(_) | Request::Discard(_) => Success::new().with("has_more", false).with("type", "w"),
            Request::Commit => {
                self.commits += 1;
                Success::new().with("bookmark", format!("bm:{}", self.commits))
            }
            _ => Success::new(),
        };
        Response::Success(success)
    }
}

/// 스크립트 핸들러에서 쓰는 FAILURE 응답
pub fn failure(code: &str, message: &str) -> Response {
    Response::Failure(Failure::new(code, message))
}

// ============================================================================
// FakeServer - 가짜 서버
// ============================================================================

struct Shared {
    script: Mutex<Script>,
    requests: Mutex<Vec<Request>>,
}

/// 가짜 Bolt 서버. `client_stream()`마다 새 서버 측 연결을 띄운다.
#[derive(Clone)]
pub struct FakeServer {
    version: Option<BoltVersion>,
    shared: Arc<Shared>,
}

impl FakeServer {
    /// 주어진 버전으로 핸드셰이크에 응답하는 서버
    pub fn start(version: BoltVersion, script: Script) -> Self {
        Self::build(Some(version), script)
    }

    /// 어떤 버전도 받아들이지 않는 서버
    pub fn refusing() -> Self {
        Self::build(None, Script::default())
    }

    fn build(version: Option<BoltVersion>, script: Script) -> Self {
        Self {
            version,
            shared: Arc::new(Shared {
                script: Mutex::new(script),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// 클라이언트 쪽 스트림
    pub fn client_stream(&self) -> DuplexStream {
        let (client, server) = duplex(64 * 1024);
        tokio::spawn(serve(server, self.version, self.shared.clone()));
        client
    }

    /// 기본 연결 설정 (인증 없음)
    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig::default()
    }

    pub fn config_with(&self, auth: AuthToken) -> ConnectionConfig {
        ConnectionConfig { auth, ..ConnectionConfig::default() }
    }

    /// 지금까지 받은 요청
    pub fn requests(&self) -> Vec<Request> {
        self.shared.requests.lock().clone()
    }

    /// 받은 요청 중 이름이 같은 것의 개수
    pub fn count(&self, name: &str) -> usize {
        self.shared.requests.lock().iter().filter(|r| r.name() == name).count()
    }

    /// 조건이 맞을 때까지 대기 (최대 2초)
    pub async fn wait_for<F>(&self, predicate: F)
    where
        F: Fn(&[Request]) -> bool,
    {
        for _ in 0..400 {
            if predicate(&self.shared.requests.lock()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met; requests: {:?}", self.requests());
    }
}

async fn serve(mut io: DuplexStream, version: Option<BoltVersion>, shared: Arc<Shared>) {
    let mut preamble = [0u8; HANDSHAKE_SIZE];
    if io.read_exact(&mut preamble).await.is_err() || handshake::parse_preamble(&preamble).is_none() {
        return;
    }
    let reply = version.map(BoltVersion::to_reply).unwrap_or([0; 4]);
    if io.write_all(&reply).await.is_err() || version.is_none() {
        return;
    }

    let mut framed = Framed::new(io, ServerCodec::new());
    let mut failed = false;
    while let Some(Ok(request)) = framed.next().await {
        shared.requests.lock().push(request.clone());
        let action = shared.script.lock().respond(&request, failed);
        match action {
            Action::HangUp => return,
            Action::Silent => continue,
            Action::Stall => {
                std::future::pending::<()>().await;
                return;
            }
            Action::Raw(bytes) => {
                let io = framed.get_mut();
                if io.write_all(&bytes).await.is_err() || io.flush().await.is_err() {
                    return;
                }
            }
            Action::Reply(responses) => {
                if matches!(request, Request::Reset) {
                    failed = false;
                }
                for response in responses {
                    failed |= matches!(response, Response::Failure(_));
                    if framed.feed(response).await.is_err() {
                        return;
                    }
                }
                if framed.flush().await.is_err() {
                    return;
                }
            }
        }
    }
}
