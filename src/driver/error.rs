//! Driver Error Types
//!
//! 드라이버 에러 정의. 서버 FAILURE 코드 분류 포함.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::bolt::codec::CodecError;

// ============================================================================
// Phase - 프로토콜 단계
// ============================================================================

/// 에러가 발생한 프로토콜 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Dial,
    Handshake,
    Hello,
    Logon,
    Begin,
    Run,
    Pull,
    Discard,
    Commit,
    Rollback,
    Reset,
    Goodbye,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Dial => "dial",
            Phase::Handshake => "handshake",
            Phase::Hello => "hello",
            Phase::Logon => "logon",
            Phase::Begin => "begin",
            Phase::Run => "run",
            Phase::Pull => "pull",
            Phase::Discard => "discard",
            Phase::Commit => "commit",
            Phase::Rollback => "rollback",
            Phase::Reset => "reset",
            Phase::Goodbye => "goodbye",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DriverError - 드라이버 에러
// ============================================================================

/// 드라이버 에러
#[derive(Error, Debug)]
pub enum DriverError {
    /// 프로토콜 위반 (연결 폐기)
    #[error("Protocol error during {phase} (last sent: {}): {detail}", .last_sent.unwrap_or("nothing"))]
    Protocol {
        phase: Phase,
        last_sent: Option<&'static str>,
        detail: String,
    },

    /// 인증 실패
    #[error("Authentication error: {code} - {message}")]
    Authentication { code: String, message: String },

    /// 소켓 I/O 실패 (연결 폐기)
    #[error("Connection lost during {phase} (last sent: {}): {source}", .last_sent.unwrap_or("nothing"))]
    ConnectionLost {
        phase: Phase,
        last_sent: Option<&'static str>,
        #[source]
        source: io::Error,
    },

    /// 재시도 가능한 서버 에러
    #[error("Transient error: {code} - {message}")]
    Transient { code: String, message: String },

    /// 상태 전이 위반
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 쿼리 실행 실패
    #[error("Query error: {code} - {message}")]
    QueryExecution { code: String, message: String },

    /// 공통 프로토콜 버전 없음
    #[error("Server accepted none of the offered Bolt versions ({offered})")]
    UnsupportedVersion { offered: String },

    /// 타임아웃 (연결 폐기)
    #[error("Timeout during {phase} after {after:?}")]
    Timeout { phase: Phase, after: Duration },

    /// 세션 동시 사용
    #[error("Concurrent use of a session: {0}")]
    ConcurrentUse(&'static str),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 타입 변환 에러
    #[error("Type conversion error: {0}")]
    TypeConversion(String),
}

impl DriverError {
    /// 상태 에러 생성
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 타입 변환 에러 생성
    pub fn type_conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }

    /// 프로토콜 에러 생성
    pub fn protocol(phase: Phase, last_sent: Option<&'static str>, detail: impl Into<String>) -> Self {
        Self::Protocol { phase, last_sent, detail: detail.into() }
    }

    /// 프레이밍 에러 변환. I/O는 연결 끊김, 나머지는 프로토콜 위반.
    pub fn from_codec(phase: Phase, last_sent: Option<&'static str>, err: CodecError) -> Self {
        match err {
            CodecError::Io(source) => Self::ConnectionLost { phase, last_sent, source },
            other => Self::protocol(phase, last_sent, other.to_string()),
        }
    }

    /// 서버 FAILURE 분류
    pub fn from_failure(phase: Phase, code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let message = message.into();
        if matches!(phase, Phase::Hello | Phase::Logon) && is_security_code(&code) {
            Self::Authentication { code, message }
        } else if is_retryable_code(&code) {
            Self::Transient { code, message }
        } else {
            Self::QueryExecution { code, message }
        }
    }

    /// 재시도 가능 여부. 드라이버 자체는 재시도하지 않는다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// 연결을 더 쓸 수 없는 에러인지
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. }
                | Self::ConnectionLost { .. }
                | Self::Timeout { .. }
                | Self::Authentication { .. }
                | Self::UnsupportedVersion { .. }
        )
    }

    /// 서버 에러 코드
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Authentication { code, .. }
            | Self::Transient { code, .. }
            | Self::QueryExecution { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// 재시도 가능한 에러 코드 확인
fn is_retryable_code(code: &str) -> bool {
    code.contains(".TransientError.")
        || code == "Neo.ClientError.Cluster.NotALeader"
        || code == "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase"
}

fn is_security_code(code: &str) -> bool {
    code.contains(".Security.")
}

// ============================================================================
// Result Type
// ============================================================================

/// 드라이버 결과 타입
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classification() {
        let err = DriverError::from_failure(
            Phase::Run,
            "Neo.TransientError.Transaction.DeadlockDetected",
            "deadlock",
        );
        assert!(matches!(err, DriverError::Transient { .. }));
        assert!(err.is_retryable());

        let err = DriverError::from_failure(Phase::Commit, "Neo.ClientError.Cluster.NotALeader", "x");
        assert!(err.is_retryable());

        let err = DriverError::from_failure(
            Phase::Begin,
            "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase",
            "x",
        );
        assert!(err.is_retryable());

        let err = DriverError::from_failure(Phase::Run, "Neo.ClientError.Statement.SyntaxError", "bad");
        assert!(matches!(err, DriverError::QueryExecution { .. }));
        assert_eq!(err.code(), Some("Neo.ClientError.Statement.SyntaxError"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_security_codes_only_authenticate_during_hello() {
        let code = "Neo.ClientError.Security.Unauthorized";
        assert!(matches!(
            DriverError::from_failure(Phase::Hello, code, "no"),
            DriverError::Authentication { .. }
        ));
        assert!(matches!(
            DriverError::from_failure(Phase::Logon, code, "no"),
            DriverError::Authentication { .. }
        ));
        assert!(matches!(
            DriverError::from_failure(Phase::Run, code, "no"),
            DriverError::QueryExecution { .. }
        ));
    }

    #[test]
    fn test_codec_errors() {
        let io = CodecError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        let err = DriverError::from_codec(Phase::Pull, Some("PULL"), io);
        assert!(matches!(err, DriverError::ConnectionLost { phase: Phase::Pull, .. }));
        assert!(err.is_fatal());

        let err = DriverError::from_codec(Phase::Run, None, CodecError::Truncated(3));
        assert!(matches!(err, DriverError::Protocol { .. }));
        assert!(err.to_string().contains("last sent: nothing"));
    }

    #[test]
    fn test_display() {
        let err = DriverError::Timeout { phase: Phase::Dial, after: Duration::from_secs(2) };
        assert_eq!(err.to_string(), "Timeout during dial after 2s");

        let err = DriverError::invalid_state("transaction already committed");
        assert_eq!(err.to_string(), "Invalid state: transaction already committed");
        assert!(!err.is_fatal());
    }
}
