//! Driver Module
//!
//! Bolt 위의 세션/트랜잭션 엔진.
//!
//! # 구성
//!
//! - 연결: 핸드셰이크, HELLO/LOGON, 요청 파이프라이닝 ([`Connection`])
//! - 풀: 유휴 연결 재사용, 반납 시 RESET ([`ConnectionPool`])
//! - 세션: 북마크 인과성, 트랜잭션 시작 ([`Session`])
//! - 트랜잭션: BEGIN/RUN/PULL/COMMIT 상태 머신 ([`Transaction`], [`ResultCursor`])
//! - auto-commit 연결: 문장마다 트랜잭션 또는 수동 커밋 ([`AutoCommitConnection`])
//! - 서버 계열과 URL 해석 ([`FlavorRegistry`])
//!
//! # Example
//!
//! ```ignore
//! use bolt_session::driver::{Driver, Execution, SessionConfig};
//! use bolt_session::params;
//!
//! let driver = Driver::new("jdbc:neo4j:bolt://localhost:7687/movies?user=neo4j,password=secret", None)?;
//!
//! // 명시적 트랜잭션
//! let session = driver.session(SessionConfig::default()).await?;
//! let mut tx = session.begin_transaction(Default::default()).await?;
//! let mut cursor = tx
//!     .run(Query::new("MATCH (p:Person) WHERE p.age > $age RETURN p.name AS name").with_params(params!{"age" => 30}))
//!     .await?;
//! while let Some(record) = cursor.next().await? {
//!     println!("{}", record.get_as::<String>("name")?);
//! }
//! tx.commit().await?;
//! session.close().await?;
//!
//! // auto-commit 연결
//! let mut conn = driver.connect().await?;
//! if let Execution::Updated(n) = conn.execute("CREATE (:Person {name: 'Ada'})").await? {
//!     println!("{} updates", n);
//! }
//! conn.close().await?;
//! driver.close().await;
//! ```

pub mod autocommit;
pub mod bookmark;
pub mod config;
pub mod connection;
pub mod cursor;
mod driver;
pub mod error;
pub mod flavor;
pub mod logging;
pub mod pool;
pub mod record;
pub mod session;
pub mod summary;
pub mod transaction;
pub mod value;

#[cfg(test)]
pub(crate) mod testkit;

// Re-exports
pub use autocommit::{AutoCommitConnection, Execution, ModeSwitch, ResultSet};
pub use bookmark::Bookmarks;
pub use config::{
    AccessMode, AuthToken, ConnectionConfig, ConnectionConfigBuilder, PoolConfig, ServerAddress,
    SessionConfig, SessionConfigBuilder, TransactionConfig,
};
pub use connection::{Connection, ConnectionState, ServerInfo};
pub use cursor::ResultCursor;
pub use driver::{Connector, Driver, DriverConnection};
pub use error::{DriverError, DriverResult, Phase};
pub use flavor::{Flavor, FlavorRegistry, ResolvedUrl};
pub use logging::{LoggingSession, SessionOps};
pub use pool::{ConnectionPool, PoolMetrics};
pub use record::Record;
pub use session::{Query, Session};
pub use summary::{Counters, QueryType, Summary};
pub use transaction::{Transaction, TransactionState};
pub use value::{Node, Params, Path, Point, Relationship, Value};

/// 파라미터 맵 생성 매크로
///
/// ```ignore
/// let params = params! {"name" => "Alice", "age" => 30};
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::driver::Params::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::driver::Params::new();
        $(
            map.insert(::std::string::String::from($key), $crate::driver::Value::from($value));
        )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_macro() {
        let empty: Params = params!();
        assert!(empty.is_empty());

        let params = params! {"name" => "Alice", "age" => 30, "tags" => vec![Value::from("a")]};
        assert_eq!(params.len(), 3);
        assert_eq!(params["name"], Value::from("Alice"));
        assert_eq!(params["age"], Value::Integer(30));
    }
}
