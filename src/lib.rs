//! # bolt-session
//!
//! Session and transaction engine for graph databases speaking the Bolt
//! protocol (Neo4j, Memgraph and other Bolt servers).
//!
//! ## Features
//!
//! - **Bolt 4.0 - 5.x** - version negotiation, HELLO/LOGON authentication, PackStream values
//! - **Async/Await** - built on Tokio; any `AsyncRead + AsyncWrite` stream works
//! - **Transactions** - explicit transactions with lazily pulled result cursors
//! - **Bookmarks** - causal chaining of transactions within a session
//! - **Auto-commit connections** - statement-per-transaction or manual commit mode
//! - **Connection pooling** - idle reuse with reset on release
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use bolt_session::{Driver, Execution, Query, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = Driver::new("bolt://localhost:7687?user=neo4j,password=secret", None)?;
//!
//!     let session = driver.session(SessionConfig::default()).await?;
//!     let mut tx = session.begin_transaction(Default::default()).await?;
//!     let summary = tx.run(Query::new("CREATE (:Person {name: $name})").with_param("name", "Ada"))
//!         .await?
//!         .consume()
//!         .await?;
//!     println!("created {} nodes", summary.counters.nodes_created);
//!     let bookmark = tx.commit().await?;
//!     println!("bookmark {:?}", bookmark);
//!     session.close().await?;
//!
//!     let mut conn = driver.connect().await?;
//!     if let Execution::Rows(rows) = conn.execute("MATCH (p:Person) RETURN p.name AS name").await? {
//!         for record in rows {
//!             println!("{}", record.get_as::<String>("name")?);
//!         }
//!     }
//!     conn.close().await?;
//!
//!     driver.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## URLs
//!
//! ```text
//! jdbc:<flavor>:<scheme>://host[:port][/database][?key=value&...]
//! ```
//!
//! Recognised properties: `user`, `password`, `database`, `readonly`,
//! `autocommit`, `usebookmarks`, `fetchsize`, `debug`.
//!
//! ## Modules
//!
//! - [`driver`] - connections, sessions, transactions and cursors
//! - [`bolt`] - wire-level protocol pieces with no I/O of their own

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bolt;
pub mod driver;

// Re-exports for convenience
pub use driver::{
    AccessMode, AuthToken, AutoCommitConnection, Bookmarks, Driver, DriverError, DriverResult,
    Execution, FlavorRegistry, Query, Record, ResultCursor, ResultSet, Session, SessionConfig,
    Summary, Transaction, TransactionConfig, Value,
};

pub use bolt::{BoltVersion, PackStreamValue};
