//! Connection Pool
//!
//! 연결 풀링. 풀은 Ready 상태의 연결만 내준다: 반환 시 RESET이 필요한
//! 연결은 RESET하고, 실패하거나 폐기된 연결은 버린다.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::config::{ConnectionConfig, PoolConfig};
use super::connection::Connection;
use super::error::{DriverError, DriverResult};

// ============================================================================
// PoolMetrics - 풀 메트릭
// ============================================================================

/// 풀 메트릭
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// 유휴 연결 수
    pub idle: usize,
    /// 총 획득 횟수
    pub total_acquisitions: u64,
    /// 총 생성 횟수
    pub total_created: u64,
    /// 반환 시 RESET한 횟수
    pub total_resets: u64,
    /// 버린 연결 수
    pub total_discarded: u64,
}

// ============================================================================
// ConnectionPool - 연결 풀
// ============================================================================

/// 연결 풀
pub struct ConnectionPool<S = TcpStream> {
    connection: ConnectionConfig,
    config: PoolConfig,
    idle: Mutex<VecDeque<Connection<S>>>,
    open: AtomicBool,
    total_acquisitions: AtomicU64,
    total_created: AtomicU64,
    total_resets: AtomicU64,
    total_discarded: AtomicU64,
}

impl ConnectionPool<TcpStream> {
    /// 유휴 연결을 재사용하거나 새로 TCP 접속
    pub async fn acquire(&self) -> DriverResult<Connection<TcpStream>> {
        self.acquire_with(|config| async move { Connection::dial(&config).await })
            .await
    }
}

impl<S> ConnectionPool<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    /// 새 연결 풀 생성
    pub fn new(connection: ConnectionConfig, config: PoolConfig) -> Self {
        Self {
            connection,
            config,
            idle: Mutex::new(VecDeque::new()),
            open: AtomicBool::new(true),
            total_acquisitions: AtomicU64::new(0),
            total_created: AtomicU64::new(0),
            total_resets: AtomicU64::new(0),
            total_discarded: AtomicU64::new(0),
        }
    }

    /// 연결 설정
    pub fn connection_config(&self) -> &ConnectionConfig {
        &self.connection
    }

    /// 연결 획득. 유휴 연결이 없으면 `connect`로 새로 만든다.
    pub async fn acquire_with<F, Fut>(&self, connect: F) -> DriverResult<Connection<S>>
    where
        F: FnOnce(ConnectionConfig) -> Fut,
        Fut: Future<Output = DriverResult<Connection<S>>>,
    {
        if !self.open.load(Ordering::Acquire) {
            return Err(DriverError::invalid_state("connection pool is closed"));
        }

        while let Some(mut conn) = self.pop_idle() {
            if let Some(threshold) = self.config.liveness_check_after {
                if conn.idle_for() >= threshold {
                    if let Err(e) = conn.check_liveness(self.config.liveness_timeout).await {
                        warn!(error = %e, "idle connection failed liveness check, discarding");
                        self.discard(conn).await;
                        continue;
                    }
                }
            }
            self.total_acquisitions.fetch_add(1, Ordering::Relaxed);
            debug!(idle = self.idle_count(), "reusing pooled connection");
            return Ok(conn);
        }

        let conn = connect(self.connection.clone()).await?;
        self.total_created.fetch_add(1, Ordering::Relaxed);
        self.total_acquisitions.fetch_add(1, Ordering::Relaxed);
        Ok(conn)
    }

    fn pop_idle(&self) -> Option<Connection<S>> {
        self.idle.lock().pop_front()
    }

    /// 연결 반환. `needs_reset`이거나 Ready가 아니면 RESET 후 보관.
    pub async fn release(&self, mut conn: Connection<S>, needs_reset: bool) {
        if conn.is_defunct() {
            debug!("dropping defunct connection");
            self.total_discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if needs_reset || !conn.is_ready() || conn.outstanding() > 0 {
            self.total_resets.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = conn.reset().await {
                warn!(error = %e, "reset before pooling failed, discarding connection");
                self.discard(conn).await;
                return;
            }
        }
        if !self.open.load(Ordering::Acquire) {
            self.discard(conn).await;
            return;
        }

        let overflow = {
            let mut idle = self.idle.lock();
            if idle.len() < self.config.max_idle {
                idle.push_back(conn);
                None
            } else {
                Some(conn)
            }
        };
        if let Some(conn) = overflow {
            self.discard(conn).await;
        }
    }

    async fn discard(&self, mut conn: Connection<S>) {
        self.total_discarded.fetch_add(1, Ordering::Relaxed);
        conn.close().await;
    }

    /// 풀 닫기. 유휴 연결에는 GOODBYE.
    pub async fn close(&self) {
        self.open.store(false, Ordering::Release);
        let drained: Vec<_> = self.idle.lock().drain(..).collect();
        for mut conn in drained {
            conn.close().await;
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// 유휴 연결 수
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            idle: self.idle_count(),
            total_acquisitions: self.total_acquisitions.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_resets: self.total_resets.load(Ordering::Relaxed),
            total_discarded: self.total_discarded.load(Ordering::Relaxed),
        }
    }
}

impl<S> std::fmt::Debug for ConnectionPool<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("address", &self.connection.address)
            .field("idle", &self.idle.lock().len())
            .field("open", &self.open.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
