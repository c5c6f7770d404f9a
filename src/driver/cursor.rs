//! Result Cursor
//!
//! 결과 레코드의 지연 스트림. 트랜잭션 안의 커서는 필요할 때마다 PULL을
//! 보내고, auto-commit 결과는 모두 버퍼링된 분리 커서다.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, Stream};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use super::error::{DriverError, DriverResult};
use super::record::Record;
use super::summary::Summary;
use super::transaction::Transaction;

enum Source<'t, S> {
    Live(&'t mut Transaction<S>),
    Detached { records: VecDeque<Record>, summary: Summary },
}

/// 결과 커서
///
/// `next()`는 끝에 도달한 뒤에도 계속 `None`을 돌려주며 서버에 아무것도
/// 보내지 않는다. `consume()`은 남은 레코드를 버리고 요약을 돌려준다.
pub struct ResultCursor<'t, S = TcpStream> {
    keys: Arc<[String]>,
    source: Source<'t, S>,
}

impl<'t, S> ResultCursor<'t, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub(crate) fn live(tx: &'t mut Transaction<S>) -> Self {
        Self { keys: tx.stream_keys(), source: Source::Live(tx) }
    }

    /// 필드 이름
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub(crate) fn shared_keys(&self) -> Arc<[String]> {
        self.keys.clone()
    }

    /// 필드가 없으면 순수 업데이트 문장
    pub fn is_update(&self) -> bool {
        self.keys.is_empty()
    }

    /// 다음 레코드
    pub async fn next(&mut self) -> DriverResult<Option<Record>> {
        match &mut self.source {
            Source::Live(tx) => tx.next_record().await,
            Source::Detached { records, .. } => Ok(records.pop_front()),
        }
    }

    /// 남은 레코드를 버리고 요약 반환
    pub async fn consume(self) -> DriverResult<Summary> {
        match self.source {
            Source::Live(tx) => tx.finish_stream().await,
            Source::Detached { summary, .. } => Ok(summary),
        }
    }

    /// 스트림이 끝났으면 요약
    pub fn summary(&self) -> Option<&Summary> {
        match &self.source {
            Source::Live(tx) => tx.stream_summary(),
            Source::Detached { summary, .. } => Some(summary),
        }
    }

    /// 남은 레코드 전부
    pub async fn collect(mut self) -> DriverResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// 정확히 한 개의 레코드
    pub async fn single(mut self) -> DriverResult<Record> {
        let first = self
            .next()
            .await?
            .ok_or_else(|| DriverError::invalid_state("expected exactly one record, got none"))?;
        if self.next().await?.is_some() {
            return Err(DriverError::invalid_state("expected exactly one record, got more"));
        }
        Ok(first)
    }

    /// `futures::Stream`으로 변환. 에러가 나면 그 에러를 마지막으로 끝난다.
    pub fn into_stream(self) -> impl Stream<Item = DriverResult<Record>> + 't
    where
        S: 't,
    {
        stream::unfold(Some(self), |state| async move {
            let mut cursor = state?;
            match cursor.next().await {
                Ok(Some(record)) => Some((Ok(record), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl<S> ResultCursor<'static, S> {
    /// 이미 다 읽은 결과 위의 분리 커서
    pub(crate) fn detached(keys: Arc<[String]>, records: Vec<Record>, summary: Summary) -> Self {
        Self { keys, source: Source::Detached { records: records.into(), summary } }
    }
}

impl<S> std::fmt::Debug for ResultCursor<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let live = matches!(self.source, Source::Live(_));
        f.debug_struct("ResultCursor").field("keys", &self.keys).field("live", &live).finish()
    }
}
