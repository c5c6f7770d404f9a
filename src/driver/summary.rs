//! Result Summary
//!
//! 쿼리 실행 후 통계 (카운터, 쿼리 타입, 타이밍)

use std::collections::HashMap;
use std::ops::AddAssign;
use std::time::Duration;

use serde::Serialize;

use crate::bolt::message::Success;
use crate::bolt::packstream::PackStreamValue;

// ============================================================================
// Counters - 업데이트 카운터
// ============================================================================

/// 업데이트 카운터
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub nodes_created: i64,
    pub nodes_deleted: i64,
    pub relationships_created: i64,
    pub relationships_deleted: i64,
    pub properties_set: i64,
    pub labels_added: i64,
    pub labels_removed: i64,
    pub indexes_added: i64,
    pub indexes_removed: i64,
    pub constraints_added: i64,
    pub constraints_removed: i64,
    pub system_updates: i64,
}

impl Counters {
    /// SUCCESS `stats` 맵에서 생성. 없는 키는 0.
    pub fn from_stats(stats: &HashMap<String, PackStreamValue>) -> Self {
        let get = |key: &str| stats.get(key).and_then(PackStreamValue::as_int).unwrap_or(0);
        Self {
            nodes_created: get("nodes-created"),
            nodes_deleted: get("nodes-deleted"),
            relationships_created: get("relationships-created"),
            relationships_deleted: get("relationships-deleted"),
            properties_set: get("properties-set"),
            labels_added: get("labels-added"),
            labels_removed: get("labels-removed"),
            indexes_added: get("indexes-added"),
            indexes_removed: get("indexes-removed"),
            constraints_added: get("constraints-added"),
            constraints_removed: get("constraints-removed"),
            system_updates: get("system-updates"),
        }
    }

    /// 데이터 변경 여부
    pub fn contains_updates(&self) -> bool {
        self.nodes_created
            + self.nodes_deleted
            + self.relationships_created
            + self.relationships_deleted
            + self.properties_set
            + self.labels_added
            + self.labels_removed
            + self.indexes_added
            + self.indexes_removed
            + self.constraints_added
            + self.constraints_removed
            > 0
    }

    /// 시스템 변경 여부
    pub fn contains_system_updates(&self) -> bool {
        self.system_updates > 0
    }

    /// 업데이트 건수: 생성/삭제된 노드와 관계 수, 없으면 설정된 속성 수
    pub fn update_count(&self) -> i64 {
        let structural = self.nodes_created
            + self.nodes_deleted
            + self.relationships_created
            + self.relationships_deleted;
        if structural > 0 {
            structural
        } else {
            self.properties_set
        }
    }
}

impl AddAssign for Counters {
    fn add_assign(&mut self, rhs: Self) {
        self.nodes_created += rhs.nodes_created;
        self.nodes_deleted += rhs.nodes_deleted;
        self.relationships_created += rhs.relationships_created;
        self.relationships_deleted += rhs.relationships_deleted;
        self.properties_set += rhs.properties_set;
        self.labels_added += rhs.labels_added;
        self.labels_removed += rhs.labels_removed;
        self.indexes_added += rhs.indexes_added;
        self.indexes_removed += rhs.indexes_removed;
        self.constraints_added += rhs.constraints_added;
        self.constraints_removed += rhs.constraints_removed;
        self.system_updates += rhs.system_updates;
    }
}

// ============================================================================
// QueryType - 쿼리 타입
// ============================================================================

/// 쿼리 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryType {
    /// `r`
    ReadOnly,
    /// `rw`
    ReadWrite,
    /// `w`
    WriteOnly,
    /// `s`
    SchemaWrite,
}

impl QueryType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "r" => Some(Self::ReadOnly),
            "rw" => Some(Self::ReadWrite),
            "w" => Some(Self::WriteOnly),
            "s" => Some(Self::SchemaWrite),
            _ => None,
        }
    }
}

// ============================================================================
// Summary - 결과 요약
// ============================================================================

/// 결과 요약
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    /// 실행한 쿼리
    pub query: String,
    /// 업데이트 카운터
    pub counters: Counters,
    /// 쿼리 타입
    pub query_type: Option<QueryType>,
    /// 실행된 데이터베이스
    pub database: Option<String>,
    /// 서버 agent
    pub server: Option<String>,
    /// 첫 레코드까지 걸린 시간 (RUN의 `t_first`)
    pub result_available_after: Option<Duration>,
    /// 마지막 레코드 소비까지 걸린 시간 (PULL의 `t_last`)
    pub result_consumed_after: Option<Duration>,
}

impl Summary {
    /// RUN 응답에서 시작
    pub fn new(query: impl Into<String>, run: &Success, server: Option<String>) -> Self {
        Self {
            query: query.into(),
            result_available_after: run.t_first().map(millis),
            database: run.database().map(str::to_owned),
            server,
            ..Self::default()
        }
    }

    /// 스트림을 끝낸 SUCCESS (PULL/DISCARD) 반영
    pub fn absorb(&mut self, tail: &Success) {
        if let Some(stats) = tail.stats() {
            self.counters = Counters::from_stats(stats);
        }
        if let Some(code) = tail.query_type() {
            self.query_type = QueryType::from_code(code);
        }
        if let Some(db) = tail.database() {
            self.database = Some(db.to_owned());
        }
        if let Some(t) = tail.t_last() {
            self.result_consumed_after = Some(millis(t));
        }
    }

    /// 업데이트 건수
    pub fn update_count(&self) -> i64 {
        self.counters.update_count()
    }
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(pairs: &[(&str, i64)]) -> HashMap<String, PackStreamValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), PackStreamValue::Integer(*v))).collect()
    }

    #[test]
    fn test_counters_from_stats() {
        let c = Counters::from_stats(&stats(&[("nodes-created", 2), ("properties-set", 4)]));
        assert_eq!(c.nodes_created, 2);
        assert_eq!(c.properties_set, 4);
        assert_eq!(c.relationships_created, 0);
        assert!(c.contains_updates());
        assert!(!Counters::default().contains_updates());
    }

    #[test]
    fn test_update_count() {
        let c = Counters::from_stats(&stats(&[("nodes-created", 1), ("relationships-created", 1)]));
        assert_eq!(c.update_count(), 2);
        let c = Counters::from_stats(&stats(&[("properties-set", 3)]));
        assert_eq!(c.update_count(), 3);
        assert_eq!(Counters::default().update_count(), 0);
    }

    #[test]
    fn test_counters_accumulate() {
        let mut total = Counters::default();
        total += Counters { nodes_created: 1, ..Default::default() };
        total += Counters { nodes_created: 2, labels_added: 1, ..Default::default() };
        assert_eq!(total.nodes_created, 3);
        assert_eq!(total.labels_added, 1);
    }

    #[test]
    fn test_summary_absorb() {
        let run = Success::new().with("t_first", 5i64).with("fields", Vec::<String>::new());
        let mut summary = Summary::new("CREATE (n)", &run, Some("Neo4j/5.13.0".into()));
        let tail = Success::new()
            .with("type", "w")
            .with("db", "neo4j")
            .with("t_last", 2i64)
            .with("stats", PackStreamValue::Map(stats(&[("nodes-created", 1)])));
        summary.absorb(&tail);

        assert_eq!(summary.query_type, Some(QueryType::WriteOnly));
        assert_eq!(summary.database.as_deref(), Some("neo4j"));
        assert_eq!(summary.counters.nodes_created, 1);
        assert_eq!(summary.result_available_after, Some(Duration::from_millis(5)));
        assert_eq!(summary.result_consumed_after, Some(Duration::from_millis(2)));
    }
}
