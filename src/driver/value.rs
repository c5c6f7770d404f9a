//! Driver Values
//!
//! 그래프 값 타입과 PackStream 구조체 변환 (노드, 관계, 경로, 시간, 공간)

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;

use crate::bolt::handshake::BoltVersion;
use crate::bolt::packstream::marker::tag;
use crate::bolt::packstream::{PackStreamStructure, PackStreamValue};

use super::error::{DriverError, DriverResult};

/// 쿼리 파라미터
pub type Params = HashMap<String, Value>;

/// 0001-01-01부터 1970-01-01까지의 일수
const EPOCH_DAYS_FROM_CE: i64 = 719_163;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

// ============================================================================
// Value - 그래프 값
// ============================================================================

/// 그래프 값 타입
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    Node(Node),
    Relationship(Relationship),
    Path(Path),
    Point(Point),
    Date(NaiveDate),
    /// 오프셋이 있는 시각
    Time(OffsetTime),
    LocalTime(NaiveTime),
    DateTime(DateTime<FixedOffset>),
    /// 존 ID가 있는 일시
    ZonedDateTime(ZonedDateTime),
    LocalDateTime(NaiveDateTime),
    Duration(IsoDuration),
}

impl Value {
    /// 바이트 값
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(data.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// 정수도 실수로 넓혀서 반환
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Value::Relationship(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }

    /// 타입 이름
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Node(_) => "Node",
            Value::Relationship(_) => "Relationship",
            Value::Path(_) => "Path",
            Value::Point(_) => "Point",
            Value::Date(_) => "Date",
            Value::Time(_) => "Time",
            Value::LocalTime(_) => "LocalTime",
            Value::DateTime(_) => "DateTime",
            Value::ZonedDateTime(_) => "ZonedDateTime",
            Value::LocalDateTime(_) => "LocalDateTime",
            Value::Duration(_) => "Duration",
        }
    }

    // ------------------------------------------------------------------------
    // Wire conversion
    // ------------------------------------------------------------------------

    /// 수신한 PackStream 값을 변환. 알 수 없는 구조체 태그는 에러.
    pub fn from_wire(value: PackStreamValue) -> DriverResult<Value> {
        Ok(match value {
            PackStreamValue::Null => Value::Null,
            PackStreamValue::Boolean(b) => Value::Boolean(b),
            PackStreamValue::Integer(i) => Value::Integer(i),
            PackStreamValue::Float(f) => Value::Float(f),
            PackStreamValue::String(s) => Value::String(s),
            PackStreamValue::Bytes(b) => Value::Bytes(b),
            PackStreamValue::List(items) => {
                Value::List(items.into_iter().map(Value::from_wire).collect::<DriverResult<_>>()?)
            }
            PackStreamValue::Map(map) => Value::Map(map_from_wire(map)?),
            PackStreamValue::Structure(s) => structure_from_wire(s)?,
        })
    }

    /// 전송용 PackStream 값. 일시 태그는 프로토콜 버전에 따라 고른다.
    pub fn to_wire(&self, version: BoltVersion) -> PackStreamValue {
        match self {
            Value::Null => PackStreamValue::Null,
            Value::Boolean(b) => PackStreamValue::Boolean(*b),
            Value::Integer(i) => PackStreamValue::Integer(*i),
            Value::Float(f) => PackStreamValue::Float(*f),
            Value::String(s) => PackStreamValue::String(s.clone()),
            Value::Bytes(b) => PackStreamValue::Bytes(b.clone()),
            Value::List(items) => {
                PackStreamValue::List(items.iter().map(|v| v.to_wire(version)).collect())
            }
            Value::Map(map) => PackStreamValue::Map(map_to_wire(map, version)),
            Value::Node(n) => n.to_wire(version),
            Value::Relationship(r) => r.to_wire(version),
            Value::Path(p) => p.to_wire(version),
            Value::Point(p) => p.to_wire(),
            Value::Date(d) => structure(tag::DATE, vec![int(days_since_epoch(d))]),
            Value::Time(t) => structure(
                tag::TIME,
                vec![int(nanos_of_day(&t.time)), int(t.offset_seconds as i64)],
            ),
            Value::LocalTime(t) => structure(tag::LOCAL_TIME, vec![int(nanos_of_day(t))]),
            Value::DateTime(dt) => {
                let offset = dt.offset().local_minus_utc() as i64;
                let nanos = int(dt.timestamp_subsec_nanos() as i64);
                if version.uses_utc_datetime() {
                    structure(tag::DATE_TIME, vec![int(dt.timestamp()), nanos, int(offset)])
                } else {
                    structure(
                        tag::LEGACY_DATE_TIME,
                        vec![int(dt.timestamp() + offset), nanos, int(offset)],
                    )
                }
            }
            Value::ZonedDateTime(z) => {
                let t = if z.utc { tag::DATE_TIME_ZONE_ID } else { tag::LEGACY_DATE_TIME_ZONE_ID };
                let stamp = z.datetime.and_utc();
                structure(
                    t,
                    vec![
                        int(stamp.timestamp()),
                        int(stamp.timestamp_subsec_nanos() as i64),
                        PackStreamValue::String(z.zone_id.clone()),
                    ],
                )
            }
            Value::LocalDateTime(dt) => {
                let stamp = dt.and_utc();
                structure(
                    tag::LOCAL_DATE_TIME,
                    vec![int(stamp.timestamp()), int(stamp.timestamp_subsec_nanos() as i64)],
                )
            }
            Value::Duration(d) => structure(
                tag::DURATION,
                vec![int(d.months), int(d.days), int(d.seconds), int(d.nanoseconds as i64)],
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(m) => write!(f, "{{{} entries}}", m.len()),
            Value::Node(n) => write!(f, "{}", n),
            Value::Relationship(r) => write!(f, "{}", r),
            Value::Path(p) => write!(f, "<path of {}>", p.len()),
            Value::Point(p) => write!(f, "{}", p),
            Value::Date(d) => write!(f, "{}", d),
            Value::Time(t) => write!(f, "{}{:+}s", t.time, t.offset_seconds),
            Value::LocalTime(t) => write!(f, "{}", t),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::ZonedDateTime(z) => write!(f, "{}[{}]", z.datetime, z.zone_id),
            Value::LocalDateTime(dt) => write!(f, "{}", dt),
            Value::Duration(d) => write!(f, "{}", d),
        }
    }
}

fn map_from_wire(map: HashMap<String, PackStreamValue>) -> DriverResult<HashMap<String, Value>> {
    map.into_iter().map(|(k, v)| Ok((k, Value::from_wire(v)?))).collect()
}

/// 파라미터 맵을 전송용으로 변환
pub fn map_to_wire(map: &HashMap<String, Value>, version: BoltVersion) -> HashMap<String, PackStreamValue> {
    map.iter().map(|(k, v)| (k.clone(), v.to_wire(version))).collect()
}

fn structure(tag: u8, fields: Vec<PackStreamValue>) -> PackStreamValue {
    PackStreamValue::Structure(PackStreamStructure::new(tag, fields))
}

fn int(i: i64) -> PackStreamValue {
    PackStreamValue::Integer(i)
}

// ============================================================================
// Structure decoding
// ============================================================================

/// 구조체 필드를 순서대로 꺼내는 헬퍼
struct Fields {
    what: &'static str,
    items: std::vec::IntoIter<PackStreamValue>,
}

impl Fields {
    fn open(s: PackStreamStructure, what: &'static str, min: usize, max: usize) -> DriverResult<Self> {
        s.expect_fields(what, min, max)
            .map_err(|e| DriverError::type_conversion(e.to_string()))?;
        Ok(Self { what, items: s.fields.into_iter() })
    }

    fn next(&mut self) -> DriverResult<PackStreamValue> {
        self.items
            .next()
            .ok_or_else(|| DriverError::type_conversion(format!("{} is missing a field", self.what)))
    }

    fn wrong(&self, expected: &str, got: &PackStreamValue) -> DriverError {
        DriverError::type_conversion(format!(
            "{} field must be {}, got {}",
            self.what,
            expected,
            got.type_name()
        ))
    }

    fn int(&mut self) -> DriverResult<i64> {
        let v = self.next()?;
        v.as_int().ok_or_else(|| self.wrong("an integer", &v))
    }

    fn float(&mut self) -> DriverResult<f64> {
        let v = self.next()?;
        v.as_float().ok_or_else(|| self.wrong("a float", &v))
    }

    fn int32(&mut self, what: &str) -> DriverResult<i32> {
        let v = self.int()?;
        i32::try_from(v).map_err(|_| DriverError::type_conversion(format!("{} out of range: {}", what, v)))
    }

    fn string(&mut self) -> DriverResult<String> {
        match self.next()? {
            PackStreamValue::String(s) => Ok(s),
            other => Err(self.wrong("a string", &other)),
        }
    }

    fn list(&mut self) -> DriverResult<Vec<PackStreamValue>> {
        match self.next()? {
            PackStreamValue::List(items) => Ok(items),
            other => Err(self.wrong("a list", &other)),
        }
    }

    fn properties(&mut self) -> DriverResult<HashMap<String, Value>> {
        match self.next()? {
            PackStreamValue::Map(map) => map_from_wire(map),
            other => Err(self.wrong("a map", &other)),
        }
    }

    /// Bolt 5 엘리먼트 ID (없으면 None)
    fn element_id(&mut self) -> Option<String> {
        match self.items.next() {
            Some(PackStreamValue::String(s)) => Some(s),
            _ => None,
        }
    }
}

fn structure_from_wire(s: PackStreamStructure) -> DriverResult<Value> {
    match s.tag {
        tag::NODE => Ok(Value::Node(Node::from_structure(s)?)),
        tag::RELATIONSHIP => Ok(Value::Relationship(Relationship::from_structure(s)?)),
        tag::PATH => Ok(Value::Path(Path::from_structure(s)?)),
        tag::POINT_2D => {
            let mut f = Fields::open(s, "Point2D", 3, 3)?;
            Ok(Value::Point(Point::new_2d(f.int32("srid")?, f.float()?, f.float()?)))
        }
        tag::POINT_3D => {
            let mut f = Fields::open(s, "Point3D", 4, 4)?;
            Ok(Value::Point(Point::new_3d(f.int32("srid")?, f.float()?, f.float()?, f.float()?)))
        }
        tag::DATE => {
            let mut f = Fields::open(s, "Date", 1, 1)?;
            Ok(Value::Date(date_from_days(f.int()?)?))
        }
        tag::TIME => {
            let mut f = Fields::open(s, "Time", 2, 2)?;
            let time = time_from_nanos(f.int()?)?;
            let offset_seconds = offset_seconds(f.int()?)?;
            Ok(Value::Time(OffsetTime { time, offset_seconds }))
        }
        tag::LOCAL_TIME => {
            let mut f = Fields::open(s, "LocalTime", 1, 1)?;
            Ok(Value::LocalTime(time_from_nanos(f.int()?)?))
        }
        tag::LOCAL_DATE_TIME => {
            let mut f = Fields::open(s, "LocalDateTime", 2, 2)?;
            Ok(Value::LocalDateTime(naive_from_epoch(f.int()?, f.int()?)?))
        }
        tag::DATE_TIME | tag::LEGACY_DATE_TIME => {
            let utc = s.tag == tag::DATE_TIME;
            let mut f = Fields::open(s, "DateTime", 3, 3)?;
            let (seconds, nanos) = (f.int()?, f.int()?);
            let offset_secs = offset_seconds(f.int()?)?;
            let offset = FixedOffset::east_opt(offset_secs)
                .ok_or_else(|| DriverError::type_conversion("DateTime offset out of range"))?;
            // 레거시 태그의 초는 현지 시각 기준
            let utc_seconds = if utc {
                seconds
            } else {
                seconds
                    .checked_sub(i64::from(offset_secs))
                    .ok_or_else(|| DriverError::type_conversion(format!("DateTime out of range: {} s", seconds)))?
            };
            let instant = naive_from_epoch(utc_seconds, nanos)?.and_utc();
            Ok(Value::DateTime(instant.with_timezone(&offset)))
        }
        tag::DATE_TIME_ZONE_ID | tag::LEGACY_DATE_TIME_ZONE_ID => {
            let utc = s.tag == tag::DATE_TIME_ZONE_ID;
            let mut f = Fields::open(s, "DateTimeZoneId", 3, 3)?;
            let datetime = naive_from_epoch(f.int()?, f.int()?)?;
            Ok(Value::ZonedDateTime(ZonedDateTime { datetime, utc, zone_id: f.string()? }))
        }
        tag::DURATION => {
            let mut f = Fields::open(s, "Duration", 4, 4)?;
            Ok(Value::Duration(IsoDuration::new(f.int()?, f.int()?, f.int()?, f.int32("nanoseconds")?)))
        }
        other => Err(DriverError::type_conversion(format!(
            "unsupported structure tag 0x{:02X}",
            other
        ))),
    }
}

fn date_from_days(days: i64) -> DriverResult<NaiveDate> {
    i32::try_from(days + EPOCH_DAYS_FROM_CE)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| DriverError::type_conversion(format!("date out of range: {} days", days)))
}

fn days_since_epoch(date: &NaiveDate) -> i64 {
    date.num_days_from_ce() as i64 - EPOCH_DAYS_FROM_CE
}

fn time_from_nanos(nanos: i64) -> DriverResult<NaiveTime> {
    let secs = u32::try_from(nanos.div_euclid(NANOS_PER_SECOND)).ok();
    let frac = nanos.rem_euclid(NANOS_PER_SECOND) as u32;
    secs.and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, frac))
        .ok_or_else(|| DriverError::type_conversion(format!("time out of range: {} ns", nanos)))
}

fn nanos_of_day(time: &NaiveTime) -> i64 {
    time.num_seconds_from_midnight() as i64 * NANOS_PER_SECOND + time.nanosecond() as i64
}

fn naive_from_epoch(seconds: i64, nanos: i64) -> DriverResult<NaiveDateTime> {
    u32::try_from(nanos)
        .ok()
        .and_then(|n| DateTime::from_timestamp(seconds, n))
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| DriverError::type_conversion(format!("timestamp out of range: {}s", seconds)))
}

fn offset_seconds(raw: i64) -> DriverResult<i32> {
    i32::try_from(raw).map_err(|_| DriverError::type_conversion("time zone offset out of range"))
}

// ============================================================================
// Node - 그래프 노드
// ============================================================================

/// 그래프 노드
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: HashMap<String, Value>,
    /// Bolt 5 엘리먼트 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
}

impl Node {
    pub fn new(id: i64, labels: Vec<String>, properties: HashMap<String, Value>) -> Self {
        Self { id, labels, properties, element_id: None }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    fn from_structure(s: PackStreamStructure) -> DriverResult<Self> {
        let mut f = Fields::open(s, "Node", 3, 4)?;
        let id = f.int()?;
        let labels = PackStreamValue::List(f.list()?).to_string_list();
        let properties = f.properties()?;
        Ok(Self { id, labels, properties, element_id: f.element_id() })
    }

    fn to_wire(&self, version: BoltVersion) -> PackStreamValue {
        let mut fields = vec![
            int(self.id),
            self.labels.clone().into(),
            PackStreamValue::Map(map_to_wire(&self.properties, version)),
        ];
        if version >= BoltVersion::V5_0 {
            fields.push(self.element_id.clone().unwrap_or_else(|| self.id.to_string()).into());
        }
        structure(tag::NODE, fields)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.id)?;
        for label in &self.labels {
            write!(f, ":{}", label)?;
        }
        f.write_str(")")
    }
}

// ============================================================================
// Relationship - 그래프 관계
// ============================================================================

/// 그래프 관계
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub id: i64,
    pub start_node_id: i64,
    pub end_node_id: i64,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub properties: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
}

impl Relationship {
    pub fn new(
        id: i64,
        start_node_id: i64,
        end_node_id: i64,
        rel_type: impl Into<String>,
        properties: HashMap<String, Value>,
    ) -> Self {
        Self {
            id,
            start_node_id,
            end_node_id,
            rel_type: rel_type.into(),
            properties,
            element_id: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    fn from_structure(s: PackStreamStructure) -> DriverResult<Self> {
        let mut f = Fields::open(s, "Relationship", 5, 8)?;
        let (id, start_node_id, end_node_id) = (f.int()?, f.int()?, f.int()?);
        let rel_type = f.string()?;
        let properties = f.properties()?;
        Ok(Self {
            id,
            start_node_id,
            end_node_id,
            rel_type,
            properties,
            element_id: f.element_id(),
        })
    }

    fn to_wire(&self, version: BoltVersion) -> PackStreamValue {
        let mut fields = vec![
            int(self.id),
            int(self.start_node_id),
            int(self.end_node_id),
            self.rel_type.as_str().into(),
            PackStreamValue::Map(map_to_wire(&self.properties, version)),
        ];
        if version >= BoltVersion::V5_0 {
            fields.push(self.element_id.clone().unwrap_or_else(|| self.id.to_string()).into());
            fields.push(self.start_node_id.to_string().into());
            fields.push(self.end_node_id.to_string().into());
        }
        structure(tag::RELATIONSHIP, fields)
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-[{}:{}]->({})", self.start_node_id, self.id, self.rel_type, self.end_node_id)
    }
}

// ============================================================================
// Path - 그래프 경로
// ============================================================================

/// 그래프 경로. `nodes`는 `relationships`보다 하나 많다.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Path {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
}

impl Path {
    pub fn new(nodes: Vec<Node>, relationships: Vec<Relationship>) -> Self {
        Self { nodes, relationships }
    }

    /// 경로 길이 (관계 수)
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn start(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn end(&self) -> Option<&Node> {
        self.nodes.last()
    }

    /// 고유 노드, 방향 없는 관계, 인덱스 시퀀스로부터 경로 복원
    fn from_structure(s: PackStreamStructure) -> DriverResult<Self> {
        let mut f = Fields::open(s, "Path", 3, 3)?;
        let unique_nodes = f
            .list()?
            .into_iter()
            .map(|v| match v {
                PackStreamValue::Structure(s) if s.tag == tag::NODE => Node::from_structure(s),
                other => Err(DriverError::type_conversion(format!(
                    "path node must be a Node, got {}",
                    other.type_name()
                ))),
            })
            .collect::<DriverResult<Vec<_>>>()?;
        let unbound = f
            .list()?
            .into_iter()
            .map(|v| match v {
                PackStreamValue::Structure(s) if s.tag == tag::UNBOUND_RELATIONSHIP => {
                    let mut f = Fields::open(s, "UnboundRelationship", 3, 4)?;
                    let id = f.int()?;
                    let rel_type = f.string()?;
                    let properties = f.properties()?;
                    Ok((id, rel_type, properties, f.element_id()))
                }
                other => Err(DriverError::type_conversion(format!(
                    "path relationship must be unbound, got {}",
                    other.type_name()
                ))),
            })
            .collect::<DriverResult<Vec<_>>>()?;
        let indices = f
            .list()?
            .into_iter()
            .map(|v| v.as_int().ok_or_else(|| DriverError::type_conversion("path index must be an integer")))
            .collect::<DriverResult<Vec<_>>>()?;

        if indices.len() % 2 != 0 {
            return Err(DriverError::type_conversion("path index sequence has odd length"));
        }
        let first = unique_nodes
            .first()
            .cloned()
            .ok_or_else(|| DriverError::type_conversion("path without nodes"))?;

        let bad_index = || DriverError::type_conversion("path index out of range");
        let mut nodes = vec![first];
        let mut relationships = Vec::with_capacity(indices.len() / 2);
        for pair in indices.chunks_exact(2) {
            let (rel_index, node_index) = (pair[0], pair[1]);
            let next = unique_nodes.get(usize::try_from(node_index).map_err(|_| bad_index())?).ok_or_else(bad_index)?;
            let slot = usize::try_from(rel_index.unsigned_abs()).map_err(|_| bad_index())?;
            let (id, rel_type, properties, element_id) =
                unbound.get(slot.wrapping_sub(1)).ok_or_else(bad_index)?.clone();
            let current = nodes.last().map(|n| n.id).unwrap_or_default();
            let (start, end) = if rel_index > 0 { (current, next.id) } else { (next.id, current) };
            let mut rel = Relationship::new(id, start, end, rel_type, properties);
            rel.element_id = element_id;
            relationships.push(rel);
            nodes.push(next.clone());
        }
        Ok(Self { nodes, relationships })
    }

    fn to_wire(&self, version: BoltVersion) -> PackStreamValue {
        let nodes = self.nodes.iter().map(|n| n.to_wire(version)).collect();
        let mut rels = Vec::with_capacity(self.relationships.len());
        let mut indices = Vec::with_capacity(self.relationships.len() * 2);
        for (i, rel) in self.relationships.iter().enumerate() {
            let mut fields = vec![
                int(rel.id),
                rel.rel_type.as_str().into(),
                PackStreamValue::Map(map_to_wire(&rel.properties, version)),
            ];
            if version >= BoltVersion::V5_0 {
                fields.push(rel.element_id.clone().unwrap_or_else(|| rel.id.to_string()).into());
            }
            rels.push(structure(tag::UNBOUND_RELATIONSHIP, fields));
            let forward = self.nodes.get(i).map(|n| n.id) == Some(rel.start_node_id);
            let slot = i as i64 + 1;
            indices.push(int(if forward { slot } else { -slot }));
            indices.push(int(slot));
        }
        structure(
            tag::PATH,
            vec![PackStreamValue::List(nodes), PackStreamValue::List(rels), PackStreamValue::List(indices)],
        )
    }
}

// ============================================================================
// Point - 공간 좌표
// ============================================================================

/// 공간 좌표
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub srid: i32,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Point {
    pub fn new_2d(srid: i32, x: f64, y: f64) -> Self {
        Self { srid, x, y, z: None }
    }

    pub fn new_3d(srid: i32, x: f64, y: f64, z: f64) -> Self {
        Self { srid, x, y, z: Some(z) }
    }

    /// WGS84 (경도, 위도)
    pub fn wgs84(longitude: f64, latitude: f64) -> Self {
        Self::new_2d(4326, longitude, latitude)
    }

    pub fn cartesian(x: f64, y: f64) -> Self {
        Self::new_2d(7203, x, y)
    }

    fn to_wire(&self) -> PackStreamValue {
        let mut fields = vec![int(self.srid as i64), self.x.into(), self.y.into()];
        match self.z {
            Some(z) => {
                fields.push(z.into());
                structure(tag::POINT_3D, fields)
            }
            None => structure(tag::POINT_2D, fields),
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.z {
            Some(z) => write!(f, "point({{srid: {}, x: {}, y: {}, z: {}}})", self.srid, self.x, self.y, z),
            None => write!(f, "point({{srid: {}, x: {}, y: {}}})", self.srid, self.x, self.y),
        }
    }
}

// ============================================================================
// Temporal - 시간 타입
// ============================================================================

/// UTC 오프셋이 있는 시각
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OffsetTime {
    pub time: NaiveTime,
    pub offset_seconds: i32,
}

/// 존 ID가 있는 일시. 시간대 DB 없이 서버 값을 그대로 보존한다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZonedDateTime {
    /// `utc`이면 UTC 기준, 아니면 현지 벽시계 기준
    pub datetime: NaiveDateTime,
    pub utc: bool,
    pub zone_id: String,
}

/// ISO-8601 기간
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IsoDuration {
    pub months: i64,
    pub days: i64,
    pub seconds: i64,
    pub nanoseconds: i32,
}

impl IsoDuration {
    pub fn new(months: i64, days: i64, seconds: i64, nanoseconds: i32) -> Self {
        Self { months, days, seconds, nanoseconds }
    }
}

impl fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}M{}DT{}", self.months, self.days, self.seconds)?;
        if self.nanoseconds != 0 {
            write!(f, ".{:09}", self.nanoseconds.unsigned_abs())?;
        }
        f.write_str("S")
    }
}

// ============================================================================
// From / TryFrom
// ============================================================================

macro_rules! value_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )+
    };
}

value_from! {
    bool => Boolean,
    i64 => Integer,
    f64 => Float,
    String => String,
    HashMap<String, Value> => Map,
    Node => Node,
    Relationship => Relationship,
    Path => Path,
    Point => Point,
    NaiveDate => Date,
    NaiveTime => LocalTime,
    NaiveDateTime => LocalDateTime,
    DateTime<FixedOffset> => DateTime,
    IsoDuration => Duration,
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

macro_rules! value_try_into {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl TryFrom<Value> for $ty {
                type Error = DriverError;

                fn try_from(value: Value) -> Result<Self, Self::Error> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(DriverError::type_conversion(format!(
                            "cannot convert {} to {}",
                            other.type_name(),
                            stringify!($ty)
                        ))),
                    }
                }
            }
        )+
    };
}

value_try_into! {
    bool => Boolean,
    i64 => Integer,
    String => String,
    Vec<Value> => List,
    HashMap<String, Value> => Map,
    Node => Node,
    Relationship => Relationship,
    Path => Path,
    Point => Point,
    NaiveDate => Date,
    NaiveDateTime => LocalDateTime,
    DateTime<FixedOffset> => DateTime,
    IsoDuration => Duration,
}

impl TryFrom<Value> for f64 {
    type Error = DriverError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value
            .as_float()
            .ok_or_else(|| DriverError::type_conversion(format!("cannot convert {} to f64", value.type_name())))
    }
}

// ============================================================================
// Tests
// ============================================================================
