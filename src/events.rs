//! MySQL Binlog 이벤트 타입 및 도메인 이벤트 정의

use crate::value::CellValue;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// MySQL / MariaDB Binlog 이벤트 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// 알 수 없는 이벤트
    Unknown(u8),
    /// 쿼리 이벤트 (BEGIN, COMMIT, DDL)
    QueryEvent,
    StopEvent,
    /// 로테이션 이벤트 (새 binlog 파일)
    RotateEvent,
    /// 포맷 설명 이벤트 (체크섬, post-header 길이)
    FormatDescriptionEvent,
    /// 트랜잭션 커밋
    XidEvent,
    /// 테이블 맵 이벤트 (스키마 정보)
    TableMapEvent,
    WriteRowsEventV1,
    UpdateRowsEventV1,
    DeleteRowsEventV1,
    HeartbeatEvent,
    RowsQueryEvent,
    WriteRowsEvent,
    UpdateRowsEvent,
    DeleteRowsEvent,
    /// GTID 이벤트 (Global Transaction ID)
    GtidEvent,
    AnonymousGtidEvent,
    PreviousGtidsEvent,
    PartialUpdateRowsEvent,
    /// 압축된 트랜잭션 페이로드
    TransactionPayloadEvent,
    HeartbeatEventV2,
    MariadbAnnotateRowsEvent,
    MariadbBinlogCheckpointEvent,
    MariadbGtidEvent,
    MariadbGtidListEvent,
    MariadbStartEncryptionEvent,
}

impl EventType {
    pub fn from_u8(val: u8) -> Self {
        match val {
            2 => EventType::QueryEvent,
            3 => EventType::StopEvent,
            4 => EventType::RotateEvent,
            15 => EventType::FormatDescriptionEvent,
            16 => EventType::XidEvent,
            19 => EventType::TableMapEvent,
            23 => EventType::WriteRowsEventV1,
            24 => EventType::UpdateRowsEventV1,
            25 => EventType::DeleteRowsEventV1,
            27 => EventType::HeartbeatEvent,
            29 => EventType::RowsQueryEvent,
            30 => EventType::WriteRowsEvent,
            31 => EventType::UpdateRowsEvent,
            32 => EventType::DeleteRowsEvent,
            33 => EventType::GtidEvent,
            34 => EventType::AnonymousGtidEvent,
            35 => EventType::PreviousGtidsEvent,
            39 => EventType::PartialUpdateRowsEvent,
            40 => EventType::TransactionPayloadEvent,
            41 => EventType::HeartbeatEventV2,
            160 => EventType::MariadbAnnotateRowsEvent,
            161 => EventType::MariadbBinlogCheckpointEvent,
            162 => EventType::MariadbGtidEvent,
            163 => EventType::MariadbGtidListEvent,
            164 => EventType::MariadbStartEncryptionEvent,
            other => EventType::Unknown(other),
        }
    }

    /// 이 row 이벤트가 만드는 변경 연산
    pub fn operation(&self) -> Option<OperationType> {
        match self {
            EventType::WriteRowsEventV1 | EventType::WriteRowsEvent => Some(OperationType::Insert),
            EventType::UpdateRowsEventV1 | EventType::UpdateRowsEvent => Some(OperationType::Update),
            EventType::DeleteRowsEventV1 | EventType::DeleteRowsEvent => Some(OperationType::Delete),
            _ => None,
        }
    }

    /// v2 row 이벤트는 post-header 뒤에 extra data 블록이 있다
    pub fn has_extra_row_data(&self) -> bool {
        matches!(
            self,
            EventType::WriteRowsEvent | EventType::UpdateRowsEvent | EventType::DeleteRowsEvent
        )
    }
}

/// Binlog 이벤트 헤더
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHeader {
    /// 이벤트 타임스탬프 (초 단위)
    pub timestamp: u32,
    /// 이벤트 타입
    pub event_type: EventType,
    /// MySQL 서버 ID
    pub server_id: u32,
    /// 이벤트 길이 (바이트)
    pub event_length: u32,
    /// 다음 이벤트 위치
    pub next_pos: u32,
    /// 이벤트 플래그
    pub flags: u16,
}

/// 변경 연산 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Insert,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Insert => "INSERT",
            OperationType::Update => "UPDATE",
            OperationType::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 컬럼 순서를 유지하는 행 이미지 (컬럼명 -> 값)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowImage {
    columns: Vec<(String, CellValue)>,
}

impl RowImage {
    pub fn new() -> Self {
        RowImage {
            columns: Vec::new(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: CellValue) {
        self.columns.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&CellValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, CellValue)> for RowImage {
    fn from_iter<I: IntoIterator<Item = (String, CellValue)>>(iter: I) -> Self {
        RowImage {
            columns: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for RowImage {
    type Item = (String, CellValue);
    type IntoIter = std::vec::IntoIter<(String, CellValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

impl Serialize for RowImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// CDC 변경 이벤트 (row 하나당 하나)
///
/// 생성 후에는 변경되지 않으며 `Arc<Event>` 로 전달된다.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Event {
    Insert {
        schema: String,
        table: String,
        timestamp: DateTime<Utc>,
        checkpoint: String,
        after: RowImage,
    },
    Update {
        schema: String,
        table: String,
        timestamp: DateTime<Utc>,
        checkpoint: String,
        before: RowImage,
        after: RowImage,
    },
    Delete {
        schema: String,
        table: String,
        timestamp: DateTime<Utc>,
        checkpoint: String,
        before: RowImage,
    },
}

impl Event {
    pub fn event_type(&self) -> OperationType {
        match self {
            Event::Insert { .. } => OperationType::Insert,
            Event::Update { .. } => OperationType::Update,
            Event::Delete { .. } => OperationType::Delete,
        }
    }

    pub fn schema(&self) -> &str {
        match self {
            Event::Insert { schema, .. } | Event::Update { schema, .. } | Event::Delete { schema, .. } => {
                schema
            }
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Event::Insert { table, .. } | Event::Update { table, .. } | Event::Delete { table, .. } => table,
        }
    }

    /// 서버에서 이벤트가 기록된 시각
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Insert { timestamp, .. }
            | Event::Update { timestamp, .. }
            | Event::Delete { timestamp, .. } => *timestamp,
        }
    }

    /// 이 이벤트 시점의 재시작 위치
    pub fn checkpoint(&self) -> &str {
        match self {
            Event::Insert { checkpoint, .. }
            | Event::Update { checkpoint, .. }
            | Event::Delete { checkpoint, .. } => checkpoint,
        }
    }

    pub fn before(&self) -> Option<&RowImage> {
        match self {
            Event::Insert { .. } => None,
            Event::Update { before, .. } | Event::Delete { before, .. } => Some(before),
        }
    }

    pub fn after(&self) -> Option<&RowImage> {
        match self {
            Event::Insert { after, .. } | Event::Update { after, .. } => Some(after),
            Event::Delete { .. } => None,
        }
    }
}
