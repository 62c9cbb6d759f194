//! MySQL Binlog 이벤트 프레임 파싱
//!
//! 각 이벤트:
//!   - Timestamp (4 bytes)
//!   - Type (1 byte)
//!   - Server ID (4 bytes)
//!   - Event Length (4 bytes)
//!   - Next Position (4 bytes)
//!   - Flags (2 bytes)
//!   - Event Data (variable)
//!   - CRC32 (4 bytes, binlog_checksum=CRC32 일 때)

use crate::error::{CdcError, Result};
use crate::events::{EventHeader, EventType};
use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;
use std::io::{Cursor, Read};
use tracing::{debug, warn};
use uuid::Uuid;

pub const EVENT_HEADER_SIZE: usize = 19;
const CHECKSUM_SIZE: usize = 4;

/// FORMAT_DESCRIPTION 고정 영역: binlog_version(2) + server_version(50) + timestamp(4) + header_length(1)
const FDE_FIXED_SIZE: usize = 57;

/// 이 버전부터 FDE 끝에 checksum 알고리즘 바이트가 붙는다
const CHECKSUM_VERSION: (u32, u32, u32) = (5, 6, 1);

/// binlog_checksum 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Off,
    Crc32,
}

impl ChecksumAlgorithm {
    /// `@@global.binlog_checksum` 값으로부터
    pub fn from_variable(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("CRC32") => ChecksumAlgorithm::Crc32,
            _ => ChecksumAlgorithm::Off,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ChecksumAlgorithm::Crc32,
            _ => ChecksumAlgorithm::Off,
        }
    }

    fn trailer_len(&self) -> usize {
        match self {
            ChecksumAlgorithm::Off => 0,
            ChecksumAlgorithm::Crc32 => CHECKSUM_SIZE,
        }
    }
}

/// FORMAT_DESCRIPTION 이벤트 데이터 (15)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptionData {
    pub binlog_version: u16,
    pub server_version: String,
    pub header_length: u8,
    /// 인덱스 = event_type - 1
    pub post_header_lengths: Vec<u8>,
    pub checksum: ChecksumAlgorithm,
}

impl FormatDescriptionData {
    fn post_header_len(&self, event_type: u8) -> Option<u8> {
        (event_type as usize)
            .checked_sub(1)
            .and_then(|idx| self.post_header_lengths.get(idx).copied())
    }
}

/// DEFAULT_CHARSET 옵션 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultCharset {
    pub collation: u32,
    /// (문자 컬럼 순번, 콜레이션)
    pub overrides: Vec<(usize, u32)>,
}

/// binlog_row_metadata=FULL 일 때 table map 뒤에 붙는 TLV 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionalMetadata {
    /// 숫자 컬럼마다 1비트, MSB 부터
    pub signedness: Vec<u8>,
    pub default_charset: Option<DefaultCharset>,
    pub column_charsets: Vec<u32>,
    pub column_names: Vec<String>,
    pub set_values: Vec<Vec<String>>,
    pub enum_values: Vec<Vec<String>>,
    pub primary_key: Vec<usize>,
}

/// 테이블 맵 정보 (19)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapData {
    pub table_id: u64,
    pub flags: u16,
    pub schema: String,
    pub table: String,
    pub column_types: Vec<u8>,
    pub column_meta: Vec<u16>,
    pub nullable_bitmap: Vec<u8>,
    pub optional: OptionalMetadata,
}

/// WRITE/UPDATE/DELETE_ROWS 이벤트 (v1: 23-25, v2: 30-32)
///
/// 행 본문은 테이블 메타데이터가 있어야 해석할 수 있으므로 그대로 둔다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowsEventData {
    pub event_type: EventType,
    pub table_id: u64,
    pub flags: u16,
    pub column_count: usize,
    pub columns_present: Vec<u8>,
    /// UPDATE 의 after 이미지 컬럼 비트맵
    pub columns_present_after: Option<Vec<u8>>,
    pub rows: Bytes,
}

/// 쿼리 이벤트 데이터 (2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryEventData {
    pub thread_id: u32,
    pub exec_time: u32,
    pub error_code: u16,
    pub schema: String,
    pub query: String,
}

impl QueryEventData {
    /// 트랜잭션을 끝내는 문장인지 (COMMIT, ROLLBACK, DDL)
    pub fn ends_transaction(&self) -> bool {
        let statement = self.query.trim_start().to_ascii_uppercase();
        !(statement.starts_with("BEGIN")
            || statement.starts_with("XA START")
            || statement.starts_with("XA END")
            || statement.starts_with("SAVEPOINT")
            || statement.starts_with("ROLLBACK TO"))
    }
}

/// 회전 이벤트 데이터 (4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotateEventData {
    pub next_binlog_name: String,
    pub position: u64,
}

/// GTID 이벤트 데이터 (33)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GtidEventData {
    pub flags: u8,
    pub uuid: Uuid,
    pub sequence: u64,
}

/// MariaDB GTID 이벤트 데이터 (162)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MariadbGtidEventData {
    pub sequence: u64,
    pub domain_id: u32,
    pub flags: u8,
}

impl MariadbGtidEventData {
    const FL_STANDALONE: u8 = 0x01;

    /// BEGIN/COMMIT 없이 단독으로 커밋되는 이벤트 그룹 (DDL 등)
    pub fn is_standalone(&self) -> bool {
        self.flags & Self::FL_STANDALONE != 0
    }
}

/// 파싱된 Binlog 이벤트 본문
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinlogEventData {
    FormatDescription(FormatDescriptionData),
    Rotate(RotateEventData),
    TableMap(TableMapData),
    Rows(RowsEventData),
    Query(QueryEventData),
    Xid(u64),
    Gtid(GtidEventData),
    MariadbGtid(MariadbGtidEventData),
    Heartbeat,
    /// 처리할 필요 없는 이벤트
    Ignored,
}

/// 완성된 Binlog 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinlogEvent {
    pub header: EventHeader,
    pub data: BinlogEventData,
}

/// Binlog 이벤트 파서
///
/// 마지막으로 본 FORMAT_DESCRIPTION 이벤트의 체크섬/post-header 정보를 유지한다.
#[derive(Debug, Clone)]
pub struct BinlogParser {
    checksum: ChecksumAlgorithm,
    format: Option<FormatDescriptionData>,
}

impl Default for BinlogParser {
    fn default() -> Self {
        BinlogParser::new(ChecksumAlgorithm::Off)
    }
}

impl BinlogParser {
    /// 첫 FDE 이전 이벤트(가짜 ROTATE)에 적용할 체크섬으로 생성
    pub fn new(checksum: ChecksumAlgorithm) -> Self {
        BinlogParser {
            checksum,
            format: None,
        }
    }

    pub fn checksum(&self) -> ChecksumAlgorithm {
        self.checksum
    }

    /// 이벤트 헤더 파싱
    pub fn parse_header(data: &[u8]) -> Result<EventHeader> {
        if data.len() < EVENT_HEADER_SIZE {
            return Err(CdcError::ProtocolError(format!(
                "Invalid event header: {} bytes",
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);
        Ok(EventHeader {
            timestamp: cursor.read_u32::<LittleEndian>()?,
            event_type: EventType::from_u8(cursor.read_u8()?),
            server_id: cursor.read_u32::<LittleEndian>()?,
            event_length: cursor.read_u32::<LittleEndian>()?,
            next_pos: cursor.read_u32::<LittleEndian>()?,
            flags: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// 이벤트 프레임 하나 파싱 (OK 바이트가 제거된 상태)
    pub fn parse(&mut self, frame: &[u8]) -> Result<BinlogEvent> {
        let header = Self::parse_header(frame)?;
        let type_code = frame[4];

        if header.event_type == EventType::FormatDescriptionEvent {
            let format = Self::parse_format_description(&frame[EVENT_HEADER_SIZE..])
                .map_err(|e| e.malformed("format description event"))?;
            debug!(
                "Format description: server={}, checksum={:?}",
                format.server_version, format.checksum
            );
            self.checksum = format.checksum;
            self.format = Some(format.clone());
            return Ok(BinlogEvent {
                header,
                data: BinlogEventData::FormatDescription(format),
            });
        }

        let trailer = self.checksum.trailer_len();
        if frame.len() < EVENT_HEADER_SIZE + trailer {
            return Err(CdcError::ProtocolError(format!(
                "event {:?} shorter than its checksum",
                header.event_type
            )));
        }
        let body = &frame[EVENT_HEADER_SIZE..frame.len() - trailer];

        let data = match header.event_type {
            EventType::RotateEvent => {
                BinlogEventData::Rotate(Self::parse_rotate_event(body).map_err(|e| e.malformed("rotate event"))?)
            }
            EventType::TableMapEvent => BinlogEventData::TableMap(
                Self::parse_table_map_event(body, self.table_id_size(type_code))
                    .map_err(|e| e.malformed("table map event"))?,
            ),
            EventType::WriteRowsEventV1
            | EventType::UpdateRowsEventV1
            | EventType::DeleteRowsEventV1
            | EventType::WriteRowsEvent
            | EventType::UpdateRowsEvent
            | EventType::DeleteRowsEvent => BinlogEventData::Rows(
                Self::parse_rows_event(header.event_type, body, self.table_id_size(type_code))
                    .map_err(|e| e.malformed("rows event"))?,
            ),
            EventType::QueryEvent => BinlogEventData::Query(
                Self::parse_query_event(body, self.post_header_len(type_code).unwrap_or(13))
                    .map_err(|e| e.malformed("query event"))?,
            ),
            EventType::XidEvent => {
                let mut cursor = Cursor::new(body);
                let xid = cursor
                    .read_u64::<LittleEndian>()
                    .map_err(|e| CdcError::from(e).malformed("xid event"))?;
                BinlogEventData::Xid(xid)
            }
            EventType::GtidEvent => {
                BinlogEventData::Gtid(Self::parse_gtid_event(body).map_err(|e| e.malformed("GTID event"))?)
            }
            EventType::MariadbGtidEvent => BinlogEventData::MariadbGtid(
                Self::parse_mariadb_gtid_event(body).map_err(|e| e.malformed("MariaDB GTID event"))?,
            ),
            EventType::HeartbeatEvent | EventType::HeartbeatEventV2 => BinlogEventData::Heartbeat,
            EventType::TransactionPayloadEvent => {
                return Err(CdcError::ProtocolError(
                    "compressed transaction payloads are not supported (binlog_transaction_compression)"
                        .to_string(),
                ))
            }
            EventType::PartialUpdateRowsEvent => {
                return Err(CdcError::ProtocolError(
                    "partial JSON updates are not supported (binlog_row_value_options)".to_string(),
                ))
            }
            EventType::Unknown(code) => {
                warn!("Skipping unknown binlog event type {}", code);
                BinlogEventData::Ignored
            }
            _ => BinlogEventData::Ignored,
        };

        Ok(BinlogEvent { header, data })
    }

    fn post_header_len(&self, event_type: u8) -> Option<u8> {
        self.format.as_ref().and_then(|f| f.post_header_len(event_type))
    }

    /// post-header 길이가 6이면 table_id 는 4바이트 (구버전 포맷)
    fn table_id_size(&self, event_type: u8) -> usize {
        match self.post_header_len(event_type) {
            Some(6) => 4,
            _ => 6,
        }
    }

    /// FORMAT_DESCRIPTION 이벤트 파싱 (15). body 는 헤더를 제외한 전체.
    pub fn parse_format_description(body: &[u8]) -> Result<FormatDescriptionData> {
        let mut cursor = Cursor::new(body);
        let binlog_version = cursor.read_u16::<LittleEndian>()?;
        let mut version = [0u8; 50];
        cursor.read_exact(&mut version)?;
        let server_version = String::from_utf8_lossy(&version)
            .trim_end_matches('\0')
            .to_string();
        let _create_timestamp = cursor.read_u32::<LittleEndian>()?;
        let header_length = cursor.read_u8()?;

        let (end, checksum) = if version_has_checksum(&server_version) {
            // post-header 배열 뒤: 알고리즘(1) + CRC 자리(4)
            let alg_at = body.len().checked_sub(CHECKSUM_SIZE + 1).ok_or_else(|| {
                CdcError::ProtocolError("format description event too short".to_string())
            })?;
            (alg_at, ChecksumAlgorithm::from_u8(body[alg_at]))
        } else {
            (body.len(), ChecksumAlgorithm::Off)
        };

        if end < FDE_FIXED_SIZE {
            return Err(CdcError::ProtocolError(
                "format description event too short".to_string(),
            ));
        }

        Ok(FormatDescriptionData {
            binlog_version,
            server_version,
            header_length,
            post_header_lengths: body[FDE_FIXED_SIZE..end].to_vec(),
            checksum,
        })
    }

    /// ROTATE 이벤트 파싱 (4)
    pub fn parse_rotate_event(body: &[u8]) -> Result<RotateEventData> {
        let mut cursor = Cursor::new(body);
        let position = cursor.read_u64::<LittleEndian>()?;
        let next_binlog_name = String::from_utf8_lossy(&body[8..]).to_string();
        if next_binlog_name.is_empty() {
            return Err(CdcError::ProtocolError("rotate event without file name".to_string()));
        }

        Ok(RotateEventData {
            next_binlog_name,
            position,
        })
    }

    /// 테이블 맵 이벤트 파싱 (19)
    pub fn parse_table_map_event(body: &[u8], table_id_size: usize) -> Result<TableMapData> {
        let mut cursor = Cursor::new(body);

        let table_id = read_table_id(&mut cursor, table_id_size)?;
        let flags = cursor.read_u16::<LittleEndian>()?;

        let schema = read_short_name(&mut cursor)?;
        let table = read_short_name(&mut cursor)?;

        let column_count = read_length(&mut cursor)?;
        let column_types = read_vec(&mut cursor, column_count)?;

        let metadata_len = read_length(&mut cursor)?;
        let metadata = read_vec(&mut cursor, metadata_len)?;
        let column_meta = parse_column_meta(&column_types, &metadata)?;

        let nullable_bitmap = read_vec(&mut cursor, column_count.div_ceil(8))?;

        let rest = &body[cursor.position() as usize..];
        let optional = parse_optional_metadata(rest)?;

        Ok(TableMapData {
            table_id,
            flags,
            schema,
            table,
            column_types,
            column_meta,
            nullable_bitmap,
            optional,
        })
    }

    /// WRITE/UPDATE/DELETE_ROWS 이벤트 헤더 파싱
    pub fn parse_rows_event(event_type: EventType, body: &[u8], table_id_size: usize) -> Result<RowsEventData> {
        let mut cursor = Cursor::new(body);

        let table_id = read_table_id(&mut cursor, table_id_size)?;
        let flags = cursor.read_u16::<LittleEndian>()?;

        if event_type.has_extra_row_data() {
            // 길이 필드 자체 2바이트 포함
            let extra_len = cursor.read_u16::<LittleEndian>()? as usize;
            let skip = extra_len.checked_sub(2).ok_or_else(|| {
                CdcError::ProtocolError(format!("invalid extra row data length {}", extra_len))
            })?;
            cursor.set_position(cursor.position() + skip as u64);
        }

        let column_count = read_length(&mut cursor)?;
        let bitmap_len = column_count.div_ceil(8);

        let columns_present = read_vec(&mut cursor, bitmap_len)?;

        let columns_present_after = if event_type.operation() == Some(crate::events::OperationType::Update) {
            Some(read_vec(&mut cursor, bitmap_len)?)
        } else {
            None
        };

        let start = cursor.position() as usize;
        if start > body.len() {
            return Err(CdcError::ProtocolError("rows event header exceeds body".to_string()));
        }

        Ok(RowsEventData {
            event_type,
            table_id,
            flags,
            column_count,
            columns_present,
            columns_present_after,
            rows: Bytes::copy_from_slice(&body[start..]),
        })
    }

    /// QUERY 이벤트 파싱 (2)
    pub fn parse_query_event(body: &[u8], post_header_len: u8) -> Result<QueryEventData> {
        let mut cursor = Cursor::new(body);

        let thread_id = cursor.read_u32::<LittleEndian>()?;
        let exec_time = cursor.read_u32::<LittleEndian>()?;
        let schema_len = cursor.read_u8()? as usize;
        let error_code = cursor.read_u16::<LittleEndian>()?;
        let status_len = cursor.read_u16::<LittleEndian>()? as usize;

        // 13바이트 이후 post-header 확장분과 status 변수 건너뜀
        let skip = (post_header_len as usize).saturating_sub(13) + status_len;
        cursor.set_position(cursor.position() + skip as u64);

        let schema = read_vec(&mut cursor, schema_len)?;
        cursor.read_u8()?;

        let start = (cursor.position() as usize).min(body.len());
        Ok(QueryEventData {
            thread_id,
            exec_time,
            error_code,
            schema: String::from_utf8_lossy(&schema).to_string(),
            query: String::from_utf8_lossy(&body[start..]).to_string(),
        })
    }

    /// GTID 이벤트 파싱 (33)
    pub fn parse_gtid_event(body: &[u8]) -> Result<GtidEventData> {
        let mut cursor = Cursor::new(body);

        let flags = cursor.read_u8()?;
        let mut uuid_bytes = [0u8; 16];
        cursor.read_exact(&mut uuid_bytes)?;
        let sequence = cursor.read_u64::<LittleEndian>()?;

        Ok(GtidEventData {
            flags,
            uuid: Uuid::from_bytes(uuid_bytes),
            sequence,
        })
    }

    /// MariaDB GTID 이벤트 파싱 (162)
    pub fn parse_mariadb_gtid_event(body: &[u8]) -> Result<MariadbGtidEventData> {
        let mut cursor = Cursor::new(body);
        Ok(MariadbGtidEventData {
            sequence: cursor.read_u64::<LittleEndian>()?,
            domain_id: cursor.read_u32::<LittleEndian>()?,
            flags: cursor.read_u8()?,
        })
    }
}

/// 서버 버전 문자열이 5.6.1 이상인지 (MariaDB 10.x 포함)
fn version_has_checksum(version: &str) -> bool {
    let mut parts = version
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>().unwrap_or(0));
    let parsed = (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    );
    parsed >= CHECKSUM_VERSION
}

/// Length-encoded integer (packed integer)
pub(crate) fn read_lenenc(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    let byte = cursor.read_u8()?;
    match byte {
        0..=0xfa => Ok(byte as u64),
        0xfb => Ok(0),
        0xfc => Ok(cursor.read_u16::<LittleEndian>()? as u64),
        0xfd => Ok(cursor.read_u24::<LittleEndian>()? as u64),
        0xfe => Ok(cursor.read_u64::<LittleEndian>()?),
        0xff => Err(CdcError::ProtocolError("Invalid length-encoded integer".to_string())),
    }
}

/// 길이 값으로 쓰이는 packed integer. 남은 바이트보다 클 수 없다.
fn read_length(cursor: &mut Cursor<&[u8]>) -> Result<usize> {
    let len = read_lenenc(cursor)?;
    let remaining = cursor.get_ref().len().saturating_sub(cursor.position() as usize);
    match usize::try_from(len) {
        Ok(len) if len <= remaining => Ok(len),
        _ => Err(CdcError::ProtocolError(format!(
            "length {} exceeds remaining {} bytes",
            len, remaining
        ))),
    }
}

/// 남은 바이트가 충분할 때만 len 바이트를 복사한다
pub(crate) fn read_vec(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let data: &[u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    let bytes = start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| {
            CdcError::ProtocolError(format!(
                "length {} exceeds remaining {} bytes",
                len,
                data.len().saturating_sub(start)
            ))
        })?;
    cursor.set_position((start + len) as u64);
    Ok(bytes.to_vec())
}

fn read_table_id(cursor: &mut Cursor<&[u8]>, size: usize) -> Result<u64> {
    Ok(match size {
        4 => cursor.read_u32::<LittleEndian>()? as u64,
        _ => cursor.read_u48::<LittleEndian>()?,
    })
}

/// 길이(1) + 이름 + NUL
fn read_short_name(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cursor.read_u8()? as usize;
    let bytes = read_vec(cursor, len)?;
    cursor.read_u8()?;
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

/// 컬럼 타입별 메타데이터 워드
///
/// STRING/ENUM/SET/NEWDECIMAL 은 (첫 바이트 << 8) | 둘째 바이트,
/// VARCHAR/BIT 는 리틀엔디언 2바이트, 나머지는 1바이트 또는 없음.
fn parse_column_meta(column_types: &[u8], metadata: &[u8]) -> Result<Vec<u16>> {
    use crate::value::ColumnType;

    let mut cursor = Cursor::new(metadata);
    let mut result = Vec::with_capacity(column_types.len());
    for &code in column_types {
        let column_type = ColumnType::from_u8(code);
        let meta = match column_type {
            ColumnType::VarChar | ColumnType::VarString | ColumnType::Bit => {
                cursor.read_u16::<LittleEndian>()?
            }
            ColumnType::NewDecimal | ColumnType::String | ColumnType::Enum | ColumnType::Set => {
                let first = cursor.read_u8()? as u16;
                let second = cursor.read_u8()? as u16;
                (first << 8) | second
            }
            _ => match column_type.metadata_len() {
                1 => cursor.read_u8()? as u16,
                _ => 0,
            },
        };
        result.push(meta);
    }
    Ok(result)
}

/// 옵션 메타데이터 TLV: type(1) + length(packed) + value
fn parse_optional_metadata(data: &[u8]) -> Result<OptionalMetadata> {
    const SIGNEDNESS: u8 = 1;
    const DEFAULT_CHARSET: u8 = 2;
    const COLUMN_CHARSET: u8 = 3;
    const COLUMN_NAME: u8 = 4;
    const SET_STR_VALUE: u8 = 5;
    const ENUM_STR_VALUE: u8 = 6;
    const SIMPLE_PRIMARY_KEY: u8 = 8;
    const PRIMARY_KEY_WITH_PREFIX: u8 = 9;

    let mut optional = OptionalMetadata::default();
    let mut cursor = Cursor::new(data);

    while (cursor.position() as usize) < data.len() {
        let field_type = cursor.read_u8()?;
        let len = read_length(&mut cursor)?;
        let value = read_vec(&mut cursor, len).map_err(|_| {
            CdcError::ProtocolError(format!("optional metadata field {} truncated", field_type))
        })?;

        let mut field = Cursor::new(value.as_slice());
        match field_type {
            SIGNEDNESS => optional.signedness = value.to_vec(),
            DEFAULT_CHARSET => {
                let collation = read_lenenc(&mut field)? as u32;
                let mut overrides = Vec::new();
                while (field.position() as usize) < value.len() {
                    let index = read_lenenc(&mut field)? as usize;
                    let collation = read_lenenc(&mut field)? as u32;
                    overrides.push((index, collation));
                }
                optional.default_charset = Some(DefaultCharset { collation, overrides });
            }
            COLUMN_CHARSET => {
                while (field.position() as usize) < value.len() {
                    optional.column_charsets.push(read_lenenc(&mut field)? as u32);
                }
            }
            COLUMN_NAME => {
                while (field.position() as usize) < value.len() {
                    optional.column_names.push(read_packed_string(&mut field)?);
                }
            }
            SET_STR_VALUE | ENUM_STR_VALUE => {
                let mut columns = Vec::new();
                while (field.position() as usize) < value.len() {
                    let count = read_length(&mut field)?;
                    let mut labels = Vec::new();
                    for _ in 0..count {
                        labels.push(read_packed_string(&mut field)?);
                    }
                    columns.push(labels);
                }
                if field_type == SET_STR_VALUE {
                    optional.set_values = columns;
                } else {
                    optional.enum_values = columns;
                }
            }
            SIMPLE_PRIMARY_KEY => {
                while (field.position() as usize) < value.len() {
                    optional.primary_key.push(read_lenenc(&mut field)? as usize);
                }
            }
            PRIMARY_KEY_WITH_PREFIX => {
                while (field.position() as usize) < value.len() {
                    optional.primary_key.push(read_lenenc(&mut field)? as usize);
                    let _prefix = read_lenenc(&mut field)?;
                }
            }
            // GEOMETRY_TYPE, ENUM_AND_SET charset, COLUMN_VISIBILITY 등
            _ => {}
        }
    }

    Ok(optional)
}

fn read_packed_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = read_length(cursor)?;
    let bytes = read_vec(cursor, len)?;
    Ok(String::from_utf8_lossy(&bytes).to_string())
}
