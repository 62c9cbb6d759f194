//! 테스트용 binlog 프레임 / 프로토콜 패킷 생성기

use crate::binlog::ChecksumAlgorithm;
use crate::events::EventType;
use uuid::Uuid;

pub const SCRAMBLE: [u8; 20] = [
    0x15, 0x2a, 0x3f, 0x41, 0x56, 0x6b, 0x70, 0x05, 0x1a, 0x2f, 0x34, 0x49, 0x5e, 0x63, 0x78, 0x0d,
    0x12, 0x27, 0x3c, 0x51,
];

fn event_code(event_type: EventType) -> u8 {
    match event_type {
        EventType::WriteRowsEventV1 => 23,
        EventType::UpdateRowsEventV1 => 24,
        EventType::DeleteRowsEventV1 => 25,
        EventType::WriteRowsEvent => 30,
        EventType::UpdateRowsEvent => 31,
        EventType::DeleteRowsEvent => 32,
        other => panic!("no code for {:?}", other),
    }
}

/// 헤더 19바이트 + 본문
pub fn event(type_code: u8, timestamp: u32, next_pos: u32, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(19 + body.len());
    frame.extend_from_slice(&timestamp.to_le_bytes());
    frame.push(type_code);
    frame.extend_from_slice(&1u32.to_le_bytes());
    frame.extend_from_slice(&((19 + body.len()) as u32).to_le_bytes());
    frame.extend_from_slice(&next_pos.to_le_bytes());
    frame.extend_from_slice(&0u16.to_le_bytes());
    frame.extend_from_slice(body);
    frame
}

/// CRC 자리 4바이트를 붙이고 길이 필드를 고친다 (값은 검증하지 않음)
pub fn with_checksum(mut frame: Vec<u8>) -> Vec<u8> {
    frame.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    let len = (frame.len() as u32).to_le_bytes();
    frame[9..13].copy_from_slice(&len);
    frame
}

pub fn format_description(version: &str, checksum: ChecksumAlgorithm) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&4u16.to_le_bytes());
    let mut server_version = [0u8; 50];
    server_version[..version.len()].copy_from_slice(version.as_bytes());
    body.extend_from_slice(&server_version);
    body.extend_from_slice(&0u32.to_le_bytes());
    body.push(19);

    let mut post_header = vec![0u8; 41];
    post_header[2 - 1] = 13;
    post_header[4 - 1] = 8;
    post_header[15 - 1] = 98;
    post_header[19 - 1] = 8;
    for code in 23..=25 {
        post_header[code - 1] = 8;
    }
    for code in 30..=32 {
        post_header[code - 1] = 10;
    }
    post_header[33 - 1] = 42;
    body.extend_from_slice(&post_header);

    body.push(match checksum {
        ChecksumAlgorithm::Off => 0,
        ChecksumAlgorithm::Crc32 => 1,
    });
    body.extend_from_slice(&[0u8; 4]);
    event(15, 0, 0, &body)
}

pub fn rotate_event(name: &str, position: u64) -> Vec<u8> {
    let mut body = position.to_le_bytes().to_vec();
    body.extend_from_slice(name.as_bytes());
    event(4, 0, 0, &body)
}

pub fn xid_event(xid: u64, timestamp: u32, next_pos: u32) -> Vec<u8> {
    event(16, timestamp, next_pos, &xid.to_le_bytes())
}

pub fn query_event(schema: &str, sql: &str, next_pos: u32) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&1u32.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());
    body.push(schema.len() as u8);
    body.extend_from_slice(&0u16.to_le_bytes());
    body.extend_from_slice(&0u16.to_le_bytes());
    body.extend_from_slice(schema.as_bytes());
    body.push(0);
    body.extend_from_slice(sql.as_bytes());
    event(2, 0, next_pos, &body)
}

pub fn gtid_event(uuid: Uuid, sequence: u64) -> Vec<u8> {
    let mut body = vec![0x01];
    body.extend_from_slice(uuid.as_bytes());
    body.extend_from_slice(&sequence.to_le_bytes());
    // logical timestamp 블록
    body.push(0x02);
    body.extend_from_slice(&[0u8; 16]);
    event(33, 0, 0, &body)
}

/// app.users (id INT, name VARCHAR(255) utf8mb4 NULL, color ENUM('red','green','blue'))
pub struct TableSpec {
    pub table_id: u64,
    pub schema: &'static str,
    pub table: &'static str,
    pub column_types: Vec<u8>,
    pub metadata: Vec<u8>,
    pub nullable: Vec<u8>,
    pub optional: Vec<u8>,
}

impl TableSpec {
    pub fn users() -> Self {
        let mut optional = Vec::new();
        // SIGNEDNESS: id 는 signed
        optional.extend_from_slice(&[1, 1, 0x00]);
        // DEFAULT_CHARSET: utf8mb4_0900_ai_ci (255)
        optional.extend_from_slice(&[2, 3, 0xfc, 0xff, 0x00]);
        // COLUMN_NAME
        let names = b"\x02id\x04name\x05color";
        optional.push(4);
        optional.push(names.len() as u8);
        optional.extend_from_slice(names);
        // ENUM_STR_VALUE
        let labels = b"\x03\x03red\x05green\x04blue";
        optional.push(6);
        optional.push(labels.len() as u8);
        optional.extend_from_slice(labels);
        // SIMPLE_PRIMARY_KEY
        optional.extend_from_slice(&[8, 1, 0]);

        TableSpec {
            table_id: 108,
            schema: "app",
            table: "users",
            column_types: vec![3, 15, 254],
            metadata: vec![0xfc, 0x03, 0xf7, 0x01],
            nullable: vec![0b010],
            optional,
        }
    }

    /// NULL 비트맵 + id + name + color 인덱스
    pub fn user_row(id: i32, name: Option<&str>, color: u8) -> Vec<u8> {
        let mut row = vec![if name.is_none() { 0b010 } else { 0 }];
        row.extend_from_slice(&id.to_le_bytes());
        if let Some(name) = name {
            row.extend_from_slice(&(name.len() as u16).to_le_bytes());
            row.extend_from_slice(name.as_bytes());
        }
        row.push(color);
        row
    }
}

pub fn table_map_event(spec: &TableSpec) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&spec.table_id.to_le_bytes()[..6]);
    body.extend_from_slice(&1u16.to_le_bytes());
    body.push(spec.schema.len() as u8);
    body.extend_from_slice(spec.schema.as_bytes());
    body.push(0);
    body.push(spec.table.len() as u8);
    body.extend_from_slice(spec.table.as_bytes());
    body.push(0);
    body.push(spec.column_types.len() as u8);
    body.extend_from_slice(&spec.column_types);
    body.push(spec.metadata.len() as u8);
    body.extend_from_slice(&spec.metadata);
    body.extend_from_slice(&spec.nullable);
    body.extend_from_slice(&spec.optional);
    event(19, 0, 0, &body)
}

/// 모든 컬럼이 present 인 rows 이벤트
pub fn rows_event(event_type: EventType, table_id: u64, column_count: usize, rows: &[u8]) -> Vec<u8> {
    rows_event_at(event_type, table_id, column_count, rows, 1_700_000_000, 0)
}

pub fn rows_event_at(
    event_type: EventType,
    table_id: u64,
    column_count: usize,
    rows: &[u8],
    timestamp: u32,
    next_pos: u32,
) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&table_id.to_le_bytes()[..6]);
    body.extend_from_slice(&1u16.to_le_bytes());
    if event_type.has_extra_row_data() {
        body.extend_from_slice(&2u16.to_le_bytes());
    }
    body.push(column_count as u8);

    let bitmap_len = (column_count + 7) / 8;
    let mut present = vec![0xffu8; bitmap_len];
    if column_count % 8 != 0 {
        present[bitmap_len - 1] = (1u8 << (column_count % 8)) - 1;
    }
    body.extend_from_slice(&present);
    if event_type == EventType::UpdateRowsEvent || event_type == EventType::UpdateRowsEventV1 {
        body.extend_from_slice(&present);
    }
    body.extend_from_slice(rows);
    event(event_code(event_type), timestamp, next_pos, &body)
}

/// 서버 -> 클라이언트 binlog 스트림 패킷 (OK 바이트 + 이벤트)
pub fn binlog_packet(frame: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x00];
    packet.extend_from_slice(frame);
    packet
}

pub fn greeting(version: &str, plugin: &str) -> Vec<u8> {
    let mut packet = vec![10];
    packet.extend_from_slice(version.as_bytes());
    packet.push(0);
    packet.extend_from_slice(&42u32.to_le_bytes());
    packet.extend_from_slice(&SCRAMBLE[..8]);
    packet.push(0);
    // capabilities lower: PROTOCOL_41 | SECURE_CONNECTION | LONG_PASSWORD
    packet.extend_from_slice(&(0x8201u16).to_le_bytes());
    packet.push(45);
    packet.extend_from_slice(&2u16.to_le_bytes());
    // capabilities upper: PLUGIN_AUTH
    packet.extend_from_slice(&(0x0008u16).to_le_bytes());
    packet.push(21);
    packet.extend_from_slice(&[0u8; 10]);
    packet.extend_from_slice(&SCRAMBLE[8..]);
    packet.push(0);
    packet.extend_from_slice(plugin.as_bytes());
    packet.push(0);
    packet
}

pub fn ok_packet() -> Vec<u8> {
    vec![0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00]
}

pub fn eof_packet() -> Vec<u8> {
    vec![0xfe, 0x00, 0x00, 0x02, 0x00]
}

pub fn err_packet(code: u16, message: &str) -> Vec<u8> {
    let mut packet = vec![0xff];
    packet.extend_from_slice(&code.to_le_bytes());
    packet.extend_from_slice(b"#HY000");
    packet.extend_from_slice(message.as_bytes());
    packet
}

pub fn auth_switch(plugin: &str, nonce: &[u8]) -> Vec<u8> {
    let mut packet = vec![0xfe];
    packet.extend_from_slice(plugin.as_bytes());
    packet.push(0);
    packet.extend_from_slice(nonce);
    packet.push(0);
    packet
}
