//! table_id -> 테이블 구조 캐시
//!
//! TABLE_MAP 이벤트가 row 이벤트보다 먼저 오며, 같은 table_id 는
//! 새 TABLE_MAP 이 오거나 binlog 파일이 바뀔 때까지 유효하다.

use crate::binlog::{OptionalMetadata, TableMapData};
use crate::error::{CdcError, Result};
use crate::value::{ColumnType, BINARY_COLLATION};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 디코딩에 필요한 컬럼 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// STRING 으로 기록된 ENUM/SET 은 실제 타입으로 풀어둔다
    pub column_type: ColumnType,
    /// STRING: 최대 바이트 길이, ENUM/SET: 저장 바이트 수, 그 외: table map 메타 그대로
    pub meta: u16,
    pub nullable: bool,
    pub unsigned: bool,
    /// 콜레이션 ID (문자 컬럼만)
    pub charset: Option<u32>,
    pub enum_values: Vec<String>,
    pub set_values: Vec<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, column_type: ColumnType, meta: u16) -> Self {
        ColumnDescriptor {
            name: name.into(),
            column_type,
            meta,
            nullable: true,
            unsigned: false,
            charset: None,
            enum_values: Vec::new(),
            set_values: Vec::new(),
        }
    }

    /// BINARY/VARBINARY/BLOB 처럼 바이트로 넘겨야 하는 컬럼인지
    pub fn is_binary(&self) -> bool {
        match self.charset {
            Some(collation) => collation == BINARY_COLLATION,
            None => self.column_type.is_blob(),
        }
    }
}

/// STRING 타입 메타에서 실제 타입과 길이를 분리
///
/// 길이가 255 를 넘으면 상위 2비트가 타입 바이트의 0x30 자리에 반전되어 들어간다.
fn resolve_string_meta(meta: u16) -> (ColumnType, u16) {
    let first = (meta >> 8) as u8;
    let second = meta & 0xff;
    let (real_type, max_len) = if first & 0x30 != 0x30 {
        (
            first | 0x30,
            second | ((((first & 0x30) ^ 0x30) as u16) << 4),
        )
    } else {
        (first, second)
    };

    match ColumnType::from_u8(real_type) {
        ColumnType::Enum => (ColumnType::Enum, second),
        ColumnType::Set => (ColumnType::Set, second),
        _ => (ColumnType::String, max_len),
    }
}

/// 캐시되는 테이블 하나의 구조
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadataEntry {
    pub table_id: u64,
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    /// 기본 키 컬럼 인덱스
    pub primary_key: Vec<usize>,
}

impl TableMetadataEntry {
    pub fn from_table_map(map: &TableMapData) -> Self {
        let mut columns: Vec<ColumnDescriptor> = map
            .column_types
            .iter()
            .zip(map.column_meta.iter())
            .enumerate()
            .map(|(idx, (&code, &meta))| {
                let (column_type, meta) = match ColumnType::from_u8(code) {
                    ColumnType::String => resolve_string_meta(meta),
                    other => (other, meta),
                };
                let mut column = ColumnDescriptor::new(format!("@{}", idx + 1), column_type, meta);
                column.nullable = bit_is_set(&map.nullable_bitmap, idx);
                column
            })
            .collect();

        apply_optional_metadata(&mut columns, &map.optional);

        TableMetadataEntry {
            table_id: map.table_id,
            schema: map.schema.clone(),
            table: map.table.clone(),
            columns,
            primary_key: map.optional.primary_key.clone(),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

fn bit_is_set(bitmap: &[u8], idx: usize) -> bool {
    bitmap
        .get(idx / 8)
        .map(|byte| byte & (1 << (idx % 8)) != 0)
        .unwrap_or(false)
}

fn apply_optional_metadata(columns: &mut [ColumnDescriptor], optional: &OptionalMetadata) {
    for (column, name) in columns.iter_mut().zip(optional.column_names.iter()) {
        column.name = name.clone();
    }

    // SIGNEDNESS: 숫자 컬럼 순서대로 MSB 부터 1비트, 1 = UNSIGNED
    for (ordinal, column) in columns
        .iter_mut()
        .filter(|c| c.column_type.is_numeric())
        .enumerate()
    {
        column.unsigned = optional
            .signedness
            .get(ordinal / 8)
            .map(|byte| byte & (0x80 >> (ordinal % 8)) != 0)
            .unwrap_or(false);
    }

    let character_columns = columns
        .iter_mut()
        .filter(|c| c.column_type.is_character())
        .enumerate();
    if let Some(default) = &optional.default_charset {
        for (ordinal, column) in character_columns {
            let collation = default
                .overrides
                .iter()
                .find(|(index, _)| *index == ordinal)
                .map(|(_, collation)| *collation)
                .unwrap_or(default.collation);
            column.charset = Some(collation);
        }
    } else {
        for (ordinal, column) in character_columns {
            column.charset = optional.column_charsets.get(ordinal).copied();
        }
    }

    let enum_columns = columns
        .iter_mut()
        .filter(|c| c.column_type == ColumnType::Enum);
    for (column, labels) in enum_columns.zip(optional.enum_values.iter()) {
        column.enum_values = labels.clone();
    }

    let set_columns = columns
        .iter_mut()
        .filter(|c| c.column_type == ColumnType::Set);
    for (column, labels) in set_columns.zip(optional.set_values.iter()) {
        column.set_values = labels.clone();
    }
}

/// table_id 별 최신 테이블 구조
#[derive(Debug, Default)]
pub struct TableMetadataCache {
    tables: HashMap<u64, Arc<TableMetadataEntry>>,
}

impl TableMetadataCache {
    pub fn new() -> Self {
        TableMetadataCache {
            tables: HashMap::new(),
        }
    }

    /// TABLE_MAP 이벤트 반영. 같은 table_id 는 덮어쓴다.
    pub fn observe(&mut self, map: &TableMapData) -> Arc<TableMetadataEntry> {
        let entry = Arc::new(TableMetadataEntry::from_table_map(map));
        debug!(
            "Table map: {} -> {} ({} columns)",
            entry.table_id,
            entry.qualified_name(),
            entry.columns.len()
        );
        self.tables.insert(entry.table_id, entry.clone());
        entry
    }

    pub fn resolve(&self, table_id: u64) -> Result<Arc<TableMetadataEntry>> {
        self.tables
            .get(&table_id)
            .cloned()
            .ok_or(CdcError::UnknownTable { table_id })
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
