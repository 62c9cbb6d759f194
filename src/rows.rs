//! WRITE/UPDATE/DELETE_ROWS 본문 디코딩

use crate::binlog::RowsEventData;
use crate::error::{CdcError, Result};
use crate::events::{OperationType, RowImage};
use crate::table_map::TableMetadataEntry;
use crate::value::{decode_value, CellValue};
use std::io::{Cursor, Read};

/// 행 하나의 변경 전/후 이미지
#[derive(Debug, Clone, PartialEq)]
pub struct RowChange {
    pub before: Option<RowImage>,
    pub after: Option<RowImage>,
}

pub struct RowEventDecoder;

impl RowEventDecoder {
    /// 서버가 기록한 순서대로 행 변경을 돌려준다
    pub fn decode(rows: &RowsEventData, table: &TableMetadataEntry) -> Result<Vec<RowChange>> {
        let operation = rows.event_type.operation().ok_or_else(|| {
            CdcError::ProtocolError(format!("{:?} is not a rows event", rows.event_type))
        })?;

        if rows.column_count > table.columns.len() {
            return Err(CdcError::ProtocolError(format!(
                "rows event for {} has {} columns, table map has {}",
                table.qualified_name(),
                rows.column_count,
                table.columns.len()
            )));
        }

        let present_after = rows
            .columns_present_after
            .as_deref()
            .unwrap_or(&rows.columns_present);

        let mut cursor = Cursor::new(&rows.rows[..]);
        let mut changes = Vec::new();

        while (cursor.position() as usize) < rows.rows.len() {
            let change = match operation {
                OperationType::Insert => RowChange {
                    before: None,
                    after: Some(read_image(&mut cursor, table, rows.column_count, &rows.columns_present)?),
                },
                OperationType::Delete => RowChange {
                    before: Some(read_image(&mut cursor, table, rows.column_count, &rows.columns_present)?),
                    after: None,
                },
                OperationType::Update => {
                    let before = read_image(&mut cursor, table, rows.column_count, &rows.columns_present)?;
                    let after = read_image(&mut cursor, table, rows.column_count, present_after)?;
                    RowChange {
                        before: Some(before),
                        after: Some(after),
                    }
                }
            };
            changes.push(change);
        }

        Ok(changes)
    }
}

fn bit_is_set(bitmap: &[u8], idx: usize) -> bool {
    bitmap
        .get(idx / 8)
        .map(|byte| byte & (1 << (idx % 8)) != 0)
        .unwrap_or(false)
}

/// NULL 비트맵(present 컬럼 수만큼) + 값들
fn read_image(
    cursor: &mut Cursor<&[u8]>,
    table: &TableMetadataEntry,
    column_count: usize,
    present: &[u8],
) -> Result<RowImage> {
    let present_count = (0..column_count).filter(|&i| bit_is_set(present, i)).count();
    let mut null_bitmap = vec![0u8; (present_count + 7) / 8];
    cursor
        .read_exact(&mut null_bitmap)
        .map_err(|e| CdcError::from(e).malformed("rows event"))?;

    let mut image = RowImage::new();
    let mut ordinal = 0;
    for (idx, column) in table.columns.iter().enumerate().take(column_count) {
        if !bit_is_set(present, idx) {
            continue;
        }

        let value = if bit_is_set(&null_bitmap, ordinal) {
            CellValue::Null
        } else {
            decode_value(cursor, column).map_err(|e| e.malformed("rows event"))?
        };
        image.push(column.name.clone(), value);
        ordinal += 1;
    }

    Ok(image)
}
