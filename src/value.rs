//! MySQL 컬럼 값 디코딩
//!
//! row 이벤트의 바이너리 값을 `CellValue` 로 변환한다.
//! 각 함수는 커서와 컬럼 정보만 받는 순수 함수다.

use crate::error::{CdcError, Result};
use crate::table_map::ColumnDescriptor;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::io::{Cursor, Read};

/// `binary` 콜레이션 ID. BINARY/VARBINARY/BLOB 컬럼이 사용한다.
pub const BINARY_COLLATION: u32 = 63;

/// MySQL 컬럼 타입 (enum_field_types)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Decimal,
    Tiny,
    Short,
    Long,
    Float,
    Double,
    Null,
    Timestamp,
    LongLong,
    Int24,
    Date,
    Time,
    DateTime,
    Year,
    NewDate,
    VarChar,
    Bit,
    Timestamp2,
    DateTime2,
    Time2,
    Json,
    NewDecimal,
    Enum,
    Set,
    TinyBlob,
    MediumBlob,
    LongBlob,
    Blob,
    VarString,
    String,
    Geometry,
    Unknown(u8),
}

impl ColumnType {
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => ColumnType::Decimal,
            1 => ColumnType::Tiny,
            2 => ColumnType::Short,
            3 => ColumnType::Long,
            4 => ColumnType::Float,
            5 => ColumnType::Double,
            6 => ColumnType::Null,
            7 => ColumnType::Timestamp,
            8 => ColumnType::LongLong,
            9 => ColumnType::Int24,
            10 => ColumnType::Date,
            11 => ColumnType::Time,
            12 => ColumnType::DateTime,
            13 => ColumnType::Year,
            14 => ColumnType::NewDate,
            15 => ColumnType::VarChar,
            16 => ColumnType::Bit,
            17 => ColumnType::Timestamp2,
            18 => ColumnType::DateTime2,
            19 => ColumnType::Time2,
            245 => ColumnType::Json,
            246 => ColumnType::NewDecimal,
            247 => ColumnType::Enum,
            248 => ColumnType::Set,
            249 => ColumnType::TinyBlob,
            250 => ColumnType::MediumBlob,
            251 => ColumnType::LongBlob,
            252 => ColumnType::Blob,
            253 => ColumnType::VarString,
            254 => ColumnType::String,
            255 => ColumnType::Geometry,
            other => ColumnType::Unknown(other),
        }
    }

    /// table map 메타데이터 블록에서 이 타입이 차지하는 바이트 수
    pub fn metadata_len(&self) -> usize {
        match self {
            ColumnType::Float
            | ColumnType::Double
            | ColumnType::TinyBlob
            | ColumnType::MediumBlob
            | ColumnType::LongBlob
            | ColumnType::Blob
            | ColumnType::Json
            | ColumnType::Geometry
            | ColumnType::Timestamp2
            | ColumnType::DateTime2
            | ColumnType::Time2 => 1,
            ColumnType::VarChar
            | ColumnType::VarString
            | ColumnType::Bit
            | ColumnType::NewDecimal
            | ColumnType::String
            | ColumnType::Enum
            | ColumnType::Set => 2,
            _ => 0,
        }
    }

    /// SIGNEDNESS 메타데이터가 비트를 할당하는 타입
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Tiny
                | ColumnType::Short
                | ColumnType::Int24
                | ColumnType::Long
                | ColumnType::LongLong
                | ColumnType::NewDecimal
                | ColumnType::Float
                | ColumnType::Double
        )
    }

    /// CHARSET 메타데이터가 값을 할당하는 타입 (ENUM/SET 제외)
    pub fn is_character(&self) -> bool {
        matches!(
            self,
            ColumnType::String
                | ColumnType::VarString
                | ColumnType::VarChar
                | ColumnType::Blob
                | ColumnType::TinyBlob
                | ColumnType::MediumBlob
                | ColumnType::LongBlob
        )
    }

    pub fn is_blob(&self) -> bool {
        matches!(
            self,
            ColumnType::Blob | ColumnType::TinyBlob | ColumnType::MediumBlob | ColumnType::LongBlob
        )
    }
}

/// 부호 있는 TIME 값 (-838:59:59 ~ 838:59:59)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MysqlTime {
    pub negative: bool,
    pub hours: u32,
    pub minutes: u8,
    pub seconds: u8,
    pub microseconds: u32,
}

impl MysqlTime {
    /// MySQL 내부 packed 표현 ((hms << 24) + 마이크로초) 에서 변환
    pub fn from_packed(packed: i64) -> Self {
        let negative = packed < 0;
        let magnitude = packed.unsigned_abs();
        let hms = magnitude >> 24;
        MysqlTime {
            negative,
            hours: ((hms >> 12) % 1024) as u32,
            minutes: ((hms >> 6) % 64) as u8,
            seconds: (hms % 64) as u8,
            microseconds: (magnitude % (1 << 24)) as u32,
        }
    }
}

impl fmt::Display for MysqlTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)?;
        if self.microseconds > 0 {
            write!(f, ".{:06}", self.microseconds)?;
        }
        Ok(())
    }
}

impl Serialize for MysqlTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 셀 값
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    /// 부호 있는 정수 (TINYINT ~ BIGINT)
    Int(i64),
    /// UNSIGNED 정수, 실제 크기 그대로
    UInt(u64),
    Float(f32),
    Double(f64),
    Decimal(String),
    String(String),
    Bytes(Vec<u8>),
    Bit(u64),
    Enum(String),
    Set(Vec<String>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    Time(MysqlTime),
    Year(u16),
    Json(serde_json::Value),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(v) => Some(*v),
            CellValue::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            CellValue::UInt(v) | CellValue::Bit(v) => Some(*v),
            CellValue::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) | CellValue::Decimal(s) | CellValue::Enum(s) => Some(s),
            _ => None,
        }
    }
}

/// 컬럼 하나의 값을 읽는다. NULL 비트맵 처리는 호출자 몫이다.
pub fn decode_value(cursor: &mut Cursor<&[u8]>, column: &ColumnDescriptor) -> Result<CellValue> {
    let meta = column.meta;
    let value = match column.column_type {
        ColumnType::Null => CellValue::Null,
        ColumnType::Tiny => {
            if column.unsigned {
                CellValue::UInt(cursor.read_u8()? as u64)
            } else {
                CellValue::Int(cursor.read_i8()? as i64)
            }
        }
        ColumnType::Short => {
            if column.unsigned {
                CellValue::UInt(cursor.read_u16::<LittleEndian>()? as u64)
            } else {
                CellValue::Int(cursor.read_i16::<LittleEndian>()? as i64)
            }
        }
        ColumnType::Int24 => {
            if column.unsigned {
                CellValue::UInt(cursor.read_u24::<LittleEndian>()? as u64)
            } else {
                CellValue::Int(cursor.read_i24::<LittleEndian>()? as i64)
            }
        }
        ColumnType::Long => {
            if column.unsigned {
                CellValue::UInt(cursor.read_u32::<LittleEndian>()? as u64)
            } else {
                CellValue::Int(cursor.read_i32::<LittleEndian>()? as i64)
            }
        }
        ColumnType::LongLong => {
            if column.unsigned {
                CellValue::UInt(cursor.read_u64::<LittleEndian>()?)
            } else {
                CellValue::Int(cursor.read_i64::<LittleEndian>()?)
            }
        }
        ColumnType::Float => CellValue::Float(cursor.read_f32::<LittleEndian>()?),
        ColumnType::Double => CellValue::Double(cursor.read_f64::<LittleEndian>()?),
        ColumnType::Year => {
            let year = cursor.read_u8()?;
            CellValue::Year(if year == 0 { 0 } else { 1900 + year as u16 })
        }
        ColumnType::NewDecimal => {
            let precision = (meta >> 8) as usize;
            let scale = (meta & 0xff) as usize;
            CellValue::Decimal(decode_decimal(cursor, precision, scale)?)
        }
        ColumnType::Bit => {
            let bits = (meta & 0xff) as usize;
            let bytes = (meta >> 8) as usize;
            let len = bytes + usize::from(bits > 0);
            CellValue::Bit(read_be_uint(cursor, len)?)
        }
        ColumnType::VarChar | ColumnType::VarString | ColumnType::String => {
            let len = if meta < 256 {
                cursor.read_u8()? as usize
            } else {
                cursor.read_u16::<LittleEndian>()? as usize
            };
            let data = read_bytes(cursor, len)?;
            if column.is_binary() {
                CellValue::Bytes(data)
            } else {
                CellValue::String(into_text(data))
            }
        }
        ColumnType::Blob | ColumnType::TinyBlob | ColumnType::MediumBlob | ColumnType::LongBlob => {
            let len = read_le_uint(cursor, meta as usize)? as usize;
            let data = read_bytes(cursor, len)?;
            if column.is_binary() {
                CellValue::Bytes(data)
            } else {
                CellValue::String(into_text(data))
            }
        }
        ColumnType::Json => {
            let len = read_le_uint(cursor, meta as usize)? as usize;
            let data = read_bytes(cursor, len)?;
            CellValue::Json(json::decode(&data))
        }
        ColumnType::Geometry => {
            let len = read_le_uint(cursor, meta as usize)? as usize;
            CellValue::Bytes(read_bytes(cursor, len)?)
        }
        ColumnType::Enum => {
            let index = read_le_uint(cursor, meta.max(1) as usize)? as usize;
            let label = match index {
                0 => String::new(),
                n => column.enum_values.get(n - 1).cloned().ok_or_else(|| {
                    CdcError::ProtocolError(format!(
                        "enum index {} out of range for column {} ({} labels)",
                        n,
                        column.name,
                        column.enum_values.len()
                    ))
                })?,
            };
            CellValue::Enum(label)
        }
        ColumnType::Set => {
            let mask = read_le_uint(cursor, meta.max(1) as usize)?;
            let known = match column.set_values.len() {
                n if n >= 64 => u64::MAX,
                n => (1u64 << n) - 1,
            };
            if mask & !known != 0 {
                return Err(CdcError::ProtocolError(format!(
                    "set mask {:#x} has bits beyond the {} labels of column {}",
                    mask,
                    column.set_values.len(),
                    column.name
                )));
            }
            let members = column
                .set_values
                .iter()
                .enumerate()
                .filter(|(bit, _)| *bit < 64 && mask & (1u64 << bit) != 0)
                .map(|(_, label)| label.clone())
                .collect();
            CellValue::Set(members)
        }
        ColumnType::Date | ColumnType::NewDate => {
            let packed = cursor.read_u24::<LittleEndian>()?;
            let day = packed & 31;
            let month = (packed >> 5) & 15;
            let year = packed >> 9;
            NaiveDate::from_ymd_opt(year as i32, month, day)
                .map(CellValue::Date)
                .unwrap_or(CellValue::Null)
        }
        ColumnType::Time => {
            let raw = cursor.read_i24::<LittleEndian>()?;
            let magnitude = raw.unsigned_abs();
            CellValue::Time(MysqlTime {
                negative: raw < 0,
                hours: magnitude / 10_000,
                minutes: ((magnitude / 100) % 100) as u8,
                seconds: (magnitude % 100) as u8,
                microseconds: 0,
            })
        }
        ColumnType::DateTime => {
            let raw = cursor.read_u64::<LittleEndian>()?;
            let date = raw / 1_000_000;
            let time = raw % 1_000_000;
            NaiveDate::from_ymd_opt(
                (date / 10_000) as i32,
                ((date / 100) % 100) as u32,
                (date % 100) as u32,
            )
            .and_then(|d| {
                d.and_hms_opt(
                    (time / 10_000) as u32,
                    ((time / 100) % 100) as u32,
                    (time % 100) as u32,
                )
            })
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Null)
        }
        ColumnType::Timestamp => {
            let seconds = cursor.read_u32::<LittleEndian>()?;
            timestamp_value(seconds, 0)?
        }
        ColumnType::Timestamp2 => {
            let seconds = cursor.read_u32::<BigEndian>()?;
            let micros = read_fraction(cursor, meta)?;
            timestamp_value(seconds, micros)?
        }
        ColumnType::DateTime2 => {
            const DATETIMEF_INT_OFS: i64 = 0x80_0000_0000;
            let ymdhms = read_be_uint(cursor, 5)? as i64 - DATETIMEF_INT_OFS;
            let micros = read_fraction(cursor, meta)?;
            datetime_from_packed_parts(ymdhms, micros)
                .map(CellValue::DateTime)
                .unwrap_or(CellValue::Null)
        }
        ColumnType::Time2 => CellValue::Time(MysqlTime::from_packed(read_time2_packed(cursor, meta)?)),
        other => {
            return Err(CdcError::ProtocolError(format!(
                "unsupported column type {:?} for column {}",
                other, column.name
            )))
        }
    };
    Ok(value)
}

/// DECIMAL 바이너리 포맷 (9자리 당 4바이트, 부호 비트 반전)
pub fn decode_decimal(cursor: &mut Cursor<&[u8]>, precision: usize, scale: usize) -> Result<String> {
    const DIGITS_PER_WORD: usize = 9;
    const WORD_SIZE: usize = 4;
    const DIG_TO_BYTES: [usize; 10] = [0, 1, 1, 2, 2, 3, 3, 4, 4, 4];

    if scale > precision {
        return Err(CdcError::ProtocolError(format!(
            "invalid decimal metadata: precision={} scale={}",
            precision, scale
        )));
    }

    let integral = precision - scale;
    let int_words = integral / DIGITS_PER_WORD;
    let int_rest = integral % DIGITS_PER_WORD;
    let frac_words = scale / DIGITS_PER_WORD;
    let frac_rest = scale % DIGITS_PER_WORD;

    let size = int_words * WORD_SIZE
        + DIG_TO_BYTES[int_rest]
        + frac_words * WORD_SIZE
        + DIG_TO_BYTES[frac_rest];
    if size == 0 {
        return Ok("0".to_string());
    }

    let mut buf = read_bytes(cursor, size)?;
    let negative = buf[0] & 0x80 == 0;
    buf[0] ^= 0x80;
    if negative {
        buf.iter_mut().for_each(|b| *b = !*b);
    }

    let mut offset = 0;
    let mut take = |len: usize| -> u32 {
        let word = buf[offset..offset + len]
            .iter()
            .fold(0u32, |acc, b| (acc << 8) | *b as u32);
        offset += len;
        word
    };

    let mut integer = String::new();
    if int_rest > 0 {
        let word = take(DIG_TO_BYTES[int_rest]);
        if word != 0 {
            integer.push_str(&word.to_string());
        }
    }
    for _ in 0..int_words {
        let word = take(WORD_SIZE);
        if integer.is_empty() {
            if word != 0 {
                integer.push_str(&word.to_string());
            }
        } else {
            integer.push_str(&format!("{:09}", word));
        }
    }
    if integer.is_empty() {
        integer.push('0');
    }

    let mut result = String::with_capacity(precision + 2);
    if negative {
        result.push('-');
    }
    result.push_str(&integer);

    if scale > 0 {
        result.push('.');
        for _ in 0..frac_words {
            result.push_str(&format!("{:09}", take(WORD_SIZE)));
        }
        if frac_rest > 0 {
            let word = take(DIG_TO_BYTES[frac_rest]);
            result.push_str(&format!("{:0width$}", word, width = frac_rest));
        }
    }

    Ok(result)
}

fn timestamp_value(seconds: u32, micros: u32) -> Result<CellValue> {
    if seconds == 0 && micros == 0 {
        return Ok(CellValue::Null);
    }
    DateTime::<Utc>::from_timestamp(seconds as i64, micros * 1_000)
        .map(CellValue::Timestamp)
        .ok_or_else(|| CdcError::ProtocolError(format!("invalid timestamp: {}", seconds)))
}

/// DATETIME2 및 JSON 의 packed datetime (년*13+월, 일, 시, 분, 초 비트 필드)
fn datetime_from_packed_parts(ymdhms: i64, micros: u32) -> Option<NaiveDateTime> {
    let ymd = ymdhms >> 17;
    let ym = ymd >> 5;
    let hms = ymdhms % (1 << 17);

    NaiveDate::from_ymd_opt((ym / 13) as i32, (ym % 13) as u32, (ymd % 32) as u32)?
        .and_hms_micro_opt(
            (hms >> 12) as u32,
            ((hms >> 6) % 64) as u32,
            (hms % 64) as u32,
            micros,
        )
}

/// TIME2 를 packed 형식으로 읽는다 (fsp 에 따라 소수부 저장 방식이 다름)
///
/// fsp 1~4 의 소수부는 부호 없이 저장된다. 음수 시간이면 정수부에서 1 을 빌려온다.
fn read_time2_packed(cursor: &mut Cursor<&[u8]>, fsp: u16) -> Result<i64> {
    const TIMEF_INT_OFS: i64 = 0x80_0000;
    const TIMEF_OFS: i64 = 0x8000_0000_0000;

    let packed = match fsp {
        1 | 2 => {
            let mut int_part = read_be_uint(cursor, 3)? as i64 - TIMEF_INT_OFS;
            let mut frac = cursor.read_u8()? as i64;
            if int_part < 0 && frac != 0 {
                int_part += 1;
                frac -= 0x100;
            }
            (int_part << 24) + frac * 10_000
        }
        3 | 4 => {
            let mut int_part = read_be_uint(cursor, 3)? as i64 - TIMEF_INT_OFS;
            let mut frac = cursor.read_u16::<BigEndian>()? as i64;
            if int_part < 0 && frac != 0 {
                int_part += 1;
                frac -= 0x10000;
            }
            (int_part << 24) + frac * 100
        }
        5 | 6 => read_be_uint(cursor, 6)? as i64 - TIMEF_OFS,
        _ => (read_be_uint(cursor, 3)? as i64 - TIMEF_INT_OFS) << 24,
    };
    Ok(packed)
}

/// 소수 초 (fsp+1)/2 바이트, 마이크로초로 환산
fn read_fraction(cursor: &mut Cursor<&[u8]>, fsp: u16) -> Result<u32> {
    let len = ((fsp + 1) / 2) as usize;
    let raw = read_be_uint(cursor, len)? as u32;
    Ok(match len {
        1 => raw * 10_000,
        2 => raw * 100,
        3 => raw,
        _ => 0,
    })
}

fn read_bytes(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let remaining = cursor.get_ref().len().saturating_sub(cursor.position() as usize);
    if len > remaining {
        return Err(CdcError::ProtocolError(format!(
            "value length {} exceeds remaining {} bytes",
            len, remaining
        )));
    }
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_le_uint(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<u64> {
    if len > 8 {
        return Err(CdcError::ProtocolError(format!("integer width {} too large", len)));
    }
    Ok(read_bytes(cursor, len)?
        .iter()
        .rev()
        .fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

fn read_be_uint(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<u64> {
    if len > 8 {
        return Err(CdcError::ProtocolError(format!("integer width {} too large", len)));
    }
    Ok(read_bytes(cursor, len)?
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

fn into_text(data: Vec<u8>) -> String {
    match String::from_utf8(data) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// MySQL 바이너리 JSON (sql/json_binary.h) 디코더
mod json {
    use super::{datetime_from_packed_parts, decode_decimal, MysqlTime};
    use crate::error::{CdcError, Result};
    use serde_json::{Map, Value};
    use std::io::Cursor;

    const SMALL_OBJECT: u8 = 0x00;
    const LARGE_OBJECT: u8 = 0x01;
    const SMALL_ARRAY: u8 = 0x02;
    const LARGE_ARRAY: u8 = 0x03;
    const LITERAL: u8 = 0x04;
    const INT16: u8 = 0x05;
    const UINT16: u8 = 0x06;
    const INT32: u8 = 0x07;
    const UINT32: u8 = 0x08;
    const INT64: u8 = 0x09;
    const UINT64: u8 = 0x0a;
    const DOUBLE: u8 = 0x0b;
    const STRING: u8 = 0x0c;
    const OPAQUE: u8 = 0x0f;

    /// 바이너리 파싱에 실패하면 텍스트 JSON, 그것도 아니면 문자열로 돌려준다
    pub(super) fn decode(data: &[u8]) -> Value {
        if data.is_empty() {
            return Value::Null;
        }
        match parse_value(data[0], &data[1..]) {
            Ok(value) => value,
            Err(_) => serde_json::from_slice(data)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(data).into_owned())),
        }
    }

    fn truncated(what: &str) -> CdcError {
        CdcError::ProtocolError(format!("truncated JSON {}", what))
    }

    fn le(data: &[u8], offset: usize, len: usize) -> Result<u64> {
        let bytes = data
            .get(offset..offset + len)
            .ok_or_else(|| truncated("integer"))?;
        Ok(bytes.iter().rev().fold(0u64, |acc, b| (acc << 8) | *b as u64))
    }

    fn parse_value(type_byte: u8, data: &[u8]) -> Result<Value> {
        let value = match type_byte {
            SMALL_OBJECT => parse_container(data, false, true)?,
            LARGE_OBJECT => parse_container(data, true, true)?,
            SMALL_ARRAY => parse_container(data, false, false)?,
            LARGE_ARRAY => parse_container(data, true, false)?,
            LITERAL => literal(le(data, 0, 1)?),
            INT16 => Value::from(le(data, 0, 2)? as u16 as i16),
            UINT16 => Value::from(le(data, 0, 2)? as u16),
            INT32 => Value::from(le(data, 0, 4)? as u32 as i32),
            UINT32 => Value::from(le(data, 0, 4)? as u32),
            INT64 => Value::from(le(data, 0, 8)? as i64),
            UINT64 => Value::from(le(data, 0, 8)?),
            DOUBLE => Value::from(f64::from_bits(le(data, 0, 8)?)),
            STRING => {
                let (len, prefix) = read_variable_length(data)?;
                let bytes = data
                    .get(prefix..prefix + len)
                    .ok_or_else(|| truncated("string"))?;
                Value::String(String::from_utf8_lossy(bytes).into_owned())
            }
            OPAQUE => {
                let field_type = *data.first().ok_or_else(|| truncated("opaque"))?;
                let rest = &data[1..];
                let (len, prefix) = read_variable_length(rest)?;
                let payload = rest
                    .get(prefix..prefix + len)
                    .ok_or_else(|| truncated("opaque"))?;
                opaque(field_type, payload)
            }
            other => {
                return Err(CdcError::ProtocolError(format!(
                    "unknown JSON value type 0x{:02x}",
                    other
                )))
            }
        };
        Ok(value)
    }

    fn literal(code: u64) -> Value {
        match code {
            0x01 => Value::Bool(true),
            0x02 => Value::Bool(false),
            _ => Value::Null,
        }
    }

    /// object: count, size, key entries(offset, u16 len), value entries(type, offset|inline)
    /// array: count, size, value entries
    fn parse_container(data: &[u8], large: bool, is_object: bool) -> Result<Value> {
        let width = if large { 4 } else { 2 };
        let count = le(data, 0, width)? as usize;
        let header = width * 2;
        let key_entry = width + 2;
        let value_entry = width + 1;
        let values_start = if is_object { header + count * key_entry } else { header };

        let mut object = Map::new();
        let mut array = Vec::new();
        for i in 0..count {
            let entry = values_start + i * value_entry;
            let value = parse_entry(data, entry, large)?;

            if is_object {
                let key_at = header + i * key_entry;
                let key_offset = le(data, key_at, width)? as usize;
                let key_len = le(data, key_at + width, 2)? as usize;
                let key = data
                    .get(key_offset..key_offset + key_len)
                    .ok_or_else(|| truncated("key"))?;
                object.insert(String::from_utf8_lossy(key).into_owned(), value);
            } else {
                array.push(value);
            }
        }

        Ok(if is_object {
            Value::Object(object)
        } else {
            Value::Array(array)
        })
    }

    /// 작은 스칼라는 값 엔트리 안에 인라인으로 들어간다
    fn parse_entry(data: &[u8], entry: usize, large: bool) -> Result<Value> {
        let width = if large { 4 } else { 2 };
        let type_byte = *data.get(entry).ok_or_else(|| truncated("value entry"))?;
        let slot = entry + 1;

        match type_byte {
            LITERAL => return Ok(literal(le(data, slot, 2)?)),
            INT16 => return Ok(Value::from(le(data, slot, 2)? as u16 as i16)),
            UINT16 => return Ok(Value::from(le(data, slot, 2)? as u16)),
            INT32 if large => return Ok(Value::from(le(data, slot, 4)? as u32 as i32)),
            UINT32 if large => return Ok(Value::from(le(data, slot, 4)? as u32)),
            _ => {}
        }

        let offset = le(data, slot, width)? as usize;
        let nested = data.get(offset..).ok_or_else(|| truncated("value offset"))?;
        parse_value(type_byte, nested)
    }

    /// 7비트씩, 최상위 비트가 연속 표시
    fn read_variable_length(data: &[u8]) -> Result<(usize, usize)> {
        let mut len = 0usize;
        for (i, byte) in data.iter().take(5).enumerate() {
            len |= ((byte & 0x7f) as usize) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok((len, i + 1));
            }
        }
        Err(truncated("length"))
    }

    fn opaque(field_type: u8, payload: &[u8]) -> Value {
        const NEWDECIMAL: u8 = 246;
        const DATE: u8 = 10;
        const TIME: u8 = 11;
        const DATETIME: u8 = 12;
        const TIMESTAMP: u8 = 7;

        let rendered = match field_type {
            NEWDECIMAL if payload.len() > 2 => {
                let mut cursor = Cursor::new(&payload[2..]);
                decode_decimal(&mut cursor, payload[0] as usize, payload[1] as usize).ok()
            }
            DATE | DATETIME | TIMESTAMP if payload.len() >= 8 => {
                let packed = le(payload, 0, 8).ok().map(|v| v as i64);
                packed.and_then(|p| {
                    let micros = (p % (1 << 24)) as u32;
                    let dt = datetime_from_packed_parts(p >> 24, micros)?;
                    Some(if field_type == DATE {
                        dt.date().to_string()
                    } else if micros > 0 {
                        dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
                    } else {
                        dt.format("%Y-%m-%d %H:%M:%S").to_string()
                    })
                })
            }
            TIME if payload.len() >= 8 => le(payload, 0, 8)
                .ok()
                .map(|p| MysqlTime::from_packed(p as i64).to_string()),
            _ => None,
        };

        Value::String(rendered.unwrap_or_else(|| String::from_utf8_lossy(payload).into_owned()))
    }
}
