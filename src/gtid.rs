//! GTID (Global Transaction ID) 관리
//!
//! GTID 형식: UUID:sequence-number
//! 여러 서버의 GTID 집합을 추적: "uuid1:1-100:200,uuid2:1-50"

use crate::error::{CdcError, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// GTID 범위 (양 끝 포함)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GtidRange {
    pub start: u64,
    pub end: u64,
}

impl GtidRange {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start == 0 || start > end {
            return Err(CdcError::GtidError(format!("Invalid range: {}-{}", start, end)));
        }
        Ok(GtidRange { start, end })
    }

    pub fn contains(&self, value: u64) -> bool {
        value >= self.start && value <= self.end
    }

    /// 겹치거나 맞닿은 범위면 합친 결과를 돌려준다
    fn merge(&self, other: &GtidRange) -> Option<GtidRange> {
        if self.end.saturating_add(1) >= other.start && other.end.saturating_add(1) >= self.start {
            Some(GtidRange {
                start: self.start.min(other.start),
                end: self.end.max(other.end),
            })
        } else {
            None
        }
    }
}

impl fmt::Display for GtidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// 서버 UUID 하나에 속한 GTID 범위들 (정렬, 병합 상태 유지)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UuidGtidSet {
    pub uuid: Uuid,
    pub ranges: Vec<GtidRange>,
}

impl UuidGtidSet {
    pub fn new(uuid: Uuid) -> Self {
        UuidGtidSet {
            uuid,
            ranges: Vec::new(),
        }
    }

    pub fn add_range(&mut self, range: GtidRange) {
        self.ranges.push(range);
        self.ranges.sort();

        let mut merged: Vec<GtidRange> = Vec::with_capacity(self.ranges.len());
        for range in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) => match last.merge(&range) {
                    Some(joined) => *last = joined,
                    None => merged.push(range),
                },
                None => merged.push(range),
            }
        }
        self.ranges = merged;
    }

    pub fn contains(&self, sequence: u64) -> bool {
        self.ranges.iter().any(|r| r.contains(sequence))
    }
}

impl fmt::Display for UuidGtidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)?;
        for range in &self.ranges {
            write!(f, ":{}", range)?;
        }
        Ok(())
    }
}

/// 전체 GTID 집합 (여러 UUID)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GtidSet {
    pub sets: BTreeMap<Uuid, UuidGtidSet>,
}

impl GtidSet {
    pub fn new() -> Self {
        GtidSet {
            sets: BTreeMap::new(),
        }
    }

    /// GTID 문자열 파싱
    ///
    /// `@@global.gtid_executed` 형식("uuid:1-5:7,uuid2:1-3")을 받는다.
    /// 콤마 뒤에 UUID 없이 범위만 오면 직전 UUID의 범위로 취급한다.
    pub fn parse(gtid_str: &str) -> Result<Self> {
        let mut gtid_set = GtidSet::new();
        let trimmed = gtid_str.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("NULL") {
            return Ok(gtid_set);
        }

        let mut current: Option<Uuid> = None;
        for part in trimmed.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let mut pieces = part.split(':');
            let head = pieces.next().unwrap_or_default().trim();

            let (uuid, intervals): (Uuid, Vec<&str>) = match Uuid::parse_str(head) {
                Ok(uuid) => (uuid, pieces.collect()),
                Err(_) => match current {
                    Some(uuid) if !part.contains(':') => (uuid, vec![part]),
                    _ => {
                        return Err(CdcError::GtidError(format!(
                            "Invalid GTID set element: {}",
                            part
                        )))
                    }
                },
            };

            if intervals.is_empty() {
                return Err(CdcError::GtidError(format!("Missing intervals: {}", part)));
            }

            let entry = gtid_set
                .sets
                .entry(uuid)
                .or_insert_with(|| UuidGtidSet::new(uuid));
            for interval in intervals {
                entry.add_range(parse_range(interval.trim())?);
            }
            current = Some(uuid);
        }

        Ok(gtid_set)
    }

    /// 트랜잭션 하나를 집합에 추가
    pub fn add(&mut self, uuid: Uuid, sequence: u64) -> Result<()> {
        let range = GtidRange::new(sequence, sequence)?;
        self.sets
            .entry(uuid)
            .or_insert_with(|| UuidGtidSet::new(uuid))
            .add_range(range);
        Ok(())
    }

    pub fn contains(&self, uuid: &Uuid, sequence: u64) -> bool {
        self.sets
            .get(uuid)
            .map(|set| set.contains(sequence))
            .unwrap_or(false)
    }

    /// `other` 의 모든 트랜잭션을 포함하는지
    pub fn is_superset_of(&self, other: &GtidSet) -> bool {
        other.sets.iter().all(|(uuid, other_set)| {
            other_set.ranges.iter().all(|range| {
                self.sets
                    .get(uuid)
                    .map(|set| {
                        set.ranges
                            .iter()
                            .any(|r| r.start <= range.start && r.end >= range.end)
                    })
                    .unwrap_or(false)
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.sets.values().all(|set| set.ranges.is_empty())
    }

    /// COM_BINLOG_DUMP_GTID 용 바이너리 인코딩
    ///
    /// n_sids(8) + [uuid(16) + n_intervals(8) + [start(8) + end_exclusive(8)]*]*
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let populated: Vec<&UuidGtidSet> =
            self.sets.values().filter(|s| !s.ranges.is_empty()).collect();

        buffer.write_u64::<LittleEndian>(populated.len() as u64)?;
        for set in populated {
            buffer.extend_from_slice(set.uuid.as_bytes());
            buffer.write_u64::<LittleEndian>(set.ranges.len() as u64)?;
            for range in &set.ranges {
                buffer.write_u64::<LittleEndian>(range.start)?;
                buffer.write_u64::<LittleEndian>(range.end + 1)?;
            }
        }
        Ok(buffer)
    }
}

impl fmt::Display for GtidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for set in self.sets.values().filter(|s| !s.ranges.is_empty()) {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}", set)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for GtidSet {
    type Err = CdcError;

    fn from_str(s: &str) -> Result<Self> {
        GtidSet::parse(s)
    }
}

fn parse_range(interval: &str) -> Result<GtidRange> {
    let invalid = || CdcError::GtidError(format!("Invalid interval: {}", interval));
    match interval.split_once('-') {
        Some((start, end)) => {
            let start = start.trim().parse::<u64>().map_err(|_| invalid())?;
            let end = end.trim().parse::<u64>().map_err(|_| invalid())?;
            GtidRange::new(start, end)
        }
        None => {
            let seq = interval.parse::<u64>().map_err(|_| invalid())?;
            GtidRange::new(seq, seq)
        }
    }
}
