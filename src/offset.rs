//! Binlog 처리 위치 추적 (BinlogPosition 및 Checkpoint)
//!
//! 체크포인트는 두 가지 문자열 형식 중 하나다.
//! - `gtid:<gtid-set>`
//! - `file:<binlog 파일명>:<바이트 위치>`

use crate::error::{CdcError, Result};
use crate::gtid::GtidSet;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const GTID_PREFIX: &str = "gtid:";
const FILE_PREFIX: &str = "file:";

/// Binlog 파일 위치 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinlogPosition {
    /// 바이너리 로그 파일명 (e.g., "mysql-bin.000001")
    pub filename: String,
    /// 바이트 위치
    pub position: u64,
}

impl BinlogPosition {
    pub fn new(filename: impl Into<String>, position: u64) -> Self {
        BinlogPosition {
            filename: filename.into(),
            position,
        }
    }
}

impl fmt::Display for BinlogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.position)
    }
}

/// 재시작 가능한 스트림 위치
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    Gtid(GtidSet),
    File(BinlogPosition),
}

impl Checkpoint {
    pub fn is_gtid(&self) -> bool {
        matches!(self, Checkpoint::Gtid(_))
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkpoint::Gtid(set) => write!(f, "{}{}", GTID_PREFIX, set),
            Checkpoint::File(pos) => write!(f, "{}{}", FILE_PREFIX, pos),
        }
    }
}

impl FromStr for Checkpoint {
    type Err = CdcError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix(GTID_PREFIX) {
            let set = GtidSet::parse(rest)
                .map_err(|e| CdcError::InvalidCheckpoint(format!("{}: {}", s, e)))?;
            return Ok(Checkpoint::Gtid(set));
        }

        if let Some(rest) = s.strip_prefix(FILE_PREFIX) {
            let (filename, position) = rest
                .rsplit_once(':')
                .ok_or_else(|| CdcError::InvalidCheckpoint(s.to_string()))?;
            if filename.is_empty() {
                return Err(CdcError::InvalidCheckpoint(s.to_string()));
            }
            let position = position
                .parse::<u64>()
                .map_err(|_| CdcError::InvalidCheckpoint(s.to_string()))?;
            return Ok(Checkpoint::File(BinlogPosition::new(filename, position)));
        }

        Err(CdcError::InvalidCheckpoint(s.to_string()))
    }
}

impl Serialize for Checkpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binlog_position_display() {
        let pos = BinlogPosition::new("mysql-bin.000123", 4096);
        assert_eq!(pos.to_string(), "mysql-bin.000123:4096");
    }

    #[test]
    fn test_file_checkpoint() {
        let cp: Checkpoint = "file:mysql-bin.000003:4097".parse().unwrap();
        assert_eq!(
            cp,
            Checkpoint::File(BinlogPosition::new("mysql-bin.000003", 4097))
        );
        assert_eq!(cp.to_string(), "file:mysql-bin.000003:4097");
        assert!(!cp.is_gtid());
    }

    #[test]
    fn test_gtid_checkpoint() {
        let text = "gtid:550e8400-e29b-41d4-a716-446655440000:1-42";
        let cp: Checkpoint = text.parse().unwrap();
        assert!(cp.is_gtid());
        assert_eq!(cp.to_string(), text);
    }

    #[test]
    fn test_empty_gtid_checkpoint() {
        let cp: Checkpoint = "gtid:".parse().unwrap();
        assert_eq!(cp, Checkpoint::Gtid(GtidSet::new()));
    }

    #[test]
    fn test_invalid_checkpoints() {
        for text in ["", "mysql-bin.000001:4", "file:mysql-bin.000001", "file::4", "file:bin:x", "gtid:zzz"] {
            assert!(
                matches!(text.parse::<Checkpoint>(), Err(CdcError::InvalidCheckpoint(_))),
                "{} should be rejected",
                text
            );
        }
    }
}
