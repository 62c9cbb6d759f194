//! MySQL / MariaDB Binlog CDC (Change Data Capture) 스트림
//!
//! 서버에 복제 replica 로 붙어 row 기반 binlog 를 읽고, 행 단위 변경 이벤트
//! (INSERT / UPDATE / DELETE)로 변환해 블로킹 pull 커서로 제공합니다.
//! 주요 기능:
//! - 복제 설정 검증 (`binlog_format`, `binlog_row_image`, `binlog_row_metadata`, `gtid_mode`)
//! - Binlog 프로토콜 핸드셰이크와 이벤트 파싱
//! - GTID / 파일 위치 체크포인트 추적과 재시작
//! - 테이블/연산 단위 필터

pub mod auth;
pub mod binlog;
pub mod binlog_client;
pub mod cdc_engine;
pub mod checkpoint;
pub mod connection;
pub mod error;
pub mod events;
pub mod filter;
pub mod gtid;
pub mod offset;
pub mod protocol;
pub mod rows;
pub mod stream;
pub mod table_map;
pub mod validator;
pub mod value;

#[cfg(test)]
mod test_support;

pub use checkpoint::{Checkpointer, MemoryCheckpointer};
pub use connection::ConnectionConfig;
pub use error::{BoxError, CdcError, Result};
pub use events::{Event, OperationType, RowImage};
pub use filter::{Filter, RegexFilter};
pub use gtid::GtidSet;
pub use offset::Checkpoint;
pub use stream::{DisconnectHandle, Events, Stream};
pub use value::CellValue;
