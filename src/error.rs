//! CDC 관련 에러 타입

use std::io;
use thiserror::Error;

/// Checkpointer, Filter 같은 외부 구현체가 돌려주는 에러
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum CdcError {
    /// 서버 복제 설정이 요구 사항과 다름
    #[error("{variable} must be {required} (found {actual})")]
    ConfigurationError {
        variable: String,
        required: String,
        actual: String,
    },

    #[error("MySQL 연결 에러: {0}")]
    ConnectionError(String),

    #[error("프로토콜 에러: {0}")]
    ProtocolError(String),

    /// table map 이벤트 없이 row 이벤트가 도착함
    #[error("프로토콜 에러: table map 이벤트 없이 table_id {table_id} 의 row 이벤트 수신")]
    UnknownTable { table_id: u64 },

    #[error("유효하지 않은 체크포인트: {0}")]
    InvalidCheckpoint(String),

    #[error("GTID 처리 에러: {0}")]
    GtidError(String),

    #[error("쿼리 실행 에러: {0}")]
    QueryError(String),

    #[error("필터 패턴 에러: {0}")]
    FilterError(#[from] regex::Error),

    #[error("I/O 에러: {0}")]
    IoError(String),

    #[error("직렬화 에러: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Checkpointer / Filter 에러를 그대로 전달
    #[error(transparent)]
    CollaboratorError(BoxError),

    #[error("스트림이 연결되어 있지 않습니다")]
    Disconnected,
}

impl CdcError {
    pub(crate) fn configuration(
        variable: impl Into<String>,
        required: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        CdcError::ConfigurationError {
            variable: variable.into(),
            required: required.into(),
            actual: actual.into(),
        }
    }

    /// 버퍼 디코딩 중 발생한 I/O 에러(주로 UnexpectedEof)를 프로토콜 에러로 바꾼다
    pub(crate) fn malformed(self, what: &str) -> Self {
        match self {
            CdcError::IoError(msg) => CdcError::ProtocolError(format!("malformed {}: {}", what, msg)),
            other => other,
        }
    }
}

impl From<io::Error> for CdcError {
    fn from(err: io::Error) -> Self {
        CdcError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CdcError>;
