//! 서버 복제 설정 검증
//!
//! row 이미지를 완전하게 디코딩하려면 다음 설정이 필요하다.
//! - binlog_format = ROW
//! - binlog_row_image = FULL
//! - binlog_row_metadata = FULL (컬럼명, 부호, 문자셋)
//! - gtid_mode = ON (MySQL 만)

use crate::error::{CdcError, Result};
use std::collections::HashMap;

/// 검증을 위해 조회하는 전역 변수
pub const REQUIRED_VARIABLES: &[&str] = &[
    "version",
    "binlog_format",
    "binlog_row_image",
    "binlog_row_metadata",
    "binlog_checksum",
    "gtid_mode",
];

const UNSET: &str = "<unset>";

/// 서버 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerFlavor {
    MySql,
    MariaDb,
}

/// `SHOW GLOBAL VARIABLES` 결과 (이름은 소문자로 정규화)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerVariables {
    values: HashMap<String, String>,
}

impl ServerVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.values.insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn flavor(&self) -> ServerFlavor {
        match self.get("version") {
            Some(version) if version.contains("MariaDB") => ServerFlavor::MariaDb,
            _ => ServerFlavor::MySql,
        }
    }
}

impl FromIterator<(String, String)> for ServerVariables {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut variables = ServerVariables::new();
        for (name, value) in iter {
            variables.insert(&name, &value);
        }
        variables
    }
}

pub struct ConfigValidator;

impl ConfigValidator {
    /// 첫 번째로 어긋난 설정을 ConfigurationError 로 돌려준다
    pub fn validate(variables: &ServerVariables) -> Result<ServerFlavor> {
        let flavor = variables.flavor();

        let mut checks = vec![
            ("binlog_format", "ROW"),
            ("binlog_row_image", "FULL"),
            ("binlog_row_metadata", "FULL"),
        ];
        if flavor == ServerFlavor::MySql {
            checks.push(("gtid_mode", "ON"));
        }

        for (variable, required) in checks {
            match variables.get(variable) {
                Some(actual) if actual.eq_ignore_ascii_case(required) => {}
                actual => {
                    return Err(CdcError::configuration(
                        variable,
                        required,
                        actual.unwrap_or(UNSET),
                    ))
                }
            }
        }

        Ok(flavor)
    }
}
