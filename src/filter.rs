//! row 이벤트 필터
//!
//! 필터는 row 이미지를 디코딩하기 전에 (연산, 스키마, 테이블)만 보고 결정한다.

use crate::error::{BoxError, CdcError, Result};
use crate::events::OperationType;
use regex::Regex;

/// 이벤트 수락 여부를 결정하는 인터페이스
pub trait Filter: Send {
    fn accept(
        &self,
        event_type: OperationType,
        schema: &str,
        table: &str,
    ) -> std::result::Result<bool, BoxError>;
}

impl<F> Filter for F
where
    F: Fn(OperationType, &str, &str) -> bool + Send,
{
    fn accept(
        &self,
        event_type: OperationType,
        schema: &str,
        table: &str,
    ) -> std::result::Result<bool, BoxError> {
        Ok(self(event_type, schema, table))
    }
}

/// 설정된 Filter 를 감싼다. 없으면 모두 수락.
#[derive(Default)]
pub struct EventFilter {
    inner: Option<Box<dyn Filter>>,
}

impl EventFilter {
    pub fn new(filter: Option<Box<dyn Filter>>) -> Self {
        EventFilter { inner: filter }
    }

    pub fn accept(&self, event_type: OperationType, schema: &str, table: &str) -> Result<bool> {
        match &self.inner {
            Some(filter) => filter
                .accept(event_type, schema, table)
                .map_err(CdcError::CollaboratorError),
            None => Ok(true),
        }
    }
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFilter")
            .field("configured", &self.inner.is_some())
            .finish()
    }
}

/// `schema.table` 이름에 대한 정규식 include/exclude 필터
///
/// 패턴은 전체 이름에 대해 대소문자 구분 없이 매칭된다.
/// include 가 비어 있으면 모든 테이블이 후보이며, exclude 가 항상 우선한다.
#[derive(Debug, Clone, Default)]
pub struct RegexFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    operations: Option<Vec<OperationType>>,
}

impl RegexFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, pattern: &str) -> Result<Self> {
        self.include.push(compile(pattern)?);
        Ok(self)
    }

    pub fn exclude(mut self, pattern: &str) -> Result<Self> {
        self.exclude.push(compile(pattern)?);
        Ok(self)
    }

    /// 지정한 연산만 수락
    pub fn operations(mut self, operations: &[OperationType]) -> Self {
        self.operations = Some(operations.to_vec());
        self
    }

    pub fn matches(&self, event_type: OperationType, schema: &str, table: &str) -> bool {
        if let Some(operations) = &self.operations {
            if !operations.contains(&event_type) {
                return false;
            }
        }

        let name = format!("{}.{}", schema, table);
        if self.exclude.iter().any(|re| re.is_match(&name)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|re| re.is_match(&name))
    }
}

impl Filter for RegexFilter {
    fn accept(
        &self,
        event_type: OperationType,
        schema: &str,
        table: &str,
    ) -> std::result::Result<bool, BoxError> {
        Ok(self.matches(event_type, schema, table))
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("(?i)^(?:{})$", pattern))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Rejected;

    impl fmt::Display for Rejected {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("filter backend unavailable")
        }
    }

    impl std::error::Error for Rejected {}

    struct FailingFilter;

    impl Filter for FailingFilter {
        fn accept(&self, _: OperationType, _: &str, _: &str) -> std::result::Result<bool, BoxError> {
            Err(Box::new(Rejected))
        }
    }

    #[test]
    fn test_default_accepts_everything() {
        let filter = EventFilter::default();
        assert!(filter.accept(OperationType::Delete, "any", "thing").unwrap());
    }

    #[test]
    fn test_closure_filter() {
        let filter = EventFilter::new(Some(Box::new(|op: OperationType, _: &str, table: &str| {
            op == OperationType::Insert && table == "users"
        })));
        assert!(filter.accept(OperationType::Insert, "app", "users").unwrap());
        assert!(!filter.accept(OperationType::Update, "app", "users").unwrap());
        assert!(!filter.accept(OperationType::Insert, "app", "orders").unwrap());
    }

    #[test]
    fn test_filter_error_is_passed_through() {
        let filter = EventFilter::new(Some(Box::new(FailingFilter)));
        match filter.accept(OperationType::Insert, "app", "users") {
            Err(CdcError::CollaboratorError(err)) => assert!(err.downcast_ref::<Rejected>().is_some()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_regex_filter() {
        let filter = RegexFilter::new()
            .include(r"app\..*")
            .unwrap()
            .exclude(r"app\.audit_.*")
            .unwrap();

        assert!(filter.matches(OperationType::Insert, "app", "users"));
        assert!(filter.matches(OperationType::Delete, "APP", "Users"));
        assert!(!filter.matches(OperationType::Insert, "app", "audit_log"));
        assert!(!filter.matches(OperationType::Insert, "other", "users"));
    }

    #[test]
    fn test_regex_filter_operations() {
        let filter = RegexFilter::new().operations(&[OperationType::Update]);
        assert!(filter.matches(OperationType::Update, "a", "b"));
        assert!(!filter.matches(OperationType::Insert, "a", "b"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            RegexFilter::new().include("(unclosed"),
            Err(CdcError::FilterError(_))
        ));
    }
}
