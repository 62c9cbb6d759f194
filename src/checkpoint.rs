//! 체크포인트 저장소와 트랜잭션 경계 추적

use crate::error::{BoxError, Result};
use crate::gtid::GtidSet;
use crate::offset::{BinlogPosition, Checkpoint};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// 체크포인트 영속화 인터페이스
///
/// 체크포인트는 `gtid:...` 또는 `file:...:...` 형식의 불투명 문자열로 주고받는다.
pub trait Checkpointer: Send {
    fn load_last_checkpoint(&mut self) -> std::result::Result<Option<String>, BoxError>;

    fn save_checkpoint(&mut self, checkpoint: &str) -> std::result::Result<(), BoxError>;
}

impl<T: Checkpointer + ?Sized> Checkpointer for Box<T> {
    fn load_last_checkpoint(&mut self) -> std::result::Result<Option<String>, BoxError> {
        (**self).load_last_checkpoint()
    }

    fn save_checkpoint(&mut self, checkpoint: &str) -> std::result::Result<(), BoxError> {
        (**self).save_checkpoint(checkpoint)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    last: Option<String>,
    saved: Vec<String>,
}

/// 메모리 기반 Checkpointer. clone 끼리 상태를 공유한다.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointer {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이미 저장된 체크포인트가 있는 상태로 시작
    pub fn with_checkpoint(checkpoint: impl Into<String>) -> Self {
        let checkpointer = Self::default();
        checkpointer.state.lock().last = Some(checkpoint.into());
        checkpointer
    }

    pub fn last(&self) -> Option<String> {
        self.state.lock().last.clone()
    }

    /// 지금까지 save 된 체크포인트 (순서대로)
    pub fn saved(&self) -> Vec<String> {
        self.state.lock().saved.clone()
    }
}

impl Checkpointer for MemoryCheckpointer {
    fn load_last_checkpoint(&mut self) -> std::result::Result<Option<String>, BoxError> {
        Ok(self.state.lock().last.clone())
    }

    fn save_checkpoint(&mut self, checkpoint: &str) -> std::result::Result<(), BoxError> {
        let mut state = self.state.lock();
        state.last = Some(checkpoint.to_string());
        state.saved.push(checkpoint.to_string());
        Ok(())
    }
}

/// 마지막으로 커밋된 트랜잭션 경계 추적
///
/// 진행 중인 트랜잭션의 GTID 는 커밋 이벤트가 올 때까지 집합에 넣지 않으며,
/// 파일 위치도 커밋 이벤트의 next_pos 로만 전진한다.
#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    current: Checkpoint,
    rendered: String,
    pending_gtid: Option<(Uuid, u64)>,
    last_saved: Option<String>,
}

impl CheckpointTracker {
    /// `last_saved` 는 Checkpointer 에서 읽어온 값 (같은 값은 다시 저장하지 않음)
    pub fn new(start: Checkpoint, last_saved: Option<String>) -> Self {
        let rendered = start.to_string();
        CheckpointTracker {
            current: start,
            rendered,
            pending_gtid: None,
            last_saved,
        }
    }

    pub fn current(&self) -> &Checkpoint {
        &self.current
    }

    /// 이벤트에 붙일 체크포인트 문자열
    pub fn checkpoint(&self) -> &str {
        &self.rendered
    }

    /// 트랜잭션 시작 (GTID_LOG_EVENT)
    pub fn on_gtid(&mut self, uuid: Uuid, sequence: u64) {
        self.pending_gtid = Some((uuid, sequence));
    }

    /// XID 또는 트랜잭션을 끝내는 QUERY 이벤트
    pub fn on_commit(&mut self, next_pos: u64) -> Result<()> {
        match &mut self.current {
            Checkpoint::Gtid(set) => {
                if let Some((uuid, sequence)) = self.pending_gtid.take() {
                    set.add(uuid, sequence)?;
                }
            }
            Checkpoint::File(position) => {
                // 아티피셜 이벤트는 next_pos 가 0
                if next_pos > 0 {
                    position.position = next_pos;
                }
            }
        }
        self.render();
        Ok(())
    }

    /// ROTATE 이벤트. 파일 모드에서만 위치가 바뀐다.
    pub fn on_rotate(&mut self, filename: &str, position: u64) {
        if let Checkpoint::File(current) = &mut self.current {
            *current = BinlogPosition::new(filename, position);
            self.render();
        }
    }

    /// 마지막 저장 이후 달라졌다면 저장할 값을 돌려준다
    pub fn take_unsaved(&mut self) -> Option<String> {
        if self.last_saved.as_deref() == Some(self.rendered.as_str()) {
            return None;
        }
        self.last_saved = Some(self.rendered.clone());
        Some(self.rendered.clone())
    }

    fn render(&mut self) {
        self.rendered = self.current.to_string();
    }
}

impl Default for CheckpointTracker {
    fn default() -> Self {
        CheckpointTracker::new(Checkpoint::Gtid(GtidSet::new()), None)
    }
}
