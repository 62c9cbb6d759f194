//! MySQL CDC 엔진 - binlog 이벤트를 행 단위 변경 이벤트로 변환
//!
//! CDC 엔진은 다음 단계로 진행됩니다:
//! 1. 서버 복제 설정 검증
//! 2. 마지막 체크포인트(없으면 서버의 현재 위치)에서 binlog dump 시작
//! 3. 프레임 처리: 테이블 맵 캐시, 트랜잭션 경계 추적, 필터, row 디코딩

use crate::binlog::{BinlogEventData, BinlogParser, ChecksumAlgorithm, RowsEventData};
use crate::binlog_client::BinlogClient;
use crate::checkpoint::{CheckpointTracker, Checkpointer};
use crate::connection::{ConnectionConfig, MySqlConnection};
use crate::error::{CdcError, Result};
use crate::events::{Event, EventHeader, OperationType};
use crate::filter::{EventFilter, Filter};
use crate::offset::Checkpoint;
use crate::rows::RowEventDecoder;
use crate::table_map::TableMetadataCache;
use crate::validator::{ConfigValidator, ServerFlavor};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// CDC 엔진 설정
#[derive(Debug, Clone, Default)]
pub struct CdcConfig {
    pub connection: ConnectionConfig,
}

impl CdcConfig {
    pub fn new(connection: ConnectionConfig) -> Self {
        CdcConfig { connection }
    }
}

/// MySQL CDC 엔진
pub struct CdcEngine {
    config: CdcConfig,
    client: Option<BinlogClient>,
    parser: BinlogParser,
    tables: TableMetadataCache,
    tracker: CheckpointTracker,
    checkpointer: Option<Box<dyn Checkpointer>>,
    filter: EventFilter,
    pending: VecDeque<Arc<Event>>,
}

impl CdcEngine {
    /// 새 CDC 엔진 생성
    pub fn new(config: CdcConfig) -> Self {
        CdcEngine {
            config,
            client: None,
            parser: BinlogParser::default(),
            tables: TableMetadataCache::new(),
            tracker: CheckpointTracker::default(),
            checkpointer: None,
            filter: EventFilter::default(),
            pending: VecDeque::new(),
        }
    }

    pub fn set_checkpointer(&mut self, checkpointer: Box<dyn Checkpointer>) {
        self.checkpointer = Some(checkpointer);
    }

    pub fn set_filter(&mut self, filter: Box<dyn Filter>) {
        self.filter = EventFilter::new(Some(filter));
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// 현재 커밋 경계 체크포인트
    pub fn checkpoint(&self) -> &str {
        self.tracker.checkpoint()
    }

    /// 검증, 시작 위치 결정, binlog dump 시작
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting CDC Engine");
        let connection = self.config.connection.clone();

        let mut sql = MySqlConnection::connect(&connection).await?;
        let prepared = self.resolve_start(&mut sql).await;
        if let Err(e) = sql.close().await {
            warn!("Failed to close SQL session: {}", e);
        }
        let (flavor, checksum, start, loaded) = prepared?;

        let mut client = BinlogClient::connect(&connection).await?;
        client.prepare(flavor, connection.heartbeat_period).await?;
        client.register_replica(connection.server_id).await?;
        client.dump(connection.server_id, &start).await?;

        self.attach(client, checksum, start, loaded);
        info!("CDC Engine started successfully");
        Ok(())
    }

    async fn resolve_start(
        &mut self,
        sql: &mut MySqlConnection,
    ) -> Result<(ServerFlavor, ChecksumAlgorithm, Checkpoint, Option<String>)> {
        let variables = sql.server_variables().await?;
        let flavor = ConfigValidator::validate(&variables)?;
        let checksum = ChecksumAlgorithm::from_variable(variables.get("binlog_checksum"));
        info!(
            "Server {} ({:?}), binlog_checksum={:?}",
            variables.get("version").unwrap_or("unknown"),
            flavor,
            checksum
        );

        let loaded = match self.checkpointer.as_mut() {
            Some(checkpointer) => checkpointer
                .load_last_checkpoint()
                .map_err(CdcError::CollaboratorError)?,
            None => None,
        };

        let start = match &loaded {
            Some(text) => {
                let checkpoint: Checkpoint = text.parse()?;
                if checkpoint.is_gtid() && flavor == ServerFlavor::MariaDb {
                    return Err(CdcError::configuration(
                        "checkpoint",
                        "a file position on MariaDB",
                        text.as_str(),
                    ));
                }
                info!("Resuming from checkpoint {}", checkpoint);
                checkpoint
            }
            None => {
                let checkpoint = match flavor {
                    ServerFlavor::MySql => Checkpoint::Gtid(sql.executed_gtid_set().await?),
                    ServerFlavor::MariaDb => Checkpoint::File(sql.binlog_position().await?),
                };
                info!("No checkpoint saved, starting at server tail {}", checkpoint);
                checkpoint
            }
        };

        Ok((flavor, checksum, start, loaded))
    }

    /// dump 가 시작된 클라이언트로 스트리밍 상태 초기화
    pub(crate) fn attach(
        &mut self,
        client: BinlogClient,
        checksum: ChecksumAlgorithm,
        start: Checkpoint,
        last_saved: Option<String>,
    ) {
        self.client = Some(client);
        self.parser = BinlogParser::new(checksum);
        self.tables.clear();
        self.pending.clear();
        self.tracker = CheckpointTracker::new(start, last_saved);
    }

    /// 다음 수락된 변경 이벤트. 서버가 스트림을 끝내면 None.
    pub async fn next_event(&mut self) -> Result<Option<Arc<Event>>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            let client = self.client.as_mut().ok_or(CdcError::Disconnected)?;
            match client.next_frame().await? {
                Some(frame) => self.handle_frame(&frame)?,
                None => {
                    self.client = None;
                    self.tables.clear();
                    return Ok(None);
                }
            }
        }
    }

    /// 이벤트 프레임 하나 처리
    pub(crate) fn handle_frame(&mut self, frame: &[u8]) -> Result<()> {
        let event = self.parser.parse(frame)?;
        let next_pos = u64::from(event.header.next_pos);

        match event.data {
            BinlogEventData::Rotate(rotate) => {
                info!(
                    "Binlog rotated to {}:{}",
                    rotate.next_binlog_name, rotate.position
                );
                self.tables.clear();
                self.tracker.on_rotate(&rotate.next_binlog_name, rotate.position);
            }
            BinlogEventData::TableMap(map) => {
                self.tables.observe(&map);
            }
            BinlogEventData::Gtid(gtid) => {
                self.tracker.on_gtid(gtid.uuid, gtid.sequence);
            }
            BinlogEventData::Xid(xid) => {
                debug!("Commit xid={} at {}", xid, next_pos);
                self.tracker.on_commit(next_pos)?;
            }
            BinlogEventData::Query(query) => {
                if query.ends_transaction() {
                    debug!("Transaction boundary: {}", query.query);
                    self.tracker.on_commit(next_pos)?;
                }
            }
            BinlogEventData::Rows(rows) => self.handle_rows(&event.header, &rows)?,
            BinlogEventData::MariadbGtid(gtid) => {
                debug!(
                    "MariaDB GTID {}-{} (standalone={})",
                    gtid.domain_id,
                    gtid.sequence,
                    gtid.is_standalone()
                );
            }
            BinlogEventData::FormatDescription(_) | BinlogEventData::Heartbeat | BinlogEventData::Ignored => {}
        }

        Ok(())
    }

    fn handle_rows(&mut self, header: &EventHeader, rows: &RowsEventData) -> Result<()> {
        let table = self.tables.resolve(rows.table_id)?;
        let operation = rows.event_type.operation().ok_or_else(|| {
            CdcError::ProtocolError(format!("{:?} is not a rows event", rows.event_type))
        })?;

        // 대상 스키마가 지정되면 다른 스키마의 행은 필터까지 가지 않는다
        let in_scope = self
            .config
            .connection
            .database
            .as_deref()
            .map_or(true, |database| database == table.schema);
        let accepted = in_scope && self.filter.accept(operation, &table.schema, &table.table)?;
        self.save_checkpoint()?;
        if !accepted {
            debug!("Filtered {} on {}", operation, table.qualified_name());
            return Ok(());
        }

        let changes = RowEventDecoder::decode(rows, &table)?;
        let timestamp = DateTime::<Utc>::from_timestamp(i64::from(header.timestamp), 0).unwrap_or_default();
        let checkpoint = self.tracker.checkpoint().to_string();

        for change in changes {
            let event = match operation {
                OperationType::Insert => Event::Insert {
                    schema: table.schema.clone(),
                    table: table.table.clone(),
                    timestamp,
                    checkpoint: checkpoint.clone(),
                    after: change.after.unwrap_or_default(),
                },
                OperationType::Update => Event::Update {
                    schema: table.schema.clone(),
                    table: table.table.clone(),
                    timestamp,
                    checkpoint: checkpoint.clone(),
                    before: change.before.unwrap_or_default(),
                    after: change.after.unwrap_or_default(),
                },
                OperationType::Delete => Event::Delete {
                    schema: table.schema.clone(),
                    table: table.table.clone(),
                    timestamp,
                    checkpoint: checkpoint.clone(),
                    before: change.before.unwrap_or_default(),
                },
            };
            self.pending.push_back(Arc::new(event));
        }

        Ok(())
    }

    /// 마지막 저장 이후 바뀐 경우에만 저장
    fn save_checkpoint(&mut self) -> Result<()> {
        if let Some(checkpoint) = self.tracker.take_unsaved() {
            if let Some(checkpointer) = self.checkpointer.as_mut() {
                debug!("Saving checkpoint {}", checkpoint);
                checkpointer
                    .save_checkpoint(&checkpoint)
                    .map_err(CdcError::CollaboratorError)?;
            }
        }
        Ok(())
    }

    /// 연결 종료. 여러 번 호출해도 된다.
    pub async fn stop(&mut self) -> Result<()> {
        self.pending.clear();
        self.tables.clear();
        if let Some(mut client) = self.client.take() {
            info!("Stopping CDC Engine");
            client.disconnect().await?;
        }
        Ok(())
    }
}
