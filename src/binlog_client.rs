//! MySQL Binlog 클라이언트
//!
//! 복제 프로토콜 순서:
//! 1. 핸드셰이크 + 인증
//! 2. 체크섬/heartbeat 세션 변수 설정
//! 3. COM_REGISTER_SLAVE
//! 4. COM_BINLOG_DUMP 또는 COM_BINLOG_DUMP_GTID
//! 5. 이벤트 패킷 수신 (OK 바이트 + 이벤트)

use crate::auth::{self, AuthPlugin};
use crate::connection::ConnectionConfig;
use crate::error::{CdcError, Result};
use crate::gtid::GtidSet;
use crate::offset::{BinlogPosition, Checkpoint};
use crate::protocol::{self, GreetingPacket, PacketChannel};
use crate::validator::ServerFlavor;
use byteorder::{LittleEndian, WriteBytesExt};
use bytes::Bytes;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};

const COM_QUERY: u8 = 0x03;
const COM_BINLOG_DUMP: u8 = 0x12;
const COM_REGISTER_SLAVE: u8 = 0x15;
const COM_BINLOG_DUMP_GTID: u8 = 0x1e;

/// COM_BINLOG_DUMP_GTID: 위치 대신 GTID 집합 사용
const BINLOG_THROUGH_GTID: u16 = 0x04;

/// MariaDB 이벤트(GTID, annotate 등)를 받기 위한 capability
const MARIADB_SLAVE_CAPABILITY_MINE: u8 = 4;

/// Binlog 클라이언트
pub struct BinlogClient {
    channel: PacketChannel,
    server_version: String,
}

impl BinlogClient {
    /// TCP 연결 후 인증까지 수행
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        info!("Connecting to {}:{}", config.hostname, config.port);
        let channel = PacketChannel::connect(&config.hostname, config.port, config.timeout).await?;
        tokio::time::timeout(config.timeout, Self::handshake(channel, config))
            .await
            .map_err(|_| CdcError::ConnectionError("Timed out during handshake".to_string()))?
    }

    /// 이미 열린 채널에서 핸드셰이크
    pub async fn handshake(mut channel: PacketChannel, config: &ConnectionConfig) -> Result<Self> {
        let greeting = GreetingPacket::parse(&channel.read_packet().await?)?;
        info!(
            "MySQL Server version: {}, Thread ID: {}",
            greeting.server_version, greeting.thread_id
        );

        let plugin = AuthPlugin::from_name(&greeting.auth_plugin_name).unwrap_or(AuthPlugin::NativePassword);
        let response = auth::create_handshake_response(
            &config.username,
            &config.password,
            config.database.as_deref(),
            &greeting.scramble,
            plugin,
        )?;
        channel.write_packet(&response).await?;

        Self::authenticate(&mut channel, plugin, &config.password).await?;
        info!("Authentication successful");

        Ok(BinlogClient {
            channel,
            server_version: greeting.server_version,
        })
    }

    /// 인증 결과 처리 (auth switch, caching_sha2 fast auth 포함)
    async fn authenticate(channel: &mut PacketChannel, mut plugin: AuthPlugin, password: &str) -> Result<()> {
        loop {
            let packet = channel.read_packet().await?;
            match packet.first() {
                Some(0x00) => return Ok(()),
                Some(0xFF) => return Err(protocol::parse_error_packet(&packet)),
                Some(0xFE) => {
                    let body = &packet[1..];
                    let name_end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
                    let name = String::from_utf8_lossy(&body[..name_end]).to_string();
                    plugin = AuthPlugin::from_name(&name).ok_or_else(|| {
                        CdcError::ConnectionError(format!("Unsupported authentication plugin: {}", name))
                    })?;

                    let nonce = &body[(name_end + 1).min(body.len())..];
                    let nonce = nonce.strip_suffix(&[0]).unwrap_or(nonce);
                    debug!("Auth switch to {}", plugin.name());
                    channel.write_packet(&plugin.scramble(password, nonce)).await?;
                }
                Some(0x01) if plugin == AuthPlugin::CachingSha2Password => match packet.get(1) {
                    Some(&auth::CACHING_SHA2_FAST_AUTH_SUCCESS) => debug!("caching_sha2_password fast auth"),
                    Some(&auth::CACHING_SHA2_FULL_AUTH_REQUIRED) => {
                        return Err(CdcError::ConnectionError(
                            "caching_sha2_password full authentication requires TLS, which is not supported"
                                .to_string(),
                        ))
                    }
                    other => {
                        return Err(CdcError::ProtocolError(format!(
                            "unexpected caching_sha2_password state {:?}",
                            other
                        )))
                    }
                },
                other => {
                    return Err(CdcError::ProtocolError(format!(
                        "unexpected authentication packet {:?}",
                        other
                    )))
                }
            }
        }
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// 결과 셋 없는 문장 실행 (SET 등)
    pub async fn execute(&mut self, sql: &str) -> Result<()> {
        let mut packet = vec![COM_QUERY];
        packet.extend_from_slice(sql.as_bytes());
        self.channel.write_command(&packet).await?;

        let response = self.channel.read_packet().await?;
        if protocol::is_error_packet(&response) {
            return Err(CdcError::QueryError(format!(
                "{}: {}",
                sql,
                protocol::error_message(&response)
            )));
        }
        Ok(())
    }

    /// 체크섬, MariaDB capability, heartbeat 세션 변수 설정
    pub async fn prepare(&mut self, flavor: ServerFlavor, heartbeat: Option<Duration>) -> Result<()> {
        // 8.0.26 이후는 source_*, 이전 버전은 master_* 를 읽는다
        self.execute(
            "SET @master_binlog_checksum = @@global.binlog_checksum, \
             @source_binlog_checksum = @@global.binlog_checksum",
        )
        .await?;

        if flavor == ServerFlavor::MariaDb {
            self.execute(&format!(
                "SET @mariadb_slave_capability = {}",
                MARIADB_SLAVE_CAPABILITY_MINE
            ))
            .await?;
        }

        if let Some(period) = heartbeat {
            let nanos = period.as_nanos();
            self.execute(&format!(
                "SET @master_heartbeat_period = {}, @source_heartbeat_period = {}",
                nanos, nanos
            ))
            .await?;
        }

        Ok(())
    }

    /// COM_REGISTER_SLAVE
    pub async fn register_replica(&mut self, server_id: u32) -> Result<()> {
        let mut buffer = Vec::new();
        buffer.write_u8(COM_REGISTER_SLAVE)?;
        buffer.write_u32::<LittleEndian>(server_id)?;
        // hostname, user, password: 빈 문자열
        buffer.write_u8(0)?;
        buffer.write_u8(0)?;
        buffer.write_u8(0)?;
        buffer.write_u16::<LittleEndian>(0)?;
        // replication rank, master id
        buffer.write_u32::<LittleEndian>(0)?;
        buffer.write_u32::<LittleEndian>(0)?;

        self.channel.write_command(&buffer).await?;
        let response = self.channel.read_packet().await?;
        if protocol::is_error_packet(&response) {
            return Err(protocol::parse_error_packet(&response));
        }
        debug!("Registered as replica with server_id={}", server_id);
        Ok(())
    }

    /// 체크포인트 종류에 맞는 dump 명령 전송
    pub async fn dump(&mut self, server_id: u32, checkpoint: &Checkpoint) -> Result<()> {
        let command = match checkpoint {
            Checkpoint::File(position) => Self::create_binlog_dump_command(server_id, position)?,
            Checkpoint::Gtid(set) => Self::create_binlog_dump_gtid_command(server_id, set)?,
        };
        self.channel.write_command(&command).await?;
        info!("Binlog dump started from {}", checkpoint);
        Ok(())
    }

    /// 다음 이벤트 프레임 (OK 바이트 제거). 서버 EOF 면 None.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let packet = self.channel.read_packet().await?;
        if protocol::is_ok_packet(&packet) {
            return Ok(Some(Bytes::from(packet).slice(1..)));
        }
        if protocol::is_error_packet(&packet) {
            return Err(protocol::parse_error_packet(&packet));
        }
        if protocol::is_eof_packet(&packet) {
            info!("Received EOF packet - stream ended");
            return Ok(None);
        }
        Err(CdcError::ProtocolError(format!(
            "unexpected packet in binlog stream: {:02x?}",
            packet.first()
        )))
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.channel.shutdown().await
    }

    /// COM_BINLOG_DUMP 명령어 생성
    fn create_binlog_dump_command(server_id: u32, position: &BinlogPosition) -> Result<Vec<u8>> {
        let offset = u32::try_from(position.position).map_err(|_| {
            CdcError::InvalidCheckpoint(format!("position {} exceeds 4 bytes", position.position))
        })?;

        let mut buffer = Vec::new();
        buffer.write_u8(COM_BINLOG_DUMP)?;
        buffer.write_u32::<LittleEndian>(offset)?;
        // Flags - 0: blocking (서버가 새 이벤트를 기다림)
        buffer.write_u16::<LittleEndian>(0)?;
        buffer.write_u32::<LittleEndian>(server_id)?;
        buffer.write_all(position.filename.as_bytes())?;

        Ok(buffer)
    }

    /// COM_BINLOG_DUMP_GTID 명령어 생성
    fn create_binlog_dump_gtid_command(server_id: u32, gtid_set: &GtidSet) -> Result<Vec<u8>> {
        let data = gtid_set.encode()?;

        let mut buffer = Vec::new();
        buffer.write_u8(COM_BINLOG_DUMP_GTID)?;
        buffer.write_u16::<LittleEndian>(BINLOG_THROUGH_GTID)?;
        buffer.write_u32::<LittleEndian>(server_id)?;
        // 파일명 없음
        buffer.write_u32::<LittleEndian>(0)?;
        buffer.write_u64::<LittleEndian>(4)?;
        buffer.write_u32::<LittleEndian>(data.len() as u32)?;
        buffer.write_all(&data)?;

        Ok(buffer)
    }

    #[cfg(test)]
    pub(crate) fn from_channel(channel: PacketChannel, server_version: &str) -> Self {
        BinlogClient {
            channel,
            server_version: server_version.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("localhost", "repl").with_password("secret")
    }

    fn pair() -> (PacketChannel, PacketChannel) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        (PacketChannel::from_stream(client), PacketChannel::from_stream(server))
    }

    #[test]
    fn test_create_binlog_dump_command() {
        let cmd = BinlogClient::create_binlog_dump_command(1001, &BinlogPosition::new("mysql-bin.000001", 4)).unwrap();

        assert_eq!(cmd[0], COM_BINLOG_DUMP);
        assert_eq!(&cmd[1..5], &4u32.to_le_bytes());
        assert_eq!(&cmd[5..7], &[0, 0]);
        assert_eq!(&cmd[7..11], &1001u32.to_le_bytes());
        assert_eq!(&cmd[11..], b"mysql-bin.000001");

        let too_far = BinlogPosition::new("mysql-bin.000001", u64::from(u32::MAX) + 1);
        assert!(BinlogClient::create_binlog_dump_command(1, &too_far).is_err());
    }

    #[test]
    fn test_create_binlog_dump_gtid_command() {
        let set = GtidSet::parse("550e8400-e29b-41d4-a716-446655440000:1-5").unwrap();
        let cmd = BinlogClient::create_binlog_dump_gtid_command(7, &set).unwrap();
        let data = set.encode().unwrap();

        assert_eq!(cmd[0], COM_BINLOG_DUMP_GTID);
        assert_eq!(&cmd[1..3], &BINLOG_THROUGH_GTID.to_le_bytes());
        assert_eq!(&cmd[3..7], &7u32.to_le_bytes());
        assert_eq!(&cmd[7..11], &0u32.to_le_bytes());
        assert_eq!(&cmd[11..19], &4u64.to_le_bytes());
        assert_eq!(&cmd[19..23], &(data.len() as u32).to_le_bytes());
        assert_eq!(&cmd[23..], &data[..]);
    }

    #[tokio::test]
    async fn test_handshake_native_password() {
        let (client, mut server) = pair();
        let server_task = tokio::spawn(async move {
            server
                .write_packet(&test_support::greeting("8.0.36", "mysql_native_password"))
                .await
                .unwrap();
            let response = server.read_packet().await.unwrap();
            server.write_packet(&test_support::ok_packet()).await.unwrap();
            response
        });

        let client = BinlogClient::handshake(client, &config()).await.unwrap();
        assert_eq!(client.server_version(), "8.0.36");

        let response = server_task.await.unwrap();
        let expected = auth::scramble_native("secret", &test_support::SCRAMBLE);
        assert_eq!(&response[32..37], b"repl\0");
        assert_eq!(&response[38..58], &expected[..]);
    }

    #[tokio::test]
    async fn test_handshake_caching_sha2_fast_auth() {
        let (client, mut server) = pair();
        tokio::spawn(async move {
            server
                .write_packet(&test_support::greeting("8.0.36", "caching_sha2_password"))
                .await
                .unwrap();
            server.read_packet().await.unwrap();
            server.write_packet(&[0x01, 0x03]).await.unwrap();
            server.write_packet(&test_support::ok_packet()).await.unwrap();
        });

        assert!(BinlogClient::handshake(client, &config()).await.is_ok());
    }

    #[tokio::test]
    async fn test_handshake_auth_switch() {
        let nonce = [7u8; 20];
        let (client, mut server) = pair();
        let server_task = tokio::spawn(async move {
            server
                .write_packet(&test_support::greeting("10.11.6-MariaDB", "caching_sha2_password"))
                .await
                .unwrap();
            server.read_packet().await.unwrap();
            server
                .write_packet(&test_support::auth_switch("mysql_native_password", &nonce))
                .await
                .unwrap();
            let switched = server.read_packet().await.unwrap();
            server.write_packet(&test_support::ok_packet()).await.unwrap();
            switched
        });

        BinlogClient::handshake(client, &config()).await.unwrap();
        assert_eq!(server_task.await.unwrap(), auth::scramble_native("secret", &nonce));
    }

    #[tokio::test]
    async fn test_handshake_access_denied() {
        let (client, mut server) = pair();
        tokio::spawn(async move {
            server
                .write_packet(&test_support::greeting("8.0.36", "mysql_native_password"))
                .await
                .unwrap();
            server.read_packet().await.unwrap();
            server
                .write_packet(&test_support::err_packet(1045, "Access denied for user 'repl'"))
                .await
                .unwrap();
        });

        match BinlogClient::handshake(client, &config()).await {
            Err(CdcError::ConnectionError(message)) => assert!(message.contains("1045")),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_prepare_and_register() {
        let (client, mut server) = pair();
        let mut client = BinlogClient::from_channel(client, "10.11.6-MariaDB");
        let server_task = tokio::spawn(async move {
            let mut commands = Vec::new();
            for _ in 0..4 {
                commands.push(server.read_packet().await.unwrap());
                server.write_packet(&test_support::ok_packet()).await.unwrap();
            }
            commands
        });

        client
            .prepare(ServerFlavor::MariaDb, Some(Duration::from_secs(2)))
            .await
            .unwrap();
        client.register_replica(1001).await.unwrap();

        let commands = server_task.await.unwrap();
        assert!(String::from_utf8_lossy(&commands[0]).contains("@master_binlog_checksum"));
        assert!(String::from_utf8_lossy(&commands[1]).contains("@mariadb_slave_capability = 4"));
        assert!(String::from_utf8_lossy(&commands[2]).contains("2000000000"));
        assert_eq!(commands[3][0], COM_REGISTER_SLAVE);
        assert_eq!(&commands[3][1..5], &1001u32.to_le_bytes());
    }

    #[tokio::test]
    async fn test_query_error() {
        let (client, mut server) = pair();
        let mut client = BinlogClient::from_channel(client, "8.0.36");
        tokio::spawn(async move {
            server.read_packet().await.unwrap();
            server
                .write_packet(&test_support::err_packet(1193, "Unknown system variable"))
                .await
                .unwrap();
        });

        assert!(matches!(
            client.prepare(ServerFlavor::MySql, None).await,
            Err(CdcError::QueryError(_))
        ));
    }

    #[tokio::test]
    async fn test_next_frame() {
        let (client, mut server) = pair();
        let mut client = BinlogClient::from_channel(client, "8.0.36");
        let frame = test_support::xid_event(1, 0, 100);
        let packet = test_support::binlog_packet(&frame);
        tokio::spawn(async move {
            server.write_packet(&packet).await.unwrap();
            server.write_packet(&test_support::eof_packet()).await.unwrap();
        });

        assert_eq!(client.next_frame().await.unwrap().unwrap(), Bytes::from(frame));
        assert_eq!(client.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_next_frame_server_error() {
        let (client, mut server) = pair();
        let mut client = BinlogClient::from_channel(client, "8.0.36");
        tokio::spawn(async move {
            server
                .write_packet(&test_support::err_packet(1236, "Could not find first log file name"))
                .await
                .unwrap();
        });

        assert!(matches!(
            client.next_frame().await,
            Err(CdcError::ConnectionError(_))
        ));
    }
}
