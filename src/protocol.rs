//! MySQL 프로토콜 패킷 처리
//!
//! 패킷 = 길이(3 bytes LE) + 시퀀스(1 byte) + 본문.
//! 본문이 0xFFFFFF 이상이면 여러 패킷으로 나뉘어 전송된다.

use crate::error::{CdcError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, ErrorKind, Read};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// 패킷 하나에 담을 수 있는 최대 본문 길이
pub const MAX_PACKET_LENGTH: usize = 0xFF_FFFF;

/// 패킷 채널이 올라갈 수 있는 스트림 (TCP, 테스트용 duplex 등)
pub trait PacketStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> PacketStream for T {}

/// MySQL 패킷 채널
pub struct PacketChannel {
    stream: Box<dyn PacketStream>,
    sequence: u8,
}

impl PacketChannel {
    /// 새 패킷 채널 생성 (TCP 연결)
    pub async fn connect(hostname: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addr = format!("{}:{}", hostname, port);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| CdcError::ConnectionError(format!("Timed out connecting to {}", addr)))?
            .map_err(|e| CdcError::ConnectionError(format!("Failed to connect to {}: {}", addr, e)))?;
        stream.set_nodelay(true)?;

        debug!("Connected to MySQL at {}", addr);

        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: impl PacketStream + 'static) -> Self {
        PacketChannel {
            stream: Box::new(stream),
            sequence: 0,
        }
    }

    /// 패킷 읽기 (분할 패킷은 이어 붙인다)
    pub async fn read_packet(&mut self) -> Result<Vec<u8>> {
        use tokio::io::AsyncReadExt;

        let mut payload = Vec::new();
        loop {
            let mut header = [0u8; 4];
            self.stream.read_exact(&mut header).await.map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof => {
                    CdcError::ConnectionError("Connection closed by server".to_string())
                }
                _ => CdcError::from(e),
            })?;
            let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
            self.sequence = header[3].wrapping_add(1);

            let start = payload.len();
            payload.resize(start + length, 0);
            self.stream.read_exact(&mut payload[start..]).await?;

            if length < MAX_PACKET_LENGTH {
                return Ok(payload);
            }
        }
    }

    /// 현재 시퀀스로 패킷 쓰기
    pub async fn write_packet(&mut self, data: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        for chunk in data.chunks(MAX_PACKET_LENGTH) {
            self.write_chunk(chunk).await?;
        }
        // 길이가 최대치의 배수(0 포함)면 빈 패킷으로 끝을 알린다
        if data.len() % MAX_PACKET_LENGTH == 0 {
            self.write_chunk(&[]).await?;
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// 새 명령 시작 (시퀀스 0)
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.sequence = 0;
        self.write_packet(data).await
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        let length = (chunk.len() as u32).to_le_bytes();
        let header = [length[0], length[1], length[2], self.sequence];
        self.sequence = self.sequence.wrapping_add(1);

        self.stream.write_all(&header).await?;
        self.stream.write_all(chunk).await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Greeting 패킷 (Protocol::HandshakeV10)
#[derive(Debug, Clone)]
pub struct GreetingPacket {
    pub protocol_version: u8,
    pub server_version: String,
    pub thread_id: u32,
    pub scramble: Vec<u8>,
    pub server_capabilities: u32,
    pub server_collation: u8,
    pub server_status: u16,
    pub auth_plugin_name: String,
}

impl GreetingPacket {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if is_error_packet(data) {
            return Err(parse_error_packet(data));
        }
        Self::parse_v10(data).map_err(|e| e.malformed("greeting packet"))
    }

    fn parse_v10(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let protocol_version = cursor.read_u8()?;
        if protocol_version != 10 {
            return Err(CdcError::ProtocolError(format!(
                "unsupported protocol version {}",
                protocol_version
            )));
        }

        let server_version = read_null_terminated_string(&mut cursor)?;
        let thread_id = cursor.read_u32::<LittleEndian>()?;

        // Auth plugin data part 1 (8 bytes) + filler
        let mut scramble = vec![0u8; 8];
        cursor.read_exact(&mut scramble)?;
        cursor.read_u8()?;

        let capabilities_lower = cursor.read_u16::<LittleEndian>()?;
        let server_collation = cursor.read_u8()?;
        let server_status = cursor.read_u16::<LittleEndian>()?;
        let capabilities_upper = cursor.read_u16::<LittleEndian>()?;
        let server_capabilities = (capabilities_upper as u32) << 16 | capabilities_lower as u32;

        let auth_data_len = cursor.read_u8()?;
        let mut reserved = [0u8; 10];
        cursor.read_exact(&mut reserved)?;

        // Auth plugin data part 2 (최소 13 bytes, 마지막은 NUL)
        let part2_len = std::cmp::max(13, auth_data_len.saturating_sub(8)) as usize;
        let mut part2 = vec![0u8; part2_len];
        cursor.read_exact(&mut part2)?;
        scramble.extend_from_slice(&part2[..part2_len - 1]);

        let auth_plugin_name = if server_capabilities & crate::auth::capabilities::PLUGIN_AUTH != 0 {
            read_null_terminated_string(&mut cursor).unwrap_or_default()
        } else {
            String::new()
        };

        Ok(GreetingPacket {
            protocol_version,
            server_version,
            thread_id,
            scramble,
            server_capabilities,
            server_collation,
            server_status,
            auth_plugin_name,
        })
    }
}

/// null로 끝나는 문자열 읽기 (NUL 이 없으면 끝까지)
fn read_null_terminated_string<R: Read>(reader: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        match reader.read_u8() {
            Ok(0) => break,
            Ok(byte) => bytes.push(byte),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof && !bytes.is_empty() => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

/// Error 패킷 확인
pub fn is_error_packet(data: &[u8]) -> bool {
    data.first() == Some(&0xFF)
}

/// OK 패킷 확인
pub fn is_ok_packet(data: &[u8]) -> bool {
    data.first() == Some(&0x00)
}

/// EOF 패킷 확인 (0xFE, 9 bytes 미만)
pub fn is_eof_packet(data: &[u8]) -> bool {
    data.first() == Some(&0xFE) && data.len() < 9
}

/// ERR 패킷 메시지
///
/// 0xFF + 에러 코드(2) + ['#' + SQL state(5)] + 메시지
pub fn error_message(data: &[u8]) -> String {
    if data.len() < 3 {
        return "Malformed error packet".to_string();
    }

    let code = u16::from_le_bytes([data[1], data[2]]);
    let message = if data.get(3) == Some(&b'#') && data.len() >= 9 {
        String::from_utf8_lossy(&data[9..])
    } else {
        String::from_utf8_lossy(&data[3..])
    };
    format!("Server error {}: {}", code, message)
}

/// ERR 패킷 -> ConnectionError
pub fn parse_error_packet(data: &[u8]) -> CdcError {
    CdcError::ConnectionError(error_message(data))
}
