/// Binlog CDC 스트림 사용 예제
///
/// 변경 이벤트를 한 줄에 하나씩 JSON 으로 출력합니다.
use binlog_stream::{ConnectionConfig, MemoryCheckpointer, Stream};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 초기화 (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = ConnectionConfig::new(
        env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
        env::var("DB_USER").unwrap_or_else(|_| "testuser".to_string()),
    )
    .with_port(
        env::var("DB_PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(3306),
    )
    .with_password(env::var("DB_PASSWORD").unwrap_or_else(|_| "testpass".to_string()));
    if let Ok(database) = env::var("DB_NAME") {
        config = config.with_database(database);
    }
    if let Some(server_id) = env::var("DB_SERVER_ID").ok().and_then(|id| id.parse().ok()) {
        config = config.with_server_id(server_id);
    }

    info!("Connecting to {}:{}", config.hostname, config.port);

    let mut stream = Stream::new(config)?;
    stream.set_checkpointer(MemoryCheckpointer::new());
    stream.connect()?;
    info!("Listening for change events at {}", stream.checkpoint());

    for event in stream.events() {
        let event = event?;
        println!("{}", serde_json::to_string(&*event)?);
    }

    Ok(())
}
