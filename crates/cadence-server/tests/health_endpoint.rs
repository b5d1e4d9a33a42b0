use cadence_server::{Config, build_state, health::health_router};
use tempfile::TempDir;

async fn spawn_health() -> (std::net::SocketAddr, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        host: "127.0.0.1".into(),
        port: 0,
        health_port: 0,
        db_path: dir.path().join("cadence.db"),
        data_dir: dir.path().to_path_buf(),
        auth_token: "test-secret".into(),
        workspace_root: dir.path().to_path_buf(),
        log_level: "warn".into(),
        log_file: None,
    };
    let state = build_state(config).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = health_router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, dir)
}

#[tokio::test]
async fn get_health_reports_component_checks() {
    let (addr, _dir) = spawn_health().await;

    let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let mut stream = stream;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    stream
        .write_all(format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n").as_bytes())
        .await
        .unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let response = String::from_utf8_lossy(&raw);

    assert!(response.starts_with("HTTP/1.1 200"));
    let body_start = response.find("\r\n\r\n").unwrap() + 4;
    let body: serde_json::Value = serde_json::from_str(response[body_start..].trim()).unwrap();

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["store"], "ok");
    assert!(body["checks"]["bridge"]["tools"].as_u64().unwrap() >= 30);
    assert!(body["checks"]["filesystem"]["writable"].as_bool().unwrap());
    assert!(body["uptime"].is_u64());
}
