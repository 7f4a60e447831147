//! Drives a real listener over loopback TCP.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use microserve::{HttpServer, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), microserve::ServerError>>,
}

impl Running {
    async fn shutdown(self) {
        let _ = self.stop.send(());
        self.handle.await.unwrap().unwrap();
    }
}

async fn start(server: HttpServer) -> Running {
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        server
            .serve(listener, async {
                let _ = stopped.await;
            })
            .await
    });
    Running { addr, stop, handle }
}

fn config_for(root: &Path) -> ServerConfig {
    ServerConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        root: root.to_path_buf(),
        ..ServerConfig::default()
    }
}

async fn fetch(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn serves_files_and_listings_over_tcp() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("app.wasm"), b"\0asm").unwrap();
    std::fs::create_dir(root.path().join("docs")).unwrap();
    std::fs::write(root.path().join("docs/guide.md"), b"# guide").unwrap();

    let mut server = HttpServer::new(config_for(root.path())).unwrap();
    server.define_content_type(".wasm", "application/wasm");
    let running = start(server).await;

    let response = fetch(running.addr, "GET /app.wasm HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Type: application/wasm\r\n"));
    assert!(response.contains("Connection: close\r\n"));

    let response = fetch(running.addr, "GET /docs HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 301 Moved Permanently\r\n"));
    assert!(response.contains("Location: /docs/\r\n"));

    let response = fetch(running.addr, "GET /docs/ HTTP/1.0\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("<a href=\"guide.md\">guide.md</a>"));

    let response = fetch(running.addr, "GET /missing HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));

    running.shutdown().await;
}

#[tokio::test]
async fn rejects_connections_over_the_limit() {
    let root = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        max_connections: 1,
        ..config_for(root.path())
    };
    let running = start(HttpServer::new(config).unwrap()).await;

    // Holds the only slot: connected but never sends a request
    let mut idle = TcpStream::connect(running.addr).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // The rejection is written on accept, before any request is read
    let mut rejected = TcpStream::connect(running.addr).await.unwrap();
    let mut response = Vec::new();
    rejected.read_to_end(&mut response).await.unwrap();
    assert!(response.starts_with(b"HTTP/1.1 503 Service Unavailable\r\n"));

    idle.shutdown().await.unwrap();
    running.shutdown().await;
}
