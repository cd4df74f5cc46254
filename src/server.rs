// FILE: src/server.rs
//! HTTP and WebSocket surface over a `SharedService`.

use crate::error::Result;
use crate::service::SharedService;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub mod api;
pub mod error;
pub mod socket;

pub fn router(service: SharedService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/", get(socket::upgrade))
        .route("/ws", get(socket::upgrade))
        .route("/health", get(health))
        .route("/api/files", get(api::list_files))
        .route("/api/thumb/:id", get(api::thumbnail))
        .route("/api/stats", get(api::stats))
        .route("/api/visible", get(api::visible))
        .with_state(service)
        .layer(cors)
}

async fn health() -> &'static str {
    "ok"
}

pub struct Server {
    listener: TcpListener,
    addr: SocketAddr,
    router: Router,
}

impl Server {
    pub async fn bind(addr: SocketAddr, service: SharedService) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        Ok(Self { listener, addr, router: router(service) })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("[Server] Listening on http://{}", self.addr);
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("[Server] Stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::indexer::IndexerEvent;
    use crate::record::test_record;
    use crate::service::CloudService;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    async fn start(service: SharedService) -> (SocketAddr, oneshot::Sender<()>, JoinHandle<Result<()>>) {
        let server = Server::bind("127.0.0.1:0".parse().unwrap(), service).await.unwrap();
        let addr = server.local_addr();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve(async move {
            let _ = rx.await;
        }));
        (addr, tx, task)
    }

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", path);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn test_binds_ephemeral_port() {
        let (service, _source) = CloudService::new(&Config::default());
        let server = Server::bind("127.0.0.1:0".parse().unwrap(), service).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_routes_over_http() {
        let (service, _source) = CloudService::new(&Config::default());
        service.apply(IndexerEvent::Discovered(test_record("/data/a.txt", 1)));
        let (addr, shutdown, task) = start(service).await;

        let stats = http_get(addr, "/api/stats").await;
        assert!(stats.starts_with("HTTP/1.1 200"));
        assert!(stats.contains(r#""totalFiles":1"#));

        let files = http_get(addr, "/api/files?cursor=0").await;
        assert!(files.contains(r#""nextCursor":null"#));
        assert!(files.contains("a.txt"));

        let bad = http_get(addr, "/api/files?cursor=-3").await;
        assert!(bad.starts_with("HTTP/1.1 400"));
        assert!(bad.contains(r#""ok":false"#));

        let missing = http_get(addr, "/api/thumb/ffffffffffffffff").await;
        assert!(missing.starts_with("HTTP/1.1 404"));

        shutdown.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_socket_greets_then_streams() {
        let (service, _source) = CloudService::new(&Config::default());
        let (addr, shutdown, task) = start(service.clone()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let handshake = "GET /ws HTTP/1.1\r\n\
            Host: localhost\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Version: 13\r\n\r\n";
        stream.write_all(handshake.as_bytes()).await.unwrap();

        // Server frames are unmasked text, so the JSON shows up verbatim
        let read_until = |mut stream: TcpStream, needle: &'static str| async move {
            let mut seen = Vec::new();
            let mut chunk = [0u8; 4096];
            while !String::from_utf8_lossy(&seen).contains(needle) {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before {:?}", needle);
                seen.extend_from_slice(&chunk[..n]);
            }
            (stream, String::from_utf8_lossy(&seen).into_owned())
        };

        let (stream, greeting) = tokio::time::timeout(Duration::from_secs(5), read_until(stream, r#""type":"connected""#))
            .await
            .unwrap();
        assert!(greeting.starts_with("HTTP/1.1 101"));
        assert!(greeting.contains(r#""totalFiles":0"#));

        // Wait for the handler to subscribe before publishing
        tokio::time::timeout(Duration::from_secs(5), async {
            while service.gateway().subscriber_count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        service.apply(IndexerEvent::Discovered(test_record("/data/pushed.txt", 3)));

        let (_stream, pushed) = tokio::time::timeout(Duration::from_secs(5), read_until(stream, "pushed.txt"))
            .await
            .unwrap();
        assert!(pushed.contains(r#""type":"file-added""#));

        shutdown.send(()).unwrap();
        drop(task);
    }
}
