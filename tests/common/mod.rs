//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use event_gateway::config::GatewayConfig;
use event_gateway::lifecycle::{startup, Shutdown};
use event_gateway::GatewayServer;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

pub const PRIMARY_DOMAIN: &str = "example.com";
pub const INSTRUCTION_TYPE: &str = "application/stream+json";

/// One request received by the mock engine.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    /// Header names are lowercased.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// What the mock engine answers.
pub enum Reply {
    /// A complete response with a Content-Length.
    Fixed { content_type: String, body: String },
    /// A chunked response, one chunk per entry, with a pause between chunks.
    Chunks {
        content_type: String,
        chunks: Vec<String>,
        delay: Duration,
    },
}

impl Reply {
    /// Instruction stream where each line is sent as its own chunk.
    pub fn instructions(lines: &[serde_json::Value]) -> Self {
        Reply::Chunks {
            content_type: INSTRUCTION_TYPE.to_string(),
            chunks: lines.iter().map(|l| format!("{}\n", l)).collect(),
            delay: Duration::from_millis(5),
        }
    }

    pub fn raw_chunks(chunks: &[&str]) -> Self {
        Reply::Chunks {
            content_type: INSTRUCTION_TYPE.to_string(),
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            delay: Duration::from_millis(5),
        }
    }

    pub fn fixed(content_type: &str, body: &str) -> Self {
        Reply::Fixed {
            content_type: content_type.to_string(),
            body: body.to_string(),
        }
    }
}

/// A programmable backend engine speaking raw HTTP/1.1.
pub struct MockEngine {
    pub addr: SocketAddr,
    pub requests: mpsc::UnboundedReceiver<CapturedRequest>,
    /// How each connection ended; an error means the gateway hung up first.
    pub outcomes: mpsc::UnboundedReceiver<std::io::Result<()>>,
}

impl MockEngine {
    pub fn endpoint(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn next_request(&mut self) -> CapturedRequest {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("engine received no request")
            .unwrap()
    }
}

/// Start a mock engine that answers every request with `reply(request)`.
pub async fn start_engine<F>(reply: F) -> MockEngine
where
    F: Fn(&CapturedRequest) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let reply = Arc::new(reply);
    let (tx, rx) = mpsc::unbounded_channel();
    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let reply = reply.clone();
            let tx = tx.clone();
            let outcome_tx = outcome_tx.clone();
            tokio::spawn(async move {
                let outcome = serve_connection(socket, reply.as_ref(), tx).await;
                let _ = outcome_tx.send(outcome);
            });
        }
    });

    MockEngine {
        addr,
        requests: rx,
        outcomes: outcome_rx,
    }
}

async fn serve_connection<F>(
    socket: TcpStream,
    reply: &F,
    tx: mpsc::UnboundedSender<CapturedRequest>,
) -> std::io::Result<()>
where
    F: Fn(&CapturedRequest) -> Reply,
{
    let mut reader = BufReader::new(socket);
    let request = read_request(&mut reader).await?;
    let answer = reply(&request);
    let _ = tx.send(request);

    let socket = reader.get_mut();
    match answer {
        Reply::Fixed { content_type, body } => {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                content_type,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await?;
        }
        Reply::Chunks { content_type, chunks, delay } => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
                content_type
            );
            socket.write_all(head.as_bytes()).await?;
            for chunk in chunks {
                socket
                    .write_all(format!("{:x}\r\n{}\r\n", chunk.len(), chunk).as_bytes())
                    .await?;
                socket.flush().await?;
                tokio::time::sleep(delay).await;
            }
            socket.write_all(b"0\r\n\r\n").await?;
        }
    }
    socket.flush().await?;
    socket.shutdown().await
}

async fn read_request(reader: &mut BufReader<TcpStream>) -> std::io::Result<CapturedRequest> {
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.push((k.trim().to_ascii_lowercase(), v.trim().to_string()));
        }
    }

    let find = |name: &str| headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone());
    let mut body = Vec::new();
    if find("transfer-encoding").is_some_and(|v| v.eq_ignore_ascii_case("chunked")) {
        loop {
            let mut size_line = String::new();
            reader.read_line(&mut size_line).await?;
            let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
            let mut chunk = vec![0u8; size + 2];
            reader.read_exact(&mut chunk).await?;
            if size == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..size]);
        }
    } else if let Some(len) = find("content-length").and_then(|v| v.parse::<usize>().ok()) {
        body.resize(len, 0);
        reader.read_exact(&mut body).await?;
    }

    Ok(CapturedRequest {
        request_line: request_line.trim_end().to_string(),
        headers,
        body,
    })
}

/// A gateway running on ephemeral loopback ports.
pub struct TestGateway {
    pub external: SocketAddr,
    pub internal: SocketAddr,
    pub dir: Arc<TempDir>,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.external, path)
    }

    pub fn control_url(&self, path: &str) -> String {
        format!("http://{}{}", self.internal, path)
    }

    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway with a fresh snapshot directory.
pub async fn start_gateway(configure: impl FnOnce(&mut GatewayConfig)) -> TestGateway {
    start_gateway_in(Arc::new(TempDir::new().unwrap()), configure).await
}

/// Start a gateway whose route snapshot lives in `dir`.
pub async fn start_gateway_in(
    dir: Arc<TempDir>,
    configure: impl FnOnce(&mut GatewayConfig),
) -> TestGateway {
    let mut config = GatewayConfig::default();
    config.routing.snapshot_path = dir.path().join("routes.json").to_string_lossy().into_owned();
    config.routing.primary_domain = Some(PRIMARY_DOMAIN.to_string());
    config.cookies.secret = Some("integration-test-secret".to_string());
    config.timeouts.request_secs = 5;
    configure(&mut config);

    let external = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let internal = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let external_addr = external.local_addr().unwrap();
    let internal_addr = internal.local_addr().unwrap();

    let state = startup::build_state(config).unwrap();
    let server = GatewayServer::new(state);
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(external, internal, server_shutdown).await;
    });

    TestGateway {
        external: external_addr,
        internal: internal_addr,
        dir,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// Register a route through the control plane.
pub async fn register(gateway: &TestGateway, host: &str, method: &str, path: &str, endpoint: &str) {
    let res = client()
        .post(gateway.control_url("/register"))
        .json(&serde_json::json!({
            "endpoint": endpoint,
            "data": {"host": host, "path": path, "method": method}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201, "registration failed");
}

/// Host header for a route label under the primary domain.
pub fn host(label: &str) -> String {
    format!("{}.{}", label, PRIMARY_DOMAIN)
}
