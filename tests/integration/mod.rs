//! Integration tests for snowsample.
//!
//! Shared fakes live here; each stage has its own test file.

pub mod credentials_test;
pub mod pipeline_test;
pub mod provision_test;
pub mod session_test;

use async_trait::async_trait;
use snowsample::error::{Result, SnowsampleError};
use snowsample::provision::ArtifactFetcher;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const REPOSITORY: &str = "https://repo.test/maven2";

static SESSION_LOCK: Mutex<()> = Mutex::new(());

/// Serializes tests that build sessions; only one may be live per process.
pub fn session_lock() -> MutexGuard<'static, ()> {
    SESSION_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Builds a `maven-metadata.xml` document.
pub fn metadata_xml(product: &str, release: &str, versions: &[&str]) -> String {
    let versions: String = versions
        .iter()
        .map(|v| format!("      <version>{v}</version>\n"))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>net.snowflake</groupId>
  <artifactId>{product}</artifactId>
  <versioning>
    <latest>{release}</latest>
    <release>{release}</release>
    <versions>
{versions}    </versions>
    <lastUpdated>20240101000000</lastUpdated>
  </versioning>
</metadata>
"#
    )
}

/// A repository served from memory that counts downloads.
///
/// Clones share state, so a test can keep a handle after boxing one for the
/// provisioner.
#[derive(Clone, Default)]
pub struct FakeRepository {
    documents: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    downloads: Arc<AtomicUsize>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `versions` of `product` with `release` as the newest.
    pub fn publish(&self, product: &str, release: &str, versions: &[&str]) {
        let base = format!("{REPOSITORY}/net/snowflake/{product}");
        let mut docs = self.documents.lock().unwrap();
        docs.insert(
            format!("{base}/maven-metadata.xml"),
            metadata_xml(product, release, versions).into_bytes(),
        );
        for version in versions {
            docs.insert(
                format!("{base}/{version}/{product}-{version}.jar"),
                format!("jar {product} {version}").into_bytes(),
            );
        }
    }

    /// Serves `body` as the metadata of `product`.
    pub fn publish_raw_metadata(&self, product: &str, body: &str) {
        self.documents.lock().unwrap().insert(
            format!("{REPOSITORY}/net/snowflake/{product}/maven-metadata.xml"),
            body.as_bytes().to_vec(),
        );
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| SnowsampleError::provision(format!("{url} returned 404 Not Found")))
    }
}

#[async_trait]
impl ArtifactFetcher for FakeRepository {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        String::from_utf8(self.get(url)?).map_err(|e| SnowsampleError::provision(e.to_string()))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self.get(url)?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(bytes)
    }
}

/// A canned HTTP response.
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: &'static str,
    pub body: String,
}

impl Canned {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: "200 OK",
            body: body.into(),
        }
    }

    pub fn status(status: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    pub query: String,
    /// Raw header block.
    pub headers: String,
    pub body: String,
}

type Routes = Arc<Mutex<HashMap<String, Vec<Canned>>>>;

/// A local HTTP/1.1 server answering one request per connection.
///
/// Routes are keyed `"METHOD /path"`. Each route answers its responses in
/// order and keeps repeating the last one. Unknown routes get a 404.
pub struct FakeHttpServer {
    base: String,
    routes: Routes,
    requests: Arc<Mutex<Vec<Recorded>>>,
    handle: JoinHandle<()>,
}

impl FakeHttpServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());
        let routes: Routes = Arc::default();
        let requests: Arc<Mutex<Vec<Recorded>>> = Arc::default();

        let handle = {
            let routes = Arc::clone(&routes);
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let routes = Arc::clone(&routes);
                    let requests = Arc::clone(&requests);
                    tokio::spawn(async move {
                        serve_connection(socket, routes, requests).await;
                    });
                }
            })
        };

        Self {
            base,
            routes,
            requests,
            handle,
        }
    }

    /// Root URL with a trailing slash, e.g. `http://127.0.0.1:4711/`.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn route(&self, key: &str, responses: Vec<Canned>) {
        self.routes
            .lock()
            .unwrap()
            .insert(key.to_string(), responses);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// `"METHOD /path"` of every request so far, in arrival order.
    pub fn request_keys(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }
}

impl Drop for FakeHttpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_connection(
    mut socket: TcpStream,
    routes: Routes,
    requests: Arc<Mutex<Vec<Recorded>>>,
) {
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    let key = format!("{} {}", request.method, request.path);
    requests.lock().unwrap().push(request);

    let canned = {
        let mut routes = routes.lock().unwrap();
        match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => Canned::status("404 Not Found", "{}"),
        }
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        canned.status,
        canned.body.len(),
        canned.body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> Option<Recorded> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    while raw.len() < header_end + 4 + length {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
    }

    let (request_line, headers) = head.split_once("\r\n").unwrap_or((head.as_str(), ""));
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?;
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let body_end = raw.len().min(header_end + 4 + length);

    Some(Recorded {
        method,
        path: path.to_string(),
        query: query.to_string(),
        headers: headers.to_string(),
        body: String::from_utf8_lossy(&raw[header_end + 4..body_end]).to_string(),
    })
}
