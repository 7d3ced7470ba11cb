//! Development server with hot reload via Server-Sent Events.
//!
//! Serves build artifacts from the output directory through a small
//! in-memory cache and pushes reload notifications to connected UI
//! clients. Reloads triggered while a rebuild is in progress are
//! buffered and flushed as a single event once the busy flag clears.

use crate::bundler::merge_config;
use crate::dev::{DevEvent, Session};
use crate::error::{ConfigError, Result, ServerError};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response, Sse},
    routing::get,
    Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

/// How many consecutive ports to probe when the configured one is taken.
const PORT_SCAN_SPAN: u16 = 10;

/// How long `close` waits for in-flight connections before aborting.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Server configuration after merging defaults with user overrides.
///
/// The `server` object in `plinth.config.json` is deep-merged over the
/// defaults, so authors only write the fields they want to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UiServerConfig {
    /// Interface to bind. An IP address, not a hostname.
    pub host: String,
    /// First port to try; the next nine are probed as fallbacks.
    pub port: u16,
    /// Whether to attach permissive CORS headers.
    pub cors: bool,
    /// Directory the artifacts are served from.
    #[serde(skip)]
    pub out_dir: PathBuf,
}

impl Default for UiServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4400,
            cors: true,
            out_dir: PathBuf::from("dist"),
        }
    }
}

impl UiServerConfig {
    /// Merge the defaults for `port`/`out_dir` with user overrides.
    ///
    /// Overrides win key-by-key; nested objects merge recursively.
    ///
    /// # Errors
    ///
    /// Fails when the merged object does not deserialize into a valid
    /// server configuration.
    pub fn merged(port: u16, out_dir: PathBuf, overrides: Option<&Value>) -> Result<Self> {
        let defaults = Self {
            port,
            ..Self::default()
        };
        let Some(overrides) = overrides else {
            return Ok(Self { out_dir, ..defaults });
        };

        let base = serde_json::to_value(&defaults)?;
        let merged = merge_config(&base, overrides);
        let mut config: Self =
            serde_json::from_value(merged).map_err(|e| ConfigError::InvalidValue {
                field: "server".to_string(),
                value: e.to_string(),
                hint: "Check the \"server\" object in plinth.config.json".to_string(),
            })?;
        config.out_dir = out_dir;
        Ok(config)
    }

    fn bind_host(&self) -> Result<IpAddr> {
        self.host.parse().map_err(|_| {
            ConfigError::InvalidValue {
                field: "server.host".to_string(),
                value: self.host.clone(),
                hint: "Use an IP address such as 127.0.0.1".to_string(),
            }
            .into()
        })
    }
}

/// Shared state behind the request handlers.
struct UiServerState {
    /// Directory served by the fallback route
    out_dir: PathBuf,
    /// Served-file cache: URL path -> (content, content type)
    cache: RwLock<HashMap<String, (Vec<u8>, &'static str)>>,
    /// Connected SSE clients
    clients: RwLock<HashMap<usize, mpsc::Sender<String>>>,
    /// Next client id
    next_client_id: AtomicUsize,
}

impl UiServerState {
    fn new(out_dir: PathBuf) -> Self {
        Self {
            out_dir,
            cache: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
            next_client_id: AtomicUsize::new(0),
        }
    }

    fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(100);
        self.clients.write().insert(id, tx);
        (id, rx)
    }

    fn unregister_client(&self, id: usize) {
        self.clients.write().remove(&id);
    }

    fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Drop every client sender, ending their event streams.
    fn close_clients(&self) {
        self.clients.write().clear();
    }

    fn cached(&self, path: &str) -> Option<(Vec<u8>, &'static str)> {
        self.cache.read().get(path).cloned()
    }

    fn store(&self, path: &str, content: Vec<u8>, content_type: &'static str) {
        self.cache
            .write()
            .insert(path.to_string(), (content, content_type));
    }

    fn invalidate(&self) {
        self.cache.write().clear();
    }

    /// Send an event to every connected client, dropping the ones that
    /// have gone away.
    async fn broadcast(&self, event: &DevEvent) {
        let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
        let clients = self.clients.read().clone();

        let mut gone = Vec::new();
        for (id, tx) in clients {
            if tx.send(payload.clone()).await.is_err() {
                gone.push(id);
            }
        }
        for id in gone {
            self.unregister_client(id);
        }
    }
}

/// A running development server.
///
/// At most one exists per session; it lives in the session's server slot
/// and is replaced through close-before-replace.
pub struct UiServerHandle {
    addr: SocketAddr,
    state: Arc<UiServerState>,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
    changes: JoinHandle<()>,
}

impl UiServerHandle {
    /// Address the server actually bound, after port fallback.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Browser-facing URL.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of currently connected UI clients.
    pub fn client_count(&self) -> usize {
        self.state.client_count()
    }
}

#[async_trait]
impl crate::dev::session::Closeable for UiServerHandle {
    async fn close(mut self) {
        self.changes.abort();
        // Open SSE streams keep their connections busy, which would hold
        // graceful shutdown indefinitely; ending the streams first lets
        // it complete.
        self.state.close_clients();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut self.server).await {
            Ok(Ok(())) => debug!("development server stopped"),
            Ok(Err(e)) => {
                if !e.is_cancelled() {
                    warn!("development server task failed: {e}");
                }
            }
            Err(_) => {
                self.server.abort();
                warn!("development server did not stop in time, aborting");
            }
        }
    }
}

/// Start the development server for this session.
///
/// Binds the configured address, falling back through the next few ports
/// when the first one is taken, and spawns the request loop plus the
/// change forwarder that turns UI change announcements into reload
/// events.
///
/// # Errors
///
/// Returns an error when the host is not a valid address or every
/// candidate port is in use.
pub async fn start_ui_server(
    config: UiServerConfig,
    session: Arc<Session>,
) -> Result<UiServerHandle> {
    let host = config.bind_host()?;
    let listener = bind_with_fallback(host, config.port).await?;
    let addr = listener.local_addr()?;

    let state = Arc::new(UiServerState::new(config.out_dir));
    let app = build_router(Arc::clone(&state), config.cors);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            warn!("development server stopped unexpectedly: {e}");
        }
    });
    // Subscribe before spawning so no announcement can slip past.
    let changes = tokio::spawn(forward_changes(
        Arc::clone(&state),
        session.subscribe_ui_changes(),
        session.busy_flag(),
    ));

    crate::ui::success(&format!("Development server running at http://{addr}"));

    Ok(UiServerHandle {
        addr,
        state,
        shutdown: Some(shutdown_tx),
        server,
        changes,
    })
}

/// Bind `start`, or the next few ports when it is taken.
async fn bind_with_fallback(host: IpAddr, start: u16) -> Result<TcpListener> {
    let end = start.saturating_add(PORT_SCAN_SPAN - 1);
    for port in start..=end {
        let addr = SocketAddr::new(host, port);
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                if port != start {
                    crate::ui::warning(&format!("Port {start} is taken, using {port} instead"));
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                debug!(port, "port in use, trying the next one");
            }
            Err(e) => return Err(ServerError::Bind { addr, source: e }.into()),
        }
    }
    Err(ServerError::PortsExhausted { start, end }.into())
}

fn build_router(state: Arc<UiServerState>, cors: bool) -> Router {
    let router = Router::new()
        .route("/__plinth_events__", get(handle_events))
        .route("/__plinth_reload__.js", get(handle_reload_script))
        .route("/favicon.ico", get(handle_favicon))
        .fallback(handle_request)
        .with_state(state);

    if cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}

/// Forward UI change announcements to connected clients.
///
/// Changes arriving while the busy flag is set are buffered; when the
/// flag clears they are applied in arrival order, the cache is
/// invalidated once, and a single reload event goes out.
async fn forward_changes(
    state: Arc<UiServerState>,
    mut changes: broadcast::Receiver<PathBuf>,
    mut busy: watch::Receiver<bool>,
) {
    loop {
        let first = match changes.recv().await {
            Ok(path) => path,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!(missed, "change announcements lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };
        let mut pending = vec![first];
        while let Ok(path) = changes.try_recv() {
            pending.push(path);
        }

        while *busy.borrow_and_update() {
            tokio::select! {
                changed = busy.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                next = changes.recv() => match next {
                    Ok(path) => pending.push(path),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(missed, "change announcements lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        for path in &pending {
            debug!(path = %path.display(), "applying change");
        }
        state.invalidate();
        state.broadcast(&DevEvent::Reload).await;
    }
}

/// Handle SSE connections for reload events.
async fn handle_events(
    State(state): State<Arc<UiServerState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>>
{
    use axum::response::sse::Event;

    let (id, rx) = state.register_client();
    crate::ui::info(&format!("UI client {id} connected"));
    state.broadcast(&DevEvent::ClientConnected { id }).await;

    let stream = ReceiverStream::new(rx).map(|data| Ok(Event::default().data(data)));

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// Serve the reload client script.
async fn handle_reload_script() -> impl IntoResponse {
    const RELOAD_SCRIPT: &str = include_str!("../../assets/reload-client.js");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/javascript")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(RELOAD_SCRIPT))
        .unwrap()
}

/// Handle favicon requests with 204 No Content.
async fn handle_favicon() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

/// Serve an artifact from the cache or the output directory.
///
/// The root path serves the UI document. HTML responses get the reload
/// client script injected before the closing body tag.
async fn handle_request(State(state): State<Arc<UiServerState>>, uri: Uri) -> Response {
    let path = if uri.path() == "/" {
        "/ui.html"
    } else {
        uri.path()
    };

    let relative = path.trim_start_matches('/');
    if !is_safe_path(relative) {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(format!("File not found: {path}")))
            .unwrap();
    }

    if let Some((content, content_type)) = state.cached(path) {
        return file_response(content, content_type);
    }

    let file_path = state.out_dir.join(relative);
    if file_path.is_file() {
        match tokio::fs::read(&file_path).await {
            Ok(content) => {
                let content_type = content_type_for(path);
                let content = if content_type.starts_with("text/html") {
                    inject_reload_tag(&content)
                } else {
                    content
                };
                state.store(path, content.clone(), content_type);
                return file_response(content, content_type);
            }
            Err(e) => {
                crate::ui::warning(&format!("Failed to read {}: {}", file_path.display(), e));
            }
        }
    }

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(format!("File not found: {path}")))
        .unwrap()
}

/// A request path may only address files inside the output directory.
/// Anything with a parent-directory or root component is rejected.
fn is_safe_path(relative: &str) -> bool {
    Path::new(relative)
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
}

fn file_response(content: Vec<u8>, content_type: &str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(content))
        .unwrap()
}

/// Inject the reload client script before the closing body tag.
fn inject_reload_tag(content: &[u8]) -> Vec<u8> {
    let html = String::from_utf8_lossy(content);
    let tag = r#"<script src="/__plinth_reload__.js"></script>"#;

    if let Some(pos) = html.rfind("</body>") {
        let mut result = String::with_capacity(html.len() + tag.len() + 4);
        result.push_str(&html[..pos]);
        result.push_str("\n  ");
        result.push_str(tag);
        result.push('\n');
        result.push_str(&html[pos..]);
        return result.into_bytes();
    }

    let mut result = html.into_owned();
    result.push('\n');
    result.push_str(tag);
    result.into_bytes()
}

/// Determine content type from file extension.
fn content_type_for(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    match extension {
        "html" => "text/html; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "css" => "text/css",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "wasm" => "application/wasm",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}
