//! Document-root file server
//!
//! A [`FileServer`] owns a listener thread and one thread per connection.
//! Requests are answered from the overlay directories (the last one listed
//! first) and then the document root.

use std::fs::{self, File, Metadata};
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::handles::HandleRegistry;
use crate::mime::content_type;
use crate::request::{find_head_end, parse_head, Method, Request, MAX_HEAD_SIZE};
use crate::response::{http_date, ResponseHead};

/// Default listen address
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// How long the accept loop sleeps when no connection is pending
const ACCEPT_POLL: Duration = Duration::from_millis(10);

const READ_CHUNK: usize = 8 * 1024;

/// Largest request body skipped to keep a connection open
const MAX_SKIPPED_BODY: u64 = 1024 * 1024;

// ============================================================================
// Document roots
// ============================================================================

/// A file found under one of the roots
#[derive(Debug)]
pub struct ResolvedFile {
    /// Full path on disk
    pub path: PathBuf,
    /// Open handle
    pub file: File,
    /// Metadata of the open handle
    pub metadata: Metadata,
}

/// Ordered set of directories a request path is looked up in
#[derive(Debug, Clone)]
pub struct DocumentRoots {
    root: PathBuf,
    overlays: Vec<PathBuf>,
}

impl DocumentRoots {
    /// Roots with no overlays
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DocumentRoots {
            root: root.into(),
            overlays: Vec::new(),
        }
    }

    /// Add an overlay; later overlays shadow earlier ones
    pub fn push_overlay(&mut self, overlay: impl Into<PathBuf>) {
        self.overlays.push(overlay.into());
    }

    /// Document root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Overlays in the order they were added
    pub fn overlays(&self) -> &[PathBuf] {
        &self.overlays
    }

    /// Directories in lookup order
    pub fn search_order(&self) -> impl Iterator<Item = &Path> {
        self.overlays
            .iter()
            .rev()
            .map(PathBuf::as_path)
            .chain(std::iter::once(self.root.as_path()))
    }

    /// Find the file a request path names.
    ///
    /// Directories map to their `index.html`. A candidate that cannot be
    /// opened falls through to the next directory. Paths that would leave a
    /// root resolve to nothing.
    pub fn resolve(&self, request_path: &str) -> Option<ResolvedFile> {
        let relative = relative_path(request_path)?;
        for base in self.search_order() {
            let mut candidate = base.join(&relative);
            match fs::metadata(&candidate) {
                Ok(meta) if meta.is_dir() => candidate.push("index.html"),
                Ok(_) => {}
                Err(_) => continue,
            }
            let opened = File::open(&candidate).and_then(|file| {
                let metadata = file.metadata()?;
                Ok((file, metadata))
            });
            if let Ok((file, metadata)) = opened {
                if metadata.is_file() {
                    return Some(ResolvedFile {
                        path: candidate,
                        file,
                        metadata,
                    });
                }
            }
        }
        None
    }

    /// Answer a parsed request head; `None` is a malformed head
    pub fn respond(&self, request: Option<&Request>) -> Response {
        let Some(request) = request else {
            return Response::empty(400, false);
        };
        // A body that cannot be skipped leaves the stream unframed
        let keep_alive = request.keep_alive()
            && request
                .body_length()
                .is_some_and(|len| len <= MAX_SKIPPED_BODY);

        if !matches!(request.method, Method::Get | Method::Head) {
            let mut response = Response::empty(405, keep_alive);
            response.head = response.head.header("Allow", "GET HEAD");
            return response;
        }

        let Some(found) = self.resolve(&request.path) else {
            return Response::empty(404, keep_alive);
        };

        let mut head = ResponseHead::new(200)
            .header("Content-Type", content_type(&found.path))
            .header("Content-Length", found.metadata.len().to_string());
        if let Ok(modified) = found.metadata.modified() {
            head = head.header("Last-Modified", http_date(modified));
        }
        if !keep_alive {
            head = head.header("Connection", "close");
        }

        Response {
            head,
            body: (request.method == Method::Get).then_some(found.file),
            keep_alive,
        }
    }
}

/// Relative path of normal components, or `None` if it escapes the root
fn relative_path(request_path: &str) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for segment in request_path.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment.contains(['\\', '\0']) {
            return None;
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => relative.push(part),
            _ => return None,
        }
    }
    Some(relative)
}

/// Head, optional body and connection disposition for one request
#[derive(Debug)]
pub struct Response {
    /// Status line and headers
    pub head: ResponseHead,
    /// File streamed after the head (GET hits only)
    pub body: Option<File>,
    /// Whether the connection stays open afterwards
    pub keep_alive: bool,
}

impl Response {
    fn empty(status: u16, keep_alive: bool) -> Self {
        let mut head = ResponseHead::new(status).header("Content-Length", "0");
        if !keep_alive {
            head = head.header("Connection", "close");
        }
        Response {
            head,
            body: None,
            keep_alive,
        }
    }
}

// ============================================================================
// Server
// ============================================================================

struct Running {
    shutdown: Arc<AtomicBool>,
    accept: JoinHandle<()>,
    connections: Arc<HandleRegistry<TcpStream>>,
}

/// Loopback HTTP server for a document root
pub struct FileServer {
    roots: Arc<DocumentRoots>,
    host: String,
    port: AtomicU16,
    running: Mutex<Option<Running>>,
}

impl FileServer {
    /// Server for `root` with no overlays
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_roots(DocumentRoots::new(root))
    }

    /// Server for `root` with overlays; later overlays shadow earlier ones
    pub fn with_overlays(root: impl Into<PathBuf>, overlays: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut roots = DocumentRoots::new(root);
        for overlay in overlays {
            roots.push_overlay(overlay);
        }
        Self::with_roots(roots)
    }

    /// Server for a prepared set of roots
    pub fn with_roots(roots: DocumentRoots) -> Self {
        FileServer {
            roots: Arc::new(roots),
            host: DEFAULT_HOST.to_string(),
            port: AtomicU16::new(0),
            running: Mutex::new(None),
        }
    }

    /// Listen on `host` instead of the loopback address
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Directories requests are served from
    pub fn roots(&self) -> &DocumentRoots {
        &self.roots
    }

    /// Bound port, 0 when stopped
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Acquire)
    }

    /// Whether the listener is running
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Bind `port` (0 picks an ephemeral port) and start serving.
    ///
    /// Returns the bound port.
    pub fn start(&self, port: u16) -> Result<u16, ServerError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(ServerError::AlreadyRunning(self.port()));
        }
        if !self.roots.root().is_dir() {
            return Err(ServerError::InvalidRoot(self.roots.root().to_path_buf()));
        }

        let addr = format!("{}:{}", self.host, port);
        let listener = TcpListener::bind(&addr).map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let bound = listener.local_addr()?.port();

        let shutdown = Arc::new(AtomicBool::new(false));
        let connections = Arc::new(HandleRegistry::new());
        let accept = {
            let roots = Arc::clone(&self.roots);
            let shutdown = Arc::clone(&shutdown);
            let connections = Arc::clone(&connections);
            thread::Builder::new()
                .name("tether-http".to_string())
                .spawn(move || accept_loop(listener, roots, shutdown, connections))?
        };

        *running = Some(Running {
            shutdown,
            accept,
            connections,
        });
        self.port.store(bound, Ordering::Release);
        info!(host = %self.host, port = bound, root = %self.roots.root().display(), "file server started");
        Ok(bound)
    }

    /// Stop listening and close every open connection
    pub fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        running.shutdown.store(true, Ordering::Release);
        if running.accept.join().is_err() {
            warn!("file server accept thread panicked");
        }
        let open = running.connections.drain();
        let count = open.len();
        for stream in open {
            let _ = stream.shutdown(Shutdown::Both);
        }
        let port = self.port.swap(0, Ordering::AcqRel);
        info!(port, connections = count, "file server stopped");
    }
}

impl Drop for FileServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FileServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileServer")
            .field("roots", &self.roots)
            .field("host", &self.host)
            .field("port", &self.port())
            .finish()
    }
}

fn accept_loop(
    listener: TcpListener,
    roots: Arc<DocumentRoots>,
    shutdown: Arc<AtomicBool>,
    connections: Arc<HandleRegistry<TcpStream>>,
) {
    while !shutdown.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "connection accepted");
                if let Err(e) = spawn_connection(stream, &roots, &connections) {
                    warn!("failed to start connection: {}", e);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                warn!("accept failed: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn spawn_connection(
    stream: TcpStream,
    roots: &Arc<DocumentRoots>,
    connections: &Arc<HandleRegistry<TcpStream>>,
) -> io::Result<()> {
    // Accepted sockets inherit non-blocking mode on some platforms
    stream.set_nonblocking(false)?;
    let id = connections.insert(stream.try_clone()?);

    let roots = Arc::clone(roots);
    let registry = Arc::clone(connections);
    let spawned = thread::Builder::new()
        .name(format!("tether-http-{}", id))
        .spawn(move || {
            if let Err(e) = serve_connection(stream, &roots) {
                debug!("connection ended: {}", e);
            }
            registry.remove(id);
        });
    if let Err(e) = spawned {
        if let Some(stream) = connections.remove(id) {
            let _ = stream.shutdown(Shutdown::Both);
        }
        return Err(e);
    }
    Ok(())
}

/// Read request heads and answer them until the peer or a response closes
fn serve_connection(mut stream: TcpStream, roots: &DocumentRoots) -> io::Result<()> {
    let mut buffer: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        while let Some(end) = find_head_end(&buffer) {
            if end > MAX_HEAD_SIZE {
                debug!(head = end, "request head too large");
                let _ = stream.shutdown(Shutdown::Both);
                return Ok(());
            }
            let request = parse_head(&buffer[..end]);
            buffer.drain(..end);

            let response = roots.respond(request.as_ref());
            match &request {
                Some(req) => debug!(method = %req.method, path = %req.path, status = response.head.status, "request"),
                None => debug!(status = response.head.status, "malformed request"),
            }
            write_response(&mut stream, response.head.to_bytes(), response.body)?;
            if !response.keep_alive {
                let _ = stream.shutdown(Shutdown::Both);
                return Ok(());
            }
            let body = request.as_ref().and_then(Request::body_length).unwrap_or(0);
            skip_body(&mut stream, &mut buffer, body)?;
        }

        if buffer.len() >= MAX_HEAD_SIZE {
            debug!(buffered = buffer.len(), "request head too large");
            let _ = stream.shutdown(Shutdown::Both);
            return Ok(());
        }

        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
}

/// Discard `len` body bytes, first from `buffer` and then from the stream
fn skip_body(stream: &mut TcpStream, buffer: &mut Vec<u8>, len: u64) -> io::Result<()> {
    let buffered = buffer.len().min(usize::try_from(len).unwrap_or(usize::MAX));
    buffer.drain(..buffered);
    let remaining = len - buffered as u64;
    if remaining > 0 {
        let skipped = io::copy(&mut Read::by_ref(stream).take(remaining), &mut io::sink())?;
        if skipped < remaining {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
    }
    Ok(())
}

fn write_response(stream: &mut TcpStream, head: Vec<u8>, body: Option<File>) -> io::Result<()> {
    stream.write_all(&head)?;
    if let Some(file) = body {
        io::copy(&mut BufReader::with_capacity(64 * 1024, file), stream)?;
    }
    stream.flush()
}
