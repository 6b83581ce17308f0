//! Development server for the generated book.
//!
//! A `tiny_http` server on `127.0.0.1:<port>` serving the output directory:
//!
//! 1. Exact file match → the file
//! 2. Directory with `index.html` → that file
//! 3. Directory without one → generated listing
//! 4. Anything else → 404
//!
//! Request paths containing `..` (or anything else that is not a plain
//! relative path) get a 403. The server reads from disk on every request,
//! so pages rewritten by the watch loop show up on the next reload.

use maud::{DOCTYPE, Markup, html};
use std::fs;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tiny_http::{Header, Request, Response, Server};

/// Port used when `--port` is not given.
pub const DEFAULT_PORT: u16 = 1313;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("failed to bind {addr}: {message}")]
    Bind { addr: SocketAddr, message: String },
}

/// A bound server, not yet accepting requests.
pub struct DevServer {
    server: Arc<Server>,
    root: PathBuf,
    addr: SocketAddr,
}

impl DevServer {
    /// Bind to `127.0.0.1:port` (port 0 picks a free one).
    pub fn bind(root: impl Into<PathBuf>, port: u16) -> Result<Self, ServeError> {
        let requested = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let server = Server::http(requested).map_err(|e| ServeError::Bind {
            addr: requested,
            message: e.to_string(),
        })?;
        let addr = server.server_addr().to_ip().unwrap_or(requested);
        Ok(Self {
            server: Arc::new(server),
            root: root.into(),
            addr,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle that makes [`run`](Self::run) return.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.server))
    }

    /// Serve requests until shut down.
    pub fn run(&self) {
        log::info!("serving {} on http://{}", self.root.display(), self.addr);
        for request in self.server.incoming_requests() {
            let url = request.url().to_string();
            if let Err(e) = handle_request(request, &self.root) {
                log::warn!("request {url} failed: {e}");
            }
        }
        log::debug!("server stopped");
    }
}

/// Stops a running [`DevServer`].
#[derive(Clone)]
pub struct ShutdownHandle(Arc<Server>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.unblock();
    }
}

/// What a request URL maps to under the serve root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    File(PathBuf),
    Listing { dir: PathBuf, request_path: String },
    NotFound,
    Forbidden,
}

/// Map a request URL to a file or directory under `root`.
pub fn resolve(root: &Path, url: &str) -> Resolved {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let Ok(decoded) = urlencoding::decode(path) else {
        return Resolved::NotFound;
    };
    let request_path = decoded.trim_matches('/');

    let relative = Path::new(request_path);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Resolved::Forbidden;
    }

    let local = root.join(relative);
    if local.is_file() {
        return Resolved::File(local);
    }
    if local.is_dir() {
        let index = local.join("index.html");
        if index.is_file() {
            return Resolved::File(index);
        }
        return Resolved::Listing {
            dir: local,
            request_path: request_path.to_string(),
        };
    }
    Resolved::NotFound
}

fn handle_request(request: Request, root: &Path) -> io::Result<()> {
    match resolve(root, request.url()) {
        Resolved::File(path) => {
            let body = fs::read(&path)?;
            respond(request, 200, guess_content_type(&path), body)
        }
        Resolved::Listing { dir, request_path } => {
            let body = directory_listing(&dir, &request_path)?;
            respond(request, 200, HTML, body.into_string().into_bytes())
        }
        Resolved::NotFound => {
            let body = error_page("404 Not Found", request.url());
            respond(request, 404, HTML, body.into_string().into_bytes())
        }
        Resolved::Forbidden => {
            let body = error_page("403 Forbidden", request.url());
            respond(request, 403, HTML, body.into_string().into_bytes())
        }
    }
}

const HTML: &str = "text/html; charset=utf-8";

fn respond(request: Request, status: u16, content_type: &str, body: Vec<u8>) -> io::Result<()> {
    let mut response = Response::from_data(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes("Content-Type", content_type) {
        response.add_header(header);
    }
    request.respond(response)
}

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
pub fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html" | "htm") => HTML,
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",

        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",

        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// HTML listing of `dir`, hidden entries left out, directories first.
pub fn directory_listing(dir: &Path, request_path: &str) -> io::Result<Markup> {
    let mut entries: Vec<(bool, String)> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                return None;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            Some((!is_dir, name))
        })
        .collect();
    entries.sort();

    let base = if request_path.is_empty() {
        String::new()
    } else {
        format!("/{request_path}")
    };
    let parent = Path::new(request_path)
        .parent()
        .map(|p| format!("/{}", p.to_string_lossy()))
        .unwrap_or_else(|| "/".to_string());
    let title = format!("Index of /{request_path}");

    Ok(html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (title) }
            }
            body {
                h1 { (title) }
                ul {
                    @if !request_path.is_empty() {
                        li { a href=(parent) { ".." } }
                    }
                    @for (is_file, name) in &entries {
                        li {
                            a href={ (base) "/" (urlencoding::encode(name).into_owned()) } {
                                (name)
                                @if !is_file { "/" }
                            }
                        }
                    }
                }
            }
        }
    })
}

fn error_page(status: &str, url: &str) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (status) }
            }
            body {
                h1 { (status) }
                p { code { (url) } }
            }
        }
    }
}
