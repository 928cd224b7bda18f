use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use percent_encoding::percent_decode_str;
use tiny_http::{Header, Method, Request, Response, Server};

use crate::ops::PathGuard;

use super::lifecycle::Shared;

/// Serves GET/HEAD for files under `static_root` until shutdown.
pub(super) fn serve_loop(server: Arc<Server>, static_root: Option<PathGuard>, shared: Arc<Shared>) {
    while !shared.is_shutting_down() {
        match server.recv_timeout(shared.config.poll_interval()) {
            Ok(Some(request)) => handle_request(request, static_root.as_ref()),
            Ok(None) => {}
            Err(err) => {
                if shared.is_shutting_down() {
                    break;
                }
                tracing::warn!(error = %err, "http receive failed");
                thread::sleep(shared.config.poll_interval());
            }
        }
    }
    tracing::debug!("http listener exiting");
}

fn handle_request(request: Request, static_root: Option<&PathGuard>) {
    let method = request.method().clone();
    let url = request.url().to_string();

    let (status, result) = match method {
        Method::Get | Method::Head => match static_root.and_then(|root| locate(&url, root)) {
            Some(path) => match fs::File::open(&path) {
                Ok(file) => {
                    let mut response = Response::from_file(file);
                    if let Some(header) = content_type(&path) {
                        response.add_header(header);
                    }
                    (200, request.respond(response))
                }
                Err(_) => (404, request.respond(not_found())),
            },
            None => (404, request.respond(not_found())),
        },
        _ => {
            let mut response =
                Response::from_string("method not allowed").with_status_code(405);
            if let Ok(allow) = Header::from_bytes(&b"Allow"[..], &b"GET, HEAD"[..]) {
                response.add_header(allow);
            }
            (405, request.respond(response))
        }
    };
    if let Err(err) = result {
        tracing::debug!(error = %err, "http response not delivered");
    }
    tracing::debug!(%method, url, status, "http request");
}

fn not_found() -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string("not found").with_status_code(404)
}

/// Maps a request URL to a regular file inside the static root; directories map to their
/// `index.html`.
pub(super) fn locate(url: &str, root: &PathGuard) -> Option<PathBuf> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    let relative = decoded.trim_start_matches('/');

    let resolved = root.resolve(relative).ok()?;
    let meta = fs::metadata(&resolved.absolute).ok()?;
    let file = if meta.is_dir() {
        root.resolve(resolved.relative.join("index.html")).ok()?
    } else {
        resolved
    };
    fs::metadata(&file.absolute)
        .ok()
        .filter(fs::Metadata::is_file)
        .map(|_| file.absolute)
}

fn content_type(path: &Path) -> Option<Header> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    let value = match extension.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    };
    Header::from_bytes(&b"Content-Type"[..], value.as_bytes()).ok()
}
