use std::io::ErrorKind as IoErrorKind;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};
use serde_json::{Value, json};
use tungstenite::handshake::HandshakeError;
use tungstenite::{Message, WebSocket};

use super::lifecycle::{ClientThread, Shared};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Accepts push-channel connections until shutdown, one thread per client.
pub(super) fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    if let Err(err) = listener.set_nonblocking(true) {
        tracing::error!(error = %err, "push listener cannot poll for shutdown");
        return;
    }
    while !shared.is_shutting_down() {
        match listener.accept() {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "push connection accepted");
                spawn_client(stream, &shared);
            }
            Err(err) if err.kind() == IoErrorKind::WouldBlock => {
                thread::sleep(shared.config.poll_interval());
            }
            Err(err) if err.kind() == IoErrorKind::Interrupted => {}
            Err(err) => {
                tracing::warn!(error = %err, "push accept failed");
                thread::sleep(shared.config.poll_interval());
            }
        }
    }
    tracing::debug!("push listener exiting");
}

fn spawn_client(stream: TcpStream, shared: &Arc<Shared>) {
    let socket = match stream.try_clone() {
        Ok(socket) => socket,
        Err(err) => {
            tracing::warn!(error = %err, "dropping push connection");
            return;
        }
    };
    let thread_shared = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name("fs-relay-push-client".to_string())
        .spawn(move || serve_client(stream, &thread_shared));
    match spawned {
        Ok(handle) => shared.track_client(ClientThread { socket, handle }),
        Err(err) => tracing::warn!(error = %err, "could not spawn push client thread"),
    }
}

fn serve_client(stream: TcpStream, shared: &Shared) {
    if let Err(err) = prepare_stream(&stream, shared) {
        tracing::debug!(error = %err, "push socket setup failed");
        return;
    }
    let Some(mut socket) = handshake(stream, shared) else {
        return;
    };
    let (id, outbound) = shared
        .registry
        .register(shared.config.client_queue_capacity);
    let reason = pump(&mut socket, &outbound, shared);
    shared.registry.unregister(id);
    tracing::debug!(client = id, reason, "push client finished");
}

// Accepted sockets can inherit the listener's non-blocking flag; reads poll instead.
fn prepare_stream(stream: &TcpStream, shared: &Shared) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(shared.config.poll_interval()))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    stream.set_nodelay(true)
}

fn handshake(stream: TcpStream, shared: &Shared) -> Option<WebSocket<TcpStream>> {
    let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
    let mut attempt = tungstenite::accept(stream);
    loop {
        match attempt {
            Ok(socket) => return Some(socket),
            Err(HandshakeError::Interrupted(mid)) => {
                if shared.is_shutting_down() || Instant::now() >= deadline {
                    return None;
                }
                attempt = mid.handshake();
            }
            Err(HandshakeError::Failure(err)) => {
                tracing::debug!(error = %err, "push handshake failed");
                return None;
            }
        }
    }
}

/// Alternates between draining the outbound queue and answering inbound frames. Returns
/// why the connection ended.
fn pump(
    socket: &mut WebSocket<TcpStream>,
    outbound: &Receiver<String>,
    shared: &Shared,
) -> &'static str {
    loop {
        if shared.is_shutting_down() {
            close(socket);
            return "server stopping";
        }
        loop {
            match outbound.try_recv() {
                Ok(text) => {
                    if socket.send(Message::Text(text)).is_err() {
                        return "send failed";
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    close(socket);
                    return "queue closed";
                }
            }
        }

        let reply = match socket.read() {
            Ok(Message::Text(text)) => Some(reply_to(&text)),
            Ok(Message::Binary(_)) => Some(error_reply("binary frames are not supported")),
            Ok(Message::Close(_)) => {
                let _ = socket.flush();
                return "closed by peer";
            }
            Ok(_) => None,
            Err(tungstenite::Error::Io(err))
                if matches!(err.kind(), IoErrorKind::WouldBlock | IoErrorKind::TimedOut) =>
            {
                // Pending control frames (pongs) go out here.
                let _ = socket.flush();
                None
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                return "disconnected";
            }
            Err(err) => {
                tracing::debug!(error = %err, "push read failed");
                return "read error";
            }
        };
        if let Some(reply) = reply
            && socket.send(Message::Text(reply)).is_err()
        {
            return "send failed";
        }
    }
}

fn close(socket: &mut WebSocket<TcpStream>) {
    let _ = socket.close(None);
    let _ = socket.flush();
}

/// Acknowledges an inbound text frame: JSON is echoed back under `received`.
pub(super) fn reply_to(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(received) => json!({ "type": "response", "data": { "received": received } }).to_string(),
        Err(err) => error_reply(&format!("invalid JSON: {err}")),
    }
}

fn error_reply(message: &str) -> String {
    json!({ "type": "error", "data": { "message": message } }).to_string()
}
