use std::fmt;
use std::net::{Shutdown, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tiny_http::Server;

use crate::dispatch::{EventSink, OperationEvent};
use crate::error::{Error, Result};
use crate::ops::PathGuard;
use crate::server_config::ServerConfig;

use super::registry::{ClientRegistry, DeliveryReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundPorts {
    pub http: u16,
    pub push: u16,
}

/// Thread accounting for one `stop()` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub joined: usize,
    /// Threads still alive at the deadline; they were detached.
    pub leaked: usize,
}

pub(super) struct ClientThread {
    pub(super) socket: TcpStream,
    pub(super) handle: JoinHandle<()>,
}

/// State shared by the listener and client threads of one run.
pub(super) struct Shared {
    pub(super) config: ServerConfig,
    pub(super) registry: Arc<ClientRegistry>,
    shutdown: AtomicBool,
    clients: Mutex<Vec<ClientThread>>,
}

impl Shared {
    pub(super) fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn lock_clients(&self) -> MutexGuard<'_, Vec<ClientThread>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a client thread, reaping any that already finished.
    pub(super) fn track_client(&self, client: ClientThread) {
        let mut clients = self.lock_clients();
        let (finished, alive): (Vec<_>, Vec<_>) = clients
            .drain(..)
            .partition(|client| client.handle.is_finished());
        *clients = alive;
        clients.push(client);
        drop(clients);
        for done in finished {
            let _ = done.handle.join();
        }
    }

    fn take_clients(&self) -> Vec<ClientThread> {
        std::mem::take(&mut *self.lock_clients())
    }
}

struct Running {
    ports: BoundPorts,
    shared: Arc<Shared>,
    http: Arc<Server>,
    listeners: Vec<JoinHandle<()>>,
}

/// `running` is `Some` exactly while `state` is `Running`.
struct Lifecycle {
    state: LifecycleState,
    running: Option<Running>,
}

impl Lifecycle {
    fn transition(&mut self, next: LifecycleState) {
        tracing::debug!(from = ?self.state, to = ?next, "notification server state");
        self.state = next;
    }
}

/// HTTP static listener plus WebSocket push channel on a consecutive port pair.
pub struct NotificationServer {
    config: ServerConfig,
    static_root: Option<PathGuard>,
    registry: Arc<ClientRegistry>,
    lifecycle: Mutex<Lifecycle>,
    /// Signalled when a `Starting` or `Stopping` phase ends.
    settled: Condvar,
}

impl fmt::Debug for NotificationServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationServer")
            .field("host", &self.config.host)
            .field("base_port", &self.config.base_port)
            .field("state", &self.state())
            .field("ports", &self.ports())
            .finish()
    }
}

impl NotificationServer {
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let static_root = config
            .static_dir
            .as_deref()
            .map(PathGuard::new)
            .transpose()?;
        Ok(Self {
            config,
            static_root,
            registry: Arc::new(ClientRegistry::new()),
            lifecycle: Mutex::new(Lifecycle {
                state: LifecycleState::Stopped,
                running: None,
            }),
            settled: Condvar::new(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.lock_lifecycle().state
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks while another caller is starting or stopping the server.
    fn lock_settled(&self) -> MutexGuard<'_, Lifecycle> {
        self.settled
            .wait_while(self.lock_lifecycle(), |lifecycle| {
                matches!(
                    lifecycle.state,
                    LifecycleState::Starting | LifecycleState::Stopping
                )
            })
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ports(&self) -> Option<BoundPorts> {
        self.lock_lifecycle()
            .running
            .as_ref()
            .map(|running| running.ports)
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Binds the first free port pair and spawns both listener threads. Calling it while
    /// running returns the ports already bound; calling it during a `stop()` waits for that
    /// stop to finish and then starts afresh.
    pub fn start(&self) -> Result<BoundPorts> {
        let mut lifecycle = self.lock_settled();
        if let Some(current) = lifecycle.running.as_ref() {
            tracing::debug!(http = current.ports.http, "notification server already running");
            return Ok(current.ports);
        }

        lifecycle.transition(LifecycleState::Starting);
        let launched = self.launch();
        let result = match launched {
            Ok(launched) => {
                let ports = launched.ports;
                lifecycle.running = Some(launched);
                lifecycle.transition(LifecycleState::Running);
                tracing::info!(
                    host = %self.config.host,
                    http = ports.http,
                    push = ports.push,
                    "notification server running"
                );
                Ok(ports)
            }
            Err(err) => {
                lifecycle.transition(LifecycleState::Stopped);
                Err(err)
            }
        };
        drop(lifecycle);
        self.settled.notify_all();
        result
    }

    fn launch(&self) -> Result<Running> {
        let (http_listener, push_listener, ports) = bind_pair(&self.config)?;
        let http = Server::from_listener(http_listener, None)
            .map(Arc::new)
            .map_err(|err| Error::Io {
                op: "start http listener",
                path: PathBuf::from(format!("{}:{}", self.config.host, ports.http)),
                source: std::io::Error::other(err.to_string()),
            })?;

        let shared = Arc::new(Shared {
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
            shutdown: AtomicBool::new(false),
            clients: Mutex::new(Vec::new()),
        });

        let mut listeners = Vec::with_capacity(2);
        let spawn_failed = |err: std::io::Error| Error::Io {
            op: "spawn listener thread",
            path: PathBuf::from(format!("{}:{}", self.config.host, ports.http)),
            source: err,
        };

        let http_thread = {
            let server = Arc::clone(&http);
            let static_root = self.static_root.clone();
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("fs-relay-http".to_string())
                .spawn(move || super::http::serve_loop(server, static_root, shared))
                .map_err(spawn_failed)?
        };
        listeners.push(http_thread);

        let push_thread = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("fs-relay-push".to_string())
                .spawn(move || super::push::accept_loop(push_listener, shared))
        };
        match push_thread {
            Ok(handle) => listeners.push(handle),
            Err(err) => {
                shared.shutdown.store(true, Ordering::Release);
                http.unblock();
                for handle in listeners {
                    let _ = handle.join();
                }
                return Err(spawn_failed(err));
            }
        }

        Ok(Running {
            ports,
            shared,
            http,
            listeners,
        })
    }

    /// Raises the shutdown flag, closes client connections and waits up to
    /// `shutdown_timeout` for every thread. Threads still alive at the deadline are logged
    /// and detached. Concurrent `start()`/`stop()` calls wait until this one finishes.
    pub fn stop(&self) -> StopReport {
        let running = {
            let mut lifecycle = self.lock_settled();
            let Some(running) = lifecycle.running.take() else {
                return StopReport::default();
            };
            lifecycle.transition(LifecycleState::Stopping);
            running
        };
        let deadline = Instant::now() + self.config.shutdown_timeout();
        let poll = self.config.poll_interval().min(Duration::from_millis(10));
        let Running {
            ports,
            shared,
            http,
            listeners,
        } = running;

        shared.shutdown.store(true, Ordering::Release);
        http.unblock();
        self.registry.clear();

        let mut report = StopReport::default();
        // Listeners first so no client thread is spawned after the client list is drained.
        for handle in listeners {
            wait_until(&handle, deadline, poll);
            finish(handle, "listener", &mut report);
        }

        let clients = shared.take_clients();
        for client in &clients {
            let _ = client.socket.shutdown(Shutdown::Both);
        }
        for client in clients {
            wait_until(&client.handle, deadline, poll);
            finish(client.handle, "push client", &mut report);
        }

        self.lock_lifecycle().transition(LifecycleState::Stopped);
        self.settled.notify_all();
        tracing::info!(
            http = ports.http,
            push = ports.push,
            joined = report.joined,
            leaked = report.leaked,
            "notification server stopped"
        );
        report
    }

    /// Serializes `event` once and enqueues it for every connected client.
    pub fn broadcast<T: Serialize>(&self, event: &T) -> DeliveryReport {
        match serde_json::to_string(event) {
            Ok(message) => self
                .registry
                .broadcast(&message, self.config.send_timeout()),
            Err(err) => {
                tracing::warn!(error = %err, "event not serializable; broadcast skipped");
                DeliveryReport::default()
            }
        }
    }
}

impl EventSink for NotificationServer {
    fn publish(&self, event: &OperationEvent) {
        let report = self.broadcast(event);
        tracing::debug!(
            operation = %event.operation,
            enqueued = report.enqueued,
            dropped = report.dropped,
            "event broadcast"
        );
    }
}

impl Drop for NotificationServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn wait_until(handle: &JoinHandle<()>, deadline: Instant, poll: Duration) {
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(poll);
    }
}

fn finish(handle: JoinHandle<()>, role: &'static str, report: &mut StopReport) {
    if handle.is_finished() {
        if handle.join().is_err() {
            tracing::warn!(role, "thread panicked before shutdown");
        }
        report.joined += 1;
    } else {
        let name = handle.thread().name().unwrap_or("unnamed").to_string();
        tracing::error!(role, thread = %name, "thread did not stop before the deadline; detaching");
        report.leaked += 1;
    }
}

/// Scans consecutive base ports for a free (http, http + 1) pair. The bind itself is the
/// probe; a half-bound pair is released before moving on.
fn bind_pair(config: &ServerConfig) -> Result<(TcpListener, TcpListener, BoundPorts)> {
    let host = config.host.as_str();
    let mut attempted = Vec::new();
    for offset in 0..config.port_scan_limit {
        let Some(http_port) = config.base_port.checked_add(offset) else {
            break;
        };
        let Some(push_port) = http_port.checked_add(1) else {
            break;
        };
        attempted.push(http_port);

        let http = match TcpListener::bind((host, http_port)) {
            Ok(listener) => listener,
            Err(err) => {
                tracing::debug!(port = http_port, error = %err, "http port unavailable");
                continue;
            }
        };
        match TcpListener::bind((host, push_port)) {
            Ok(push) => {
                if http_port != config.base_port {
                    tracing::info!(
                        requested = config.base_port,
                        http = http_port,
                        push = push_port,
                        "requested ports busy; shifted"
                    );
                }
                let ports = BoundPorts {
                    http: http_port,
                    push: push_port,
                };
                return Ok((http, push, ports));
            }
            Err(err) => {
                tracing::debug!(port = push_port, error = %err, "push port unavailable");
            }
        }
    }

    Err(Error::Startup {
        host: config.host.clone(),
        base_port: config.base_port,
        attempted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_on(port: u16) -> ServerConfig {
        ServerConfig {
            base_port: port,
            port_scan_limit: 20,
            shutdown_timeout_ms: 1_000,
            poll_interval_ms: 10,
            ..ServerConfig::default()
        }
    }

    fn free_port() -> u16 {
        TcpListener::bind(("127.0.0.1", 0))
            .expect("bind")
            .local_addr()
            .expect("addr")
            .port()
    }

    #[test]
    fn exhausted_scan_reports_attempted_ports() {
        let blocker = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let port = blocker.local_addr().expect("addr").port();
        let config = ServerConfig {
            base_port: port,
            port_scan_limit: 1,
            ..config_on(port)
        };
        match bind_pair(&config) {
            Err(Error::Startup {
                base_port,
                attempted,
                ..
            }) => {
                assert_eq!(base_port, port);
                assert_eq!(attempted, vec![port]);
            }
            other => panic!("unexpected result: {:?}", other.map(|(_, _, ports)| ports)),
        }
    }

    #[test]
    fn stop_without_start_is_a_no_op() {
        let server = NotificationServer::new(config_on(free_port())).expect("server");
        assert_eq!(server.state(), LifecycleState::Stopped);
        assert_eq!(server.stop(), StopReport::default());
        assert_eq!(server.ports(), None);
    }

    #[test]
    fn missing_static_dir_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ServerConfig {
            static_dir: Some(dir.path().join("missing")),
            ..config_on(free_port())
        };
        assert!(NotificationServer::new(config).is_err());
    }
}
