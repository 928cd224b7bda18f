use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use fs_relay::config_io::{AppConfig, load_config};
use fs_relay::dispatch::{Dispatcher, EventSink};
use fs_relay::notify::NotificationServer;
use fs_relay::ops::{Engine, OperationResult};
use fs_relay::{Error, Result};

#[derive(Debug, Parser)]
#[command(name = "fs-relay")]
#[command(
    about = "Workspace-bounded file operations over stdin/stdout, mirrored to a live HTTP/WebSocket front end."
)]
struct Cli {
    /// TOML or JSON config file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    workspace: Option<PathBuf>,
    /// HTTP port; the push channel uses the next one.
    #[arg(long)]
    ui_port: Option<u16>,
    #[arg(long, value_name = "MB")]
    max_file_size: Option<u64>,
    #[arg(long)]
    log_level: Option<String>,
    #[arg(long)]
    static_dir: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    no_ui: bool,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(workspace) = &self.workspace {
            config.workspace.workspace_root = workspace.clone();
        }
        if let Some(port) = self.ui_port {
            config.server.base_port = port;
        }
        if let Some(megabytes) = self.max_file_size {
            config.workspace.limits.max_file_size =
                megabytes.checked_mul(1024 * 1024).ok_or_else(|| {
                    Error::InvalidConfig(format!("--max-file-size {megabytes} MB overflows"))
                })?;
        }
        if let Some(level) = &self.log_level {
            config.log_level = Some(level.clone());
        }
        if let Some(dir) = &self.static_dir {
            config.server.static_dir = Some(dir.clone());
        }
        if self.no_ui {
            config.server.enabled = false;
        }
        config.validate()
    }
}

#[derive(Debug, Deserialize)]
struct RequestLine {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct ResponseLine<'a> {
    id: &'a Value,
    result: &'a OperationResult,
}

/// Stops the notification server once, whichever of signal or stdin EOF comes first.
struct Shutdown {
    server: Option<Arc<NotificationServer>>,
    done: AtomicBool,
}

impl Shutdown {
    fn run(&self, reason: &str) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(reason, "shutting down");
        if let Some(server) = &self.server {
            let report = server.stop();
            if report.leaked > 0 {
                tracing::error!(leaked = report.leaked, "notification threads leaked at exit");
            }
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    cli.apply(&mut config)?;
    init_tracing(config.log_level.as_deref())?;

    let engine = Engine::new(config.workspace.clone())?;
    tracing::info!(root = %engine.root().display(), "workspace ready");
    let mut dispatcher = Dispatcher::new(engine);

    let server = if config.server.enabled {
        let server = Arc::new(NotificationServer::new(config.server.clone())?);
        server.start()?;
        let sink: Arc<dyn EventSink> = server.clone();
        dispatcher = dispatcher.with_sink(sink);
        Some(server)
    } else {
        tracing::info!("notification server disabled");
        None
    };

    let shutdown = Arc::new(Shutdown {
        server,
        done: AtomicBool::new(false),
    });
    spawn_signal_watcher(Arc::clone(&shutdown));

    let served = serve_stdio(&dispatcher);
    shutdown.run("stdin closed");
    served
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)
            .map_err(|err| Error::InvalidConfig(format!("invalid log level {level:?}: {err}")))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| Error::InvalidConfig(format!("logging setup failed: {err}")))
}

/// Waits for SIGINT/SIGTERM on a dedicated single-threaded runtime, then stops the server
/// and exits.
fn spawn_signal_watcher(shutdown: Arc<Shutdown>) {
    let spawned = std::thread::Builder::new()
        .name("fs-relay-signals".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    tracing::warn!(error = %err, "signal handling unavailable");
                    return;
                }
            };
            let signal = runtime.block_on(wait_for_signal());
            shutdown.run(signal);
            std::process::exit(0);
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "signal handling unavailable");
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(error = %err, "SIGTERM handler unavailable");
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT";
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "ctrl-c"
}

/// One JSON request per stdin line, one JSON response per stdout line, until EOF.
fn serve_stdio(dispatcher: &Dispatcher) -> Result<()> {
    let stdin = std::io::stdin().lock();
    let mut stdout = std::io::stdout().lock();
    for line in stdin.lines() {
        let line = line.map_err(|err| Error::io_path("read", "<stdin>", err))?;
        if line.trim().is_empty() {
            continue;
        }
        let (id, result) = match serde_json::from_str::<RequestLine>(&line) {
            Ok(request) => {
                let result = dispatcher.invoke(&request.tool, request.arguments);
                (request.id, result)
            }
            Err(err) => (
                Value::Null,
                OperationResult::failure(
                    "request",
                    &Error::InvalidArgument(format!("malformed request line: {err}")),
                ),
            ),
        };
        serde_json::to_writer(
            &mut stdout,
            &ResponseLine {
                id: &id,
                result: &result,
            },
        )?;
        stdout
            .write_all(b"\n")
            .and_then(|()| stdout.flush())
            .map_err(|err| Error::io_path("write", "<stdout>", err))?;
    }
    Ok(())
}
