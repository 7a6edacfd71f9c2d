//! Unix socket server accepting detection updates and control commands.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use harvester_core::error::ApiError;
use harvester_core::geometry::Point;
use harvester_core::protocol::{Command, Request, Response, ResponseData};

use crate::daemon::controller::Controller;
use crate::daemon::paths::{self, DaemonPaths};

/// Maximum number of concurrent producer connections.
const MAX_CONNECTIONS: usize = 100;

/// How long to wait for in-flight connections to complete during shutdown.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum request size in bytes.
const MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Maximum number of targets accepted in one update.
const MAX_TARGETS: usize = 4096;

/// The daemon server that listens for producer connections.
pub struct DaemonServer {
    listener: UnixListener,
    paths: DaemonPaths,
    controller: Arc<Controller>,
    connection_semaphore: Arc<Semaphore>,
    shutdown: Arc<Notify>,
}

impl DaemonServer {
    /// Bind the socket for `paths`.
    ///
    /// A socket left behind by a dead daemon is removed and rebound; a live
    /// daemon on the same socket is an error.
    pub async fn bind_to(paths: DaemonPaths, controller: Arc<Controller>) -> Result<Self> {
        if let Some(parent) = paths.socket.parent() {
            paths::ensure_runtime_dir(parent)
                .with_context(|| format!("Failed to create runtime directory {:?}", parent))?;
        }

        let listener = match UnixListener::bind(&paths.socket) {
            Ok(l) => l,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                if is_daemon_alive(&paths.pid) {
                    anyhow::bail!(
                        "Daemon already running (socket {:?} in use, PID file valid)",
                        paths.socket
                    );
                }

                let metadata = std::fs::symlink_metadata(&paths.socket)
                    .with_context(|| format!("Failed to stat socket path: {:?}", paths.socket))?;
                {
                    use std::os::unix::fs::FileTypeExt;
                    if metadata.file_type().is_symlink() || !metadata.file_type().is_socket() {
                        anyhow::bail!(
                            "Path {:?} exists but is not a socket, refusing to delete it",
                            paths.socket
                        );
                    }
                }

                info!("Removing stale socket from dead daemon");
                std::fs::remove_file(&paths.socket).with_context(|| {
                    format!("Failed to remove stale socket: {:?}", paths.socket)
                })?;
                UnixListener::bind(&paths.socket)
                    .with_context(|| format!("Failed to bind to socket: {:?}", paths.socket))?
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to bind to socket: {:?}", paths.socket));
            }
        };
        std::fs::write(&paths.pid, std::process::id().to_string())
            .with_context(|| format!("Failed to write PID file: {:?}", paths.pid))?;

        info!("Daemon listening on {:?}", paths.socket);

        Ok(Self {
            listener,
            paths,
            controller,
            connection_semaphore: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Accept connections until a `shutdown` command arrives.
    pub async fn run(&self) -> Result<()> {
        let mut connection_tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let permit = match self.connection_semaphore.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    warn!(
                                        "Connection limit ({}) reached, rejecting new connection",
                                        MAX_CONNECTIONS
                                    );
                                    drop(stream);
                                    continue;
                                }
                            };

                            debug!("Accepted new connection");
                            let controller = self.controller.clone();
                            let shutdown = self.shutdown.clone();
                            connection_tasks.spawn(async move {
                                let _permit = permit;
                                if let Err(e) = handle_connection(stream, controller, shutdown).await {
                                    error!("Connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                Some(_) = connection_tasks.join_next(), if !connection_tasks.is_empty() => {}
                _ = self.shutdown.notified() => {
                    info!("Shutdown requested, waiting for in-flight connections");
                    break;
                }
            }
        }

        if !connection_tasks.is_empty() {
            let drained = tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, async {
                while connection_tasks.join_next().await.is_some() {}
            })
            .await;

            if drained.is_err() {
                warn!(
                    "Graceful shutdown timed out after {:?}, aborting {} connection(s)",
                    GRACEFUL_SHUTDOWN_TIMEOUT,
                    connection_tasks.len()
                );
                connection_tasks.abort_all();
            }
        }

        Ok(())
    }
}

impl Drop for DaemonServer {
    fn drop(&mut self) {
        if self.paths.socket.exists() && std::fs::remove_file(&self.paths.socket).is_err() {
            warn!("Failed to remove socket on shutdown");
        }
        if self.paths.pid.exists() && std::fs::remove_file(&self.paths.pid).is_err() {
            warn!("Failed to remove PID file on shutdown");
        }
    }
}

/// Check whether the process named in a PID file is still alive.
fn is_daemon_alive(pid_path: &Path) -> bool {
    let Ok(pid_str) = std::fs::read_to_string(pid_path) else {
        return false;
    };
    let Ok(pid) = pid_str.trim().parse::<i32>() else {
        return false;
    };

    // SAFETY: kill with signal 0 only checks that the process exists and may
    // be signalled; nothing is delivered.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Read a line with a maximum size limit.
///
/// Returns the number of bytes read (0 means EOF).
async fn read_line_bounded<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut String,
    max_size: usize,
) -> Result<usize> {
    use tokio::io::AsyncBufReadExt;

    let mut bytes = Vec::new();

    loop {
        let available = reader
            .fill_buf()
            .await
            .context("Failed to read from client")?;
        if available.is_empty() {
            break;
        }

        let newline_pos = available.iter().position(|&b| b == b'\n');
        let take = newline_pos.map_or(available.len(), |p| p + 1);
        if bytes.len() + take > max_size {
            anyhow::bail!("Request too large: exceeded {} byte limit", max_size);
        }

        bytes.extend_from_slice(&available[..take]);
        reader.consume(take);

        if newline_pos.is_some() {
            break;
        }
    }

    // Validate once so multi-byte characters split across reads survive.
    buf.push_str(std::str::from_utf8(&bytes).context("Invalid UTF-8 in request")?);
    Ok(bytes.len())
}

async fn handle_connection(
    stream: UnixStream,
    controller: Arc<Controller>,
    shutdown: Arc<Notify>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if read_line_bounded(&mut reader, &mut line, MAX_REQUEST_SIZE).await? == 0 {
            debug!("Client disconnected");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        debug!("Received: {} bytes", trimmed.len());

        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => handle_request(request, &controller, &shutdown).await,
            Err(e) => Response::error(
                "unknown",
                ApiError::invalid_input_with_suggestion(
                    format!("Invalid JSON request: {}", e),
                    "Send one JSON object per line with 'id' and 'command'. Example: {\"id\":\"1\",\"command\":{\"action\":\"status\"}}",
                ),
            ),
        };

        let response_json =
            serde_json::to_string(&response).context("Failed to serialize response")?;
        writer
            .write_all(response_json.as_bytes())
            .await
            .context("Failed to write response")?;
        writer
            .write_all(b"\n")
            .await
            .context("Failed to write newline")?;
        writer.flush().await.context("Failed to flush")?;
    }

    Ok(())
}

async fn handle_request(
    request: Request,
    controller: &Arc<Controller>,
    shutdown: &Arc<Notify>,
) -> Response {
    let id = request.id.as_str();
    match request.command {
        Command::UpdateTargets { targets } => handle_update_targets(id, controller, targets).await,
        Command::UpdateScreenshot { path } => {
            handle_update_screenshot(id, controller, path).await
        }
        Command::Status => {
            let running = controller.is_running().await;
            Response::success(
                id,
                ResponseData::Status(controller.state().status(running).await),
            )
        }
        Command::History { limit } => {
            let (total, clicks) = controller.state().recent_clicks(limit).await;
            Response::success(id, ResponseData::History { total, clicks })
        }
        Command::Start => match controller.start().await {
            Ok(_handle) => ok(id, "Controller started"),
            Err(e) => Response::error(id, e),
        },
        Command::Stop => {
            if controller.stop().await {
                ok(id, "Controller stopping")
            } else {
                Response::error(id, ApiError::not_running())
            }
        }
        Command::Shutdown => {
            info!("Received shutdown command, stopping daemon");
            controller.stop().await;
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                // Let the response flush before the accept loop exits.
                tokio::time::sleep(Duration::from_millis(50)).await;
                shutdown.notify_one();
            });
            ok(id, "Daemon shutting down")
        }
    }
}

fn ok(id: &str, message: &str) -> Response {
    Response::success(
        id,
        ResponseData::Ok {
            message: message.to_string(),
        },
    )
}

async fn handle_update_targets(id: &str, controller: &Controller, targets: Vec<Point>) -> Response {
    if targets.len() > MAX_TARGETS {
        return Response::error(id, ApiError::too_many_targets(targets.len(), MAX_TARGETS));
    }
    let count = targets.len();
    controller.state().update_targets(targets).await;
    ok(id, &format!("Received {} targets", count))
}

async fn handle_update_screenshot(id: &str, controller: &Controller, path: String) -> Response {
    if path.trim().is_empty() {
        return Response::error(
            id,
            ApiError::invalid_input_with_suggestion(
                "Screenshot path is empty",
                "Pass the path of an image file written by the capture process",
            ),
        );
    }

    let load_path = path.clone();
    let loaded =
        tokio::task::spawn_blocking(move || image::open(&load_path).map(|img| img.to_rgba8()))
            .await;

    match loaded {
        Ok(Ok(frame)) => {
            let (w, h) = (frame.width(), frame.height());
            controller.state().update_screenshot(frame).await;
            ok(id, &format!("Received {}x{} screenshot", w, h))
        }
        Ok(Err(e)) => Response::error(id, ApiError::screenshot_unreadable(&path, &e.to_string())),
        Err(e) => Response::error(
            id,
            ApiError::internal(format!("Screenshot loader panicked: {}", e)),
        ),
    }
}
