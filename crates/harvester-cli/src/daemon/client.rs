//! Client for sending producer updates and commands to a running daemon.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

use harvester_core::protocol::{Request, Response};

use crate::daemon::paths::DaemonPaths;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DaemonClient {
    stream: UnixStream,
}

impl DaemonClient {
    /// Connect to the daemon for `paths`.
    ///
    /// The daemon is never auto-started: it needs the window geometry that
    /// only `harvester run` is given.
    pub async fn connect(paths: &DaemonPaths) -> Result<Self> {
        match UnixStream::connect(&paths.socket).await {
            Ok(stream) => {
                debug!("Connected to daemon at {:?}", paths.socket);
                Ok(Self { stream })
            }
            Err(e) => Err(e).with_context(|| {
                format!(
                    "No daemon listening on {:?}; start one with 'harvester run'",
                    paths.socket
                )
            }),
        }
    }

    /// Send a request and wait for a response.
    pub async fn request(&mut self, request: Request) -> Result<Response> {
        self.request_with_timeout(request, REQUEST_TIMEOUT).await
    }

    async fn request_with_timeout(
        &mut self,
        request: Request,
        timeout_duration: Duration,
    ) -> Result<Response> {
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize request")?;
        debug!("Sending: {}", request_json);

        self.stream
            .write_all(request_json.as_bytes())
            .await
            .context("Failed to write request")?;
        self.stream
            .write_all(b"\n")
            .await
            .context("Failed to write newline")?;
        self.stream.flush().await.context("Failed to flush")?;

        let (reader, _writer) = self.stream.split();
        let mut reader = BufReader::new(reader);
        let mut response_line = String::new();

        let bytes_read = timeout(timeout_duration, reader.read_line(&mut response_line))
            .await
            .context("Request timed out")?
            .context("Failed to read response")?;
        if bytes_read == 0 {
            bail!("Daemon closed connection unexpectedly");
        }

        debug!("Received: {}", response_line.trim());
        serde_json::from_str(&response_line).context("Failed to parse response")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::daemon::controller::Controller;
    use crate::daemon::devices::fakes::{CountingExplorer, RecordingPointer, ScriptedMotion};
    use crate::daemon::devices::Devices;
    use crate::daemon::DaemonServer;
    use harvester_core::config::ControllerConfig;
    use harvester_core::geometry::{Point, WindowGeometry};
    use harvester_core::protocol::{Command, ResponseData};

    #[tokio::test]
    async fn connect_without_daemon_explains_how_to_start() {
        let dir = std::env::temp_dir().join(format!("harvester-none-{}", std::process::id()));
        let paths = DaemonPaths::in_dir(dir, "absent");
        let err = DaemonClient::connect(&paths).await.err().expect("should fail");
        assert!(format!("{:#}", err).contains("harvester run"));
    }

    #[tokio::test]
    async fn client_talks_to_running_daemon() {
        let dir = std::env::temp_dir().join(format!("harvester-client-{}", std::process::id()));
        let paths = DaemonPaths::in_dir(dir, "client");
        let controller = Arc::new(Controller::new(
            ControllerConfig::new(WindowGeometry {
                offset: Point::new(0, 0),
                width: 640,
                height: 480,
            }),
            Devices {
                pointer: Box::new(RecordingPointer::default()),
                motion: Box::new(ScriptedMotion::new(&[], false)),
                explorer: Box::new(CountingExplorer::default()),
            },
        ));
        let server = DaemonServer::bind_to(paths.clone(), controller)
            .await
            .expect("Failed to bind server");
        let server_handle = tokio::spawn(async move {
            let _ = timeout(Duration::from_secs(2), server.run()).await;
        });

        let mut client = DaemonClient::connect(&paths).await.expect("connect");
        let response = client
            .request(Request {
                id: "client-1".to_string(),
                command: Command::History { limit: None },
            })
            .await
            .expect("Request failed");

        assert!(response.success);
        assert_eq!(response.id, "client-1");
        assert!(matches!(
            response.data,
            Some(ResponseData::History { total: 0, .. })
        ));

        server_handle.abort();
    }
}
