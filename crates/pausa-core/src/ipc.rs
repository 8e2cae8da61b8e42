use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
};

use crate::engine::BreakTimerEngine;

/// IPC request from CLI to daemon
#[derive(Serialize, Deserialize, Debug)]
pub enum IpcRequest {
    Status,
    Restart,
    Shutdown,
}

/// IPC response from daemon to CLI
#[derive(Serialize, Deserialize, Debug)]
pub enum IpcResponse {
    Status {
        enabled: bool,
        threshold_minutes: u32,
        elapsed_seconds: f64,
        uptime_seconds: u64,
    },
    Restarted,
    Shutdown,
}

#[derive(Debug)]
pub struct IpcClient {
    sock_path: PathBuf,
}

impl IpcClient {
    #[must_use]
    pub fn new(sock_path: &Path) -> Self {
        Self {
            sock_path: sock_path.to_path_buf(),
        }
    }

    /// Send one request to the daemon and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon socket is unreachable or the
    /// round-trip fails.
    pub async fn send_command(&self, request: IpcRequest) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.sock_path).await?;

        let encoded = bincode::serialize(&request)?;
        stream.write_all(&encoded).await?;
        stream.shutdown().await?;

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await?;
        let response: IpcResponse = bincode::deserialize(&buffer)?;

        Ok(response)
    }
}

/// Daemon-side request handler, holding the live engine.
pub struct DaemonIpcHandler {
    engine: BreakTimerEngine,
    started_at: chrono::DateTime<chrono::Utc>,
    shutdown_signal: Arc<AtomicBool>,
}

impl DaemonIpcHandler {
    #[must_use]
    pub fn new(engine: BreakTimerEngine, shutdown_signal: Arc<AtomicBool>) -> Self {
        Self {
            engine,
            started_at: chrono::Utc::now(),
            shutdown_signal,
        }
    }

    async fn handle(&self, stream: &mut UnixStream, request: IpcRequest) -> Result<()> {
        let response = match request {
            IpcRequest::Status => {
                let snapshot = self.engine.snapshot().await;
                let uptime = chrono::Utc::now().signed_duration_since(self.started_at);

                IpcResponse::Status {
                    enabled: snapshot.enabled,
                    threshold_minutes: snapshot.threshold_minutes,
                    elapsed_seconds: snapshot.elapsed_seconds,
                    uptime_seconds: u64::try_from(uptime.num_seconds()).unwrap_or(0),
                }
            }
            IpcRequest::Restart => {
                self.engine.start_timer().await;
                IpcResponse::Restarted
            }
            IpcRequest::Shutdown => {
                self.shutdown_signal.store(true, Ordering::SeqCst);
                IpcResponse::Shutdown
            }
        };

        let encoded = bincode::serialize(&response)?;
        stream.write_all(&encoded).await?;
        Ok(())
    }
}

/// Accept loop for the daemon control socket. Per-connection failures are
/// logged and do not stop the listener.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound.
pub async fn listen(handler: Arc<DaemonIpcHandler>, sock_path: &Path) -> io::Result<()> {
    if sock_path.exists() {
        fs::remove_file(sock_path)?;
    }
    let listener = UnixListener::bind(sock_path)?;

    loop {
        match listener.accept().await {
            Ok((mut stream, _)) => {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0; 1024];
                    match stream.read(&mut buf).await {
                        Ok(n) if n > 0 => match bincode::deserialize::<IpcRequest>(&buf[..n]) {
                            Ok(request) => {
                                if let Err(e) = handler.handle(&mut stream, request).await {
                                    log::error!("IPC handle error: {e}");
                                }
                            }
                            Err(e) => {
                                log::error!("IPC deserialize error: {e}");
                            }
                        },
                        Ok(_) => {} // Connection closed
                        Err(e) => {
                            log::error!("IPC read error: {e}");
                        }
                    }
                });
            }
            Err(e) => {
                log::error!("IPC accept error: {e}");
            }
        }
    }
}
