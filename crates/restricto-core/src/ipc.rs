use anyhow::Result;
use restricto_storage::Database;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{atomic::Ordering, Arc},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
    sync::Mutex,
};

/// IPC request from CLI to daemon
#[derive(Serialize, Deserialize, Debug)]
pub enum IpcRequest {
    Status,
    Pause,
    Resume,
    Shutdown,
}

/// IPC response from daemon to CLI
#[derive(Serialize, Deserialize, Debug)]
pub enum IpcResponse {
    Status {
        running: bool,
        paused: bool,
        session_id: String,
        session_duration: u64,
        current_foreground: Option<String>,
        last_blocked: Option<String>,
        blocks_this_session: u64,
    },
    /// Pause/resume acknowledgement carrying the state now in effect.
    Ack {
        paused: bool,
    },
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

    /// Send a request to the daemon and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket connection or the round trip fails
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

/// Shared enforcement-session status, updated by the monitor loop each tick
/// and served to status queries. Pause/resume requests write through the same
/// settings table the loop reads each tick.
pub struct MonitorIpcHandler {
    session_id: uuid::Uuid,
    session_start: chrono::DateTime<chrono::Utc>,
    database: Arc<Database>,
    current_foreground: Arc<Mutex<Option<String>>>,
    last_blocked: Arc<Mutex<Option<String>>>,
    blocks_this_session: std::sync::atomic::AtomicU64,
    shutdown_signal: Arc<std::sync::atomic::AtomicBool>,
}

impl MonitorIpcHandler {
    #[must_use]
    pub fn new(
        session_id: uuid::Uuid,
        database: Arc<Database>,
        shutdown_signal: Arc<std::sync::atomic::AtomicBool>,
    ) -> Self {
        Self {
            session_id,
            session_start: chrono::Utc::now(),
            database,
            current_foreground: Arc::new(Mutex::new(None)),
            last_blocked: Arc::new(Mutex::new(None)),
            blocks_this_session: std::sync::atomic::AtomicU64::new(0),
            shutdown_signal,
        }
    }

    pub async fn set_current_foreground(&self, package: Option<String>) {
        let mut lock = self.current_foreground.lock().await;
        *lock = package;
    }

    pub async fn record_block(&self, package: &str) {
        let mut lock = self.last_blocked.lock().await;
        *lock = Some(package.to_string());
        self.blocks_this_session.fetch_add(1, Ordering::SeqCst);
    }

    /// Compute the response for one request.
    pub async fn respond(&self, request: IpcRequest) -> IpcResponse {
        match request {
            IpcRequest::Status => {
                let foreground = self.current_foreground.lock().await;
                let blocked = self.last_blocked.lock().await;
                let duration = chrono::Utc::now().signed_duration_since(self.session_start);

                IpcResponse::Status {
                    running: true,
                    paused: self.paused(),
                    session_id: self.session_id.to_string(),
                    session_duration: duration.num_seconds().unsigned_abs(),
                    current_foreground: foreground.clone(),
                    last_blocked: blocked.clone(),
                    blocks_this_session: self.blocks_this_session.load(Ordering::SeqCst),
                }
            }
            IpcRequest::Pause => IpcResponse::Ack {
                paused: self.set_paused(true),
            },
            IpcRequest::Resume => IpcResponse::Ack {
                paused: self.set_paused(false),
            },
            IpcRequest::Shutdown => {
                self.shutdown_signal.store(true, Ordering::SeqCst);
                IpcResponse::Shutdown
            }
        }
    }

    fn paused(&self) -> bool {
        match self.database.get_settings() {
            Ok(settings) => settings.paused,
            Err(e) => {
                log::warn!("Failed to read settings for status: {e}");
                false
            }
        }
    }

    /// Persist the paused flag; the monitor picks it up next tick. Returns
    /// the state actually in effect.
    fn set_paused(&self, paused: bool) -> bool {
        let result = self.database.get_settings().and_then(|mut settings| {
            settings.paused = paused;
            self.database.update_settings(&settings)
        });
        match result {
            Ok(()) => paused,
            Err(e) => {
                log::error!("Failed to update paused state: {e}");
                self.paused()
            }
        }
    }

    /// Handle one decoded request on an accepted connection.
    ///
    /// # Errors
    ///
    /// Returns an error if serializing or writing the response fails
    pub async fn handle(&self, stream: &mut UnixStream, request: IpcRequest) -> Result<()> {
        let response = self.respond(request).await;
        let encoded = bincode::serialize(&response)?;
        stream.write_all(&encoded).await?;
        Ok(())
    }
}

/// Accept loop for the daemon's control socket.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound
pub async fn listen(handler: Arc<MonitorIpcHandler>, sock_path: &Path) -> io::Result<()> {
    if sock_path.exists() {
        fs::remove_file(sock_path)?;
    }
    let listener = UnixListener::bind(sock_path)?;

    loop {
        match listener.accept().await {
            Ok((mut stream, _)) => {
                let handler = handler.clone();
                tokio::spawn(async move {
                    // The client shuts down its write half after sending, so
                    // read until EOF rather than assuming one read returns
                    // the whole frame.
                    let mut buf = Vec::new();
                    match stream.read_to_end(&mut buf).await {
                        Ok(n) if n > 0 => match bincode::deserialize::<IpcRequest>(&buf) {
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
