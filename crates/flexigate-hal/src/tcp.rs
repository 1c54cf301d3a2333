//! [`TcpTransport`] – fixed-length payloads over TCP.
//!
//! The gateway is expected to stream its input data set as back-to-back
//! [`INPUT_FRAME_LEN`]-byte payloads and to accept [`OUTPUT_FRAME_LEN`]-byte
//! payloads in return.  Session handshakes of specific gateway firmwares are
//! not handled here.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use flexigate_codec::{InputFrame, OutputFrame, INPUT_FRAME_LEN, OUTPUT_FRAME_LEN};
use flexigate_types::GatewayError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::transport::{FlexiTransport, FrameHandler};

/// Default bound on how long `connect` may take.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// TCP implementation of [`FlexiTransport`].
pub struct TcpTransport {
    connect_timeout: Duration,
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            reader: Mutex::new(None),
            writer: tokio::sync::Mutex::new(None),
            listener: Mutex::new(None),
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl FlexiTransport for TcpTransport {
    async fn connect(&self, host: &str, port: u16) -> Result<(), GatewayError> {
        let endpoint = format!("{host}:{port}");
        let connection_error = |details: String| GatewayError::Connection {
            endpoint: endpoint.clone(),
            details,
        };

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| connection_error(format!("timed out after {:?}", self.connect_timeout)))?
            .map_err(|e| connection_error(e.to_string()))?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!(%endpoint, error = %e, "could not disable Nagle's algorithm");
        }

        let (read_half, write_half) = stream.into_split();
        *self
            .reader
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(read_half);
        *self.writer.lock().await = Some(write_half);
        info!(%endpoint, "connected to safety controller gateway");
        Ok(())
    }

    async fn start_listener(&self, handler: FrameHandler) -> Result<(), GatewayError> {
        let mut listener = self
            .listener
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if listener.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("inbound listener already running");
            return Ok(());
        }

        let mut reader = self
            .reader
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .ok_or(GatewayError::NotConnected)?;

        *listener = Some(tokio::spawn(async move {
            let mut buf = [0u8; INPUT_FRAME_LEN];
            loop {
                match reader.read_exact(&mut buf).await {
                    Ok(_) => handler(InputFrame::new(buf)),
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        warn!("safety controller closed the connection");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "inbound read failed");
                        break;
                    }
                }
            }
        }));
        Ok(())
    }

    async fn send(&self, frame: &OutputFrame) -> Result<(), GatewayError> {
        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or(GatewayError::NotConnected)?;
        debug_assert_eq!(frame.as_bytes().len(), OUTPUT_FRAME_LEN);
        stream
            .write_all(frame.as_bytes())
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    async fn close(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.reader
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(mut stream) = self.writer.lock().await.take()
            && let Err(e) = stream.shutdown().await
        {
            debug!(error = %e, "error while shutting down gateway stream");
        }
    }
}
