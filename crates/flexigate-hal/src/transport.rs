//! The transport seam between the gateway core and the safety controller.

use std::sync::Arc;

use async_trait::async_trait;
use flexigate_codec::{InputFrame, OutputFrame};
use flexigate_types::GatewayError;

/// Callback invoked once per inbound payload.
///
/// Implementations may call it from any thread, concurrently with the control
/// cycle; it must not block for longer than a decode and a cache store.
pub type FrameHandler = Arc<dyn Fn(InputFrame) + Send + Sync>;

/// Every safety-controller transport must implement this trait.
///
/// # Contract
///
/// * `connect` – open the session to `host:port`.  No retries: a failure is
///   reported once and the caller decides what to do.
/// * `start_listener` – begin delivering inbound frames to `handler`.
///   Idempotent: a second call while a listener is running must not start
///   another one.
/// * `send` – transmit one outbound payload.
/// * `close` – stop the listener and release the connection.  Safe to call
///   more than once.
#[async_trait]
pub trait FlexiTransport: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<(), GatewayError>;

    async fn start_listener(&self, handler: FrameHandler) -> Result<(), GatewayError>;

    async fn send(&self, frame: &OutputFrame) -> Result<(), GatewayError>;

    async fn close(&self);
}
