//! In-process simulated transport for CI/CD testing without a physical
//! safety controller.
//!
//! [`SimTransport`] records every transmitted frame and lets a test play the
//! controller by injecting inbound frames through the registered handler.
//!
//! # Example
//!
//! ```rust
//! use flexigate_hal::{FlexiTransport, SimTransport};
//! use flexigate_codec::OutputFrame;
//!
//! # tokio_test_block(async {
//! let sim = SimTransport::new();
//! sim.connect("sim", 9100).await.unwrap();
//! sim.send(&OutputFrame::zeroed()).await.unwrap();
//! assert_eq!(sim.sent_frames().len(), 1);
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use flexigate_codec::{
    decode_output, encode_input, InputFrame, InputRecord, OutputFrame, OutputRecord,
};
use flexigate_types::GatewayError;
use tracing::debug;

use crate::transport::{FlexiTransport, FrameHandler};

#[derive(Default)]
struct SimState {
    unreachable: bool,
    fail_sends: bool,
    connected: bool,
    closed: bool,
    handler: Option<FrameHandler>,
    listener_starts: usize,
    connect_attempts: usize,
    sent: Vec<OutputFrame>,
}

/// A simulated safety-controller link.  Always succeeds unless told
/// otherwise.
#[derive(Clone, Default)]
pub struct SimTransport {
    state: Arc<Mutex<SimState>>,
}

impl SimTransport {
    /// A reachable simulated controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// A controller that refuses every connection attempt.
    pub fn unreachable() -> Self {
        let sim = Self::default();
        sim.lock().unreachable = true;
        sim
    }

    /// Make subsequent `send` calls fail (or succeed again).
    pub fn set_fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    /// Deliver `frame` through the registered handler, as the controller
    /// would.  Returns `false` when no listener is running.
    ///
    /// The handler runs on the caller's thread, outside the simulator's lock.
    pub fn inject(&self, frame: InputFrame) -> bool {
        let handler = self.lock().handler.clone();
        match handler {
            Some(handler) => {
                handler(frame);
                true
            }
            None => false,
        }
    }

    /// Encode `record` and [`inject`][Self::inject] it.
    pub fn inject_record(&self, record: &InputRecord) -> bool {
        self.inject(encode_input(record))
    }

    /// Every frame transmitted so far, oldest first.
    pub fn sent_frames(&self) -> Vec<OutputFrame> {
        self.lock().sent.clone()
    }

    /// The most recently transmitted frame, decoded.
    pub fn last_sent(&self) -> Option<OutputRecord> {
        self.lock().sent.last().map(decode_output)
    }

    /// How many times a listener was actually started.
    pub fn listener_starts(&self) -> usize {
        self.lock().listener_starts
    }

    pub fn connect_attempts(&self) -> usize {
        self.lock().connect_attempts
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl FlexiTransport for SimTransport {
    async fn connect(&self, host: &str, port: u16) -> Result<(), GatewayError> {
        let mut state = self.lock();
        state.connect_attempts += 1;
        if state.unreachable {
            return Err(GatewayError::Connection {
                endpoint: format!("{host}:{port}"),
                details: "simulated controller unreachable".to_string(),
            });
        }
        state.connected = true;
        state.closed = false;
        Ok(())
    }

    async fn start_listener(&self, handler: FrameHandler) -> Result<(), GatewayError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(GatewayError::NotConnected);
        }
        if state.handler.is_some() {
            debug!("simulated listener already running");
            return Ok(());
        }
        state.handler = Some(handler);
        state.listener_starts += 1;
        Ok(())
    }

    async fn send(&self, frame: &OutputFrame) -> Result<(), GatewayError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(GatewayError::NotConnected);
        }
        if state.fail_sends {
            return Err(GatewayError::Transport("simulated send failure".to_string()));
        }
        state.sent.push(*frame);
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.lock();
        state.connected = false;
        state.closed = true;
        state.handler = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn unreachable_refuses_connection() {
        let sim = SimTransport::unreachable();
        let result = sim.connect("10.0.0.1", 9100).await;
        assert!(matches!(result, Err(GatewayError::Connection { .. })));
        assert!(!sim.is_connected());
        assert_eq!(sim.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn inject_reaches_handler_only_while_listening() {
        let sim = SimTransport::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let handler: FrameHandler = Arc::new(move |_: InputFrame| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!sim.inject(InputFrame::zeroed()));
        sim.connect("sim", 1).await.unwrap();
        sim.start_listener(Arc::clone(&handler)).await.unwrap();
        sim.start_listener(handler).await.unwrap();
        assert_eq!(sim.listener_starts(), 1);

        assert!(sim.inject_record(&InputRecord::nominal()));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        sim.close().await;
        assert!(!sim.inject(InputFrame::zeroed()));
        assert!(sim.is_closed());
    }

    #[tokio::test]
    async fn records_sent_frames() {
        let sim = SimTransport::new();
        assert_eq!(
            sim.send(&OutputFrame::zeroed()).await,
            Err(GatewayError::NotConnected)
        );
        sim.connect("sim", 1).await.unwrap();

        let record = OutputRecord {
            enable_base: true,
            ..OutputRecord::default()
        };
        sim.send(&flexigate_codec::encode_output(&record)).await.unwrap();
        assert_eq!(sim.last_sent(), Some(record));

        sim.set_fail_sends(true);
        assert!(matches!(
            sim.send(&OutputFrame::zeroed()).await,
            Err(GatewayError::Transport(_))
        ));
        assert_eq!(sim.sent_frames().len(), 1);
    }
}
