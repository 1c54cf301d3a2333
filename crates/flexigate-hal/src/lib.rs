//! `flexigate-hal` – Safety Controller Transport
//!
//! The gateway core never talks to a socket directly.  It drives a
//! [`FlexiTransport`] and registers a [`FrameHandler`] that the transport
//! calls, from whatever thread it likes, for every inbound payload.
//!
//! # Modules
//!
//! - [`transport`] – the [`FlexiTransport`] trait and the [`FrameHandler`]
//!   callback type.
//! - [`tcp`] – [`TcpTransport`]: fixed-length frames over a Tokio TCP stream.
//! - [`sim`] – [`SimTransport`]: in-process stand-in for CI and tests that
//!   records every transmitted frame and lets tests inject inbound ones.

pub mod sim;
pub mod tcp;
pub mod transport;

pub use sim::SimTransport;
pub use tcp::TcpTransport;
pub use transport::{FlexiTransport, FrameHandler};
