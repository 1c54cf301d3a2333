//! Console – newline-delimited JSON control surface on stdin/stdout.
//!
//! One request per line, one reply per line:
//!
//! ```text
//! {"cmd":"set_mode","mode":1}         → {"success":true,"message":"mode set to BaseOnly"}
//! {"cmd":"odom","vx":0.4,"vy":0.0}    → {"success":true,"message":"1 subscriber(s) notified"}
//! {"cmd":"status"}                    → {"state":"Running","mode":"Automatic",...}
//! {"cmd":"quit"}                      → {"success":true,"message":"shutting down"}
//! ```

use std::io::BufRead;
use std::sync::Arc;

use flexigate_runtime::GatewaySession;
use flexigate_types::{SetModeRequest, SetModeResponse};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ConsoleCommand {
    SetMode { mode: i32 },
    Odom { vx: f64, vy: f64 },
    Status,
    Quit,
}

/// Acknowledgement for console commands other than `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleReply {
    pub success: bool,
    pub message: String,
}

impl ConsoleReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    fn into_value(self) -> Value {
        serde_json::to_value(&self)
            .unwrap_or_else(|_| json!({ "success": self.success, "message": self.message }))
    }
}

impl From<SetModeResponse> for ConsoleReply {
    fn from(response: SetModeResponse) -> Self {
        Self {
            success: response.success,
            message: response.message,
        }
    }
}

/// What the console should do after handling a line.
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    Reply(Value),
    Quit(Value),
}

/// Interpret one request line against `session`.
pub fn handle_line(session: &GatewaySession, line: &str) -> Handled {
    let command = match serde_json::from_str::<ConsoleCommand>(line) {
        Ok(command) => command,
        Err(e) => {
            debug!(error = %e, "unparseable console line");
            return Handled::Reply(ConsoleReply::err(format!("invalid command: {e}")).into_value());
        }
    };

    match command {
        ConsoleCommand::SetMode { mode } => {
            let response = session.set_mode(SetModeRequest { mode });
            Handled::Reply(ConsoleReply::from(response).into_value())
        }
        ConsoleCommand::Odom { vx, vy } => {
            let reply = match session.odometry_bridge().ingest_twist(vx, vy) {
                Ok(n) => ConsoleReply::ok(format!("{n} subscriber(s) notified")),
                Err(e) => ConsoleReply::err(e.to_string()),
            };
            Handled::Reply(reply.into_value())
        }
        ConsoleCommand::Status => {
            let output = session.last_output();
            Handled::Reply(json!({
                "state": session.state().to_string(),
                "mode": format!("{:?}", session.mode()),
                "output": output,
                "send_failures": session.send_failures(),
            }))
        }
        ConsoleCommand::Quit => Handled::Quit(ConsoleReply::ok("shutting down").into_value()),
    }
}

/// Serve stdin until EOF or a `quit` command.  `quit` raises `stop`; EOF
/// only ends the console, the gateway keeps running.
///
/// Lines are read on a detached thread so a pending read never holds up
/// process exit.
pub async fn run(session: Arc<GatewaySession>, stop: watch::Sender<bool>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "console read failed");
                    return;
                }
            }
        }
    });

    while let Some(line) = rx.recv().await {
        if line.trim().is_empty() {
            continue;
        }
        match handle_line(&session, &line) {
            Handled::Reply(value) => println!("{value}"),
            Handled::Quit(value) => {
                println!("{value}");
                stop.send_replace(true);
                return;
            }
        }
    }
    debug!("console input closed");
}
