//! Line-delimited JSON protocol spoken with the host driver.

use std::{collections::HashMap, fmt, sync::Arc};

use psremote_core::{
    ErrorRecord, Invocation, OutputRecord, ParamValue,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{ChildStdin, ChildStdout},
    sync::{Mutex, mpsc},
};

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Command part of an invoke request.
#[derive(Serialize)]
pub struct WireCommand {
    pub name: String,
    pub parameters: Vec<(String, Value)>,
}

/// Script part of an invoke request.
#[derive(Serialize)]
pub struct WireScript {
    pub text: String,
    pub variables: Vec<(String, Value)>,
    pub arguments: Vec<Value>,
}

// Encoded values may hold a plaintext password; Debug prints parameter names only.
impl fmt::Debug for WireCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireCommand")
            .field("name", &self.name)
            .field("parameters", &names(&self.parameters))
            .finish()
    }
}

impl fmt::Debug for WireScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireScript")
            .field("text", &self.text)
            .field("variables", &names(&self.variables))
            .field("arguments", &self.arguments.len())
            .finish()
    }
}

fn names(pairs: &[(String, Value)]) -> Vec<&str> {
    pairs.iter().map(|(name, _)| name.as_str()).collect()
}

/// Request written to the driver's stdin.
///
/// The serialized form of a request carrying a credential contains the
/// password; never log it.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostRequest {
    Invoke {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        command: Option<WireCommand>,
        #[serde(skip_serializing_if = "Option::is_none")]
        script: Option<WireScript>,
    },
    Close {
        id: String,
    },
}

impl HostRequest {
    /// Encode an invocation.
    #[must_use]
    pub fn invoke(id: String, invocation: &Invocation) -> Self {
        match invocation {
            Invocation::Command(cmd) => Self::Invoke {
                id,
                command: Some(WireCommand {
                    name: cmd.name().to_string(),
                    parameters: encode_pairs(cmd.parameters()),
                }),
                script: None,
            },
            Invocation::Script(script) => Self::Invoke {
                id,
                command: None,
                script: Some(WireScript {
                    text: script.text().to_string(),
                    variables: encode_pairs(script.variables()),
                    arguments: script.argument_values().iter().map(encode_value).collect(),
                }),
            },
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Invoke { id, .. } | Self::Close { id } => id,
        }
    }
}

fn encode_pairs(pairs: &[(String, ParamValue)]) -> Vec<(String, Value)> {
    pairs
        .iter()
        .map(|(name, value)| (name.clone(), encode_value(value)))
        .collect()
}

/// Encode a parameter value; live objects become `{"$handle": id}` references.
#[must_use]
pub fn encode_value(value: &ParamValue) -> Value {
    match value {
        ParamValue::Null => Value::Null,
        ParamValue::Bool(b) => json!(b),
        ParamValue::Int(i) => json!(i),
        ParamValue::Float(f) => json!(f),
        ParamValue::String(s) => json!(s),
        ParamValue::Array(items) => Value::Array(items.iter().map(encode_value).collect()),
        ParamValue::Object(handle) => json!({ "$handle": handle.id() }),
        ParamValue::Session(session) => json!({ "$handle": session.object().id() }),
        ParamValue::Credential(credential) => json!({
            "$credential": {
                "username": credential.username,
                "password": credential.password.expose_secret(),
            }
        }),
    }
}

/// Event read from the driver's stdout.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Progress {
        id: Option<String>,
        percent: i64,
    },
    Completed {
        id: Option<String>,
        #[serde(default)]
        output: Vec<OutputRecord>,
        #[serde(default)]
        errors: Vec<ErrorRecord>,
    },
    /// The driver could not run the request at all.
    Fault {
        id: Option<String>,
        message: String,
    },
    Closed {
        id: Option<String>,
    },
}

impl HostEvent {
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Progress { id, .. }
            | Self::Completed { id, .. }
            | Self::Fault { id, .. }
            | Self::Closed { id } => id.as_deref(),
        }
    }
}

type Pending = HashMap<String, mpsc::UnboundedSender<HostEvent>>;

/// Requests waiting for driver events, keyed by request id.
#[derive(Clone, Default)]
pub struct PendingRequests {
    inner: Arc<Mutex<Pending>>,
}

impl PendingRequests {
    /// Register interest in events for request `id`.
    pub async fn register(&self, id: &str) -> mpsc::UnboundedReceiver<HostEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().await.insert(id.to_string(), tx);
        rx
    }

    /// Stop routing events for request `id`.
    pub async fn unregister(&self, id: &str) {
        self.inner.lock().await.remove(id);
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Drop every waiter; their receivers observe the end of the stream.
    pub async fn abandon(&self) {
        self.inner.lock().await.clear();
    }

    /// Deliver an event to the request it names.
    ///
    /// A fault without an id means the driver could not parse a request line,
    /// so it cannot tell whose request failed: every waiter receives it.
    pub async fn route(&self, event: HostEvent) {
        let pending = self.inner.lock().await;
        match event.id() {
            Some(id) => match pending.get(id) {
                Some(tx) => {
                    let _ = tx.send(event);
                }
                None => tracing::debug!(id, "Host event for unknown request"),
            },
            None if matches!(event, HostEvent::Fault { .. }) => {
                tracing::warn!(waiters = pending.len(), "Host fault without request id");
                for tx in pending.values() {
                    let _ = tx.send(event.clone());
                }
            }
            None => tracing::error!(?event, "Host event without request id"),
        }
    }
}

/// Handles bidirectional communication with the driver.
#[derive(Clone)]
pub struct ProtocolPeer {
    stdin: Arc<Mutex<ChildStdin>>,
    pending: PendingRequests,
}

impl ProtocolPeer {
    /// Spawn a new protocol peer.
    ///
    /// This starts a background task that reads events from stdout and routes
    /// them to the request that registered their id. When stdout closes every
    /// pending receiver is dropped, so waiters observe the end of the stream.
    #[must_use]
    pub fn spawn(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        let peer = Self {
            stdin: Arc::new(Mutex::new(stdin)),
            pending: PendingRequests::default(),
        };

        let pending = peer.pending.clone();
        tokio::spawn(async move {
            if let Err(e) = read_loop(stdout, &pending).await {
                tracing::error!("Host reader loop error: {}", e);
            }
            pending.abandon().await;
        });

        peer
    }

    #[must_use]
    pub const fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Write one request line.
    ///
    /// # Errors
    /// Returns error if serialization or the write fails.
    pub async fn send(&self, request: &HostRequest) -> Result<(), ProtocolError> {
        let json = serde_json::to_string(request)?;
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        tracing::trace!(id = request.id(), "Sent host request");
        Ok(())
    }
}

async fn read_loop(stdout: ChildStdout, pending: &PendingRequests) -> Result<(), ProtocolError> {
    let mut reader = BufReader::new(stdout);
    let mut buffer = String::new();

    loop {
        buffer.clear();
        if reader.read_line(&mut buffer).await? == 0 {
            tracing::debug!("Host stdout closed");
            break;
        }
        let line = buffer.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<HostEvent>(line) {
            Ok(event) => pending.route(event).await,
            Err(e) => tracing::warn!("Unparseable host event ({e}): {line}"),
        }
    }
    Ok(())
}
