//! WebSocket transport driving a `SessionManager`.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use psremote_core::{ProgressHandler, RemoteExecutionError, RunspaceFactory};
use psremote_session::{DEFAULT_ROOT, SessionManager};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedSender};
use tower_http::trace::TraceLayer;

use crate::protocol::{ClientMessage, ServerMessage};

/// Failure to deliver a message to the client.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Client channel closed")]
    ChannelClosed,
    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn reply(tx: &UnboundedSender<ServerMessage>, msg: ServerMessage) -> Result<(), SendError> {
    tx.send(msg).map_err(|_| SendError::ChannelClosed)
}

fn encode(msg: &ServerMessage) -> Result<Message, SendError> {
    Ok(Message::Text(serde_json::to_string(msg)?.into()))
}

/// Forwards command progress to the client currently attached.
#[derive(Debug, Default)]
pub struct ProgressRelay {
    client: Mutex<Option<UnboundedSender<ServerMessage>>>,
}

impl ProgressRelay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route progress to `tx`, replacing any previous client.
    pub fn attach(&self, tx: UnboundedSender<ServerMessage>) {
        if let Ok(mut client) = self.client.lock() {
            *client = Some(tx);
        }
    }

    /// Stop routing progress to `tx` if it is still the attached client.
    pub fn detach(&self, tx: &UnboundedSender<ServerMessage>) {
        if let Ok(mut client) = self.client.lock() {
            if client.as_ref().is_some_and(|current| current.same_channel(tx)) {
                *client = None;
            }
        }
    }

    fn report(&self, percent: u8) {
        let Ok(client) = self.client.lock() else {
            return;
        };
        if let Some(tx) = client.as_ref() {
            let _ = tx.send(ServerMessage::Progress { percent });
        }
    }
}

impl ProgressHandler for ProgressRelay {
    fn on_progress(&self, percent: u8) {
        self.report(percent);
    }
}

/// WebSocket handler state.
pub struct ExplorerState<F>
where
    F: RunspaceFactory,
{
    pub manager: Arc<SessionManager<F>>,
    pub progress: Arc<ProgressRelay>,
}

impl<F> ExplorerState<F>
where
    F: RunspaceFactory,
{
    /// `progress` should be the relay the manager was built with.
    #[must_use]
    pub const fn new(manager: Arc<SessionManager<F>>, progress: Arc<ProgressRelay>) -> Self {
        Self { manager, progress }
    }
}

impl<F> Clone for ExplorerState<F>
where
    F: RunspaceFactory,
{
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            progress: Arc::clone(&self.progress),
        }
    }
}

/// Run one client request against the manager and build its reply.
///
/// # Errors
/// Returns the manager's error unchanged.
pub async fn dispatch<F>(
    manager: &SessionManager<F>,
    msg: ClientMessage,
) -> Result<ServerMessage, RemoteExecutionError>
where
    F: RunspaceFactory,
{
    let operation = msg.operation();
    match msg {
        ClientMessage::Connect => {
            manager.open().await?;
            let directories = manager.list_directories(DEFAULT_ROOT).await?;
            Ok(ServerMessage::Connected {
                root: DEFAULT_ROOT.to_string(),
                directories,
            })
        }
        ClientMessage::Disconnect => {
            manager.close().await?;
            Ok(ServerMessage::Disconnected)
        }
        ClientMessage::ListDirectories { path } => {
            let items = manager.list_directories(&path).await?;
            Ok(ServerMessage::Directories { path, items })
        }
        ClientMessage::ListFiles { path } => {
            let items = manager.list_files(&path).await?;
            Ok(ServerMessage::Files { path, items })
        }
        ClientMessage::Upload {
            local_path,
            remote_path,
        } => {
            manager.copy_in(&remote_path, &local_path).await?;
            Ok(ServerMessage::completed(operation))
        }
        ClientMessage::Download {
            remote_path,
            local_path,
        } => {
            manager.copy_out(&remote_path, &local_path).await?;
            Ok(ServerMessage::completed(operation))
        }
        ClientMessage::Delete { path } => {
            manager.remove(&path).await?;
            Ok(ServerMessage::completed(operation))
        }
        ClientMessage::Rename { path, new_name } => {
            manager.rename(&path, &new_name).await?;
            Ok(ServerMessage::completed(operation))
        }
        ClientMessage::Extract { path, destination } => {
            match destination {
                Some(destination) => manager.extract_archive(&path, &destination).await?,
                None => manager.extract_archive_here(&path).await?,
            }
            Ok(ServerMessage::completed(operation))
        }
        ClientMessage::Ping => Ok(ServerMessage::Pong),
    }
}

/// Handle one request, bracketing it with progress 0 and 100.
///
/// A transport failure closes the session so the client can connect again.
///
/// # Errors
/// Returns error only if the client channel is gone.
pub async fn handle_request<F>(
    manager: &SessionManager<F>,
    msg: ClientMessage,
    tx: &UnboundedSender<ServerMessage>,
) -> Result<(), SendError>
where
    F: RunspaceFactory,
{
    if msg == ClientMessage::Ping {
        return reply(tx, ServerMessage::Pong);
    }

    let operation = msg.operation();
    tracing::debug!(operation, "Handling request");
    reply(tx, ServerMessage::Progress { percent: 0 })?;

    match dispatch(manager, msg).await {
        Ok(response) => reply(tx, response)?,
        Err(e) => {
            tracing::warn!(operation, "Request failed: {e}");
            reply(tx, ServerMessage::error(&e))?;
            if e.is_transport_failure() {
                if let Err(close_err) = manager.close().await {
                    tracing::debug!("Failed to close broken session: {close_err}");
                }
                reply(tx, ServerMessage::Disconnected)?;
            }
        }
    }

    reply(tx, ServerMessage::Progress { percent: 100 })
}

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler<F>(
    ws: WebSocketUpgrade,
    State(state): State<ExplorerState<F>>,
) -> impl IntoResponse
where
    F: RunspaceFactory + 'static,
{
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket<F>(socket: WebSocket, state: ExplorerState<F>)
where
    F: RunspaceFactory + 'static,
{
    let (mut sender, mut receiver) = socket.split();

    // Channel for sending messages to the client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.progress.attach(tx.clone());

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let frame = match encode(&msg) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!("{e}");
                    continue;
                }
            };
            if sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    tracing::info!("Explorer client connected");

    // Requests are handled in arrival order, one at a time.
    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        let client_msg: ClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid client message: {e}");
                let _ = reply(
                    &tx,
                    ServerMessage::Error {
                        message: format!("Invalid message: {e}"),
                    },
                );
                continue;
            }
        };

        if handle_request(&state.manager, client_msg, &tx).await.is_err() {
            break;
        }
    }

    state.progress.detach(&tx);
    send_task.abort();
    tracing::info!("Explorer client disconnected");
}

/// Create WebSocket router.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_ws_router(state));
/// ```
#[must_use]
pub fn create_ws_router<F>(state: ExplorerState<F>) -> axum::Router
where
    F: RunspaceFactory + 'static,
{
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler::<F>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
