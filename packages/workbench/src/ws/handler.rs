//! Per-connection WebSocket handling.
//!
//! Each connection owns one shell session. Four tasks run until the socket
//! goes away: session output, workspace changes, the socket writer and the
//! socket reader. Whichever ends first tears the connection down, and the
//! session is released exactly once afterwards.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use pty_manager::{PtyError, Session, SessionEvent, SessionId};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::protocol::{ClientMessage, Outbound, ServerMessage};
use crate::AppState;
use crate::files;

pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    state.metrics.connection_opened();
    info!(conn_id = %conn_id, "WebSocket connection opened");

    // Subscribe before taking the tree snapshot so no change slips between them
    let mut changes = state.hub.subscribe();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (session, mut events) = match state
        .sessions
        .create_session(SessionId::from(conn_id.clone()))
        .await
    {
        Ok(pair) => {
            state.metrics.session_spawned();
            pair
        }
        Err(e) => {
            state.metrics.spawn_failed();
            error!(conn_id = %conn_id, "Failed to start shell: {}", e);
            let msg = ServerMessage::error(format!("Failed to start shell: {e}"));
            if let Ok(json) = serde_json::to_string(&msg) {
                let _ = ws_sender.send(Message::Text(json.into())).await;
            }
            let _ = ws_sender.send(Message::Close(None)).await;
            state.metrics.connection_closed();
            return;
        }
    };

    let (tx, mut rx) = mpsc::channel::<Outbound>(state.config.websocket.send_channel_capacity);

    // Initial tree goes to this connection only, ahead of everything else
    let initial = match files::snapshot_tree(&state.store).await {
        Ok(tree) => ServerMessage::FileTree { tree },
        Err(e) => {
            warn!(conn_id = %conn_id, "Failed to list workspace: {}", e);
            ServerMessage::error(format!("Failed to list workspace: {e}"))
        }
    };
    if tx.send(Outbound::Message(initial)).await.is_err() {
        warn!(conn_id = %conn_id, "Failed to queue initial tree - channel closed");
    }

    // Session output → this connection only
    let tx_output = tx.clone();
    let metrics_output = state.metrics.clone();
    let conn_output = conn_id.clone();
    let output_task = async move {
        while let Some(event) = events.recv().await {
            let outbound = match event {
                SessionEvent::Output(data) => {
                    metrics_output.terminal_output(data.len());
                    Outbound::Terminal(data)
                }
                SessionEvent::Exited { exit_code } => {
                    debug!(conn_id = %conn_output, ?exit_code, "Shell exited");
                    continue;
                }
                SessionEvent::Restarted => {
                    metrics_output.session_restarted();
                    Outbound::Message(ServerMessage::TerminalRestarted)
                }
                SessionEvent::Failed(reason) => {
                    metrics_output.spawn_failed();
                    Outbound::Message(ServerMessage::error(format!(
                        "Shell could not be restarted: {reason}"
                    )))
                }
            };
            if tx_output.send(outbound).await.is_err() {
                return;
            }
        }
        // The shell is gone for good; file sync keeps working without it
        debug!(conn_id = %conn_output, "Session events ended");
        std::future::pending::<()>().await
    };

    // Workspace changes → every connection, including the writer
    let tx_changes = tx.clone();
    let metrics_changes = state.metrics.clone();
    let conn_changes = conn_id.clone();
    let change_task = async move {
        loop {
            let refresh = match changes.recv().await {
                Ok(event) => ServerMessage::FileRefresh {
                    path: Some(event.path),
                    kind: Some(event.kind),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    metrics_changes.broadcasts_missed(n);
                    warn!(conn_id = %conn_changes, "Change broadcast lagged by {} events", n);
                    ServerMessage::FileRefresh {
                        path: None,
                        kind: None,
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if tx_changes.send(Outbound::Message(refresh)).await.is_err() {
                return;
            }
        }
        std::future::pending::<()>().await
    };

    // Task to send messages to WebSocket
    let sender_task = async move {
        while let Some(outbound) = rx.recv().await {
            let frame = match outbound {
                Outbound::Terminal(data) => Message::Binary(data.into()),
                Outbound::Message(msg) => match serde_json::to_string(&msg) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                },
            };
            if ws_sender.send(frame).await.is_err() {
                break;
            }
        }
    };

    // Task to handle incoming messages
    let input_session = session.clone();
    let input_state = state.clone();
    let conn_input = conn_id.clone();
    let input_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Binary(data)) => {
                    write_input(&input_session, &input_state, &conn_input, &data).await;
                }
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        dispatch(client_msg, &input_session, &input_state, &conn_input, &tx).await;
                    }
                    Err(e) => {
                        warn!(conn_id = %conn_input, "Ignoring malformed message: {}", e);
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!(conn_id = %conn_input, "Client closed connection");
                    break;
                }
                Err(e) => {
                    debug!(conn_id = %conn_input, "WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = output_task => debug!("Output task ended"),
        _ = change_task => debug!("Change task ended"),
        _ = sender_task => debug!("Sender task ended"),
        _ = input_task => debug!("Input task ended"),
    }

    state.sessions.release(&session).await;
    state.metrics.session_terminated();
    state.metrics.connection_closed();
    info!(conn_id = %conn_id, "WebSocket connection closed");
}

async fn dispatch(
    msg: ClientMessage,
    session: &Arc<Session>,
    state: &AppState,
    conn_id: &str,
    tx: &mpsc::Sender<Outbound>,
) {
    match msg {
        ClientMessage::TerminalWrite { data } => {
            write_input(session, state, conn_id, data.as_bytes()).await;
        }
        ClientMessage::TerminalResize { rows, cols } => {
            if rows == 0 || cols == 0 {
                warn!(conn_id = %conn_id, rows, cols, "Ignoring empty terminal size");
                return;
            }
            if let Err(e) = session.resize(rows, cols).await {
                warn!(conn_id = %conn_id, "Failed to resize terminal: {}", e);
            }
        }
        ClientMessage::FileChange { path, content } => {
            // Writes outlive the connection; the watcher announces the result
            let store = state.store.clone();
            let metrics = state.metrics.clone();
            let tx = tx.clone();
            let conn_id = conn_id.to_string();
            tokio::spawn(async move {
                let reply = match files::save_file(&store, path.clone(), content).await {
                    Ok(()) => {
                        metrics.file_written(true);
                        debug!(conn_id = %conn_id, path = %path, "Saved file");
                        ServerMessage::FileSaved { path }
                    }
                    Err(e) => {
                        metrics.file_written(false);
                        warn!(conn_id = %conn_id, path = %path, "Failed to save file: {}", e);
                        ServerMessage::Error {
                            message: e.to_string(),
                            path: Some(path),
                        }
                    }
                };
                let _ = tx.send(Outbound::Message(reply)).await;
            });
        }
    }
}

/// Forward keystrokes to the connection's shell. Input that arrives while the
/// shell is restarting is dropped.
async fn write_input(session: &Session, state: &AppState, conn_id: &str, data: &[u8]) {
    match session.write(data).await {
        Ok(n) => state.metrics.terminal_input(n),
        Err(PtyError::NotRunning(_)) => {
            debug!(conn_id = %conn_id, bytes = data.len(), "Dropped input while shell is down");
        }
        Err(e) => warn!(conn_id = %conn_id, "Failed to write to terminal: {}", e),
    }
}
