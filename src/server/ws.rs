use super::AppState;
use crate::core::broadcast::observer_channel;
use crate::core::protocol::{ClientCommand, ServerEvent};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};

/// `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One task per connection. The writer drains the connection's event queue,
/// which only the engine (and local parse errors) feed; the reader forwards
/// parsed commands and reports the disconnect when the socket ends.
///
/// The engine holds the only strong sender. Once it drops a lagging
/// observer the queue closes and the writer ends the connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = observer_channel();
    let local_tx = tx.downgrade();

    let connection = match state.handle.connect(tx).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::error!("❌ Rejecting connection: {}", e);
            if let Ok(text) = ServerEvent::error(&e).to_json() {
                let _ = sink.send(Message::Text(text.into())).await;
            }
            let _ = sink.close().await;
            return;
        }
    };

    let mut writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("❌ Could not encode {} event: {}", event.name(), e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let handle = state.handle.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            match ClientCommand::parse(text.as_str()) {
                Ok(command) => {
                    if handle.dispatch(connection, command).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("⚠️ {} sent a malformed frame: {}", connection, e);
                    let Some(tx) = local_tx.upgrade() else { break };
                    let _ = tx.try_send(ServerEvent::error(&e));
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    if let Err(e) = state.handle.disconnect(connection).await {
        tracing::debug!("{} closed after engine stop: {}", connection, e);
    }
}
