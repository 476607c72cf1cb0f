//! WebSocket feed of the reactive slices. On connect the client receives the
//! composed modules, concepts and misconceptions; afterwards every published
//! change of a slice is sent again in full.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::context::AppContext;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::store::Store;

#[instrument(level = "info", skip(ws, ctx))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
  info!(target: "authoring_store", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, ctx))
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> bool {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  match socket.send(Message::Text(out)).await {
    Ok(()) => true,
    Err(e) => {
      error!(target: "authoring_store", error = %e, "WS send error");
      false
    }
  }
}

fn full_state(store: &Store) -> [ServerWsMessage; 3] {
  [
    ServerWsMessage::Modules { modules: store.modules() },
    ServerWsMessage::Concepts { concepts: store.concepts() },
    ServerWsMessage::Misconceptions { misconceptions: store.misconceptions() },
  ]
}

#[instrument(level = "info", skip(socket, ctx))]
async fn handle_ws(mut socket: WebSocket, ctx: Arc<AppContext>) {
  info!(target: "authoring_store", "WebSocket connected");
  let store = ctx.store.clone();
  let mut modules_rx = store.subscribe_modules();
  let mut concepts_rx = store.subscribe_concepts();
  let mut misconceptions_rx = store.subscribe_misconceptions();

  for msg in full_state(&store) {
    if !send(&mut socket, &msg).await {
      return;
    }
  }

  loop {
    let outgoing = tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(ClientWsMessage::Ping) => vec![ServerWsMessage::Pong],
          Ok(ClientWsMessage::Refresh) => full_state(&store).into(),
          Err(e) => vec![ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }],
        },
        Some(Ok(Message::Ping(payload))) => {
          let _ = socket.send(Message::Pong(payload)).await;
          continue;
        }
        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
        Some(Ok(_)) => continue,
      },
      changed = modules_rx.changed() => {
        if changed.is_err() { break; }
        let modules = modules_rx.borrow_and_update().clone();
        vec![ServerWsMessage::Modules { modules }]
      }
      changed = concepts_rx.changed() => {
        if changed.is_err() { break; }
        let concepts = concepts_rx.borrow_and_update().clone();
        vec![ServerWsMessage::Concepts { concepts }]
      }
      changed = misconceptions_rx.changed() => {
        if changed.is_err() { break; }
        let misconceptions = misconceptions_rx.borrow_and_update().clone();
        vec![ServerWsMessage::Misconceptions { misconceptions }]
      }
    };

    for msg in &outgoing {
      debug!(target: "authoring_store", "WS sending slice update");
      if !send(&mut socket, msg).await {
        return;
      }
    }
  }
  info!(target: "authoring_store", "WebSocket disconnected");
}
