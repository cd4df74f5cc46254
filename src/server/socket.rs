// FILE: src/server/socket.rs
//! Push channel: one WebSocket per client mirroring the gateway.

use crate::gateway::ClientMessage;
use crate::service::SharedService;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};

pub(crate) async fn upgrade(State(service): State<SharedService>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(service, socket))
}

async fn handle_socket(service: SharedService, socket: WebSocket) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    // Subscribe before counting so nothing between the two is lost
    let mut subscription = service.gateway().subscribe();
    let hello = ClientMessage::Connected { total_files: service.store().count() };
    if ws_sink.send(Message::Text(hello.to_json())).await.is_err() {
        return;
    }
    tracing::debug!("[Socket] Client connected ({} subscribers)", service.gateway().subscriber_count());

    loop {
        tokio::select! {
            message = subscription.recv() => match message {
                Some(message) => {
                    if ws_sink.send(Message::Text(message.to_json())).await.is_err() {
                        break;
                    }
                }
                // Lagged past capacity, or the gateway is gone
                None => break,
            },
            incoming = ws_stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = ws_sink.close().await;
    tracing::debug!("[Socket] Client disconnected");
}
