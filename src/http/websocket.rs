//! Authenticated websocket endpoint.
//!
//! # Responsibilities
//! - Complete the upgrade handshake for authenticated clients
//! - Announce readiness with a `ready` frame
//! - Answer pings and close on client close or gateway shutdown
//!
//! # Design Decisions
//! - Pongs are sent explicitly rather than relying on the transport
//! - Shutdown sends a `1001 going away` close frame before dropping the socket

use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde_json::json;

use crate::context::RequestContext;
use crate::http::request::Ctx;
use crate::http::server::AppState;
use crate::lifecycle::Shutdown;

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    upgrade: WebSocketUpgrade,
) -> Response {
    let shutdown = state.shutdown.clone();
    upgrade.on_upgrade(move |socket| session(socket, ctx, shutdown))
}

async fn session(mut socket: WebSocket, ctx: RequestContext, shutdown: Arc<Shutdown>) {
    let user_id = ctx.principal().map(|p| p.user_id);
    let ready = json!({
        "type": "ready",
        "request_id": ctx.request_id(),
        "user_id": user_id,
    });
    if socket
        .send(Message::Text(ready.to_string().into()))
        .await
        .is_err()
    {
        return;
    }
    tracing::debug!(request_id = %ctx.request_id(), user_id = ?user_id, "Websocket session opened");

    loop {
        tokio::select! {
            _ = shutdown.triggered() => {
                let frame = CloseFrame {
                    code: close_code::AWAY,
                    reason: "server shutting down".into(),
                };
                let _ = socket.send(Message::Close(Some(frame))).await;
                break;
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Ping(payload))) => {
                    if socket.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(request_id = %ctx.request_id(), error = %e, "Websocket read failed");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    tracing::debug!(request_id = %ctx.request_id(), "Websocket session closed");
}
