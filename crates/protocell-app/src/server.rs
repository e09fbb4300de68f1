//! HTTP surface: a WebSocket endpoint per viewer plus a health check.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::command::{COMMAND_CAPACITY, create_command_bus, submit_command};
use crate::protocol::{ClientMessage, PONG, parse_client_message};
use crate::registry::SessionRegistry;
use crate::session::{SessionSettings, open_and_run};

#[derive(Debug, Clone)]
pub struct AppState {
    pub settings: SessionSettings,
    pub registry: SessionRegistry,
}

impl AppState {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            registry: SessionRegistry::new(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Binds `addr` and serves until the listener fails.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local = listener.local_addr().context("listener has no local address")?;
    info!(%local, "protocell listening; viewers connect to /ws");
    axum::serve(listener, router(state))
        .await
        .context("server exited unexpectedly")
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "sessions": state.registry.len() }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session_socket(socket, state))
}

async fn handle_session_socket(socket: WebSocket, state: AppState) {
    let id = state.registry.register();
    info!(session = %id, active = state.registry.len(), "viewer connected");
    let (outbox, mut outgoing) = mpsc::unbounded_channel::<String>();
    let (mut sink, mut stream) = socket.split();
    let (commands, receiver) = create_command_bus(COMMAND_CAPACITY);
    let cancel = Arc::new(AtomicBool::new(false));

    // World construction and population run off the async workers too.
    let mut ticker = tokio::task::spawn_blocking({
        let settings = state.settings.clone();
        let outbox = outbox.clone();
        let cancel = Arc::clone(&cancel);
        move || open_and_run(id, settings, outbox, receiver, cancel)
    });

    // Sole writer to the socket; frames leave in enqueue order.
    let sender = tokio::spawn(async move {
        while let Some(frame) = outgoing.recv().await {
            if let Err(err) = sink.send(Message::Text(frame.into())).await {
                debug!(session = %id, error = %err, "socket send failed");
                break;
            }
        }
    });

    let mut finished = None;
    loop {
        tokio::select! {
            outcome = &mut ticker => {
                finished = Some(outcome);
                break;
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => match parse_client_message(text.as_str()) {
                    Ok(ClientMessage::Ping) => {
                        if outbox.send(PONG.to_owned()).is_err() {
                            break;
                        }
                    }
                    Ok(ClientMessage::Control(command)) => {
                        submit_command(&commands, command);
                    }
                    Err(err) => {
                        warn!(session = %id, error = %err, "ignoring client frame");
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    error!(session = %id, error = %err, "websocket receive failed");
                    break;
                }
            },
        }
    }

    cancel.store(true, Ordering::Release);
    drop(commands);
    drop(outbox);
    let outcome = match finished {
        Some(outcome) => outcome,
        None => ticker.await,
    };
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(session = %id, error = %err, "failed to create session world"),
        Err(err) => error!(session = %id, error = %err, "session ticker panicked"),
    }
    // The ticker owned the last outbox handle; the sender drains and exits.
    if let Err(err) = sender.await {
        error!(session = %id, error = %err, "session sender panicked");
    }
    let connected = state.registry.deregister(id);
    info!(
        session = %id,
        connected_secs = connected.map(|elapsed| elapsed.as_secs_f64()),
        active = state.registry.len(),
        "viewer disconnected"
    );
}
