//! WebSocket endpoint driving join/leave, live location, chat, and
//! read-receipt flows.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::http::auth::AuthedUser;
use crate::http::AppState;
use crate::models::message::ChatMessage;
use crate::models::notification::{Notification, NotificationKind};
use crate::models::user::UserAccount;
use crate::{AppError, Result};

use super::events::{ClientEvent, ServerEvent};

/// Outbound buffer per connection.
const OUTBOUND_CAPACITY: usize = 64;

/// Longest accepted chat message, characters.
const MAX_MESSAGE_CHARS: usize = 1000;

/// Handler for `GET /ws` — upgrades to the realtime channel protocol.
pub async fn ws_handler(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        info!(user_id = %user.id, "realtime connection opened");
        drive_connection(socket, state, user).await;
    })
}

/// Forward a broadcast subscription into the connection's outbound
/// queue until either side closes. Lagged receivers skip ahead —
/// delivery is at-most-once and clients reconcile by fetching.
fn spawn_forwarder(
    mut rx: broadcast::Receiver<ServerEvent>,
    out_tx: mpsc::Sender<ServerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if out_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "forwarder lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn drive_connection(socket: WebSocket, state: AppState, user: UserAccount) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_CAPACITY);

    // Single writer task owns the sink; everything else goes through
    // the outbound queue.
    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Every connection joins its personal channel implicitly.
    let personal_rx = state.hub.subscribe_user(&user.id).await;
    let personal = spawn_forwarder(personal_rx, out_tx.clone());

    let mut task_subscriptions: HashMap<String, JoinHandle<()>> = HashMap::new();

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let event = match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => event,
            Err(err) => {
                let _ = out_tx
                    .send(ServerEvent::Error {
                        message: format!("unrecognized event: {err}"),
                    })
                    .await;
                continue;
            }
        };

        if let Err(err) =
            handle_event(&state, &user, event, &out_tx, &mut task_subscriptions).await
        {
            let _ = out_tx
                .send(ServerEvent::Error {
                    message: err.to_string(),
                })
                .await;
        }
    }

    for (_, handle) in task_subscriptions {
        handle.abort();
    }
    personal.abort();
    drop(out_tx);
    let _ = writer.await;
    info!(user_id = %user.id, "realtime connection closed");
}

async fn handle_event(
    state: &AppState,
    user: &UserAccount,
    event: ClientEvent,
    out_tx: &mpsc::Sender<ServerEvent>,
    task_subscriptions: &mut HashMap<String, JoinHandle<()>>,
) -> Result<()> {
    match event {
        ClientEvent::JoinTask { task_id } => {
            let task = state.tasks.require(&task_id).await?;
            let rx = state.hub.subscribe_task(&task, &user.id).await?;

            if let Some(previous) = task_subscriptions.remove(&task_id) {
                previous.abort();
            }
            task_subscriptions.insert(task_id.clone(), spawn_forwarder(rx, out_tx.clone()));

            let _ = out_tx.send(ServerEvent::JoinedTask { task_id }).await;
        }

        ClientEvent::LeaveTask { task_id } => {
            if let Some(handle) = task_subscriptions.remove(&task_id) {
                handle.abort();
            }
            let _ = out_tx.send(ServerEvent::LeftTask { task_id }).await;
        }

        ClientEvent::UpdateLocation {
            task_id,
            latitude,
            longitude,
        } => {
            let task = state.tasks.require(&task_id).await?;
            if !task.is_any_helper(&user.id) {
                return Err(AppError::Forbidden(
                    "only assigned helpers can update location".into(),
                ));
            }

            let location = crate::geo::Point::new(latitude, longitude);
            state.users.update_location(&user.id, location).await?;

            state
                .hub
                .publish_task(
                    &task_id,
                    ServerEvent::HelperLocation {
                        task_id: task_id.clone(),
                        helper_id: user.id.clone(),
                        latitude,
                        longitude,
                        timestamp: Utc::now(),
                    },
                )
                .await;
        }

        ClientEvent::SendMessage { task_id, content } => {
            if content.trim().is_empty() || content.chars().count() > MAX_MESSAGE_CHARS {
                return Err(AppError::Validation(
                    "message must be between 1 and 1000 characters".into(),
                ));
            }

            let task = state.tasks.require(&task_id).await?;

            // Chat runs between the requester and the primary helper.
            let receiver_id = if task.is_requester(&user.id) {
                task.assigned_helper.clone().ok_or_else(|| {
                    AppError::InvalidState("no helper assigned to this task yet".into())
                })?
            } else if task.is_any_helper(&user.id) {
                task.requester_id.clone()
            } else {
                return Err(AppError::Forbidden("access denied to this chat".into()));
            };

            // Durably store before any broadcast.
            let message = ChatMessage::new(
                task_id.clone(),
                user.id.clone(),
                receiver_id.clone(),
                content,
                state.config.retention.message_ttl_days,
            );
            let stored = state.messages.create(&message).await?;

            state
                .hub
                .publish_task(
                    &task_id,
                    ServerEvent::MessageNew {
                        message: stored.clone(),
                    },
                )
                .await;

            let preview: String = stored.content.chars().take(50).collect();
            let ellipsis = if stored.content.chars().count() > 50 {
                "…"
            } else {
                ""
            };
            let notification = Notification::new(
                receiver_id,
                NotificationKind::ChatMessage,
                "New Message".to_owned(),
                format!("{}: {preview}{ellipsis}", user.username),
            )
            .with_task(task_id)
            .with_message(stored.id.clone());
            let _ = state.notifier.send(notification).await;
        }

        ClientEvent::MessagesRead { task_id } => {
            let marked = state.messages.mark_read(&task_id, &user.id).await?;
            debug!(%task_id, marked, "messages marked read");

            state
                .hub
                .publish_task(
                    &task_id,
                    ServerEvent::MessagesMarkedRead {
                        task_id: task_id.clone(),
                        user_id: user.id.clone(),
                    },
                )
                .await;
        }
    }

    Ok(())
}
