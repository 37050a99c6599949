use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_db::Database;
use parley_types::api::Claims;
use parley_types::events::{GatewayCommand, GatewayEvent};
use parley_types::time::{from_millis, now_ms};

use crate::auth::TokenVerifier;
use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh socket has to send Identify.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a gateway connection needs from the server.
#[derive(Clone)]
pub struct GatewayContext {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub verifier: TokenVerifier,
}

/// Who is on the other end of a connection.
struct Session {
    user_id: Uuid,
    name: String,
}

/// Handle a single WebSocket connection: Identify handshake, then the event loop.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with a session token
    let Some(claims) = wait_for_identify(&mut receiver, &ctx.verifier).await else {
        warn!("WebSocket client failed to identify, closing");
        return;
    };

    // Step 2: The profile must have been synced over REST first
    let external_id = claims.sub.clone();
    let user = match run_db(&ctx.db, move |db| db.require_user(&external_id)).await {
        Ok(user) => user,
        Err(e) => {
            warn!("Gateway identify for {} rejected: {}", claims.sub, e);
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    info!("{} ({}) connected to gateway", user.name, user.id);

    let session = Session {
        user_id: user.id,
        name: user.name,
    };
    run_connection_loop(sender, receiver, ctx, session).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    ctx: GatewayContext,
    session: Session,
) {
    let user_id = session.user_id;

    // Register before Ready so every event after Ready reaches this client
    let (conn_id, mut user_rx, first) = ctx.dispatcher.register_connection(user_id).await;
    let mut broadcast_rx = ctx.dispatcher.subscribe();

    let now = now_ms();
    touch_presence(&ctx.db, user_id).await;
    if first {
        ctx.dispatcher.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            online: true,
            last_seen_at: from_millis(now),
        });
    }

    // Ready, then who's already here
    let mut greeting = vec![GatewayEvent::Ready {
        user_id,
        name: session.name.clone(),
    }];
    for uid in ctx.dispatcher.online_users().await {
        if uid != user_id {
            greeting.push(GatewayEvent::PresenceUpdate {
                user_id: uid,
                online: true,
                last_seen_at: from_millis(now),
            });
        }
    }

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        for event in &greeting {
            if send_event(&mut sender, event).await.is_err() {
                return;
            }
        }

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let Some(event) = result else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_ctx = ctx.clone();
    let recv_name = session.name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_ctx, user_id, &recv_name, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_name,
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                    // A live socket keeps the user online for REST readers too
                    touch_presence(&recv_ctx.db, user_id).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let last = ctx.dispatcher.unregister_connection(user_id, conn_id).await;
    if last {
        // Stored before the broadcast so REST readers agree with it
        let now = now_ms();
        if let Err(e) = run_db(&ctx.db, move |db| db.mark_offline(user_id, now)).await {
            warn!("Failed to record {} going offline: {}", user_id, e);
        }
        ctx.dispatcher.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            online: false,
            last_seen_at: from_millis(now),
        });
    }
    info!("{} ({}) disconnected from gateway", session.name, user_id);
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    verifier: &TokenVerifier,
) -> Option<Claims> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return match verifier.verify(&token) {
                        Ok(claims) => Some(claims),
                        Err(e) => {
                            warn!("Gateway token rejected: {}", e);
                            None
                        }
                    };
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify)
        .await
        .ok()
        .flatten()
}

async fn handle_command(ctx: &GatewayContext, user_id: Uuid, name: &str, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Heartbeat => touch_presence(&ctx.db, user_id).await,

        GatewayCommand::StartTyping { conversation_id } => {
            let event = GatewayEvent::TypingStart {
                conversation_id,
                user_id,
                name: name.to_string(),
            };
            set_typing(ctx, user_id, conversation_id, true, event).await;
        }

        GatewayCommand::StopTyping { conversation_id } => {
            let event = GatewayEvent::TypingStop {
                conversation_id,
                user_id,
            };
            set_typing(ctx, user_id, conversation_id, false, event).await;
        }
    }
}

/// Persist the typing flag, then tell the other participants.
async fn set_typing(
    ctx: &GatewayContext,
    user_id: Uuid,
    conversation_id: Uuid,
    is_typing: bool,
    event: GatewayEvent,
) {
    let now = now_ms();
    let result = run_db(&ctx.db, move |db| {
        db.set_typing(user_id, conversation_id, is_typing, now)?;
        db.other_participant_ids(user_id, conversation_id)
    })
    .await;

    match result {
        Ok(others) => ctx.dispatcher.send_to_users(&others, event).await,
        Err(e) => debug!("Typing update from {} in {} dropped: {}", user_id, conversation_id, e),
    }
}

async fn touch_presence(db: &Arc<Database>, user_id: Uuid) {
    let now = now_ms();
    if let Err(e) = run_db(db, move |db| db.touch_presence(user_id, now)).await {
        warn!("Failed to record presence for {}: {}", user_id, e);
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

/// Run blocking DB work off the async runtime.
async fn run_db<F, T>(db: &Arc<Database>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> parley_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    Ok(tokio::task::spawn_blocking(move || f(&db)).await??)
}
