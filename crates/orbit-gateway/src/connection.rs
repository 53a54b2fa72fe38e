use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use orbit_types::events::{GatewayCommand, GatewayEvent, PresenceStatus};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive a WebSocket whose token was already checked at the upgrade.
///
/// Sends `ready`, replays who is online, joins the user's room and then
/// relays events until either side goes away.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, user_id: Uuid, username: String) {
    let (mut sender, receiver) = socket.split();

    info!("{} ({}) connected to gateway", username, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, dispatcher, user_id, username).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    user_id: Uuid,
    username: String,
) {
    // Subscribe first so nothing announced after the replay is missed
    let mut broadcast_rx = dispatcher.subscribe();
    let (conn_id, mut user_rx) = dispatcher.join_room(user_id, &username).await;

    // Let the new client see who is already here
    for (uid, _) in dispatcher.online_users().await {
        if uid == user_id {
            continue;
        }
        let event = GatewayEvent::UserStatusChange {
            user_id: uid,
            status: PresenceStatus::Online,
        };
        if send_event(&mut sender, &event).await.is_err() {
            dispatcher.user_offline(user_id, conn_id).await;
            return;
        }
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    // Presence changes go to everyone but the user themselves
                    if let GatewayEvent::UserStatusChange { user_id: changed, .. } = &event {
                        if *changed == user_id {
                            continue;
                        }
                    }

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
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let dispatcher_recv = dispatcher.clone();
    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&dispatcher_recv, user_id, &username_recv, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            truncate(&text, 200)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.user_offline(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn handle_command(dispatcher: &Dispatcher, user_id: Uuid, username: &str, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::TypingStart { receiver_id } => {
            debug!("{} ({}) typing to {}", username, user_id, receiver_id);
            dispatcher
                .send_to_user(
                    receiver_id,
                    GatewayEvent::UserTyping {
                        user_id,
                        username: username.to_string(),
                    },
                )
                .await;
        }

        GatewayCommand::TypingStop { receiver_id } => {
            dispatcher
                .send_to_user(receiver_id, GatewayEvent::UserStoppedTyping { user_id })
                .await;
        }

        GatewayCommand::UserOnline => {
            if !dispatcher.user_online(user_id).await {
                debug!("{} ({}) sent user_online without a room", username, user_id);
            }
        }
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> Result<(), ()> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 200), "short");
    }

    #[tokio::test]
    async fn typing_goes_only_to_the_receiver() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (_a, mut alice_rx) = dispatcher.join_room(alice, "alice").await;
        let (_b, mut bob_rx) = dispatcher.join_room(bob, "bob").await;

        handle_command(&dispatcher, alice, "alice", GatewayCommand::TypingStart { receiver_id: bob }).await;
        handle_command(&dispatcher, alice, "alice", GatewayCommand::TypingStop { receiver_id: bob }).await;

        match bob_rx.try_recv() {
            Ok(GatewayEvent::UserTyping { user_id, username }) => {
                assert_eq!(user_id, alice);
                assert_eq!(username, "alice");
            }
            other => panic!("expected user_typing, got {:?}", other),
        }
        assert!(matches!(
            bob_rx.try_recv(),
            Ok(GatewayEvent::UserStoppedTyping { user_id }) if user_id == alice
        ));
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn user_online_command_reannounces_a_connected_user() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let (_a, _alice_rx) = dispatcher.join_room(alice, "alice").await;
        let mut events = dispatcher.subscribe();

        handle_command(&dispatcher, alice, "alice", GatewayCommand::UserOnline).await;
        assert!(matches!(
            events.try_recv(),
            Ok(GatewayEvent::UserStatusChange { user_id, status: PresenceStatus::Online }) if user_id == alice
        ));
    }
}
