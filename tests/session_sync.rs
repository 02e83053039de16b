//! Session replica driven by hub events: reconnect, teardown and notifications

mod support;

use std::collections::HashSet;
use std::time::Duration;

use serde_json::json;

use space_session_client::hub::ConnectionState;
use space_session_client::lobby::CreateLobbyState;
use space_session_client::store::{
    LobbyState, PlayerHit, SessionNotification, SessionState,
};
use space_session_client::sync::command::events;

use support::{connected_context, eventually, next_link, ServerLink};

fn bot_ids(state: &SessionState) -> HashSet<String> {
    state.bots.keys().cloned().collect()
}

fn ids(list: &[&str]) -> HashSet<String> {
    list.iter().map(|id| id.to_string()).collect()
}

fn send_bots(link: &ServerLink, list: &[&str]) {
    let roster: serde_json::Map<String, serde_json::Value> = list
        .iter()
        .map(|id| (id.to_string(), json!({ "x": 1.0, "y": 2.0 })))
        .collect();
    link.send_event(events::RECEIVE_BOT_LIST, vec![json!(roster)]);
}

#[tokio::test]
async fn bot_list_after_reconnect_replaces_the_roster() {
    let (context, link, mut links) = connected_context().await;

    send_bots(&link, &["a", "b", "c"]);
    assert!(eventually(|| bot_ids(&context.session.snapshot()) == ids(&["a", "b", "c"])).await);

    drop(link);
    let link = next_link(&mut links).await;
    assert!(eventually(|| context.connection.is_connected()).await);

    send_bots(&link, &["d", "e"]);
    assert!(eventually(|| bot_ids(&context.session.snapshot()) == ids(&["d", "e"])).await);
}

#[tokio::test]
async fn positions_and_projectiles_flow_into_the_replica() {
    let (context, link, _links) = connected_context().await;

    link.send_event(
        events::RECEIVE_PLAYER_POSITION,
        vec![json!("p1"), json!({ "x": 5, "y": 6 })],
    );
    link.send_event(events::SPAWN_BULLET, vec![json!("s1"), json!(1), json!(2)]);
    link.send_event(events::SPAWN_ENEMY_BULLET, vec![json!({ "id": "e1", "x": 3, "y": 4 })]);
    link.send_event(events::UPDATE_SCORE, vec![json!(120)]);

    assert!(eventually(|| context.session.snapshot().score == 120).await);
    let state = context.session.snapshot();
    assert_eq!(state.players["p1"].y, 6.0);
    assert!(state.bullets.contains_key("s1"));
    assert!(state.enemy_bullets.contains_key("e1"));

    link.send_event(events::REMOVE_BULLET, vec![json!("s1")]);
    link.send_event(events::PLAYER_LEFT, vec![json!("p1")]);
    assert!(eventually(|| {
        let state = context.session.snapshot();
        state.bullets.is_empty() && state.players.is_empty()
    })
    .await);
}

#[tokio::test]
async fn malformed_payloads_are_dropped() {
    let (context, link, _links) = connected_context().await;

    link.send_event(events::RECEIVE_PLAYER_POSITION, vec![json!("p1")]);
    link.send_event(events::UPDATE_SCORE, vec![json!(7)]);

    assert!(eventually(|| context.session.snapshot().score == 7).await);
    assert!(context.session.snapshot().players.is_empty());
}

#[tokio::test]
async fn reset_clears_everything_but_keeps_the_socket() {
    let (context, link, _links) = connected_context().await;

    context.lobby.set_lobby_name("Alpha");
    send_bots(&link, &["a"]);
    link.send_event(events::UPDATE_SCORE, vec![json!(40)]);
    assert!(eventually(|| context.session.snapshot().score == 40).await);

    context.leave_to_menu();

    assert_eq!(context.session.snapshot(), SessionState::default());
    assert_eq!(context.lobby.snapshot(), LobbyState::default());
    assert_eq!(context.coordinator.create_state(), CreateLobbyState::default());
    assert_eq!(context.connection.state(), ConnectionState::Connected);
    assert!(!context.dispatcher.is_armed());

    // Nothing listens until the next lobby flow re-arms
    link.send_event(events::UPDATE_SCORE, vec![json!(90)]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(context.session.snapshot().score, 0);

    context.connection.rearm();
    assert!(context.dispatcher.is_armed());
    link.send_event(events::UPDATE_SCORE, vec![json!(70)]);
    assert!(eventually(|| context.session.snapshot().score == 70).await);
}

#[tokio::test]
async fn reset_is_idempotent() {
    let (context, _link, _links) = connected_context().await;

    context.leave_to_menu();
    let generation = context.dispatcher.generation();
    context.leave_to_menu();

    assert_eq!(context.dispatcher.generation(), generation + 1);
    assert_eq!(context.session.snapshot(), SessionState::default());
}

#[tokio::test]
async fn listener_may_reset_on_game_over() {
    let (context, link, _links) = connected_context().await;

    let teardown = context.teardown.clone();
    let _subscription = context.session.subscribe(move |state| {
        if state.game_over {
            teardown.reset_all();
        }
    });

    link.send_event(events::UPDATE_SCORE, vec![json!(10)]);
    assert!(eventually(|| context.session.snapshot().score == 10).await);

    link.send_event(events::GAME_OVER, Vec::new());
    assert!(eventually(|| context.dispatcher.generation() == 1).await);
    assert_eq!(context.session.snapshot(), SessionState::default());
}

#[tokio::test]
async fn hits_are_announced_once_and_never_sticky() {
    let (context, link, _links) = connected_context().await;
    let mut notifications = context.session.notifications();

    link.send_event(events::PLAYER_HIT, vec![json!("p1"), json!(40)]);

    let notification = tokio::time::timeout(support::WAIT, notifications.recv())
        .await
        .expect("no notification")
        .expect("channel closed");
    assert_eq!(
        notification,
        SessionNotification::PlayerHit(PlayerHit {
            id: "p1".into(),
            health: 40,
        })
    );
    assert_eq!(context.session.snapshot().player_hit, None);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(notifications.try_recv().is_err());
}

#[tokio::test]
async fn game_over_freezes_the_replica() {
    let (context, link, _links) = connected_context().await;

    link.send_event(events::UPDATE_SCORE, vec![json!(300)]);
    link.send_event(events::GAME_OVER, Vec::new());
    assert!(eventually(|| context.session.snapshot().game_over).await);

    link.send_event(events::UPDATE_SCORE, vec![json!(999)]);
    link.send_event(events::RECEIVE_BOT_POSITION, vec![json!("b1"), json!({ "x": 0, "y": 0 })]);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let state = context.session.snapshot();
    assert_eq!(state.score, 300);
    assert!(state.bots.is_empty());
}

#[tokio::test]
async fn disconnect_watch_resets_when_the_hub_closes() {
    let (context, link, _links) = connected_context().await;
    let watch = context.spawn_disconnect_watch();

    context.lobby.set_lobby_name("Alpha");
    link.send_event(events::UPDATE_SCORE, vec![json!(15)]);
    assert!(eventually(|| context.session.snapshot().score == 15).await);

    link.send_close(false);

    assert!(eventually(|| context.lobby.snapshot() == LobbyState::default()).await);
    assert_eq!(context.session.snapshot(), SessionState::default());
    assert_eq!(context.connection.state(), ConnectionState::Disconnected);
    watch.abort();
}
