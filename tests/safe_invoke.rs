//! Readiness-bounded invocation and player input

mod support;

use std::time::Duration;

use serde_json::{json, Value};
use tokio_test::assert_ok;

use space_session_client::error::InvokeError;
use space_session_client::hub::protocol::PlayerInputAction;
use space_session_client::session::InputCommands;
use space_session_client::util::rate_limit::InputRateLimiter;

use support::{connected_context, mock_context, mock_context_with, next_link, test_config};

#[tokio::test]
async fn shot_before_connect_is_sent_exactly_once() {
    let (context, _connector, mut links) = mock_context();

    let shooter = {
        let input = context.input.clone();
        tokio::spawn(async move { input.shoot().await })
    };
    tokio::task::yield_now().await;

    let connecting = {
        let context = context.clone();
        tokio::spawn(async move { context.connect().await })
    };

    let mut link = next_link(&mut links).await;
    let (id, args) = link.expect_invocation("Shoot").await;
    assert!(args.is_empty());
    link.complete(&id, Value::Null);

    assert_ok!(connecting.await.unwrap());
    assert_ok!(shooter.await.unwrap());
    assert!(link.drain_invocations(Duration::from_millis(100)).await.is_empty());
}

#[tokio::test]
async fn safe_invoke_gives_up_after_the_ready_timeout() {
    let mut config = test_config();
    config.ready_timeout = Duration::from_millis(50);
    let (context, connector, _links) = mock_context_with(config);

    assert_eq!(
        context.invoker.invoke_safe("TogglePause", vec![json!("Alpha")]).await,
        Err(InvokeError::NotConnected)
    );
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn safe_invoke_returns_the_completion_result() {
    let (context, mut link, _links) = connected_context().await;

    let call = {
        let invoker = context.invoker.clone();
        tokio::spawn(async move {
            invoker
                .invoke_safe_as::<Vec<String>>("GetPlayerList", vec![json!("Alpha")])
                .await
        })
    };

    let (id, args) = link.expect_invocation("GetPlayerList").await;
    assert_eq!(args, vec![json!("Alpha")]);
    link.complete(&id, json!(["Ann", "Bob"]));

    assert_eq!(call.await.unwrap(), Ok(vec!["Ann".to_string(), "Bob".to_string()]));
}

#[tokio::test]
async fn actions_carry_their_wire_values() {
    let (context, mut link, _links) = connected_context().await;

    let action = {
        let input = context.input.clone();
        tokio::spawn(async move { input.perform_action(PlayerInputAction::ALL[0]).await })
    };

    let (id, args) = link.expect_invocation("PerformAction").await;
    assert_eq!(args, vec![json!(PlayerInputAction::ALL[0].wire_value())]);
    link.complete(&id, Value::Null);

    assert_ok!(action.await.unwrap());
}

#[tokio::test]
async fn rapid_shots_are_throttled_locally() {
    let (context, mut link, _links) = connected_context().await;
    let input = InputCommands::new(context.invoker.clone(), InputRateLimiter::with_limits(30, 1));

    let first = {
        let input = input.clone();
        tokio::spawn(async move { input.shoot().await })
    };
    let (id, _) = link.expect_invocation("Shoot").await;
    link.complete(&id, Value::Null);
    assert_ok!(first.await.unwrap());

    assert_eq!(input.shoot().await, Err(InvokeError::Throttled));
    assert!(link.drain_invocations(Duration::from_millis(100)).await.is_empty());
}

#[tokio::test]
async fn stop_intents_bypass_the_action_limit() {
    let (context, mut link, _links) = connected_context().await;
    let input = InputCommands::new(context.invoker.clone(), InputRateLimiter::with_limits(1, 10));

    let start = {
        let input = input.clone();
        tokio::spawn(async move { input.perform_action(PlayerInputAction::MoveLeftStart).await })
    };
    let (id, _) = link.expect_invocation("PerformAction").await;
    link.complete(&id, Value::Null);
    assert_ok!(start.await.unwrap());

    assert_eq!(
        input.perform_action(PlayerInputAction::MoveUpStart).await,
        Err(InvokeError::Throttled)
    );

    let stop = {
        let input = input.clone();
        tokio::spawn(async move { input.perform_action(PlayerInputAction::MoveLeftStop).await })
    };
    let (id, args) = link.expect_invocation("PerformAction").await;
    assert_eq!(args, vec![json!(PlayerInputAction::MoveLeftStop.wire_value())]);
    link.complete(&id, Value::Null);
    assert_ok!(stop.await.unwrap());
}
