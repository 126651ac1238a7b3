//! Integration tests for the per-context message router

use pagewire::error::{HandlerError, RespondError};
use pagewire::messaging::{
    HandlerResult, MessageAction, MessageContext, MessageEnvelope, MessageRouter, MessageSender,
    ResponseEnvelope,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

fn envelope(action: MessageAction, data: Value) -> MessageEnvelope {
    MessageEnvelope::new(action, data, MessageContext::Popup)
}

async fn echo(envelope: MessageEnvelope, _sender: MessageSender) -> HandlerResult {
    Ok(json!({ "echo": envelope.data }))
}

async fn exploding(_envelope: MessageEnvelope, _sender: MessageSender) -> HandlerResult {
    panic!("selection overlay exploded")
}

#[tokio::test]
async fn test_registered_handler_answers_once() {
    let router = MessageRouter::new(MessageContext::Content);
    router.register_fn(MessageAction::Ping, echo);
    let responses = Mutex::new(Vec::new());

    let handled = router
        .handle_message(
            &envelope(MessageAction::Ping, json!({"n": 1})),
            &MessageSender::default(),
            |response| {
                responses.lock().push(response);
                Ok(())
            },
        )
        .await;

    assert!(handled);
    let responses = responses.into_inner();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0], ResponseEnvelope::ok(json!({"echo": {"n": 1}})));
}

#[tokio::test]
async fn test_unregistered_action_is_not_handled() {
    let router = MessageRouter::new(MessageContext::Content);
    router.register_fn(MessageAction::Ping, echo);
    let mut called = false;

    let handled = router
        .handle_message(
            &envelope(MessageAction::DismissTranslationWindow, Value::Null),
            &MessageSender::default(),
            |_| {
                called = true;
                Ok(())
            },
        )
        .await;

    assert!(!handled);
    assert!(!called);
}

#[tokio::test]
async fn test_unknown_action_string_is_not_handled() {
    let router = MessageRouter::new(MessageContext::Content);
    router.register_fn(MessageAction::Ping, echo);
    let raw = json!({
        "action": "openDevTools",
        "context": "popup",
        "messageId": "popup-7",
        "timestamp": 1,
    });
    let mut called = false;

    let handled = router
        .handle_raw(&raw, &MessageSender::default(), |_| {
            called = true;
            Ok(())
        })
        .await;

    assert!(!handled);
    assert!(!called);
}

#[tokio::test]
async fn test_fractional_timestamp_is_handled() {
    let router = MessageRouter::new(MessageContext::Content);
    router.register_fn(MessageAction::Ping, echo);
    let raw = json!({
        "action": "ping",
        "context": "popup",
        "messageId": "popup-8",
        "timestamp": 1712345678901.25,
    });
    let mut called = false;

    let handled = router
        .handle_raw(&raw, &MessageSender::default(), |_| {
            called = true;
            Ok(())
        })
        .await;

    assert!(handled);
    assert!(called);
}

#[tokio::test]
async fn test_malformed_envelope_is_not_handled() {
    let router = MessageRouter::new(MessageContext::Content);
    router.register_fn(MessageAction::Ping, echo);
    let raw = json!({ "action": "ping", "context": "popup" });

    let handled = router
        .handle_raw(&raw, &MessageSender::default(), |_| Ok(()))
        .await;

    assert!(!handled);
}

#[tokio::test]
async fn test_handler_error_becomes_failure_response() {
    let router = MessageRouter::new(MessageContext::Content);
    router.register_fn(MessageAction::RefreshFeatures, |_envelope, _sender| async {
        Err(HandlerError::new("exclusion settings not loaded"))
    });
    let responses = Mutex::new(Vec::new());

    let handled = router
        .handle_message(
            &envelope(MessageAction::RefreshFeatures, Value::Null),
            &MessageSender::default(),
            |response| {
                responses.lock().push(response);
                Ok(())
            },
        )
        .await;

    assert!(handled);
    assert_eq!(
        responses.into_inner(),
        vec![ResponseEnvelope::failure("exclusion settings not loaded")]
    );
}

#[tokio::test]
async fn test_handler_panic_becomes_failure_response() {
    let router = MessageRouter::new(MessageContext::Content);
    router.register_fn(MessageAction::ShowTranslationWindow, exploding);
    let responses = Mutex::new(Vec::new());

    let handled = router
        .handle_message(
            &envelope(MessageAction::ShowTranslationWindow, Value::Null),
            &MessageSender::default(),
            |response| {
                responses.lock().push(response);
                Ok(())
            },
        )
        .await;

    assert!(handled);
    let responses = responses.into_inner();
    assert_eq!(responses.len(), 1);
    assert!(!responses[0].success);
    let error = responses[0].error.clone().unwrap();
    assert!(error.contains("selection overlay exploded"), "{}", error);
}

#[tokio::test]
async fn test_failing_respond_still_counts_as_handled() {
    let router = MessageRouter::new(MessageContext::Content);
    router.register_fn(MessageAction::Ping, echo);

    let handled = router
        .handle_message(
            &envelope(MessageAction::Ping, Value::Null),
            &MessageSender::default(),
            |_| Err(RespondError::ChannelClosed("tab navigated away".to_string())),
        )
        .await;

    assert!(handled);
}

#[tokio::test]
async fn test_reregistration_overwrites_previous_handler() {
    let router = MessageRouter::new(MessageContext::Content);
    assert!(!router.register_fn(MessageAction::Ping, echo));
    assert!(router.register_fn(MessageAction::Ping, |_envelope, _sender| async {
        Ok(json!("second"))
    }));
    let responses = Mutex::new(Vec::new());

    router
        .handle_message(
            &envelope(MessageAction::Ping, Value::Null),
            &MessageSender::default(),
            |response| {
                responses.lock().push(response);
                Ok(())
            },
        )
        .await;

    assert_eq!(responses.into_inner(), vec![ResponseEnvelope::ok(json!("second"))]);
    assert_eq!(router.registered_actions(), vec![MessageAction::Ping]);
}

#[test]
fn test_missing_actions_lists_unregistered_set() {
    let router = MessageRouter::new(MessageContext::Content);
    router.register_fn(MessageAction::Ping, echo);
    router.register_fn(MessageAction::RefreshFeatures, echo);

    let missing = router.missing_actions();

    assert_eq!(missing.len(), MessageAction::ALL.len() - 2);
    assert!(!missing.contains(&MessageAction::Ping));
    assert!(missing.contains(&MessageAction::DismissTranslationWindow));

    assert!(router.unregister_handler(MessageAction::Ping));
    assert!(!router.is_registered(MessageAction::Ping));
}
