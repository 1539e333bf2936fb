mod helpers;

use evcare_realtime::infrastructure::stomp::{StompCommand, StompFrame};
use evcare_realtime::{ConnectionState, RealtimeError, SendMessageRequest};
use helpers::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn request(content: &str) -> SendMessageRequest {
    SendMessageRequest {
        sender_id: "cust-1".to_string(),
        receiver_id: "staff-1".to_string(),
        content: content.to_string(),
        image_url: None,
        client_message_id: Some("token-1".to_string()),
    }
}

#[tokio::test]
async fn test_connect_subscribes_to_user_queues() {
    let mut h = Harness::new("cust-1");
    h.connection.connect("cust-1").await;
    let mut server = h.next_server().await;

    let destinations = server.handshake().await;

    assert_eq!(
        destinations,
        vec![
            "/user/cust-1/queue/messages",
            "/user/cust-1/queue/unread-count",
            "/user/cust-1/queue/notifications",
        ]
    );
    let mut events = h.connection.events();
    h.connection.connect("cust-1").await;
    server.push_unread(1);
    wait_for(&mut events, "unread_count").await;

    assert_eq!(h.connection.state().await, ConnectionState::Connected);
    assert_eq!(h.connection.current_user().await.as_deref(), Some("cust-1"));
    // Second connect for the same user opened nothing new
    assert_eq!(h.transport.open_count(), 1);
}

#[tokio::test]
async fn test_empty_user_id_is_ignored() {
    let h = Harness::new("cust-1");
    h.connection.connect("   ").await;
    tokio::task::yield_now().await;

    assert_eq!(h.transport.open_count(), 0);
    assert_eq!(h.connection.state().await, ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_link_dying_during_subscribe_schedules_reconnect() {
    let mut h = Harness::new("cust-1");
    let recorder = Arc::new(RecordingHandler::default());
    h.connection.register(recorder.clone()).await;
    let mut events = h.connection.events();

    h.connection.connect("cust-1").await;
    let mut server = h.next_server().await;
    server.expect(StompCommand::Connect).await;

    // Writer side gone before the SUBSCRIBE frames can go out
    let ServerEnd {
        to_client,
        from_client,
        ..
    } = server;
    drop(from_client);
    let _ = to_client.send(Ok(StompFrame::new(StompCommand::Connected)
        .header("version", "1.2")
        .encode()));

    let mut retry = h.next_server().await;
    assert_eq!(h.connection.reconnect_attempts().await, 1);
    retry.handshake().await;
    wait_for(&mut events, "connected").await;

    assert_eq!(h.connection.state().await, ConnectionState::Connected);
    assert_eq!(h.connection.reconnect_attempts().await, 0);
    assert_eq!(h.transport.open_count(), 2);
    assert_eq!(recorder.count("disconnected"), 0);
    assert!(recorder.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_gives_up_after_five_attempts() {
    let h = Harness::new("cust-1");
    h.transport.set_refuse(true);
    let recorder = Arc::new(RecordingHandler::default());
    h.connection.register(recorder.clone()).await;
    let mut events = h.connection.events();
    let started = Instant::now();

    h.connection.connect("cust-1").await;
    let event = wait_for(&mut events, "error").await;

    // Initial open plus five reconnects, three seconds apart
    assert_eq!(h.transport.open_count(), 6);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(16));
    match event {
        evcare_realtime::RealtimeEvent::Error(err) => {
            assert_eq!(err, RealtimeError::ReconnectExhausted { attempts: 5 })
        }
        other => panic!("Unexpected event: {:?}", other),
    }

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.transport.open_count(), 6);
    assert_eq!(h.connection.state().await, ConnectionState::Disconnected);
    assert_eq!(recorder.errors().len(), 1);
    assert_eq!(recorder.count("connected"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_connect_after_giving_up_starts_over() {
    let mut h = Harness::new("cust-1");
    h.transport.set_refuse(true);
    let mut events = h.connection.events();
    h.connection.connect("cust-1").await;
    wait_for(&mut events, "error").await;

    h.transport.set_refuse(false);
    h.connect().await;

    assert_eq!(h.transport.open_count(), 7);
    assert_eq!(h.connection.reconnect_attempts().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let mut h = Harness::new("cust-1");
    let recorder = Arc::new(RecordingHandler::default());
    h.connection.register(recorder.clone()).await;
    let server = h.connect().await;
    let mut events = h.connection.events();

    server.close();
    wait_for(&mut events, "disconnected").await;
    assert_eq!(h.connection.state().await, ConnectionState::Reconnecting);

    h.connection.disconnect().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.transport.open_count(), 1);
    assert_eq!(h.connection.state().await, ConnectionState::Disconnected);
    assert_eq!(recorder.count("disconnected"), 1);
    assert!(recorder.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_successful_reconnect_resets_attempts() {
    let mut h = Harness::new("cust-1");
    let server = h.connect().await;
    let mut events = h.connection.events();

    server.fail("connection reset");
    wait_for(&mut events, "disconnected").await;
    assert_eq!(h.connection.reconnect_attempts().await, 1);

    let mut server = h.next_server().await;
    server.handshake().await;
    wait_for(&mut events, "connected").await;

    assert_eq!(h.connection.reconnect_attempts().await, 0);
    assert_eq!(h.transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_broker_error_is_reported_then_reconnects() {
    let mut h = Harness::new("cust-1");
    let server = h.connect().await;
    let mut events = h.connection.events();

    server.reply(
        StompFrame::new(StompCommand::Error)
            .header("message", "session expired")
            .body("details"),
    );

    match wait_for(&mut events, "error").await {
        evcare_realtime::RealtimeEvent::Error(err) => {
            assert_eq!(err, RealtimeError::Broker("session expired".to_string()))
        }
        other => panic!("Unexpected event: {:?}", other),
    }
    wait_for(&mut events, "disconnected").await;
    let mut next = h.next_server().await;
    next.expect(StompCommand::Connect).await;
}

#[tokio::test]
async fn test_disconnect_sends_frame_and_is_idempotent() {
    let mut h = Harness::new("cust-1");
    let recorder = Arc::new(RecordingHandler::default());
    h.connection.register(recorder.clone()).await;
    let mut server = h.connect().await;

    h.connection.disconnect().await;
    let frame = server.expect(StompCommand::Disconnect).await;
    assert!(frame.get("receipt").is_some());
    assert!(server.closed().await);

    h.connection.disconnect().await;
    assert_eq!(recorder.count("disconnected"), 1);
    assert_eq!(h.connection.current_user().await, None);
}

#[tokio::test]
async fn test_send_requires_connection() {
    let h = Harness::new("cust-1");
    let result = h.connection.send(&request("hi")).await;
    assert_eq!(result, Err(RealtimeError::NotConnected));
}

#[tokio::test]
async fn test_send_and_mark_read_use_app_destinations() {
    let mut h = Harness::new("cust-1");
    let mut server = h.connect().await;

    h.connection
        .send(&request("Is my battery covered?"))
        .await
        .expect("Failed to send");
    h.connection
        .mark_read(&evcare_realtime::MarkReadRequest {
            user_id: "cust-1".to_string(),
            other_user_id: "staff-1".to_string(),
        })
        .await
        .expect("Failed to mark read");

    let send = server.expect(StompCommand::Send).await;
    assert_eq!(send.get("destination"), Some("/app/chat.sendMessage"));
    let body: serde_json::Value = serde_json::from_str(&send.body).unwrap();
    assert_eq!(body["content"], "Is my battery covered?");
    assert_eq!(body["clientMessageId"], "token-1");

    let read = server.expect(StompCommand::Send).await;
    assert_eq!(read.get("destination"), Some("/app/chat.markAsRead"));
}

#[tokio::test]
async fn test_malformed_payload_does_not_end_session() {
    let mut h = Harness::new("cust-1");
    let server = h.connect().await;
    let mut events = h.connection.events();

    server.push_raw("MESSAGE\nsubscription:sub-messages\ndestination:/user/cust-1/queue/messages\n\nnot json\0");
    server.push_raw("\n");
    server.push_unread(3);

    match wait_for(&mut events, "unread_count").await {
        evcare_realtime::RealtimeEvent::UnreadCount(n) => assert_eq!(n, 3),
        other => panic!("Unexpected event: {:?}", other),
    }
    assert_eq!(h.connection.state().await, ConnectionState::Connected);
}
