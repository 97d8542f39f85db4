//! Integration tests for the agent link against a local WebSocket agent

use futures_util::{SinkExt, StreamExt};
use relaypanel_link::{AgentDispatcher, AgentEndpoint, AgentLink, LinkConfig, LinkError, LinkRegistry};
use relaypanel_proto::{AgentCommand, LimiterRef, ServiceDeletion};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

async fn agent_listener(node_id: i64) -> (TcpListener, AgentEndpoint) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, AgentEndpoint::new(node_id, "127.0.0.1", port))
}

fn test_config() -> LinkConfig {
    LinkConfig::default()
        .with_call_timeout(Duration::from_secs(2))
        .with_reconnect_backoff(Duration::from_millis(50))
}

fn delete_limiter(name: &str) -> AgentCommand {
    AgentCommand::DeleteLimiters(LimiterRef {
        limiter: name.to_string(),
    })
}

fn ack(request: &Value) -> Message {
    Message::Text(
        json!({
            "id": request["id"],
            "code": 0,
            "msg": "OK",
            "echo": request["params"],
        })
        .to_string(),
    )
}

async fn next_request(ws: &mut WebSocketStream<TcpStream>) -> Option<Value> {
    while let Some(Ok(message)) = ws.next().await {
        if let Message::Text(text) = message {
            return Some(serde_json::from_str(&text).unwrap());
        }
    }
    None
}

async fn echo(mut ws: WebSocketStream<TcpStream>) {
    while let Some(request) = next_request(&mut ws).await {
        if ws.send(ack(&request)).await.is_err() {
            break;
        }
    }
}

/// Agent that accepts connections forever and acknowledges every request
fn spawn_echo_agent(listener: TcpListener) {
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = accept_async(stream).await {
                tokio::spawn(echo(ws));
            }
        }
    });
}

#[tokio::test]
async fn test_call_receives_reply() {
    let (listener, endpoint) = agent_listener(1).await;
    spawn_echo_agent(listener);

    let link = AgentLink::new(endpoint, test_config());
    link.connect().await.unwrap();

    let reply = link
        .call(AgentCommand::DeleteService(ServiceDeletion::for_rule("7_1_0")))
        .await
        .unwrap();

    assert_eq!(reply["code"], 0);
    assert_eq!(reply["echo"]["services"], json!(["7_1_0_tcp", "7_1_0_udp"]));
    assert_eq!(link.pending_calls(), 0);
}

#[tokio::test]
async fn test_out_of_order_replies_reach_their_callers() {
    let (listener, endpoint) = agent_listener(1).await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let first = next_request(&mut ws).await.unwrap();
        let second = next_request(&mut ws).await.unwrap();

        // Reply in reverse order
        ws.send(ack(&second)).await.unwrap();
        ws.send(ack(&first)).await.unwrap();
        echo(ws).await;
    });

    let link = AgentLink::new(endpoint, test_config());
    link.connect().await.unwrap();

    let (a, b) = tokio::join!(
        link.call(delete_limiter("a")),
        link.call(delete_limiter("b"))
    );

    assert_eq!(a.unwrap()["echo"]["limiter"], "a");
    assert_eq!(b.unwrap()["echo"]["limiter"], "b");
    assert_eq!(link.pending_calls(), 0);
}

#[tokio::test]
async fn test_silent_agent_times_out() {
    let (listener, endpoint) = agent_listener(1).await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while next_request(&mut ws).await.is_some() {}
    });

    let link = AgentLink::new(endpoint, test_config());
    link.connect().await.unwrap();

    let err = link
        .call_with_timeout(delete_limiter("slow"), Duration::from_millis(100))
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {}", err);
    assert_eq!(link.pending_calls(), 0);
}

#[tokio::test]
async fn test_foreign_and_garbage_messages_are_dropped() {
    let (listener, endpoint) = agent_listener(1).await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let request = next_request(&mut ws).await.unwrap();
        ws.send(Message::Text("not json".to_string())).await.unwrap();
        ws.send(Message::Text(json!({"id": "someone-else"}).to_string()))
            .await
            .unwrap();
        ws.send(Message::Text(json!({"event": "stats"}).to_string()))
            .await
            .unwrap();
        ws.send(ack(&request)).await.unwrap();
        echo(ws).await;
    });

    let link = AgentLink::new(endpoint, test_config());
    link.connect().await.unwrap();

    let reply = link.call(delete_limiter("x")).await.unwrap();
    assert_eq!(reply["echo"]["limiter"], "x");
}

#[tokio::test]
async fn test_connect_to_dead_agent_is_unreachable() {
    let (listener, endpoint) = agent_listener(1).await;
    drop(listener);

    let link = AgentLink::new(endpoint, test_config());
    let err = link.connect().await.unwrap_err();
    assert!(err.is_unreachable(), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_call_without_connection_is_unreachable() {
    let (_listener, endpoint) = agent_listener(1).await;
    let link = AgentLink::new(endpoint, test_config());

    let err = link.call(delete_limiter("x")).await.unwrap_err();
    assert!(err.is_unreachable());
    assert_eq!(link.pending_calls(), 0);
}

#[tokio::test]
async fn test_reconnects_after_agent_drops_connection() {
    let (listener, endpoint) = agent_listener(1).await;

    tokio::spawn(async move {
        // First connection answers one call, then goes away.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let request = next_request(&mut ws).await.unwrap();
        ws.send(ack(&request)).await.unwrap();
        let _ = ws.close(None).await;
        drop(ws);

        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = accept_async(stream).await {
                tokio::spawn(echo(ws));
            }
        }
    });

    let link = AgentLink::new(endpoint, test_config());
    link.connect().await.unwrap();
    link.call(delete_limiter("before")).await.unwrap();

    let mut recovered = None;
    for _ in 0..100 {
        match link
            .call_with_timeout(delete_limiter("after"), Duration::from_millis(200))
            .await
        {
            Ok(reply) => {
                recovered = Some(reply);
                break;
            }
            Err(err) => {
                assert!(
                    err.is_timeout() || err.is_unreachable(),
                    "unexpected error: {}",
                    err
                );
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    }

    let reply = recovered.expect("link never recovered");
    assert_eq!(reply["echo"]["limiter"], "after");
    assert!(link.connection_count() >= 2);
    assert_eq!(link.pending_calls(), 0);
}

#[tokio::test]
async fn test_close_releases_waiting_callers() {
    let (listener, endpoint) = agent_listener(1).await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while next_request(&mut ws).await.is_some() {}
    });

    let link = AgentLink::new(endpoint, test_config());
    link.connect().await.unwrap();

    let waiting = {
        let link = link.clone();
        tokio::spawn(async move {
            link.call_with_timeout(delete_limiter("never"), Duration::from_secs(30))
                .await
        })
    };

    for _ in 0..100 {
        if link.pending_calls() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    link.close().await;

    let err = waiting.await.unwrap().unwrap_err();
    assert!(matches!(err, LinkError::Closed(_)));
    assert!(!link.is_connected());
}

#[tokio::test]
async fn test_registry_dispatch_reuses_one_link() {
    let (listener, endpoint) = agent_listener(3).await;
    spawn_echo_agent(listener);

    let registry = LinkRegistry::new(test_config());

    for name in ["1", "2", "3"] {
        let reply = registry
            .dispatch(&endpoint, delete_limiter(name))
            .await
            .unwrap();
        assert_eq!(reply["echo"]["limiter"], name);
    }

    assert_eq!(registry.count(), 1);
    assert_eq!(registry.get(&endpoint).unwrap().connection_count(), 1);

    registry.close_all().await;
}

#[tokio::test]
async fn test_stalled_handshake_is_unreachable() {
    let (listener, endpoint) = agent_listener(1).await;

    // Accepts TCP but never answers the upgrade request.
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let config = test_config()
        .with_call_timeout(Duration::from_millis(300))
        .with_connect_timeout(Duration::from_millis(300));
    let registry = LinkRegistry::new(config);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        registry.dispatch(&endpoint, delete_limiter("x")),
    )
    .await
    .expect("dispatch hung on a stalled handshake");

    let err = result.unwrap_err();
    assert!(err.is_unreachable(), "unexpected error: {}", err);

    // A second caller is not stuck behind the first dial either.
    let result = tokio::time::timeout(Duration::from_secs(5), registry.probe(&endpoint))
        .await
        .expect("probe hung on a stalled handshake");
    assert!(result.unwrap_err().is_unreachable());

    registry.close_all().await;
}

#[tokio::test]
async fn test_in_flight_call_survives_drop_until_deadline() {
    let (listener, endpoint) = agent_listener(1).await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        next_request(&mut ws).await.unwrap();
        // Drop the socket and stop listening without replying.
        drop(ws);
        drop(listener);
    });

    let link = AgentLink::new(endpoint, test_config());
    link.connect().await.unwrap();

    let deadline = Duration::from_millis(800);
    let started = tokio::time::Instant::now();
    let err = link
        .call_with_timeout(delete_limiter("dropped"), deadline)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout(), "unexpected error: {}", err);
    assert!(elapsed >= deadline, "call settled early after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(3), "call settled late after {:?}", elapsed);
    assert_eq!(link.pending_calls(), 0);
    assert_eq!(link.connection_count(), 1);

    link.close().await;
}

#[tokio::test]
async fn test_closed_link_stays_closed() {
    let (listener, endpoint) = agent_listener(1).await;
    spawn_echo_agent(listener);

    let registry = LinkRegistry::new(test_config());
    let old = registry.link(&endpoint).await;
    old.connect().await.unwrap();

    // Same node under new credentials evicts and closes the old link.
    let moved = endpoint.clone().with_credentials("admin", "pw");
    registry.link(&moved).await;
    assert!(old.is_closed());

    let err = old.connect().await.unwrap_err();
    assert!(matches!(err, LinkError::Closed(_)));
    let err = old.call(delete_limiter("late")).await.unwrap_err();
    assert!(matches!(err, LinkError::Closed(_)));

    assert!(!old.is_connected());
    assert_eq!(old.connection_count(), 1);
    assert_eq!(registry.count(), 1);

    registry.close_all().await;
}
