//! End-to-end tests against a local tokio-tungstenite server.

use std::time::Duration;

use anyhow::{Context, bail};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_async, accept_hdr_async};

use realtime_link::{ConnectionManager, ConnectionState, EventKind, LifecycleEvent};

// ============================================================================
// Helpers
// ============================================================================

const WAIT: Duration = Duration::from_secs(5);

/// Next text frame as JSON, or `None` once the client closes.
async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> anyhow::Result<Option<Value>> {
    while let Some(message) = ws.next().await {
        match message? {
            Message::Text(text) => return Ok(Some(serde_json::from_str(text.as_str())?)),
            Message::Close(_) => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) -> anyhow::Result<()> {
    ws.send(Message::Text(value.to_string().into())).await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn subscribe_dispatch_and_request_over_websocket() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (handshake_tx, handshake_rx) = oneshot::channel::<(Option<String>, Option<String>)>();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let mut ws = accept_hdr_async(
            stream,
            move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                let auth = request
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let query = request.uri().query().map(str::to_string);
                let _ = handshake_tx.send((auth, query));
                Ok(response)
            },
        )
        .await?;

        let directive = next_json(&mut ws).await?.context("expected subscribe")?;
        if directive != json!({ "type": "subscribe", "channel": "trades" }) {
            bail!("unexpected directive: {directive}");
        }
        send_json(&mut ws, json!({ "channel": "trades", "data": { "px": 7 } })).await?;

        let request = next_json(&mut ws).await?.context("expected request")?;
        if request["type"] != "request" || request["requestType"] != "quote" {
            bail!("unexpected request: {request}");
        }
        send_json(
            &mut ws,
            json!({ "requestId": request["requestId"], "data": { "px": 42 } }),
        )
        .await?;

        // Drain until the client's close frame.
        while next_json(&mut ws).await?.is_some() {}
        anyhow::Ok(())
    });

    let link = ConnectionManager::builder()
        .endpoint(format!("ws://{addr}/feed"))
        .heartbeat_interval(Duration::ZERO)
        .build()?;

    let (data_tx, mut data_rx) = mpsc::unbounded_channel();
    let _trades = link.subscribe("trades", move |data| {
        let _ = data_tx.send(data.clone());
    });

    link.connect("tok-123", "desk 7");
    link.wait_connected(WAIT).await?;

    let (auth, query) = timeout(WAIT, handshake_rx).await??;
    assert_eq!(auth.as_deref(), Some("Bearer tok-123"));
    assert_eq!(query.as_deref(), Some("identity=desk+7"));

    let data = timeout(WAIT, data_rx.recv()).await?.context("channel closed")?;
    assert_eq!(data, json!({ "px": 7 }));

    let quote = link
        .request("quote", json!({ "symbol": "BTC" }), WAIT)?
        .await?;
    assert_eq!(quote, json!({ "px": 42 }));

    link.disconnect();
    assert_eq!(link.state(), ConnectionState::Disconnected);
    timeout(WAIT, server).await???;
    Ok(())
}

#[tokio::test]
async fn reconnects_and_resubscribes_after_server_drop() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (directive_tx, mut directive_rx) = mpsc::unbounded_channel::<Value>();

    let server = tokio::spawn(async move {
        for round in 0..2 {
            let (stream, _) = listener.accept().await?;
            let mut ws = accept_async(stream).await?;
            let directive = next_json(&mut ws).await?.context("expected subscribe")?;
            let _ = directive_tx.send(directive);

            if round == 0 {
                // Drop without a close frame.
                drop(ws);
            } else {
                while next_json(&mut ws).await?.is_some() {}
            }
        }
        anyhow::Ok(())
    });

    let link = ConnectionManager::builder()
        .endpoint(format!("ws://{addr}"))
        .reconnect_delay(Duration::from_millis(50))
        .max_reconnect_delay(Duration::from_millis(200))
        .heartbeat_interval(Duration::ZERO)
        .build()?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    for kind in [EventKind::Connected, EventKind::Reconnecting] {
        let event_tx = event_tx.clone();
        link.on(kind, move |event| {
            let _ = event_tx.send(event.clone());
        });
    }

    let _book = link.subscribe("book", |_| {});
    link.connect("tok", "desk");

    for _ in 0..2 {
        let directive = timeout(WAIT, directive_rx.recv())
            .await?
            .context("server stopped")?;
        assert_eq!(directive, json!({ "type": "subscribe", "channel": "book" }));
    }

    let mut seen = Vec::new();
    while seen.iter().filter(|e| matches!(e, LifecycleEvent::Connected)).count() < 2 {
        let event = timeout(WAIT, event_rx.recv()).await?.context("listener gone")?;
        seen.push(event);
    }
    assert!(
        seen.iter()
            .any(|e| matches!(e, LifecycleEvent::Reconnecting { attempt: 1, .. }))
    );

    link.disconnect();
    timeout(WAIT, server).await???;
    Ok(())
}
