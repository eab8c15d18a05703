// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bridge connector tests against an in-process fake bridge.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use zapline_bridge::BridgeConnector;
use zapline_config::model::BridgeConfig;
use zapline_core::{
    CloseReason, CredentialBlob, GatewayConnection, GatewayConnector, GatewayEvent, MessageId,
    TenantId, ZaplineError,
};

type ServerSide = WebSocketStream<TcpStream>;

/// Listens on loopback and hands every accepted WebSocket to the test.
async fn fake_bridge() -> (String, mpsc::Receiver<ServerSide>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            if let Ok(ws) = accept_async(tcp).await
                && tx.send(ws).await.is_err()
            {
                break;
            }
        }
    });
    (url, rx)
}

fn connector(url: &str) -> BridgeConnector {
    BridgeConnector::new(&BridgeConfig {
        url: url.to_string(),
        connect_timeout_ms: 2_000,
        request_timeout_ms: 300,
    })
}

async fn read_frame(server: &mut ServerSide) -> Value {
    loop {
        match server.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("bridge connection ended: {other:?}"),
        }
    }
}

async fn write_frame(server: &mut ServerSide, frame: Value) {
    server
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

async fn next_event(connection: &mut GatewayConnection) -> Option<GatewayEvent> {
    tokio::time::timeout(Duration::from_secs(5), connection.events.recv())
        .await
        .expect("no event within 5s")
}

/// Opens a connection and returns both ends after the start frame.
async fn open(credentials: Option<CredentialBlob>) -> (GatewayConnection, ServerSide, Value) {
    let (url, mut accepted) = fake_bridge().await;
    let connector = connector(&url);
    let connection = connector
        .connect(&TenantId::from("acme"), credentials)
        .await
        .unwrap();
    let mut server = accepted.recv().await.unwrap();
    let start = read_frame(&mut server).await;
    (connection, server, start)
}

#[tokio::test]
async fn pairing_flow_reaches_the_event_stream() {
    let (mut connection, mut server, start) = open(None).await;
    assert_eq!(start["type"], "start");
    assert_eq!(start["tenant_id"], "acme");
    assert!(start["credentials"].is_null());

    write_frame(&mut server, json!({"type": "qr", "code": "2@abc"})).await;
    write_frame(&mut server, json!({"type": "credentials", "blob": "bm9pc2Uta2V5"})).await;
    write_frame(
        &mut server,
        json!({"type": "connected", "phone_number": "5511400000000", "business_name": "Imobiliária Sol"}),
    )
    .await;

    assert_eq!(
        next_event(&mut connection).await,
        Some(GatewayEvent::Qr {
            code: "2@abc".into()
        })
    );
    assert_eq!(
        next_event(&mut connection).await,
        Some(GatewayEvent::CredentialsUpdated(CredentialBlob(
            b"noise-key".to_vec()
        )))
    );
    assert_eq!(
        next_event(&mut connection).await,
        Some(GatewayEvent::Connected {
            phone_number: "5511400000000".into(),
            business_name: Some("Imobiliária Sol".into()),
        })
    );
}

#[tokio::test]
async fn stored_credentials_are_sent_on_start() {
    let (_connection, _server, start) = open(Some(CredentialBlob(b"noise-key".to_vec()))).await;
    assert_eq!(start["credentials"], "bm9pc2Uta2V5");
}

#[tokio::test]
async fn inbound_messages_are_decoded() {
    let (mut connection, mut server, _) = open(None).await;
    write_frame(
        &mut server,
        json!({
            "type": "message",
            "id": "3EB0C1",
            "from": "5511988887777@s.whatsapp.net",
            "text": "oi",
            "push_name": "Maria"
        }),
    )
    .await;

    let Some(GatewayEvent::Message(message)) = next_event(&mut connection).await else {
        panic!("expected a message");
    };
    assert_eq!(message.id, MessageId::from("3EB0C1"));
    assert_eq!(message.sender, "5511988887777@s.whatsapp.net");
    assert_eq!(message.push_name.as_deref(), Some("Maria"));
    assert!(!message.from_me);
}

#[tokio::test]
async fn sends_are_correlated_with_acks() {
    let (connection, mut server, _) = open(None).await;
    let socket = connection.socket.clone();

    let send = tokio::spawn(async move {
        socket
            .send_text("5511988887777@s.whatsapp.net", "Olá!")
            .await
    });
    let frame = read_frame(&mut server).await;
    assert_eq!(frame["type"], "send_text");
    assert_eq!(frame["text"], "Olá!");
    let request_id = frame["request_id"].as_str().unwrap().to_string();

    // An unrelated ack must not complete the send.
    write_frame(&mut server, json!({"type": "ack", "request_id": "other", "message_id": "X"}))
        .await;
    write_frame(
        &mut server,
        json!({"type": "ack", "request_id": request_id, "message_id": "3EB0FF"}),
    )
    .await;

    assert_eq!(send.await.unwrap().unwrap(), MessageId::from("3EB0FF"));
}

#[tokio::test]
async fn media_sends_carry_the_caption() {
    let (connection, mut server, _) = open(None).await;
    let socket = connection.socket.clone();

    let send = tokio::spawn(async move {
        socket
            .send_media(
                "5511988887777@s.whatsapp.net",
                "https://cdn.example.com/planta.jpg",
                Some("Planta do 2º andar"),
            )
            .await
    });
    let frame = read_frame(&mut server).await;
    assert_eq!(frame["type"], "send_media");
    assert_eq!(frame["url"], "https://cdn.example.com/planta.jpg");
    assert_eq!(frame["caption"], "Planta do 2º andar");
    write_frame(
        &mut server,
        json!({"type": "ack", "request_id": frame["request_id"], "message_id": "M1"}),
    )
    .await;

    assert_eq!(send.await.unwrap().unwrap(), MessageId::from("M1"));
}

#[tokio::test]
async fn rejected_send_is_an_error() {
    let (connection, mut server, _) = open(None).await;
    let socket = connection.socket.clone();

    let send = tokio::spawn(async move { socket.send_text("bad@s.whatsapp.net", "x").await });
    let frame = read_frame(&mut server).await;
    write_frame(
        &mut server,
        json!({"type": "error", "request_id": frame["request_id"], "message": "not on WhatsApp"}),
    )
    .await;

    let err = send.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("not on WhatsApp"));
    assert!(matches!(err, ZaplineError::Rejected { .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn unacknowledged_send_times_out() {
    let (connection, mut server, _) = open(None).await;
    let err = connection
        .socket
        .send_text("5511988887777@s.whatsapp.net", "hello?")
        .await
        .unwrap_err();
    assert!(matches!(err, ZaplineError::Timeout { .. }));
    assert_eq!(read_frame(&mut server).await["type"], "send_text");
}

#[tokio::test]
async fn logged_out_frame_ends_the_stream() {
    let (mut connection, mut server, _) = open(None).await;
    write_frame(&mut server, json!({"type": "closed", "reason": "logged_out"})).await;

    assert_eq!(
        next_event(&mut connection).await,
        Some(GatewayEvent::Closed(CloseReason::LoggedOut))
    );
    assert_eq!(next_event(&mut connection).await, None);
}

#[tokio::test]
async fn bridge_hangup_ends_the_stream_and_fails_sends() {
    let (mut connection, mut server, _) = open(None).await;
    let socket = connection.socket.clone();

    let send = tokio::spawn(async move {
        socket
            .send_text("5511988887777@s.whatsapp.net", "perdida")
            .await
    });
    read_frame(&mut server).await;
    server.close(None).await.unwrap();

    assert_eq!(next_event(&mut connection).await, None);
    let err = send.await.unwrap().unwrap_err();
    assert!(matches!(err, ZaplineError::SocketClosed { .. }));
}

#[tokio::test]
async fn garbage_frames_are_skipped() {
    let (mut connection, mut server, _) = open(None).await;
    server
        .send(Message::Text("{not json".to_string().into()))
        .await
        .unwrap();
    write_frame(&mut server, json!({"type": "presence", "who": "x"})).await;
    write_frame(&mut server, json!({"type": "qr", "code": "still-alive"})).await;

    assert_eq!(
        next_event(&mut connection).await,
        Some(GatewayEvent::Qr {
            code: "still-alive".into()
        })
    );
}

#[tokio::test]
async fn logout_writes_a_frame_and_closes() {
    let (mut connection, mut server, _) = open(None).await;
    connection.socket.logout().await.unwrap();

    assert_eq!(read_frame(&mut server).await["type"], "logout");
    assert_eq!(next_event(&mut connection).await, None);
}

#[tokio::test]
async fn dropping_the_socket_closes_the_connection() {
    let (connection, mut server, _) = open(None).await;
    let GatewayConnection { socket, mut events } = connection;
    drop(socket);

    let end = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap();
    assert!(end.is_none());
    // The bridge sees the close handshake.
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match server.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}
