//! Integration test: fake signaling server with a WebSocket endpoint; the negotiator must pick
//! the duplex transport and the connector must follow the config/device_info/device_msg flow.

mod common;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use common::{collect_device_msgs, next_msg, serve, test_config};
use devlink::{create_connector, ConnectorError, Transport};
use serde_json::{json, Value};

async fn ws_handler(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(handle_socket)
}

async fn send_json(socket: &mut WebSocket, value: Value) -> bool {
    socket.send(Message::Text(value.to_string())).await.is_ok()
}

/// Devices: "cvd-1" (normal), "chatty" (sends a device_msg before device_info),
/// "unruly" (unknown message type), "vanish" (closes the socket); anything else is not found.
async fn handle_socket(mut socket: WebSocket) {
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let Ok(req) = serde_json::from_str::<Value>(&text) else { continue };
        match req["message_type"].as_str() {
            Some("connect") => {
                let config = json!({
                    "message_type": "config",
                    "ice_servers": [{ "urls": ["stun:stun.example:19302"] }]
                });
                let device_id = req["device_id"].as_str().unwrap_or_default().to_string();
                match device_id.as_str() {
                    "cvd-1" | "chatty" => {
                        send_json(&mut socket, config).await;
                        if device_id == "chatty" {
                            send_json(
                                &mut socket,
                                json!({ "message_type": "device_msg", "payload": { "early": true } }),
                            )
                            .await;
                        }
                        send_json(
                            &mut socket,
                            json!({ "message_type": "device_info", "device_info": { "id": device_id } }),
                        )
                        .await;
                    }
                    "unruly" => {
                        send_json(&mut socket, json!({ "message_type": "surprise" })).await;
                    }
                    "vanish" => {
                        let _ = socket.send(Message::Close(None)).await;
                        return;
                    }
                    _ => {
                        send_json(&mut socket, json!({ "error": "not found" })).await;
                    }
                }
            }
            Some("forward") => {
                send_json(
                    &mut socket,
                    json!({ "message_type": "device_msg", "payload": req["payload"].clone() }),
                )
                .await;
            }
            _ => {}
        }
    }
}

async fn server() -> String {
    serve(Router::new().route("/connect_client", get(ws_handler))).await
}

#[tokio::test]
async fn negotiates_websocket_and_resolves_device_session() {
    let base = server().await;
    let connector = create_connector(&test_config(&base)).await;
    assert_eq!(connector.transport(), Transport::Duplex);

    let session = connector.request_device("cvd-1").await.expect("device session");
    assert_eq!(session.device_info.0, json!({ "id": "cvd-1" }));
    assert_eq!(
        session.infra_config.0["ice_servers"][0]["urls"][0],
        "stun:stun.example:19302"
    );
}

#[tokio::test]
async fn forwards_payloads_and_receives_device_messages_in_order() {
    let base = server().await;
    let connector = create_connector(&test_config(&base)).await;
    let mut rx = collect_device_msgs(connector.as_ref());
    connector.request_device("cvd-1").await.expect("device session");

    let offer = json!({ "type": "offer", "sdp": "v=0\r\n" });
    connector.send_to_device(offer.clone()).await.expect("send offer");
    connector
        .send_to_device(json!({ "type": "ice-candidate", "candidate": "c1" }))
        .await
        .expect("send candidate");

    assert_eq!(next_msg(&mut rx).await, offer);
    assert_eq!(next_msg(&mut rx).await["candidate"], "c1");
}

#[tokio::test]
async fn device_message_before_device_info_reaches_callback() {
    let base = server().await;
    let connector = create_connector(&test_config(&base)).await;
    let mut rx = collect_device_msgs(connector.as_ref());

    connector.request_device("chatty").await.expect("device session");
    assert_eq!(next_msg(&mut rx).await, json!({ "early": true }));
}

#[tokio::test]
async fn unknown_device_rejects_with_server_error() {
    let base = server().await;
    let connector = create_connector(&test_config(&base)).await;
    match connector.request_device("missing").await {
        Err(ConnectorError::Server(e)) => assert_eq!(e, "not found"),
        other => panic!("expected server error, got {:?}", other),
    }
}

#[tokio::test]
async fn unrecognized_reply_rejects_request() {
    let base = server().await;
    let connector = create_connector(&test_config(&base)).await;
    match connector.request_device("unruly").await {
        Err(ConnectorError::Protocol(raw)) => assert!(raw.contains("surprise")),
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn closed_channel_rejects_pending_request() {
    let base = server().await;
    let connector = create_connector(&test_config(&base)).await;
    assert!(matches!(
        connector.request_device("vanish").await,
        Err(ConnectorError::ChannelClosed)
    ));
    assert!(connector.send_to_device(json!("late")).await.is_err());
}

#[tokio::test]
async fn send_before_request_and_second_request_fail() {
    let base = server().await;
    let connector = create_connector(&test_config(&base)).await;
    assert!(matches!(
        connector.send_to_device(json!("too early")).await,
        Err(ConnectorError::DeviceNotSelected)
    ));

    connector.request_device("cvd-1").await.expect("device session");
    assert!(matches!(
        connector.request_device("cvd-1").await,
        Err(ConnectorError::DeviceAlreadyRequested)
    ));
}
