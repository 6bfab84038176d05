async fn stream_lobby(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let initial_message = {
        let inner = state.inner.lock().await;
        StreamMessage::lobby_status(&inner.lobby.status())
    };

    ws.on_upgrade(move |socket| stream_socket(socket, state, initial_message))
}

async fn stream_socket(mut socket: WebSocket, state: AppState, initial_message: StreamMessage) {
    if send_stream_message(&mut socket, &initial_message)
        .await
        .is_err()
    {
        return;
    }

    let mut rx = state.stream_tx.subscribe();
    debug!("stream subscriber attached");

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        break;
                    }
                    _ => {}
                }
            }
            outgoing = rx.recv() => {
                match outgoing {
                    Ok(message) => {
                        if send_stream_message(&mut socket, &message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "stream subscriber lagged");
                        let warning = StreamMessage::warning(format!(
                            "stream client lagged and skipped {skipped} message(s); resync with GET /api/v1/lobby/events"
                        ));
                        if send_stream_message(&mut socket, &warning).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        }
    }
    debug!("stream subscriber detached");
}

async fn send_stream_message(
    socket: &mut WebSocket,
    message: &StreamMessage,
) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(message).map_err(axum::Error::new)?;
    socket.send(Message::Text(payload.into())).await
}

#[derive(Debug, Clone, Serialize)]
struct StreamMessage {
    schema_version: String,
    #[serde(rename = "type")]
    message_type: String,
    sequence: Option<u64>,
    payload: Value,
}

impl StreamMessage {
    fn lobby_status(status: &LobbyStatus) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "lobby.status".to_string(),
            sequence: None,
            payload: json!(status),
        }
    }

    fn event_appended(event: &LobbyEvent) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "event.appended".to_string(),
            sequence: Some(event.sequence),
            payload: json!(event),
        }
    }

    fn warning(message: String) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "warning".to_string(),
            sequence: None,
            payload: json!({ "message": message }),
        }
    }
}
