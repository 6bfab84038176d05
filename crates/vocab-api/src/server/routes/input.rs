#[derive(Debug, Deserialize)]
struct TextInputRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
struct SpeechInputRequest {
    text: String,
    confidence: f64,
}

#[derive(Debug, Serialize)]
struct InputResponse {
    schema_version: String,
    player_id: PlayerId,
    /// Text that continues on to the game. Absent for speech.
    passthrough: Option<String>,
    /// Events the input produced, in order.
    events: Vec<LobbyEvent>,
}

impl InputResponse {
    fn new(player_id: PlayerId, passthrough: Option<String>, events: Vec<LobbyEvent>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            player_id,
            passthrough,
            events,
        }
    }
}

async fn submit_chat(
    Path(player_id): Path<PlayerId>,
    State(state): State<AppState>,
    Json(request): Json<TextInputRequest>,
) -> Result<Json<InputResponse>, HttpApiError> {
    let (passthrough, events) = with_lobby(&state, move |lobby| {
        let since = last_sequence(lobby);
        let passthrough = lobby.chat(player_id, &request.text)?;
        Ok((passthrough, lobby.events_since(since).to_vec()))
    })
    .await?;

    Ok(Json(InputResponse::new(player_id, Some(passthrough), events)))
}

async fn submit_terminal(
    Path(player_id): Path<PlayerId>,
    State(state): State<AppState>,
    Json(request): Json<TextInputRequest>,
) -> Result<Json<InputResponse>, HttpApiError> {
    let (passthrough, events) = with_lobby(&state, move |lobby| {
        let since = last_sequence(lobby);
        let passthrough = lobby.terminal(player_id, &request.text)?;
        Ok((passthrough, lobby.events_since(since).to_vec()))
    })
    .await?;

    Ok(Json(InputResponse::new(player_id, Some(passthrough), events)))
}

async fn submit_speech(
    Path(player_id): Path<PlayerId>,
    State(state): State<AppState>,
    Json(request): Json<SpeechInputRequest>,
) -> Result<Json<InputResponse>, HttpApiError> {
    let events = with_lobby(&state, move |lobby| {
        let since = last_sequence(lobby);
        lobby.speech(player_id, &request.text, request.confidence)?;
        Ok(lobby.events_since(since).to_vec())
    })
    .await?;

    Ok(Json(InputResponse::new(player_id, None, events)))
}
