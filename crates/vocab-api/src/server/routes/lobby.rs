#[derive(Debug, Deserialize)]
struct JoinRequest {
    player_id: PlayerId,
}

#[derive(Debug, Serialize)]
struct PlayerResponse {
    schema_version: String,
    player_id: PlayerId,
    status: LobbyStatus,
}

#[derive(Debug, Deserialize)]
struct StartRoundRequest {
    location_id: String,
}

#[derive(Debug, Serialize)]
struct RoundResponse {
    schema_version: String,
    /// `None` when ending a round while the lobby is idle.
    round_id: Option<u64>,
    status: LobbyStatus,
}

/// Settings write; `player_id` names the requester and must be the host.
#[derive(Debug, Deserialize)]
struct SettingsUpdateRequest {
    player_id: PlayerId,
    #[serde(flatten)]
    update: SettingsUpdate,
}

#[derive(Debug, Deserialize)]
struct ForcedCategoriesRequest {
    player_id: PlayerId,
    categories: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ForcedCategoriesResponse {
    schema_version: String,
    forced_category_names: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CatalogueResponse {
    schema_version: String,
    entries: Vec<CatalogueEntry>,
    forced_category_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AdvanceClockRequest {
    delta_ms: u64,
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    since: Option<u64>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EventsResponse {
    schema_version: String,
    events: Vec<LobbyEvent>,
    /// Pass as `since` to continue after this page.
    next_since: Option<u64>,
}

async fn get_status(State(state): State<AppState>) -> Json<LobbyStatus> {
    let inner = state.inner.lock().await;
    Json(inner.lobby.status())
}

async fn join_player(
    State(state): State<AppState>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<PlayerResponse>, HttpApiError> {
    let player_id = request.player_id;
    let status = with_lobby(&state, move |lobby| {
        lobby.join(player_id)?;
        Ok(lobby.status())
    })
    .await?;

    Ok(Json(PlayerResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        player_id,
        status,
    }))
}

async fn leave_player(
    Path(player_id): Path<PlayerId>,
    State(state): State<AppState>,
) -> Result<Json<PlayerResponse>, HttpApiError> {
    let status = with_lobby(&state, move |lobby| {
        lobby.leave(player_id)?;
        Ok(lobby.status())
    })
    .await?;

    Ok(Json(PlayerResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        player_id,
        status,
    }))
}

async fn start_round(
    State(state): State<AppState>,
    Json(request): Json<StartRoundRequest>,
) -> Result<Json<RoundResponse>, HttpApiError> {
    let (round_id, status) = with_lobby(&state, move |lobby| {
        let round_id = lobby.start_round(&request.location_id)?;
        Ok((round_id, lobby.status()))
    })
    .await?;

    Ok(Json(RoundResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        round_id: Some(round_id),
        status,
    }))
}

async fn end_round(State(state): State<AppState>) -> Result<Json<RoundResponse>, HttpApiError> {
    let (round_id, status) = with_lobby(&state, |lobby| {
        let round_id = lobby.end_round();
        Ok((round_id, lobby.status()))
    })
    .await?;

    Ok(Json(RoundResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        round_id,
        status,
    }))
}

async fn get_settings(State(state): State<AppState>) -> Json<SessionSettings> {
    let inner = state.inner.lock().await;
    Json(inner.lobby.settings().clone())
}

async fn update_settings(
    State(state): State<AppState>,
    Json(request): Json<SettingsUpdateRequest>,
) -> Result<Json<SessionSettings>, HttpApiError> {
    let SettingsUpdateRequest { player_id, update } = request;
    let settings = with_lobby(&state, move |lobby| lobby.update_settings(player_id, &update)).await?;
    Ok(Json(settings))
}

async fn set_forced_categories(
    State(state): State<AppState>,
    Json(request): Json<ForcedCategoriesRequest>,
) -> Result<Json<ForcedCategoriesResponse>, HttpApiError> {
    let ForcedCategoriesRequest { player_id, categories } = request;
    let forced_category_names =
        with_lobby(&state, move |lobby| lobby.set_forced_categories(player_id, categories)).await?;
    Ok(Json(ForcedCategoriesResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        forced_category_names,
    }))
}

async fn get_catalogue(State(state): State<AppState>) -> Json<CatalogueResponse> {
    let inner = state.inner.lock().await;
    Json(CatalogueResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        entries: inner.lobby.catalogue(),
        forced_category_names: inner.lobby.authority().forced_categories().into_iter().collect(),
    })
}

async fn advance_clock(
    State(state): State<AppState>,
    Json(request): Json<AdvanceClockRequest>,
) -> Result<Json<LobbyStatus>, HttpApiError> {
    if request.delta_ms == 0 {
        return Err(HttpApiError::invalid_input("delta_ms must be >= 1", None));
    }
    let status = with_lobby(&state, move |lobby| {
        lobby.advance_clock(request.delta_ms);
        Ok(lobby.status())
    })
    .await?;
    Ok(Json(status))
}

async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let limit = query.limit.unwrap_or(MAX_EVENT_PAGE).clamp(1, MAX_EVENT_PAGE);
    let inner = state.inner.lock().await;
    let tail = inner.lobby.events_since(query.since.unwrap_or(0));
    let events: Vec<LobbyEvent> = tail.iter().take(limit).cloned().collect();
    let next_since = if tail.len() > limit {
        events.last().map(|event| event.sequence)
    } else {
        None
    };

    Json(EventsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        events,
        next_since,
    })
}
